//! Rendering engine events for the terminal.

use engine::EngineEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Raw engine lines, prefixed with `<<`
    Text,
    /// One JSON object per event
    Json,
}

pub fn render_event(event: &EngineEvent, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(format!("<< {}", event.raw_text)),
        OutputFormat::Json => serde_json::to_string(event),
    }
}

/// One-line summary of a finished analysis.
pub fn render_summary(best: &EngineEvent, last_info: Option<&EngineEvent>) -> String {
    let mut summary = format!("Best move: {}", best.best_move.as_deref().unwrap_or("-"));
    if let Some(ponder) = &best.ponder_move {
        summary.push_str(&format!(" (ponder {})", ponder));
    }
    if let Some(info) = last_info {
        if let Some(score) = format_score(info) {
            summary.push_str(&format!("  score: {}", score));
        }
        summary.push_str(&format!("  depth: {}", info.search_depth));
    }
    summary
}

/// `+0.32` for centipawns, `#-3` for mates.
fn format_score(event: &EngineEvent) -> Option<String> {
    if let Some(mate) = event.mate_in {
        return Some(format!("#{}", mate));
    }
    event
        .score_centipawns
        .map(|cp| format!("{:+.2}", cp as f64 / 100.0))
}
