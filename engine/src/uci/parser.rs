use serde::{Deserialize, Serialize};

/// What kind of line an [`EngineEvent`] was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    UciOk,
    ReadyOk,
    Id,
    BestMove,
    Info,
    /// Synthesized by the adapter when the transport goes away on its own.
    ChannelLost,
    Other,
}

/// `id name ...` / `id author ...`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineId {
    pub key: String,
    pub value: String,
}

/// One line of engine output, with whatever could be extracted from it.
///
/// `raw_text` is always the line exactly as received. Every other field is a
/// best-effort extraction and is left unset when the line does not carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub raw_text: String,
    pub kind: EventKind,
    pub best_move: Option<String>,
    pub ponder_move: Option<String>,
    pub score_centipawns: Option<i32>,
    pub mate_in: Option<i32>, // Negative when the engine gets mated
    pub principal_variation: Option<Vec<String>>,
    pub search_depth: u32,
    pub seldepth: Option<u32>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time_ms: Option<u64>,
    pub multipv: Option<u32>,
    pub id: Option<EngineId>,
}

impl EngineEvent {
    fn raw(raw_text: &str, kind: EventKind) -> Self {
        Self {
            raw_text: raw_text.to_string(),
            kind,
            best_move: None,
            ponder_move: None,
            score_centipawns: None,
            mate_in: None,
            principal_variation: None,
            search_depth: 0,
            seldepth: None,
            nodes: None,
            nps: None,
            time_ms: None,
            multipv: None,
            id: None,
        }
    }

    pub(crate) fn channel_lost(reason: &str) -> Self {
        Self::raw(reason, EventKind::ChannelLost)
    }

    /// `uciok` or `readyok`
    pub fn is_handshake(&self) -> bool {
        matches!(self.kind, EventKind::UciOk | EventKind::ReadyOk)
    }

    /// A search result; callers waiting for analysis to finish filter on this.
    pub fn is_terminal(&self) -> bool {
        self.best_move.is_some()
    }
}

/// Parse a line of engine output. Never fails: unrecognized text comes back
/// as an [`EventKind::Other`] event carrying only `raw_text`.
pub fn parse_line(raw: &str) -> EngineEvent {
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    match tokens.first() {
        Some(&"uciok") if tokens.len() == 1 => EngineEvent::raw(raw, EventKind::UciOk),
        Some(&"readyok") if tokens.len() == 1 => EngineEvent::raw(raw, EventKind::ReadyOk),

        Some(&"id") => {
            let mut event = EngineEvent::raw(raw, EventKind::Id);
            if tokens.len() >= 3 {
                event.id = Some(EngineId {
                    key: tokens[1].to_string(),
                    value: tokens[2..].join(" "),
                });
            }
            event
        }

        Some(&"bestmove") => {
            let mut event = EngineEvent::raw(raw, EventKind::BestMove);
            event.best_move = tokens.get(1).map(|s| s.to_string());
            if tokens.get(2) == Some(&"ponder") {
                event.ponder_move = tokens.get(3).map(|s| s.to_string());
            }
            event
        }

        Some(&"info") => {
            let mut event = EngineEvent::raw(raw, EventKind::Info);
            parse_info_tokens(&tokens[1..], &mut event);
            event
        }

        _ => EngineEvent::raw(raw, EventKind::Other),
    }
}

/// Fill the analysis fields of `event` from the tokens after `info`
fn parse_info_tokens(tokens: &[&str], event: &mut EngineEvent) {
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i] {
            "depth" => {
                i += 1;
                event.search_depth = tokens.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
            }
            "seldepth" => {
                i += 1;
                event.seldepth = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "time" => {
                i += 1;
                event.time_ms = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nodes" => {
                i += 1;
                event.nodes = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "nps" => {
                i += 1;
                event.nps = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "multipv" => {
                i += 1;
                event.multipv = tokens.get(i).and_then(|s| s.parse().ok());
            }
            "score" => {
                i += 1;
                if let Some(&score_type) = tokens.get(i) {
                    i += 1;
                    let value = tokens.get(i).and_then(|s| s.parse::<i32>().ok());
                    match score_type {
                        "cp" => event.score_centipawns = value,
                        "mate" => event.mate_in = value,
                        _ => {}
                    }
                }
            }
            "pv" => {
                // Collect all moves until next keyword
                i += 1;
                let mut pv = Vec::new();
                while i < tokens.len() && !is_keyword(tokens[i]) {
                    pv.push(tokens[i].to_string());
                    i += 1;
                }
                if !pv.is_empty() {
                    event.principal_variation = Some(pv);
                }
                continue; // Don't increment i again
            }
            // The rest of the line is free text
            "string" => break,
            _ => {
                // Unknown keyword, skip
            }
        }
        i += 1;
    }
}

fn is_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "time"
            | "nodes"
            | "score"
            | "pv"
            | "multipv"
            | "currmove"
            | "currmovenumber"
            | "hashfull"
            | "nps"
            | "tbhits"
            | "cpuload"
            | "string"
    )
}
