//! UCI 输出解析
//!
//! 只解析需要用到的几类行，其余一律归为 [`UciMessage::Other`]。

use crate::evaluate::Score;

/// 一行 info 输出
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InfoLine {
    pub depth: Option<u32>,
    /// 未给出时视为 1
    pub multipv: u32,
    /// 轮到走棋一方视角
    pub score: Option<Score>,
    pub pv: Vec<String>,
}

/// 引擎输出的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciMessage {
    UciOk,
    ReadyOk,
    /// "bestmove (none)" 时 best 为 None
    BestMove {
        best: Option<String>,
        ponder: Option<String>,
    },
    Info(InfoLine),
    Other,
}

/// 解析一行
pub fn parse_line(line: &str) -> UciMessage {
    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some("uciok") => UciMessage::UciOk,
        Some("readyok") => UciMessage::ReadyOk,
        Some("bestmove") => {
            let best = tokens
                .next()
                .filter(|mv| *mv != "(none)" && *mv != "0000")
                .map(str::to_string);
            let ponder = match (tokens.next(), tokens.next()) {
                (Some("ponder"), Some(mv)) => Some(mv.to_string()),
                _ => None,
            };
            UciMessage::BestMove { best, ponder }
        }
        Some("info") => parse_info(tokens),
        _ => UciMessage::Other,
    }
}

fn parse_info<'a>(mut tokens: impl Iterator<Item = &'a str>) -> UciMessage {
    let mut info = InfoLine {
        multipv: 1,
        ..InfoLine::default()
    };

    while let Some(token) = tokens.next() {
        match token {
            // info string 之后是自由文本
            "string" => return UciMessage::Other,
            "depth" => info.depth = tokens.next().and_then(|v| v.parse().ok()),
            "multipv" => {
                info.multipv = tokens.next().and_then(|v| v.parse().ok()).unwrap_or(1);
            }
            "score" => {
                let kind = tokens.next();
                let value = tokens.next().and_then(|v| v.parse::<i32>().ok());
                info.score = match (kind, value) {
                    (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                    _ => None,
                };
            }
            // pv 总是在行尾
            "pv" => {
                info.pv = tokens.by_ref().map(str::to_string).collect();
            }
            _ => {}
        }
    }

    UciMessage::Info(info)
}
