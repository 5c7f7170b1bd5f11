//! 对局记录
//!
//! 只由对局协调器持有和修改；其它组件只能拿到它生成的快照。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Move, Position};

use crate::error::ChessError;
use crate::message::{DrawReason, GameResult, MoveQuality, Side, WinReason};

/// 对局元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub started_at: DateTime<Utc>,
}

impl GameMetadata {
    pub fn new(white: impl Into<String>, black: impl Into<String>) -> Self {
        Self {
            white: white.into(),
            black: black.into(),
            started_at: Utc::now(),
        }
    }
}

/// 某一步的评估摘要（白方视角）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlyEvaluation {
    /// 评估值（兵）
    pub pawns: Option<f64>,
    /// 杀棋步数，白方将杀为正
    pub mate: Option<i32>,
    /// 推荐着法（UCI）
    pub best_moves: Vec<String>,
}

/// 已应用的一个半回合
#[derive(Debug, Clone)]
pub struct Ply {
    /// 全局唯一编号，悔棋后不复用
    pub id: u64,
    pub mv: Move,
    pub uci: String,
    pub san: String,
    pub mover: Side,
    /// 走完后的局面
    pub position: Chess,
    pub annotation: Option<MoveQuality>,
    pub evaluation: Option<PlyEvaluation>,
}

/// 对局记录
#[derive(Debug, Clone)]
pub struct GameRecord {
    metadata: GameMetadata,
    initial: Chess,
    plies: Vec<Ply>,
    outcome: Option<GameResult>,
    next_id: u64,
}

/// 解析 FEN 为局面
pub fn parse_fen(fen: &str) -> Result<Chess, ChessError> {
    let parsed: Fen = fen.trim().parse().map_err(|e| ChessError::InvalidFen {
        reason: format!("{}", e),
    })?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| ChessError::InvalidPosition {
            reason: format!("{}", e),
        })
}

/// 局面的 FEN
pub fn fen_of(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal).to_string()
}

/// 重复局面判定用的键：去掉半回合计数与回合数
fn repetition_key(position: &Chess) -> String {
    let fen = fen_of(position);
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

/// 按 UCI 字符串在合法着法中查找
pub fn find_legal_move(position: &Chess, uci: &str) -> Option<Move> {
    position
        .legal_moves()
        .into_iter()
        .find(|m| m.to_uci(CastlingMode::Standard).to_string() == uci)
}

impl GameRecord {
    /// 从给定局面开始
    pub fn new(metadata: GameMetadata, initial: Chess) -> Self {
        Self {
            metadata,
            initial,
            plies: Vec::new(),
            outcome: None,
            next_id: 1,
        }
    }

    /// 从 FEN 开始
    pub fn from_fen(metadata: GameMetadata, fen: &str) -> Result<Self, ChessError> {
        Ok(Self::new(metadata, parse_fen(fen)?))
    }

    pub fn metadata(&self) -> &GameMetadata {
        &self.metadata
    }

    pub fn initial(&self) -> &Chess {
        &self.initial
    }

    /// 当前局面
    pub fn position(&self) -> &Chess {
        self.plies
            .last()
            .map(|p| &p.position)
            .unwrap_or(&self.initial)
    }

    pub fn plies(&self) -> &[Ply] {
        &self.plies
    }

    pub fn last(&self) -> Option<&Ply> {
        self.plies.last()
    }

    pub fn len(&self) -> usize {
        self.plies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plies.is_empty()
    }

    /// 轮到哪一方
    pub fn turn(&self) -> Side {
        self.position().turn().into()
    }

    pub fn outcome(&self) -> Option<GameResult> {
        self.outcome
    }

    pub fn set_outcome(&mut self, outcome: GameResult) {
        self.outcome = Some(outcome);
    }

    /// 应用一步合法着法
    pub fn apply(&mut self, mv: &Move) -> Result<&Ply, ChessError> {
        if self.outcome.is_some_and(|o| o.ends_play()) {
            return Err(ChessError::GameOver);
        }

        let before = self.position();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        if !before.is_legal(mv) {
            return Err(ChessError::IllegalMove { uci });
        }

        let mut san = San::from_move(before, mv).to_string();
        let mover = Side::from(before.turn());
        let position = before
            .clone()
            .play(mv)
            .map_err(|_| ChessError::IllegalMove { uci: uci.clone() })?;

        if position.is_checkmate() {
            san.push('#');
        } else if position.is_check() {
            san.push('+');
        }

        let id = self.next_id;
        self.next_id += 1;
        self.plies.push(Ply {
            id,
            mv: mv.clone(),
            uci,
            san,
            mover,
            position,
            annotation: None,
            evaluation: None,
        });

        Ok(&self.plies[self.plies.len() - 1])
    }

    /// 按 UCI 字符串应用
    pub fn apply_uci(&mut self, uci: &str) -> Result<&Ply, ChessError> {
        let mv = find_legal_move(self.position(), uci).ok_or_else(|| ChessError::IllegalMove {
            uci: uci.to_string(),
        })?;
        self.apply(&mv)
    }

    /// 撤销最后 n 个半回合，返回被撤销的部分
    pub fn undo(&mut self, n: usize) -> Result<Vec<Ply>, ChessError> {
        if n > self.plies.len() {
            return Err(ChessError::UndoOutOfRange {
                requested: n,
                available: self.plies.len(),
            });
        }
        let removed = self.plies.split_off(self.plies.len() - n);
        if n > 0 {
            self.outcome = None;
        }
        Ok(removed)
    }

    /// 按编号查找半回合（悔棋后旧编号找不到）
    pub fn ply_mut(&mut self, id: u64) -> Option<&mut Ply> {
        self.plies.iter_mut().find(|p| p.id == id)
    }

    /// 标注质量；已有标注不覆盖
    pub fn annotate(&mut self, id: u64, quality: MoveQuality) -> bool {
        match self.ply_mut(id) {
            Some(ply) if ply.annotation.is_none() => {
                ply.annotation = Some(quality);
                true
            }
            _ => false,
        }
    }

    /// 记录评估摘要
    pub fn record_evaluation(&mut self, id: u64, evaluation: PlyEvaluation) -> bool {
        match self.ply_mut(id) {
            Some(ply) => {
                ply.evaluation = Some(evaluation);
                true
            }
            None => false,
        }
    }

    /// SAN 着法列表
    pub fn san_list(&self) -> Vec<String> {
        self.plies.iter().map(|p| p.san.clone()).collect()
    }

    /// 规则判定的终局结果
    pub fn terminal_outcome(&self) -> Option<GameResult> {
        let position = self.position();

        if position.legal_moves().is_empty() {
            if position.is_checkmate() {
                let winner = Side::from(position.turn()).opponent();
                return Some(GameResult::win_for(winner, WinReason::Checkmate));
            }
            return Some(GameResult::Draw(DrawReason::Stalemate));
        }

        if position.is_insufficient_material() {
            return Some(GameResult::Draw(DrawReason::InsufficientMaterial));
        }

        if self.repetition_count() >= 3 {
            return Some(GameResult::Draw(DrawReason::Repetition));
        }

        if position.halfmoves() >= 100 {
            return Some(GameResult::Draw(DrawReason::FiftyMoves));
        }

        None
    }

    /// 当前局面出现的次数（含当前）
    fn repetition_count(&self) -> usize {
        let key = repetition_key(self.position());
        std::iter::once(&self.initial)
            .chain(self.plies.iter().map(|p| &p.position))
            .filter(|pos| repetition_key(pos) == key)
            .count()
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let export = RecordExport {
            metadata: self.metadata.clone(),
            initial_fen: fen_of(&self.initial),
            moves: self
                .plies
                .iter()
                .map(|p| PlyExport {
                    uci: p.uci.clone(),
                    san: p.san.clone(),
                    mover: p.mover,
                    fen: fen_of(&p.position),
                    annotation: p.annotation,
                    evaluation: p.evaluation.clone(),
                })
                .collect(),
            result: self.outcome.unwrap_or(GameResult::Undetermined).as_str(),
        };
        serde_json::to_string_pretty(&export)
    }
}

#[derive(Serialize)]
struct RecordExport {
    metadata: GameMetadata,
    initial_fen: String,
    moves: Vec<PlyExport>,
    result: &'static str,
}

#[derive(Serialize)]
struct PlyExport {
    uci: String,
    san: String,
    mover: Side,
    fen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotation: Option<MoveQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<PlyEvaluation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> GameRecord {
        GameRecord::new(GameMetadata::new("Alice", "Stockfish"), Chess::default())
    }

    fn play(record: &mut GameRecord, moves: &[&str]) {
        for uci in moves {
            record.apply_uci(uci).unwrap();
        }
    }

    #[test]
    fn test_apply_grows_by_one() {
        let mut record = record();
        assert_eq!(record.turn(), Side::White);

        let ply = record.apply_uci("e2e4").unwrap();
        assert_eq!(ply.san, "e4");
        assert_eq!(ply.mover, Side::White);
        assert_eq!(ply.id, 1);
        assert_eq!(record.len(), 1);
        assert_eq!(record.turn(), Side::Black);

        record.apply_uci("e7e5").unwrap();
        assert_eq!(record.san_list(), vec!["e4", "e5"]);
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut record = record();
        let err = record.apply_uci("e2e5").unwrap_err();
        assert_eq!(
            err,
            ChessError::IllegalMove {
                uci: "e2e5".to_string()
            }
        );
        assert!(record.is_empty());
    }

    #[test]
    fn test_undo() {
        let mut record = record();
        play(&mut record, &["e2e4", "e7e5", "g1f3"]);

        let err = record.undo(4).unwrap_err();
        assert_eq!(
            err,
            ChessError::UndoOutOfRange {
                requested: 4,
                available: 3
            }
        );
        assert_eq!(record.len(), 3);

        let removed = record.undo(2).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(record.len(), 1);
        assert_eq!(record.turn(), Side::Black);

        // 编号不复用
        let ply = record.apply_uci("c7c5").unwrap();
        assert_eq!(ply.id, 4);
    }

    #[test]
    fn test_checkmate_outcome() {
        let mut record = record();
        play(&mut record, &["f2f3", "e7e5", "g2g4"]);
        assert_eq!(record.terminal_outcome(), None);

        play(&mut record, &["d8h4"]);
        assert_eq!(record.last().unwrap().san, "Qh4#");
        assert_eq!(
            record.terminal_outcome(),
            Some(GameResult::BlackWin(WinReason::Checkmate))
        );
    }

    #[test]
    fn test_draw_outcomes() {
        let meta = GameMetadata::new("a", "b");
        let stalemate = GameRecord::from_fen(meta.clone(), "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(
            stalemate.terminal_outcome(),
            Some(GameResult::Draw(DrawReason::Stalemate))
        );

        let bare = GameRecord::from_fen(meta.clone(), "8/8/8/4k3/8/8/8/4K3 w - - 0 1").unwrap();
        assert_eq!(
            bare.terminal_outcome(),
            Some(GameResult::Draw(DrawReason::InsufficientMaterial))
        );

        let fifty =
            GameRecord::from_fen(meta, "4k3/8/8/8/8/8/4P3/4K2R w - - 100 80").unwrap();
        assert_eq!(
            fifty.terminal_outcome(),
            Some(GameResult::Draw(DrawReason::FiftyMoves))
        );
    }

    #[test]
    fn test_threefold_repetition() {
        let mut record = record();
        let shuffle = ["g1f3", "g8f6", "f3g1", "f6g8"];
        play(&mut record, &shuffle);
        assert_eq!(record.terminal_outcome(), None);
        play(&mut record, &shuffle);
        assert_eq!(
            record.terminal_outcome(),
            Some(GameResult::Draw(DrawReason::Repetition))
        );
    }

    #[test]
    fn test_game_over_blocks_moves_but_agreed_draw_does_not() {
        let mut record = record();
        record.set_outcome(GameResult::Draw(DrawReason::Agreement));
        assert!(record.apply_uci("e2e4").is_ok());

        record.set_outcome(GameResult::WhiteWin(WinReason::Resign));
        assert_eq!(record.apply_uci("e7e5").unwrap_err(), ChessError::GameOver);

        // 悔棋清除结果
        record.undo(1).unwrap();
        assert_eq!(record.outcome(), None);
    }

    #[test]
    fn test_annotation_is_immutable() {
        let mut record = record();
        let id = record.apply_uci("e2e4").unwrap().id;
        assert!(record.annotate(id, MoveQuality::Mistake));
        assert!(!record.annotate(id, MoveQuality::Blunder));
        assert_eq!(record.last().unwrap().annotation, Some(MoveQuality::Mistake));
        assert!(!record.annotate(99, MoveQuality::Blunder));
    }

    #[test]
    fn test_invalid_fen() {
        let meta = GameMetadata::new("a", "b");
        assert!(matches!(
            GameRecord::from_fen(meta, "not a fen"),
            Err(ChessError::InvalidFen { .. })
        ));
    }

    #[test]
    fn test_to_json() {
        let mut record = record();
        play(&mut record, &["e2e4"]);
        let json = record.to_json().unwrap();
        assert!(json.contains("\"e2e4\""));
        assert!(json.contains("\"Alice\""));
        assert!(json.contains("\"result\": \"*\""));
    }
}
