//! 从棋盘快照推断着法

use shakmaty::{Chess, Move, Position};
use tracing::warn;

use protocol::BoardSnapshot;

/// 着法推断
///
/// 对当前局面的每个合法着法计算走后的棋盘，与快照逐格比对。
/// 快照中有子的格必须与走后的棋盘一致，且确认的格数要等于走后棋盘的总子数；
/// 快照中的空格不参与计数。
pub struct MoveResolver;

impl MoveResolver {
    /// 第一个完全吻合的合法着法；棋盘尚未摆成合法局面时返回 None
    ///
    /// 多个着法吻合时按规则引擎的枚举顺序取第一个，并记录警告。
    pub fn resolve(snapshot: &BoardSnapshot, position: &Chess) -> Option<Move> {
        let mut candidates = Self::candidates(snapshot, position);
        if candidates.len() > 1 {
            let all: Vec<String> = candidates.iter().map(|m| m.to_string()).collect();
            warn!(candidates = ?all, "快照对应多个合法着法，取第一个");
        }
        if candidates.is_empty() {
            None
        } else {
            Some(candidates.swap_remove(0))
        }
    }

    /// 所有完全吻合的着法，按枚举顺序
    pub fn candidates(snapshot: &BoardSnapshot, position: &Chess) -> Vec<Move> {
        position
            .legal_moves()
            .into_iter()
            .filter(|mv| Self::matches(snapshot, position, mv))
            .collect()
    }

    fn matches(snapshot: &BoardSnapshot, position: &Chess, mv: &Move) -> bool {
        let mut after = position.clone();
        after.play_unchecked(mv);
        let board = after.board();

        let mut confirmed = 0;
        for (square, piece) in snapshot.occupied() {
            if board.piece_at(square) != Some(piece) {
                return false;
            }
            confirmed += 1;
        }
        confirmed == board.occupied().count()
    }
}
