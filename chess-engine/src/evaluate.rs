//! 评估分数与着法质量分类
//!
//! 引擎给出的分数以轮到走棋的一方为视角；显示和比较统一换算成白方视角。

use protocol::{
    GameResult, MoveQuality, PlyEvaluation, Side, BLUNDER_THRESHOLD, INACCURACY_THRESHOLD,
    MISTAKE_THRESHOLD,
};

/// 引擎分数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// 百分之一兵
    Centipawns(i32),
    /// 杀棋步数，正数表示视角方将杀对方
    Mate(i32),
}

impl Score {
    /// 换到另一方视角
    pub fn flipped(self) -> Score {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }

    /// 从 `side` 视角的分数换算为白方视角
    pub fn for_white(self, side: Side) -> Score {
        match side {
            Side::White => self,
            Side::Black => self.flipped(),
        }
    }

    /// 兵值，杀棋时为 None
    pub fn pawns(self) -> Option<f64> {
        match self {
            Score::Centipawns(cp) => Some(f64::from(cp) / 100.0),
            Score::Mate(_) => None,
        }
    }

    pub fn mate(self) -> Option<i32> {
        match self {
            Score::Mate(n) => Some(n),
            Score::Centipawns(_) => None,
        }
    }

    pub fn is_mate(self) -> bool {
        matches!(self, Score::Mate(_))
    }
}

/// 一次评估的结果（白方视角）
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub score: Score,
    /// 推荐着法（UCI），按主变顺序
    pub best_moves: Vec<String>,
    pub quality: Option<MoveQuality>,
}

impl EvaluationResult {
    /// 转为对局记录里的摘要
    pub fn summary(&self) -> PlyEvaluation {
        PlyEvaluation {
            pawns: self.score.pawns(),
            mate: self.score.mate(),
            best_moves: self.best_moves.clone(),
        }
    }
}

/// 按失分（兵）分类
pub fn quality_for_loss(loss: f64) -> Option<MoveQuality> {
    if loss >= BLUNDER_THRESHOLD {
        Some(MoveQuality::Blunder)
    } else if loss >= MISTAKE_THRESHOLD {
        Some(MoveQuality::Mistake)
    } else if loss >= INACCURACY_THRESHOLD {
        Some(MoveQuality::Inaccuracy)
    } else {
        None
    }
}

/// 对一步着法分类
///
/// `previous` 是上一步之后的分数（首步为 None，按均势 0.00 计），
/// `current` 是这一步之后的分数，两者都是白方视角。
/// 进入或脱离杀棋一律记为不精确。
pub fn classify_move(previous: Option<Score>, current: Score, mover: Side) -> Option<MoveQuality> {
    let previous = previous.unwrap_or(Score::Centipawns(0));

    if previous.is_mate() != current.is_mate() {
        return Some(MoveQuality::Inaccuracy);
    }

    let before = previous.for_white(mover).pawns()?;
    let after = current.for_white(mover).pawns()?;
    quality_for_loss(before - after)
}

/// 评估条 [0, 100]，50 为均势
///
/// 已决出的结果优先；否则杀棋取两端，普通分数取 50 + 兵值。
pub fn eval_bar(score: Option<Score>, outcome: Option<GameResult>) -> u8 {
    match outcome {
        Some(GameResult::WhiteWin(_)) => return 100,
        Some(GameResult::BlackWin(_)) => return 0,
        Some(GameResult::Draw(_)) => return 50,
        Some(GameResult::Undetermined) | None => {}
    }

    match score {
        None => 50,
        Some(Score::Mate(n)) if n > 0 => 100,
        Some(Score::Mate(n)) if n < 0 => 0,
        Some(Score::Mate(_)) => 50,
        Some(Score::Centipawns(cp)) => {
            let value = 50.0 + f64::from(cp) / 100.0;
            value.clamp(0.0, 100.0).round() as u8
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{DrawReason, WinReason};

    #[test]
    fn test_white_perspective() {
        assert_eq!(
            Score::Centipawns(35).for_white(Side::Black),
            Score::Centipawns(-35)
        );
        assert_eq!(Score::Mate(3).for_white(Side::Black), Score::Mate(-3));
        assert_eq!(Score::Mate(-2).for_white(Side::White), Score::Mate(-2));
        assert_eq!(Score::Centipawns(-150).pawns(), Some(-1.5));
        assert_eq!(Score::Mate(4).pawns(), None);
    }

    #[test]
    fn test_thresholds() {
        assert_eq!(quality_for_loss(0.99), None);
        assert_eq!(quality_for_loss(1.0), Some(MoveQuality::Inaccuracy));
        assert_eq!(quality_for_loss(2.5), Some(MoveQuality::Mistake));
        assert_eq!(quality_for_loss(3.0), Some(MoveQuality::Blunder));
        assert_eq!(quality_for_loss(3.5), Some(MoveQuality::Blunder));
    }

    #[test]
    fn test_classify_from_mover_perspective() {
        // 白方从 +0.50 掉到 -2.00：失 2.5 兵
        assert_eq!(
            classify_move(
                Some(Score::Centipawns(50)),
                Score::Centipawns(-200),
                Side::White
            ),
            Some(MoveQuality::Mistake)
        );

        // 黑方走后白方从 -0.50 变成 +3.00：黑方失 3.5 兵
        assert_eq!(
            classify_move(
                Some(Score::Centipawns(-50)),
                Score::Centipawns(300),
                Side::Black
            ),
            Some(MoveQuality::Blunder)
        );

        // 得分不标记
        assert_eq!(
            classify_move(
                Some(Score::Centipawns(0)),
                Score::Centipawns(-400),
                Side::Black
            ),
            None
        );
    }

    #[test]
    fn test_first_ply_baseline() {
        assert_eq!(classify_move(None, Score::Centipawns(30), Side::White), None);
        assert_eq!(
            classify_move(None, Score::Centipawns(-120), Side::White),
            Some(MoveQuality::Inaccuracy)
        );
    }

    #[test]
    fn test_mate_transition() {
        assert_eq!(
            classify_move(Some(Score::Centipawns(20)), Score::Mate(-3), Side::White),
            Some(MoveQuality::Inaccuracy)
        );
        assert_eq!(
            classify_move(Some(Score::Mate(5)), Score::Centipawns(800), Side::White),
            Some(MoveQuality::Inaccuracy)
        );
        assert_eq!(
            classify_move(Some(Score::Mate(5)), Score::Mate(4), Side::White),
            None
        );
    }

    #[test]
    fn test_eval_bar() {
        assert_eq!(eval_bar(None, None), 50);
        assert_eq!(eval_bar(Some(Score::Centipawns(250)), None), 53);
        assert_eq!(eval_bar(Some(Score::Centipawns(-9000)), None), 0);
        assert_eq!(eval_bar(Some(Score::Centipawns(9000)), None), 100);
        assert_eq!(eval_bar(Some(Score::Mate(2)), None), 100);
        assert_eq!(eval_bar(Some(Score::Mate(-1)), None), 0);

        let score = Some(Score::Mate(2));
        assert_eq!(eval_bar(score, Some(GameResult::BlackWin(WinReason::Resign))), 0);
        assert_eq!(eval_bar(score, Some(GameResult::Draw(DrawReason::Agreement))), 50);
        assert_eq!(eval_bar(score, Some(GameResult::Undetermined)), 100);
    }
}
