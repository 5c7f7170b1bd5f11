//! 显示状态的生成与文本渲染

use async_trait::async_trait;
use shakmaty::Position;

use chess_engine::{eval_bar, Score};
use protocol::{
    fen_of, BoardSnapshot, DisplayState, GameRecord, GameResult, MoveEntry, PlyEvaluation,
};

use crate::hub::Observer;

/// 由对局记录生成完整显示状态
pub fn record_state(record: &GameRecord, started: bool) -> DisplayState {
    let position = record.position();
    let moves = record
        .plies()
        .iter()
        .enumerate()
        .map(|(index, ply)| MoveEntry {
            ply: index + 1,
            san: ply.san.clone(),
            uci: ply.uci.clone(),
            mover: ply.mover,
            quality: ply.annotation,
        })
        .collect();

    // 取最近一次已完成的评估
    let evaluation = record
        .plies()
        .iter()
        .rev()
        .find_map(|ply| ply.evaluation.as_ref());
    let score = evaluation.and_then(score_of);
    let best_move = record
        .last()
        .and_then(|ply| ply.evaluation.as_ref())
        .and_then(|evaluation| evaluation.best_moves.first().cloned());

    let metadata = record.metadata();
    DisplayState {
        fen: fen_of(position),
        diagram: BoardSnapshot::from_board(position.board()).diagram(),
        last_move: record.last().map(|ply| ply.uci.clone()),
        best_move,
        moves,
        side_to_move: record.turn(),
        eval_pawns: score.and_then(Score::pawns),
        mate_in: score.and_then(Score::mate),
        eval_bar: eval_bar(score, record.outcome()),
        outcome: record
            .outcome()
            .unwrap_or(GameResult::Undetermined)
            .as_str()
            .to_string(),
        white_name: metadata.white.clone(),
        black_name: metadata.black.clone(),
        started,
    }
}

/// 空闲时显示棋盘上的实际摆放
pub fn preview_state(snapshot: &BoardSnapshot) -> DisplayState {
    DisplayState {
        fen: snapshot.to_fen(),
        diagram: snapshot.diagram(),
        ..DisplayState::default()
    }
}

fn score_of(evaluation: &PlyEvaluation) -> Option<Score> {
    match (evaluation.mate, evaluation.pawns) {
        (Some(n), _) => Some(Score::Mate(n)),
        (None, Some(pawns)) => Some(Score::Centipawns((pawns * 100.0).round() as i32)),
        (None, None) => None,
    }
}

/// 渲染为终端文本
pub fn render(state: &DisplayState) -> String {
    let mut out = String::new();
    if !state.white_name.is_empty() || !state.black_name.is_empty() {
        out.push_str(&format!("{} - {}\n", state.white_name, state.black_name));
    }
    out.push_str(&state.diagram);

    if let Some(entry) = state.moves.last() {
        let quality = entry.quality.map_or("", |q| q.symbol());
        out.push_str(&format!("{}. {}{} ({})\n", entry.ply, entry.san, quality, entry.mover));
    }

    match (state.mate_in, state.eval_pawns) {
        (Some(n), _) => out.push_str(&format!("Mate in {}\n", n)),
        (None, Some(pawns)) => out.push_str(&format!("Eval {:+.2}\n", pawns)),
        (None, None) => {}
    }
    if let Some(best) = &state.best_move {
        out.push_str(&format!("Best {}\n", best));
    }
    if state.outcome != GameResult::Undetermined.as_str() {
        out.push_str(&format!("Result {}\n", state.outcome));
    }
    out
}

/// 打印到终端的观察者
pub struct ConsoleObserver;

#[async_trait]
impl Observer for ConsoleObserver {
    async fn push(&mut self, state: &DisplayState) -> anyhow::Result<()> {
        println!("{}", render(state));
        Ok(())
    }

    fn name(&self) -> String {
        "console".to_string()
    }
}
