//! 对局错误类型

use chess_engine::EngineError;
use protocol::{ChessError, ErrorCode};
use thiserror::Error;

/// 对局控制错误
#[derive(Error, Debug)]
pub enum GameError {
    /// 没有进行中的对局
    #[error("No active game")]
    NoActiveGame,

    /// 已有对局进行中
    #[error("A game is already running")]
    AlreadyRunning,

    /// 开局选项无效
    #[error("Invalid start options: {0}")]
    InvalidOptions(String),

    /// 规则错误（非法着法、悔棋越界、FEN 无效等）
    #[error(transparent)]
    Chess(#[from] ChessError),

    /// 棋手失败（引擎崩溃等），对局无法继续
    #[error("Player {name} failed: {source}")]
    PlayerFailed {
        name: String,
        #[source]
        source: EngineError,
    },

    /// 引擎启动/初始化失败
    #[error("Engine {name} unavailable: {source}")]
    EngineUnavailable {
        name: String,
        #[source]
        source: EngineError,
    },

    /// 电子棋盘读循环已退出
    #[error("DGT board disconnected")]
    BoardDisconnected,

    /// 对局任务已结束
    #[error("Game loop stopped")]
    Stopped,
}

impl GameError {
    /// 对应的控制面错误码
    pub fn code(&self) -> ErrorCode {
        match self {
            GameError::NoActiveGame => ErrorCode::NoActiveGame,
            GameError::AlreadyRunning => ErrorCode::GameAlreadyRunning,
            GameError::InvalidOptions(_) => ErrorCode::InvalidStartOptions,
            GameError::Chess(ChessError::UndoOutOfRange { .. }) => ErrorCode::UndoOutOfRange,
            GameError::Chess(ChessError::InvalidFen { .. } | ChessError::InvalidPosition { .. }) => {
                ErrorCode::InvalidFen
            }
            GameError::Chess(ChessError::GameOver) | GameError::Stopped => {
                ErrorCode::GameAlreadyOver
            }
            _ => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let undo = GameError::from(ChessError::UndoOutOfRange {
            requested: 3,
            available: 1,
        });
        assert_eq!(undo.code(), ErrorCode::UndoOutOfRange);
        assert_eq!(
            undo.to_string(),
            "Cannot undo 3 plies, only 1 played"
        );

        let fen = GameError::from(ChessError::InvalidFen {
            reason: "bad".to_string(),
        });
        assert_eq!(fen.code(), ErrorCode::InvalidFen);
        assert_eq!(GameError::AlreadyRunning.code(), ErrorCode::GameAlreadyRunning);
        assert_eq!(GameError::BoardDisconnected.code(), ErrorCode::InternalError);
    }
}
