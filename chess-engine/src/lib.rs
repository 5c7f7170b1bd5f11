//! UCI 国际象棋引擎客户端
//!
//! 包含:
//! - 引擎子进程管理与 UCI 命令子集
//! - 搜索输出解析（info / bestmove）
//! - 分数换算、评估条与着法质量分类
//! - 可选的脚本化引擎（`scripted` feature），供测试驱动对局

mod error;
mod evaluate;
mod options;
mod parser;
#[cfg(any(test, feature = "scripted"))]
mod scripted;
mod uci;

pub use error::{EngineError, Result};
pub use evaluate::{classify_move, eval_bar, quality_for_loss, EvaluationResult, Score};
pub use options::{parse_option, EngineSettings, SearchLimits, DEFAULT_MOVE_TIME_MS, DEFAULT_THREADS};
pub use parser::{parse_line, InfoLine, UciMessage};
#[cfg(any(test, feature = "scripted"))]
pub use scripted::{scripted_engine, CommandLog, ScriptedLauncher, ScriptedReply};
pub use uci::{
    EngineLauncher, ProcessLauncher, PvLine, SearchResult, UciEngine, HANDSHAKE_TIMEOUT,
    SEARCH_GRACE,
};
