//! 引擎错误类型

use thiserror::Error;

/// 引擎子进程错误
///
/// 除 [`EngineError::InvalidOption`] 外都是致命错误：出错的引擎实例不再可用。
#[derive(Error, Debug)]
pub enum EngineError {
    /// 无法启动引擎进程
    #[error("Failed to spawn engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// IO 错误
    #[error("Engine IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 引擎关闭了输出
    #[error("Engine closed its output")]
    Closed,

    /// 引擎输出不符合协议
    #[error("Unexpected engine output: {line}")]
    Protocol { line: String },

    /// 引擎没有给出着法
    #[error("Engine returned no move")]
    NoBestMove,

    /// 引擎给出了非法着法
    #[error("Engine played illegal move: {uci}")]
    IllegalMove { uci: String },

    /// 引擎响应超时
    #[error("Engine did not answer within {secs}s")]
    Timeout { secs: u64 },

    /// 无法解析的 "Name=Value" 选项
    #[error("Invalid engine option: {option}")]
    InvalidOption { option: String },
}

/// 引擎操作结果类型
pub type Result<T> = std::result::Result<T, EngineError>;
