//! 电子棋盘对弈服务端
//!
//! 包含:
//! - DGT 电子棋盘读循环与去抖
//! - 快照到着法的推断
//! - 对局协调（引擎棋手、棋盘棋手、悔棋/和棋/认输）
//! - 后台评估与着法质量标注
//! - 显示状态广播与控制面

pub mod config;
pub mod controller;
pub mod dgt;
pub mod display;
pub mod error;
pub mod evaluation;
pub mod game;
pub mod hub;
pub mod player;
pub mod resolver;
pub mod server;

pub use config::{BotConfig, Config, EvalConfig, HumanConfig};
pub use controller::Controller;
pub use dgt::{Debouncer, DgtBoard, DgtPort, SerialPort};
pub use display::{preview_state, record_state, render, ConsoleObserver};
pub use error::GameError;
pub use evaluation::{EvalJob, EvalOutcome, EvaluationDispatcher, Evaluator};
pub use game::{GameCommand, GameHandle, TurnCoordinator, TurnState};
pub use hub::{Observer, ObserverId, StateBroadcastHub};
pub use player::{MoveRequest, Player};
pub use resolver::MoveResolver;
pub use server::MessageHandler;
