//! 电子棋盘对弈共享协议库
//!
//! 包含:
//! - DGT 电子棋盘字节协议（棋子编码、帧分类、棋盘快照）
//! - 对局记录与结果
//! - 控制面消息 (ClientMessage, ServerMessage) 与显示状态
//! - 传输层抽象 (Connector, Connection, Listener traits) 与帧编解码

mod constants;
mod error;
mod frame;
mod message;
mod piece;
mod record;
mod snapshot;
mod transport;

pub use constants::*;
pub use error::{ChessError, ProtocolError, Result};
pub use frame::{DgtCommand, FrameKind, RawFrame};
pub use message::{
    ClientMessage, DisplayState, DrawReason, ErrorCode, EvalMode, GameResult, MoveEntry,
    MoveQuality, PlayerChoice, ServerMessage, Side, StartOptions, WinReason,
};
pub use piece::PieceCode;
pub use record::{
    fen_of, find_legal_move, parse_fen, GameMetadata, GameRecord, Ply, PlyEvaluation,
};
pub use snapshot::{index_for_square, square_for_index, BoardSnapshot};
pub use transport::{
    encode_frame, Connection, Connector, FrameReader, FrameWriter, Listener, TcpConnection,
    TcpConnector, TcpListener,
};
