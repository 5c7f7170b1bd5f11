//! DGT 设备帧
//!
//! 一次串口读取得到的字节块只有在"类型字节 + 长度"都吻合时才算一帧，
//! 其余一律视为噪声。

use serde::{Deserialize, Serialize};

use crate::constants::{
    BOARD_SQUARES, DGT_HEADER_SIZE, DGT_MSG_BOARD_DUMP, DGT_MSG_BOARD_DUMP_SIZE,
    DGT_MSG_FIELD_UPDATE, DGT_MSG_FIELD_UPDATE_SIZE, DGT_SEND_BRD, DGT_SEND_RESET,
    DGT_SEND_UPDATE_BRD,
};

/// 帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    /// 单格变化
    FieldUpdate,
    /// 整盘数据
    BoardDump,
    /// 无法识别
    Unknown,
}

impl FrameKind {
    /// 按类型字节判断帧类型（不检查长度）
    pub fn from_type_byte(byte: u8) -> FrameKind {
        match byte {
            DGT_MSG_FIELD_UPDATE => FrameKind::FieldUpdate,
            DGT_MSG_BOARD_DUMP => FrameKind::BoardDump,
            _ => FrameKind::Unknown,
        }
    }

    /// 该类型固定的帧长度
    pub fn expected_len(&self) -> Option<usize> {
        match self {
            FrameKind::FieldUpdate => Some(DGT_MSG_FIELD_UPDATE_SIZE),
            FrameKind::BoardDump => Some(DGT_MSG_BOARD_DUMP_SIZE),
            FrameKind::Unknown => None,
        }
    }

    /// 对一段字节分类：类型字节与长度必须同时吻合
    pub fn classify(buf: &[u8]) -> FrameKind {
        let Some(&first) = buf.first() else {
            return FrameKind::Unknown;
        };
        let kind = FrameKind::from_type_byte(first);
        match kind.expected_len() {
            Some(len) if len == buf.len() => kind,
            _ => FrameKind::Unknown,
        }
    }
}

/// 已校验的设备帧
///
/// 只能通过 [`RawFrame::parse`] 从合法字节块构造，长度与类型不匹配的组合无法表示。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    /// 单格变化：格子索引 + 棋子编码
    FieldUpdate { square_index: u8, code: u8 },
    /// 整盘数据：64 个棋子编码，按设备顺序排列
    BoardDump { codes: [u8; BOARD_SQUARES] },
}

impl RawFrame {
    /// 解析一次读取到的字节块，噪声返回 None
    pub fn parse(buf: &[u8]) -> Option<RawFrame> {
        match FrameKind::classify(buf) {
            FrameKind::FieldUpdate => Some(RawFrame::FieldUpdate {
                square_index: buf[3],
                code: buf[4],
            }),
            FrameKind::BoardDump => {
                let mut codes = [0u8; BOARD_SQUARES];
                codes.copy_from_slice(&buf[DGT_HEADER_SIZE..]);
                Some(RawFrame::BoardDump { codes })
            }
            FrameKind::Unknown => None,
        }
    }

    /// 帧类型
    pub fn kind(&self) -> FrameKind {
        match self {
            RawFrame::FieldUpdate { .. } => FrameKind::FieldUpdate,
            RawFrame::BoardDump { .. } => FrameKind::BoardDump,
        }
    }

    /// 编码为设备字节（长度字段为 7 位高/低字节）
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RawFrame::FieldUpdate { square_index, code } => {
                let mut buf = Self::header(DGT_MSG_FIELD_UPDATE, DGT_MSG_FIELD_UPDATE_SIZE);
                buf.push(*square_index);
                buf.push(*code);
                buf
            }
            RawFrame::BoardDump { codes } => {
                let mut buf = Self::header(DGT_MSG_BOARD_DUMP, DGT_MSG_BOARD_DUMP_SIZE);
                buf.extend_from_slice(codes);
                buf
            }
        }
    }

    fn header(type_byte: u8, len: usize) -> Vec<u8> {
        let mut buf = Vec::with_capacity(len);
        buf.push(type_byte);
        buf.push(((len >> 7) & 0x7f) as u8);
        buf.push((len & 0x7f) as u8);
        buf
    }
}

/// 发往设备的命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DgtCommand {
    /// 复位
    Reset,
    /// 请求整盘数据
    RequestBoard,
    /// 开启单格变化推送
    EnableUpdates,
}

impl DgtCommand {
    /// 命令字节
    pub fn as_byte(&self) -> u8 {
        match self {
            DgtCommand::Reset => DGT_SEND_RESET,
            DgtCommand::RequestBoard => DGT_SEND_BRD,
            DgtCommand::EnableUpdates => DGT_SEND_UPDATE_BRD,
        }
    }

    /// 启动时依次发送的命令
    pub fn startup_sequence() -> [DgtCommand; 3] {
        [
            DgtCommand::Reset,
            DgtCommand::RequestBoard,
            DgtCommand::EnableUpdates,
        ]
    }
}
