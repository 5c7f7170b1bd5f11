//! DGT 棋子编码
//!
//! 设备用一个字节表示一格：0 为空，1-6 为白方，7-12 为黑方（减 6 后查同一张表）。

use shakmaty::{Color, Piece, Role};

/// 空格
pub const DGT_EMPTY: u8 = 0x00;
/// 兵
pub const DGT_PAWN: u8 = 0x01;
/// 车
pub const DGT_ROOK: u8 = 0x02;
/// 马
pub const DGT_KNIGHT: u8 = 0x03;
/// 象
pub const DGT_BISHOP: u8 = 0x04;
/// 王
pub const DGT_KING: u8 = 0x05;
/// 后
pub const DGT_QUEEN: u8 = 0x06;

/// 黑方编码相对白方的偏移
const BLACK_OFFSET: u8 = DGT_QUEEN;

/// 棋子编码表
pub struct PieceCode;

impl PieceCode {
    /// 解码一个格子字节；0 或无法识别的值都视为"未知/空"
    pub fn decode(code: u8) -> Option<Piece> {
        if code == DGT_EMPTY {
            return None;
        }

        let (color, base) = if code > BLACK_OFFSET {
            (Color::Black, code - BLACK_OFFSET)
        } else {
            (Color::White, code)
        };

        Self::role_from_code(base).map(|role| Piece { color, role })
    }

    /// 编码一个格子
    pub fn encode(piece: Option<Piece>) -> u8 {
        match piece {
            None => DGT_EMPTY,
            Some(piece) => {
                let base = Self::code_from_role(piece.role);
                match piece.color {
                    Color::White => base,
                    Color::Black => base + BLACK_OFFSET,
                }
            }
        }
    }

    fn role_from_code(base: u8) -> Option<Role> {
        match base {
            DGT_PAWN => Some(Role::Pawn),
            DGT_ROOK => Some(Role::Rook),
            DGT_KNIGHT => Some(Role::Knight),
            DGT_BISHOP => Some(Role::Bishop),
            DGT_KING => Some(Role::King),
            DGT_QUEEN => Some(Role::Queen),
            _ => None,
        }
    }

    fn code_from_role(role: Role) -> u8 {
        match role {
            Role::Pawn => DGT_PAWN,
            Role::Rook => DGT_ROOK,
            Role::Knight => DGT_KNIGHT,
            Role::Bishop => DGT_BISHOP,
            Role::King => DGT_KING,
            Role::Queen => DGT_QUEEN,
        }
    }
}
