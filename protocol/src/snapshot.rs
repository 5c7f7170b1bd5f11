//! 棋盘快照
//!
//! 一次整盘数据解码得到的 64 格占用情况，构造后不可修改。

use shakmaty::{Board, Color, Piece, Role, Square};

use crate::constants::BOARD_SQUARES;
use crate::frame::RawFrame;
use crate::piece::PieceCode;

/// 设备数据索引 -> 棋盘格
///
/// 设备从 a8 开始逐行向下；倒装（upside_down）时整块旋转 180°。
pub fn square_for_index(index: usize, upside_down: bool) -> Square {
    let mut file = index % 8;
    let mut rank = 7 - index / 8;
    if upside_down {
        file = 7 - file;
        rank = 7 - rank;
    }
    Square::new((rank * 8 + file) as u32)
}

/// 棋盘格 -> 设备数据索引
pub fn index_for_square(square: Square, upside_down: bool) -> usize {
    let raw = square as usize;
    let mut file = raw % 8;
    let mut rank = raw / 8;
    if upside_down {
        file = 7 - file;
        rank = 7 - rank;
    }
    (7 - rank) * 8 + file
}

/// 棋盘快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSnapshot {
    /// 按 Square 索引（a1 = 0, h8 = 63）
    squares: [Option<Piece>; BOARD_SQUARES],
}

impl BoardSnapshot {
    /// 从设备的 64 个编码构造
    pub fn from_codes(codes: &[u8; BOARD_SQUARES], upside_down: bool) -> Self {
        let mut squares = [None; BOARD_SQUARES];
        for (index, &code) in codes.iter().enumerate() {
            let square = square_for_index(index, upside_down);
            squares[square as usize] = PieceCode::decode(code);
        }
        Self { squares }
    }

    /// 从设备帧构造，只接受整盘数据帧
    pub fn from_frame(frame: &RawFrame, upside_down: bool) -> Option<Self> {
        match frame {
            RawFrame::BoardDump { codes } => Some(Self::from_codes(codes, upside_down)),
            RawFrame::FieldUpdate { .. } => None,
        }
    }

    /// 从规则引擎的棋盘构造
    pub fn from_board(board: &Board) -> Self {
        let mut squares = [None; BOARD_SQUARES];
        for square in Square::ALL {
            squares[square as usize] = board.piece_at(square);
        }
        Self { squares }
    }

    /// 重新编码为设备顺序
    pub fn to_codes(&self, upside_down: bool) -> [u8; BOARD_SQUARES] {
        let mut codes = [0u8; BOARD_SQUARES];
        for square in Square::ALL {
            codes[index_for_square(square, upside_down)] =
                PieceCode::encode(self.squares[square as usize]);
        }
        codes
    }

    /// 重新编码为整盘数据帧
    pub fn to_frame(&self, upside_down: bool) -> RawFrame {
        RawFrame::BoardDump {
            codes: self.to_codes(upside_down),
        }
    }

    /// 获取某格棋子
    pub fn get(&self, square: Square) -> Option<Piece> {
        self.squares[square as usize]
    }

    /// 所有被占用的格子
    pub fn occupied(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::ALL
            .into_iter()
            .filter_map(|square| self.squares[square as usize].map(|piece| (square, piece)))
    }

    /// 被占用格数
    pub fn occupied_count(&self) -> usize {
        self.squares.iter().filter(|s| s.is_some()).count()
    }

    /// 生成 FEN 的棋子布局部分
    pub fn board_fen(&self) -> String {
        let mut fen = String::with_capacity(72);
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.squares[rank * 8 + file] {
                    Some(piece) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        fen.push(piece.char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }
        fen
    }

    /// 文本棋盘，白方在下，空格用 '.'
    pub fn diagram(&self) -> String {
        let mut out = String::with_capacity(8 * 18);
        for rank in (0..8).rev() {
            out.push(char::from(b'1' + rank as u8));
            for file in 0..8 {
                out.push(' ');
                out.push(self.squares[rank * 8 + file].map_or('.', |p| p.char()));
            }
            out.push('\n');
        }
        out.push_str("  a b c d e f g h\n");
        out
    }

    /// 以白方先行生成完整 FEN，王车仍在原位时保留易位权
    pub fn to_fen(&self) -> String {
        let mut castling = String::new();
        let white_king = self.get(Square::E1) == Some(Color::White.king());
        let black_king = self.get(Square::E8) == Some(Color::Black.king());
        let white_rook = Piece { color: Color::White, role: Role::Rook };
        let black_rook = Piece { color: Color::Black, role: Role::Rook };
        if white_king && self.get(Square::H1) == Some(white_rook) {
            castling.push('K');
        }
        if white_king && self.get(Square::A1) == Some(white_rook) {
            castling.push('Q');
        }
        if black_king && self.get(Square::H8) == Some(black_rook) {
            castling.push('k');
        }
        if black_king && self.get(Square::A8) == Some(black_rook) {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }
        format!("{} w {} - 0 1", self.board_fen(), castling)
    }
}
