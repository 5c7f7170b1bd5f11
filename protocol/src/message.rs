//! 消息类型定义

use serde::{Deserialize, Serialize};
use shakmaty::Color;

/// 执子方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// 对方
    pub fn opponent(self) -> Side {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::White => write!(f, "white"),
            Side::Black => write!(f, "black"),
        }
    }
}

/// 游戏结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// 白方胜
    WhiteWin(WinReason),
    /// 黑方胜
    BlackWin(WinReason),
    /// 和棋
    Draw(DrawReason),
    /// 未决（对局中止）
    Undetermined,
}

impl GameResult {
    /// 某方获胜
    pub fn win_for(side: Side, reason: WinReason) -> GameResult {
        match side {
            Side::White => GameResult::WhiteWin(reason),
            Side::Black => GameResult::BlackWin(reason),
        }
    }

    /// PGN 结果字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::WhiteWin(_) => "1-0",
            GameResult::BlackWin(_) => "0-1",
            GameResult::Draw(_) => "1/2-1/2",
            GameResult::Undetermined => "*",
        }
    }

    /// 胜方
    pub fn winner(&self) -> Option<Side> {
        match self {
            GameResult::WhiteWin(_) => Some(Side::White),
            GameResult::BlackWin(_) => Some(Side::Black),
            _ => None,
        }
    }

    /// 是否终止对局（协议和棋后仍可继续走子分析）
    pub fn ends_play(&self) -> bool {
        !matches!(self, GameResult::Draw(DrawReason::Agreement))
    }
}

impl std::fmt::Display for GameResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 胜利原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinReason {
    /// 将死
    Checkmate,
    /// 对方认输
    Resign,
}

/// 和棋原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawReason {
    /// 双方同意
    Agreement,
    /// 无子可动
    Stalemate,
    /// 子力不足
    InsufficientMaterial,
    /// 三次重复局面
    Repetition,
    /// 50 回合无吃子无动兵
    FiftyMoves,
}

/// 着法质量标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoveQuality {
    Inaccuracy,
    Mistake,
    Blunder,
}

impl MoveQuality {
    /// 棋谱符号
    pub fn symbol(&self) -> &'static str {
        match self {
            MoveQuality::Inaccuracy => "?!",
            MoveQuality::Mistake => "?",
            MoveQuality::Blunder => "??",
        }
    }
}

impl std::fmt::Display for MoveQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 一方由谁执子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerChoice {
    /// 电子棋盘前的人类棋手（配置中 humans 的下标）
    Human(usize),
    /// 引擎（配置中 bots 的下标）
    Bot(usize),
}

/// 评估模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EvalMode {
    /// 不评估
    #[default]
    Off,
    /// 每步评估最后一着
    LastMove,
}

/// 开局选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    pub white: PlayerChoice,
    pub black: PlayerChoice,
    pub eval_mode: EvalMode,
    /// 棋盘倒装（黑方一侧朝向设备接口）
    pub upside_down: bool,
    /// 起始局面；为 None 且 from_board 为 false 时用标准开局
    pub fen: Option<String>,
    /// 以电子棋盘上当前摆放（白方先走）作为起始局面
    pub from_board: bool,
}

/// 着法列表中的一项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveEntry {
    /// 半回合序号（从 1 开始）
    pub ply: usize,
    pub san: String,
    pub uci: String,
    /// 走这步的一方
    pub mover: Side,
    pub quality: Option<MoveQuality>,
}

/// 推送给观察者的完整显示状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayState {
    pub fen: String,
    /// 文本棋盘
    pub diagram: String,
    pub last_move: Option<String>,
    /// 评估引擎推荐的着法
    pub best_move: Option<String>,
    pub moves: Vec<MoveEntry>,
    pub side_to_move: Side,
    /// 评估值（兵，白方为正）
    pub eval_pawns: Option<f64>,
    /// 杀棋步数（白方为正）
    pub mate_in: Option<i32>,
    /// 评估条 [0, 100]
    pub eval_bar: u8,
    /// "*", "1-0", "0-1", "1/2-1/2"
    pub outcome: String,
    pub white_name: String,
    pub black_name: String,
    pub started: bool,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            fen: String::new(),
            diagram: String::new(),
            last_move: None,
            best_move: None,
            moves: Vec::new(),
            side_to_move: Side::White,
            eval_pawns: None,
            mate_in: None,
            eval_bar: 50,
            outcome: GameResult::Undetermined.as_str().to_string(),
            white_name: String::new(),
            black_name: String::new(),
            started: false,
        }
    }
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// 开始新对局
    Start(StartOptions),
    /// 悔棋若干半回合
    Undo { plies: usize },
    /// 协议和棋
    Draw,
    /// 轮到走棋的一方认输
    Resign,
    /// 中止当前对局
    Abort,
    /// 心跳请求
    Ping,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// 连接后首先发送：可选的引擎与人类棋手
    Setup {
        bots: Vec<String>,
        humans: Vec<String>,
    },
    /// 对局已开始
    Started { white: String, black: String },
    /// 当前显示状态
    State(DisplayState),
    /// 心跳响应
    Pong,
    /// 错误消息
    Error { code: ErrorCode, message: String },
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // === 对局相关 (2xx) ===
    /// 没有进行中的对局
    NoActiveGame = 200,
    /// 已有对局进行中
    GameAlreadyRunning = 201,
    /// 悔棋步数超出历史
    UndoOutOfRange = 202,
    /// 开局选项无效（下标越界、没有棋盘等）
    InvalidStartOptions = 203,
    /// 无效的起始局面
    InvalidFen = 204,
    /// 对局已结束
    GameAlreadyOver = 205,

    // === 系统相关 (5xx) ===
    /// 内部错误
    InternalError = 500,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_strings() {
        assert_eq!(GameResult::WhiteWin(WinReason::Checkmate).as_str(), "1-0");
        assert_eq!(GameResult::BlackWin(WinReason::Resign).as_str(), "0-1");
        assert_eq!(GameResult::Draw(DrawReason::Stalemate).as_str(), "1/2-1/2");
        assert_eq!(GameResult::Undetermined.to_string(), "*");
    }

    #[test]
    fn test_agreed_draw_does_not_end_play() {
        assert!(!GameResult::Draw(DrawReason::Agreement).ends_play());
        assert!(GameResult::Draw(DrawReason::Repetition).ends_play());
        assert!(GameResult::win_for(Side::Black, WinReason::Resign).ends_play());
        assert_eq!(
            GameResult::win_for(Side::Black, WinReason::Resign).winner(),
            Some(Side::Black)
        );
    }

    #[test]
    fn test_side_color_conversion() {
        assert_eq!(Side::from(Color::Black), Side::Black);
        assert_eq!(Color::from(Side::White), Color::White);
        assert_eq!(Side::White.opponent(), Side::Black);
    }

    #[test]
    fn test_start_message_serialize() {
        let msg = ClientMessage::Start(StartOptions {
            white: PlayerChoice::Human(0),
            black: PlayerChoice::Bot(2),
            eval_mode: EvalMode::LastMove,
            upside_down: true,
            fen: None,
            from_board: false,
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: ClientMessage = bincode::deserialize(&bytes).unwrap();

        match decoded {
            ClientMessage::Start(options) => {
                assert_eq!(options.black, PlayerChoice::Bot(2));
                assert!(options.upside_down);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_state_message_serialize() {
        let mut state = DisplayState::default();
        state.moves.push(MoveEntry {
            ply: 1,
            san: "e4".to_string(),
            uci: "e2e4".to_string(),
            mover: Side::White,
            quality: Some(MoveQuality::Mistake),
        });
        state.eval_pawns = Some(-0.35);

        let bytes = bincode::serialize(&ServerMessage::State(state.clone())).unwrap();
        let decoded: ServerMessage = bincode::deserialize(&bytes).unwrap();
        match decoded {
            ServerMessage::State(decoded) => assert_eq!(decoded, state),
            _ => panic!("Wrong message type"),
        }
    }
}
