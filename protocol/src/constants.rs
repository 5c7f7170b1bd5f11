//! 协议常量定义

use std::time::Duration;

/// 协议版本号
pub const PROTOCOL_VERSION: u8 = 1;

/// 棋盘格数
pub const BOARD_SQUARES: usize = 64;

/// 消息帧最大大小
pub const MAX_FRAME_SIZE: usize = 65536;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

// ============================================================================
// DGT 电子棋盘
// ============================================================================

/// 设备消息的类型字节最高位
pub const DGT_MESSAGE_BIT: u8 = 0x80;

/// 单格变化消息类型
pub const DGT_MSG_FIELD_UPDATE: u8 = DGT_MESSAGE_BIT | 0x0e;

/// 单格变化消息长度
pub const DGT_MSG_FIELD_UPDATE_SIZE: usize = 5;

/// 整盘数据消息类型
pub const DGT_MSG_BOARD_DUMP: u8 = DGT_MESSAGE_BIT | 0x06;

/// 整盘数据消息长度（类型 + 2 字节保留 + 64 格）
pub const DGT_MSG_BOARD_DUMP_SIZE: usize = 67;

/// 消息头长度（类型 + 2 字节长度/保留）
pub const DGT_HEADER_SIZE: usize = 3;

/// 复位命令
pub const DGT_SEND_RESET: u8 = 0x40;

/// 请求整盘数据
pub const DGT_SEND_BRD: u8 = 0x42;

/// 开启单格变化推送
pub const DGT_SEND_UPDATE_BRD: u8 = 0x44;

/// 串口默认波特率
pub const DGT_BAUD_RATE: u32 = 9600;

/// 去抖等待时间（毫秒）- 滑动棋子时会连续产生多帧
pub const SETTLE_WINDOW_MS: u64 = 200;

/// 去抖等待时间 Duration
pub const SETTLE_WINDOW: Duration = Duration::from_millis(SETTLE_WINDOW_MS);

/// 串口重连/重读间隔
pub const HARDWARE_RETRY_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// 状态推送
// ============================================================================

/// 单个观察者推送超时（秒）
pub const OBSERVER_PUSH_TIMEOUT_SECS: u64 = 5;

/// 单个观察者推送超时 Duration
pub const OBSERVER_PUSH_TIMEOUT: Duration = Duration::from_secs(OBSERVER_PUSH_TIMEOUT_SECS);

// ============================================================================
// 着法质量阈值（兵值）
// ============================================================================

/// 不精确
pub const INACCURACY_THRESHOLD: f64 = 1.0;

/// 错着
pub const MISTAKE_THRESHOLD: f64 = 2.0;

/// 败着
pub const BLUNDER_THRESHOLD: f64 = 3.0;
