//! DGT 电子棋盘读循环
//!
//! 串口上每次读到的字节块先按 [`FrameKind`] 分类；单格变化只触发一次整盘请求，
//! 整盘数据在去抖窗口内没有被更新的读取取代时，才解码为 [`BoardSnapshot`] 发布。
//! 读循环在整个进程生命周期内存在，跨对局复用。

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use protocol::{BoardSnapshot, DgtCommand, FrameKind, RawFrame, HARDWARE_RETRY_DELAY};

/// 单次读取缓冲区大小，足够容纳一个整盘帧
const READ_BUFFER_SIZE: usize = 256;

/// 可打开的棋盘设备
#[async_trait]
pub trait DgtPort: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// 打开设备
    async fn open(&self) -> io::Result<Self::Stream>;

    /// 日志里显示的设备名
    fn describe(&self) -> String;
}

/// 串口设备
#[derive(Debug, Clone)]
pub struct SerialPort {
    pub path: String,
    pub baud_rate: u32,
}

#[async_trait]
impl DgtPort for SerialPort {
    type Stream = SerialStream;

    async fn open(&self) -> io::Result<SerialStream> {
        let stream = tokio_serial::new(self.path.as_str(), self.baud_rate).open_native_async()?;
        Ok(stream)
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

/// 去抖器
///
/// 只保留最近一次推入的值；新值会重置等待期限。
#[derive(Debug)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(Instant, T)>,
}

impl<T> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// 推入新值，取代尚未稳定的旧值
    pub fn push(&mut self, item: T) {
        self.pending = Some((Instant::now() + self.window, item));
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// 等到最近的值稳定后取出；没有待定值时一直挂起
    ///
    /// 可以安全地在 `select!` 中取消，取消不会丢失待定值。
    pub async fn settled(&mut self) -> T {
        loop {
            match self.pending.as_ref().map(|(deadline, _)| *deadline) {
                Some(deadline) => {
                    sleep_until(deadline).await;
                    if let Some((_, item)) = self.pending.take() {
                        return item;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        }
    }
}

/// 读循环与句柄共享的状态
struct Shared {
    upside_down: AtomicBool,
    snapshots: watch::Sender<Option<BoardSnapshot>>,
    settle: Duration,
}

impl Shared {
    /// 处理一个已稳定的读取
    fn deliver(&self, buf: &[u8]) {
        match RawFrame::parse(buf) {
            Some(frame @ RawFrame::BoardDump { .. }) => {
                let upside_down = self.upside_down.load(Ordering::Relaxed);
                if let Some(snapshot) = BoardSnapshot::from_frame(&frame, upside_down) {
                    debug!(pieces = snapshot.occupied_count(), "棋盘快照");
                    self.snapshots.send_replace(Some(snapshot));
                }
            }
            Some(RawFrame::FieldUpdate { .. }) => {
                trace!("单格变化已被整盘请求取代");
            }
            None => {
                trace!(len = buf.len(), "丢弃无法识别的数据");
            }
        }
    }
}

/// 电子棋盘句柄
///
/// 持有后台读循环；句柄释放时读循环随之结束。
pub struct DgtBoard {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl DgtBoard {
    /// 在给定设备上启动读循环
    pub fn spawn<P: DgtPort>(port: P, settle: Duration) -> Self {
        let (snapshots, _) = watch::channel(None);
        let shared = Arc::new(Shared {
            upside_down: AtomicBool::new(false),
            snapshots,
            settle,
        });

        let task = tokio::spawn(read_loop(port, shared.clone()));
        Self { shared, task }
    }

    /// 打开串口设备
    pub fn serial(path: &str, baud_rate: u32, settle: Duration) -> Self {
        Self::spawn(
            SerialPort {
                path: path.to_string(),
                baud_rate,
            },
            settle,
        )
    }

    /// 订阅稳定后的快照；当前值视为已读
    pub fn subscribe(&self) -> watch::Receiver<Option<BoardSnapshot>> {
        self.shared.snapshots.subscribe()
    }

    /// 最近一次快照
    pub fn latest(&self) -> Option<BoardSnapshot> {
        self.shared.snapshots.borrow().clone()
    }

    /// 设置棋盘朝向，对之后解码的快照生效
    pub fn set_upside_down(&self, upside_down: bool) {
        self.shared.upside_down.store(upside_down, Ordering::Relaxed);
    }

    pub fn is_upside_down(&self) -> bool {
        self.shared.upside_down.load(Ordering::Relaxed)
    }
}

impl Drop for DgtBoard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// 打开设备并读取；设备断开或打开失败时每秒重试
async fn read_loop<P: DgtPort>(port: P, shared: Arc<Shared>) {
    loop {
        match port.open().await {
            Ok(stream) => {
                info!(port = %port.describe(), "电子棋盘已连接");
                match run_session(stream, &shared).await {
                    Ok(()) => warn!(port = %port.describe(), "电子棋盘连接已关闭"),
                    Err(e) => warn!(port = %port.describe(), "电子棋盘读取失败: {}", e),
                }
            }
            Err(e) => {
                debug!(port = %port.describe(), "无法打开电子棋盘: {}", e);
            }
        }
        sleep(HARDWARE_RETRY_DELAY).await;
    }
}

/// 单次连接的读循环，EOF 时返回 Ok
async fn run_session<S>(stream: S, shared: &Shared) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut reader, mut writer) = tokio::io::split(stream);

    let startup: Vec<u8> = DgtCommand::startup_sequence()
        .iter()
        .map(DgtCommand::as_byte)
        .collect();
    writer.write_all(&startup).await?;
    writer.flush().await?;

    let mut buf = [0u8; READ_BUFFER_SIZE];
    let mut debouncer = Debouncer::new(shared.settle);

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                let chunk = &buf[..n];
                if FrameKind::classify(chunk) == FrameKind::FieldUpdate {
                    writer.write_all(&[DgtCommand::RequestBoard.as_byte()]).await?;
                    writer.flush().await?;
                }
                debouncer.push(chunk.to_vec());
            }
            settled = debouncer.settled() => {
                shared.deliver(&settled);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use protocol::DGT_SEND_BRD;
    use shakmaty::{Board, Square};
    use std::collections::VecDeque;
    use tokio::io::DuplexStream;
    use tokio::sync::Mutex;

    /// 只能打开一次的内存设备
    pub(crate) struct DuplexPort {
        stream: Mutex<Option<DuplexStream>>,
    }

    impl DuplexPort {
        pub(crate) fn pair() -> (Self, DuplexStream) {
            let (ours, device) = tokio::io::duplex(1024);
            (
                Self {
                    stream: Mutex::new(Some(ours)),
                },
                device,
            )
        }
    }

    #[async_trait]
    impl DgtPort for DuplexPort {
        type Stream = DuplexStream;

        async fn open(&self) -> io::Result<DuplexStream> {
            self.stream
                .lock()
                .await
                .take()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "gone"))
        }

        fn describe(&self) -> String {
            "duplex".to_string()
        }
    }

    /// 依次交出预设连接的设备，`None` 表示这次打开失败
    struct ReconnectingPort {
        streams: Mutex<VecDeque<Option<DuplexStream>>>,
    }

    #[async_trait]
    impl DgtPort for ReconnectingPort {
        type Stream = DuplexStream;

        async fn open(&self) -> io::Result<DuplexStream> {
            self.streams
                .lock()
                .await
                .pop_front()
                .flatten()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unplugged"))
        }

        fn describe(&self) -> String {
            "reconnecting".to_string()
        }
    }

    fn dump_of(board: &Board) -> Vec<u8> {
        BoardSnapshot::from_board(board).to_frame(false).encode()
    }

    fn after_e4() -> Board {
        let mut board = Board::default();
        if let Some(pawn) = board.remove_piece_at(Square::E2) {
            board.set_piece_at(Square::E4, pawn);
        }
        board
    }

    pub(crate) async fn read_startup(device: &mut DuplexStream) -> [u8; 3] {
        let mut startup = [0u8; 3];
        device.read_exact(&mut startup).await.unwrap();
        startup
    }

    #[tokio::test]
    async fn test_startup_sequence() {
        let (port, mut device) = DuplexPort::pair();
        let _board = DgtBoard::spawn(port, Duration::from_millis(200));

        assert_eq!(read_startup(&mut device).await, [0x40, 0x42, 0x44]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopens_after_eof_and_failed_open() {
        let (first, mut first_device) = tokio::io::duplex(1024);
        let (second, mut second_device) = tokio::io::duplex(1024);
        let port = ReconnectingPort {
            streams: Mutex::new(VecDeque::from(vec![Some(first), None, Some(second)])),
        };
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        let mut rx = board.subscribe();

        assert_eq!(read_startup(&mut first_device).await, [0x40, 0x42, 0x44]);

        // 拔掉设备：EOF，一次打开失败，然后重新连上
        drop(first_device);
        let started = Instant::now();
        assert_eq!(read_startup(&mut second_device).await, [0x40, 0x42, 0x44]);
        assert!(started.elapsed() >= HARDWARE_RETRY_DELAY * 2);

        second_device.write_all(&dump_of(&after_e4())).await.unwrap();
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot.get(Square::E4).map(|p| p.role), Some(shakmaty::Role::Pawn));
        assert_eq!(snapshot.get(Square::E2), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_read_is_delivered() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        let mut rx = board.subscribe();
        read_startup(&mut device).await;

        let first = Board::default();
        let second = after_e4();

        device.write_all(&dump_of(&first)).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(!rx.has_changed().unwrap());

        // 第二次读取在窗口内到达，第一次被取代
        device.write_all(&dump_of(&second)).await.unwrap();
        sleep(Duration::from_millis(150)).await;
        assert!(!rx.has_changed().unwrap());

        sleep(Duration::from_millis(100)).await;
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone().unwrap();
        assert_eq!(snapshot, BoardSnapshot::from_board(&second));
        assert_eq!(board.latest(), Some(snapshot));
    }

    #[tokio::test(start_paused = true)]
    async fn test_field_update_requests_board() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        let rx = board.subscribe();
        read_startup(&mut device).await;

        let update = RawFrame::FieldUpdate {
            square_index: 52,
            code: 0,
        };
        device.write_all(&update.encode()).await.unwrap();

        let mut request = [0u8; 1];
        device.read_exact(&mut request).await.unwrap();
        assert_eq!(request[0], DGT_SEND_BRD);

        // 单格变化本身不产生快照
        sleep(Duration::from_millis(500)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_noise_is_discarded() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        let rx = board.subscribe();
        read_startup(&mut device).await;

        let mut truncated = dump_of(&Board::default());
        truncated.pop();
        device.write_all(&truncated).await.unwrap();
        sleep(Duration::from_millis(300)).await;
        device.write_all(&[0x99, 0x00, 0x05, 0x01, 0x02]).await.unwrap();
        sleep(Duration::from_millis(300)).await;

        assert!(!rx.has_changed().unwrap());
        assert!(board.latest().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upside_down_applies_to_next_snapshot() {
        let (port, mut device) = DuplexPort::pair();
        let board = DgtBoard::spawn(port, Duration::from_millis(200));
        read_startup(&mut device).await;
        board.set_upside_down(true);
        assert!(board.is_upside_down());

        let expected = BoardSnapshot::from_board(&after_e4());
        device
            .write_all(&expected.to_frame(true).encode())
            .await
            .unwrap();
        sleep(Duration::from_millis(300)).await;

        assert_eq!(board.latest(), Some(expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debouncer_keeps_latest() {
        let mut debouncer = Debouncer::new(Duration::from_millis(200));
        assert!(!debouncer.is_pending());

        debouncer.push(1);
        sleep(Duration::from_millis(150)).await;
        debouncer.push(2);

        let started = Instant::now();
        assert_eq!(debouncer.settled().await, 2);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(!debouncer.is_pending());
    }
}
