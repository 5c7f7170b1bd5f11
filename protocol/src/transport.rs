//! 控制面传输层
//!
//! 帧格式：1 字节协议版本 + 4 字节大端长度 + bincode 消息体。
//! Connection/Connector/Listener 把控制面与具体传输解耦。

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, MAX_FRAME_SIZE, PROTOCOL_VERSION};

/// 连接抽象
#[async_trait]
pub trait Connection: Send + Sync {
    /// 发送消息
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()>;

    /// 接收消息
    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M>;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<String>;
}

/// 连接器（客户端）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 监听器（服务端）
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    async fn bind(addr: &str) -> Result<Self>;

    async fn accept(&mut self) -> Result<Self::Conn>;

    fn local_addr(&self) -> Option<String>;
}

/// 客户端：按地址拨号
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<TcpConnection> {
        match timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(stream) => TcpConnection::from_stream(stream?),
            Err(_) => Err(ProtocolError::ConnectionTimeout),
        }
    }
}

/// 一条 TCP 控制连接
pub struct TcpConnection {
    peer: Option<String>,
    reader: FrameReader<OwnedReadHalf>,
    writer: FrameWriter<OwnedWriteHalf>,
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        // 状态推送是小包，关掉 Nagle
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr().map(|addr| addr.to_string()).ok();
        let (rx, tx) = stream.into_split();
        Ok(Self {
            peer,
            reader: FrameReader::new(rx),
            writer: FrameWriter::new(tx),
        })
    }

    /// 分离读写端：写端交给观察者，读端留给命令循环
    pub fn split(self) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send<M: Serialize + Send + Sync>(&mut self, msg: &M) -> Result<()> {
        self.writer.write_frame(msg).await
    }

    async fn recv<M: DeserializeOwned>(&mut self) -> Result<M> {
        self.reader.read_frame().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer.clone()
    }
}

/// 服务端监听器
pub struct TcpListener(tokio::net::TcpListener);

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        Ok(Self(tokio::net::TcpListener::bind(addr).await?))
    }

    async fn accept(&mut self) -> Result<TcpConnection> {
        let (stream, _) = self.0.accept().await?;
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.0.local_addr().map(|addr| addr.to_string()).ok()
    }
}

/// 帧头大小: 1 字节版本 + 4 字节长度
const FRAME_HEADER_SIZE: usize = 5;

/// 帧头：版本号 + 大端长度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameHeader {
    version: u8,
    length: usize,
}

impl FrameHeader {
    fn for_payload(length: usize) -> Result<Self> {
        check_length(length)?;
        Ok(Self {
            version: PROTOCOL_VERSION,
            length,
        })
    }

    fn decode(bytes: [u8; FRAME_HEADER_SIZE]) -> Result<Self> {
        if bytes[0] != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: bytes[0],
            });
        }
        let length = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        check_length(length)?;
        Ok(Self {
            version: bytes[0],
            length,
        })
    }

    fn encode(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut bytes = [self.version; FRAME_HEADER_SIZE];
        bytes[1..].copy_from_slice(&(self.length as u32).to_be_bytes());
        bytes
    }
}

fn check_length(length: usize) -> Result<()> {
    if length > MAX_FRAME_SIZE {
        Err(ProtocolError::FrameTooLarge {
            size: length,
            max: MAX_FRAME_SIZE,
        })
    } else {
        Ok(())
    }
}

/// 帧中途遇到 EOF 同样视为对端关闭
fn map_read_error(e: std::io::Error) -> ProtocolError {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed,
        _ => ProtocolError::Io(e),
    }
}

/// 编码一帧（帧头 + bincode 消息体）
pub fn encode_frame<M: Serialize + ?Sized>(msg: &M) -> Result<Vec<u8>> {
    let payload = bincode::serialize(msg)?;
    let header = FrameHeader::for_payload(payload.len())?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// 按帧读取消息
pub struct FrameReader<R> {
    inner: R,
    payload: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            payload: Vec::new(),
        }
    }

    pub async fn read_frame<M: DeserializeOwned>(&mut self) -> Result<M> {
        let mut bytes = [0u8; FRAME_HEADER_SIZE];
        self.inner.read_exact(&mut bytes).await.map_err(map_read_error)?;
        let header = FrameHeader::decode(bytes)?;

        self.payload.resize(header.length, 0);
        self.inner
            .read_exact(&mut self.payload)
            .await
            .map_err(map_read_error)?;
        Ok(bincode::deserialize(&self.payload)?)
    }
}

/// 按帧写出消息，每帧一次写入
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame<M: Serialize>(&mut self, msg: &M) -> Result<()> {
        let frame = encode_frame(msg)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }
}
