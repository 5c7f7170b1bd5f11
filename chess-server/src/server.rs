//! 控制面服务
//!
//! 每个连接一个任务：先发送可选棋手，再注册为显示状态观察者，
//! 之后逐条处理客户端命令。

use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use protocol::{
    ClientMessage, DisplayState, Listener, ProtocolError, ServerMessage, TcpConnection,
};

use crate::controller::Controller;
use crate::error::GameError;
use crate::hub::{Observer, StateBroadcastHub};

/// 每个连接的待发送消息上限
const OUTBOX_SIZE: usize = 64;

/// 通过连接推送显示状态的观察者
struct TcpObserver {
    peer: String,
    outbox: mpsc::Sender<ServerMessage>,
}

#[async_trait]
impl Observer for TcpObserver {
    async fn push(&mut self, state: &DisplayState) -> anyhow::Result<()> {
        self.outbox
            .send(ServerMessage::State(state.clone()))
            .await
            .map_err(|_| anyhow!("connection {} closed", self.peer))
    }

    fn name(&self) -> String {
        self.peer.clone()
    }
}

/// 接受连接直到监听器出错
pub async fn run<L>(
    mut listener: L,
    controller: Arc<Controller>,
    hub: Arc<StateBroadcastHub>,
) -> anyhow::Result<()>
where
    L: Listener<Conn = TcpConnection>,
{
    info!(addr = ?listener.local_addr(), "控制面已启动");

    loop {
        match listener.accept().await {
            Ok(conn) => {
                let controller = controller.clone();
                let hub = hub.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(conn, controller, hub).await {
                        warn!("连接异常结束: {}", e);
                    }
                });
            }
            Err(e) => warn!("接受连接失败: {}", e),
        }
    }
}

/// 处理单个连接
pub async fn handle_connection(
    conn: TcpConnection,
    controller: Arc<Controller>,
    hub: Arc<StateBroadcastHub>,
) -> anyhow::Result<()> {
    let peer = protocol::Connection::peer_addr(&conn).unwrap_or_else(|| "unknown".to_string());
    info!(peer = %peer, "新连接");

    let (mut reader, mut writer) = conn.split();
    let (outbox, mut pending) = mpsc::channel::<ServerMessage>(OUTBOX_SIZE);
    let writer_task = tokio::spawn(async move {
        while let Some(msg) = pending.recv().await {
            if let Err(e) = writer.write_frame(&msg).await {
                debug!("写入失败: {}", e);
                break;
            }
        }
    });

    outbox
        .send(ServerMessage::Setup {
            bots: controller.bots(),
            humans: controller.humans(),
        })
        .await?;
    if let Some((white, black)) = controller.running_players().await {
        outbox.send(ServerMessage::Started { white, black }).await?;
    }
    let observer = hub
        .attach(Box::new(TcpObserver {
            peer: peer.clone(),
            outbox: outbox.clone(),
        }))
        .await;

    let result = loop {
        match reader.read_frame::<ClientMessage>().await {
            Ok(msg) => {
                debug!(peer = %peer, ?msg, "收到命令");
                if let Some(reply) = MessageHandler::handle(&controller, msg).await {
                    if outbox.send(reply).await.is_err() {
                        break Ok(());
                    }
                }
            }
            Err(ProtocolError::ConnectionClosed) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    hub.detach(observer);
    writer_task.abort();
    info!(peer = %peer, "连接已关闭");
    Ok(result?)
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端命令，返回需要直接回复的消息
    pub async fn handle(controller: &Controller, msg: ClientMessage) -> Option<ServerMessage> {
        match msg {
            ClientMessage::Start(options) => Some(Self::handle_start(controller, options).await),
            ClientMessage::Undo { plies } => Self::reply(controller.undo(plies).await),
            ClientMessage::Draw => Self::reply(controller.draw().await),
            ClientMessage::Resign => Self::reply(controller.resign().await),
            ClientMessage::Abort => Self::reply(controller.abort().await),
            ClientMessage::Ping => Some(ServerMessage::Pong),
        }
    }

    async fn handle_start(controller: &Controller, options: protocol::StartOptions) -> ServerMessage {
        match controller.start(options).await {
            Ok((white, black)) => ServerMessage::Started { white, black },
            Err(e) => Self::error(e),
        }
    }

    /// 成功时不回复，状态变化通过观察者推送
    fn reply(result: Result<(), GameError>) -> Option<ServerMessage> {
        result.err().map(Self::error)
    }

    fn error(e: GameError) -> ServerMessage {
        warn!("命令失败: {}", e);
        ServerMessage::Error {
            code: e.code(),
            message: e.to_string(),
        }
    }
}
