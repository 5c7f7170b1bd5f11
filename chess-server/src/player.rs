//! 棋手
//!
//! 引擎棋手向子进程请求着法；棋盘棋手等待电子棋盘摆出一个合法着法。

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use shakmaty::{Chess, Move};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use chess_engine::{EngineError, SearchLimits, UciEngine};
use protocol::{fen_of, find_legal_move, BoardSnapshot};

use crate::error::GameError;
use crate::resolver::MoveResolver;

/// 棋手
#[derive(Clone)]
pub enum Player {
    /// 引擎
    Engine(EnginePlayer),
    /// 电子棋盘前的人
    Board(BoardPlayer),
}

impl Player {
    /// 由已完成握手的引擎构造
    pub fn engine(name: impl Into<String>, engine: UciEngine, limits: SearchLimits) -> Self {
        Player::Engine(EnginePlayer {
            name: name.into(),
            engine: Arc::new(Mutex::new(engine)),
            limits,
        })
    }

    pub fn board(name: impl Into<String>, snapshots: watch::Receiver<Option<BoardSnapshot>>) -> Self {
        Player::Board(BoardPlayer {
            name: name.into(),
            snapshots,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Player::Engine(player) => &player.name,
            Player::Board(player) => &player.name,
        }
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, Player::Engine(_))
    }

    /// 给定局面下的下一步
    pub async fn next_move(&self, position: &Chess) -> Result<Move, GameError> {
        match self {
            Player::Engine(player) => player.next_move(position).await,
            Player::Board(player) => player.next_move(position).await,
        }
    }

    /// 在后台请求下一步；返回的请求被丢弃时取消等待
    pub fn request(&self, position: &Chess) -> MoveRequest {
        let player = self.clone();
        let position = position.clone();
        MoveRequest {
            handle: tokio::spawn(async move { player.next_move(&position).await }),
        }
    }

    /// 结束棋手；引擎进程退出
    pub async fn shutdown(&self) {
        match self {
            Player::Engine(player) => {
                player.engine.lock().await.shutdown().await;
                info!(player = %player.name, "引擎棋手已关闭");
            }
            Player::Board(player) => {
                debug!(player = %player.name, "棋盘棋手已关闭");
            }
        }
    }
}

/// 引擎棋手
#[derive(Clone)]
pub struct EnginePlayer {
    name: String,
    engine: Arc<Mutex<UciEngine>>,
    limits: SearchLimits,
}

impl EnginePlayer {
    async fn next_move(&self, position: &Chess) -> Result<Move, GameError> {
        let fen = fen_of(position);
        let failed = |source: EngineError| GameError::PlayerFailed {
            name: self.name.clone(),
            source,
        };

        let result = {
            let mut engine = self.engine.lock().await;
            engine.search(&fen, &self.limits).await.map_err(failed)?
        };
        let uci = result.best_move.ok_or_else(|| failed(EngineError::NoBestMove))?;

        debug!(player = %self.name, uci = %uci, "引擎给出着法");
        find_legal_move(position, &uci).ok_or_else(|| failed(EngineError::IllegalMove { uci }))
    }
}

/// 电子棋盘棋手
#[derive(Clone)]
pub struct BoardPlayer {
    name: String,
    snapshots: watch::Receiver<Option<BoardSnapshot>>,
}

impl BoardPlayer {
    /// 等待之后的快照吻合一个合法着法
    ///
    /// 请求开始时棋盘上已有的快照视为已处理，悔棋后棋盘尚未复原时不会把旧着法再走一遍。
    async fn next_move(&self, position: &Chess) -> Result<Move, GameError> {
        let mut snapshots = self.snapshots.clone();
        snapshots.borrow_and_update();

        loop {
            snapshots
                .changed()
                .await
                .map_err(|_| GameError::BoardDisconnected)?;
            let snapshot = snapshots.borrow_and_update().clone();
            let Some(snapshot) = snapshot else {
                continue;
            };
            match MoveResolver::resolve(&snapshot, position) {
                Some(mv) => {
                    debug!(player = %self.name, "棋盘着法已识别");
                    return Ok(mv);
                }
                None => {
                    debug!(player = %self.name, pieces = snapshot.occupied_count(), "快照尚不构成合法着法");
                }
            }
        }
    }
}

/// 进行中的着法请求
///
/// 被丢弃时后台任务随之取消，挂起的棋盘等待也一并释放。
pub struct MoveRequest {
    handle: JoinHandle<Result<Move, GameError>>,
}

impl Future for MoveRequest {
    type Output = Result<Move, GameError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(GameError::Stopped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MoveRequest {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
