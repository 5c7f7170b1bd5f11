//! 对局协调
//!
//! 一个长期任务独占 [`GameRecord`]，依次向轮到的一方请求着法；
//! 等待着法期间同时处理控制命令和评估结果。

use std::sync::Arc;

use shakmaty::Move;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use protocol::{fen_of, DrawReason, GameRecord, GameResult, Side, WinReason};

use crate::display::record_state;
use crate::error::GameError;
use crate::evaluation::{EvalJob, EvalOutcome, EvaluationDispatcher, Evaluator};
use crate::hub::StateBroadcastHub;
use crate::player::Player;

/// 控制命令队列长度
const COMMAND_QUEUE_SIZE: usize = 16;

/// 发给对局任务的控制命令
#[derive(Debug)]
pub enum GameCommand {
    /// 悔棋 n 个半回合
    Undo {
        plies: usize,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    /// 协议和棋，之后仍可继续走子
    Draw,
    /// 轮到走棋的一方认输
    Resign,
    /// 中止对局
    Abort,
}

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingMove(Side),
    ApplyingMove,
    Finished(GameResult),
}

impl TurnState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TurnState::Finished(_))
    }
}

/// 对局协调器
pub struct TurnCoordinator {
    record: GameRecord,
    white: Player,
    black: Player,
    hub: Arc<StateBroadcastHub>,
    dispatcher: EvaluationDispatcher,
    evaluations: mpsc::UnboundedReceiver<EvalOutcome>,
    commands: mpsc::Receiver<GameCommand>,
    state: watch::Sender<TurnState>,
}

impl TurnCoordinator {
    /// 启动对局任务
    pub fn start(
        record: GameRecord,
        white: Player,
        black: Player,
        hub: Arc<StateBroadcastHub>,
        evaluators: Vec<Evaluator>,
    ) -> GameHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let (state, state_rx) = watch::channel(TurnState::Idle);
        let (dispatcher, evaluations) = EvaluationDispatcher::new(evaluators);

        let coordinator = Self {
            record,
            white,
            black,
            hub,
            dispatcher,
            evaluations,
            commands,
            state,
        };
        let task = tokio::spawn(coordinator.run());

        GameHandle {
            commands: commands_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(mut self) -> GameRecord {
        info!(
            white = %self.white.name(),
            black = %self.black.name(),
            fen = %fen_of(self.record.position()),
            "对局开始"
        );
        self.publish(true);

        let outcome = self.play().await;
        self.finish(outcome).await;
        self.record
    }

    fn player(&self, side: Side) -> &Player {
        match side {
            Side::White => &self.white,
            Side::Black => &self.black,
        }
    }

    /// 对局主循环，返回最终结果
    async fn play(&mut self) -> GameResult {
        loop {
            if let Some(outcome) = self.record.terminal_outcome() {
                return outcome;
            }

            let side = self.record.turn();
            self.state.send_replace(TurnState::AwaitingMove(side));
            let mut request = self.player(side).request(self.record.position());

            // 直到本方着法应用或悔棋才重新请求
            loop {
                tokio::select! {
                    result = &mut request => {
                        match result {
                            Ok(mv) => {
                                self.apply(mv);
                                break;
                            }
                            Err(e) => {
                                error!(player = %self.player(side).name(), "棋手失败: {}", e);
                                return self.interrupted();
                            }
                        }
                    }
                    command = self.commands.recv() => {
                        let Some(command) = command else {
                            warn!("控制端已关闭，中止对局");
                            return self.interrupted();
                        };
                        match command {
                            GameCommand::Undo { plies, reply } => {
                                let result = self.undo(plies);
                                let applied = result.is_ok();
                                if reply.send(result).is_err() {
                                    debug!("悔棋结果无人接收");
                                }
                                if applied {
                                    break;
                                }
                            }
                            GameCommand::Draw => {
                                info!("双方同意和棋");
                                self.record.set_outcome(GameResult::Draw(DrawReason::Agreement));
                                self.publish(true);
                            }
                            GameCommand::Resign => {
                                info!(side = %side, "认输");
                                return GameResult::win_for(side.opponent(), WinReason::Resign);
                            }
                            GameCommand::Abort => {
                                info!("对局被中止");
                                return self.interrupted();
                            }
                        }
                    }
                    Some(outcome) = self.evaluations.recv() => {
                        self.on_evaluation(outcome);
                    }
                }
            }
        }
    }

    /// 中止时的结果：已协议和棋则保留，否则未决
    fn interrupted(&self) -> GameResult {
        self.record.outcome().unwrap_or(GameResult::Undetermined)
    }

    fn apply(&mut self, mv: Move) {
        self.state.send_replace(TurnState::ApplyingMove);

        let (ply_id, fen, mover) = match self.record.apply(&mv) {
            Ok(ply) => {
                info!(san = %ply.san, uci = %ply.uci, mover = %ply.mover, "着法已应用");
                (ply.id, fen_of(&ply.position), ply.mover)
            }
            Err(e) => {
                warn!("无法应用着法: {}", e);
                return;
            }
        };

        self.dispatcher.dispatch(EvalJob {
            ply_id,
            ply: self.record.len(),
            fen,
            mover,
            terminal: self.record.terminal_outcome().is_some(),
        });
        self.publish(true);
    }

    fn undo(&mut self, plies: usize) -> Result<(), GameError> {
        let removed = self.record.undo(plies)?;
        info!(plies = removed.len(), remaining = self.record.len(), "悔棋");
        self.publish(true);
        Ok(())
    }

    fn on_evaluation(&mut self, outcome: EvalOutcome) {
        let summary = outcome.result.summary();
        if !self.record.record_evaluation(outcome.ply_id, summary) {
            debug!(ply_id = outcome.ply_id, "评估对应的半回合已被悔掉");
            return;
        }
        if let Some(quality) = outcome.result.quality {
            self.record.annotate(outcome.ply_id, quality);
        }
        debug!(
            evaluator = %outcome.evaluator,
            ply_id = outcome.ply_id,
            score = ?outcome.result.score,
            "评估完成"
        );
        self.publish(true);
    }

    async fn finish(&mut self, outcome: GameResult) {
        self.record.set_outcome(outcome);
        info!(outcome = %outcome, plies = self.record.len(), "对局结束");
        match self.record.to_json() {
            Ok(json) => debug!(record = %json, "对局记录"),
            Err(e) => warn!("对局记录导出失败: {}", e),
        }
        self.publish(false);

        self.white.shutdown().await;
        self.black.shutdown().await;
        self.dispatcher.shutdown().await;

        self.state.send_replace(TurnState::Finished(outcome));
    }

    fn publish(&self, started: bool) {
        self.hub.set(record_state(&self.record, started));
    }
}

/// 对局句柄
pub struct GameHandle {
    commands: mpsc::Sender<GameCommand>,
    state: watch::Receiver<TurnState>,
    task: JoinHandle<GameRecord>,
}

impl GameHandle {
    async fn send(&self, command: GameCommand) -> Result<(), GameError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GameError::Stopped)
    }

    /// 悔棋 n 个半回合，超出历史时拒绝
    pub async fn undo(&self, plies: usize) -> Result<(), GameError> {
        let (reply, rx) = oneshot::channel();
        self.send(GameCommand::Undo { plies, reply }).await?;
        rx.await.map_err(|_| GameError::Stopped)?
    }

    pub async fn draw(&self) -> Result<(), GameError> {
        self.send(GameCommand::Draw).await
    }

    pub async fn resign(&self) -> Result<(), GameError> {
        self.send(GameCommand::Resign).await
    }

    pub async fn abort(&self) -> Result<(), GameError> {
        self.send(GameCommand::Abort).await
    }

    pub fn state(&self) -> TurnState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<TurnState> {
        self.state.clone()
    }

    /// 等待对局结束
    pub async fn finished(&self) -> Result<GameResult, GameError> {
        let mut state = self.state.clone();
        let finished = state
            .wait_for(TurnState::is_finished)
            .await
            .map_err(|_| GameError::Stopped)?;
        match *finished {
            TurnState::Finished(outcome) => Ok(outcome),
            _ => Err(GameError::Stopped),
        }
    }

    /// 等待对局任务结束并取回对局记录
    pub async fn join(self) -> Result<GameRecord, GameError> {
        self.task.await.map_err(|_| GameError::Stopped)
    }
}
