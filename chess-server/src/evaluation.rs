//! 后台评估
//!
//! 每个评估引擎一个工作任务，通过无界队列接收局面，互不阻塞，也不阻塞对局循环。
//! 每个半回合都按顺序评估一次；引擎失败只结束该评估引擎自己的任务。

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use chess_engine::{classify_move, EvaluationResult, Score, SearchLimits, UciEngine};
use protocol::Side;

/// 评估引擎
pub struct Evaluator {
    engine: UciEngine,
    limits: SearchLimits,
}

impl Evaluator {
    /// `engine` 需已完成握手
    pub fn new(engine: UciEngine, limits: SearchLimits) -> Self {
        Self { engine, limits }
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }
}

/// 一个待评估的半回合
#[derive(Debug, Clone)]
pub struct EvalJob {
    /// 对局记录中的半回合编号
    pub ply_id: u64,
    /// 半回合序号（从 1 开始），悔棋后会重复出现
    pub ply: usize,
    /// 走完后的局面
    pub fen: String,
    pub mover: Side,
    /// 已是终局，无需搜索
    pub terminal: bool,
}

/// 一次评估结果
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub ply_id: u64,
    pub evaluator: String,
    pub result: EvaluationResult,
}

struct Worker {
    name: String,
    jobs: mpsc::UnboundedSender<EvalJob>,
    task: JoinHandle<()>,
}

/// 评估分发器
pub struct EvaluationDispatcher {
    workers: Vec<Worker>,
}

impl EvaluationDispatcher {
    /// 为每个评估引擎启动工作任务，返回结果接收端
    pub fn new(evaluators: Vec<Evaluator>) -> (Self, mpsc::UnboundedReceiver<EvalOutcome>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let workers = evaluators
            .into_iter()
            .map(|evaluator| {
                let (jobs, jobs_rx) = mpsc::unbounded_channel();
                let name = evaluator.name().to_string();
                let task = tokio::spawn(run_worker(evaluator, jobs_rx, results_tx.clone()));
                Worker { name, jobs, task }
            })
            .collect();

        (Self { workers }, results_rx)
    }

    /// 没有评估引擎
    pub fn none() -> (Self, mpsc::UnboundedReceiver<EvalOutcome>) {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// 把局面交给所有评估引擎，立即返回
    pub fn dispatch(&self, job: EvalJob) {
        for worker in &self.workers {
            if worker.jobs.send(job.clone()).is_err() {
                debug!(evaluator = %worker.name, ply = job.ply, "评估引擎已停止，跳过");
            }
        }
    }

    /// 关闭所有评估引擎并等待退出
    pub async fn shutdown(&mut self) {
        for worker in self.workers.drain(..) {
            drop(worker.jobs);
            if let Err(e) = worker.task.await {
                warn!(evaluator = %worker.name, "评估任务异常退出: {}", e);
            }
        }
    }
}

async fn run_worker(
    mut evaluator: Evaluator,
    mut jobs: mpsc::UnboundedReceiver<EvalJob>,
    results: mpsc::UnboundedSender<EvalOutcome>,
) {
    let name = evaluator.name().to_string();
    // 半回合序号 -> 白方视角分数
    let mut scores: BTreeMap<usize, Score> = BTreeMap::new();

    // 按到达顺序逐个评估，已悔掉的半回合由对局记录按编号过滤
    while let Some(job) = jobs.recv().await {
        // 悔棋后重走的半回合，丢弃旧分数
        scores.retain(|ply, _| *ply < job.ply);

        if job.terminal {
            continue;
        }

        let search = match evaluator.engine.search(&job.fen, &evaluator.limits).await {
            Ok(search) => search,
            Err(e) => {
                error!(evaluator = %name, ply = job.ply, "评估引擎失败: {}", e);
                break;
            }
        };
        let Some(relative) = search.score() else {
            warn!(evaluator = %name, ply = job.ply, "搜索结果没有分数");
            continue;
        };

        // 引擎分数以轮到走棋的一方（即走子方的对手）为视角
        let score = relative.for_white(job.mover.opponent());
        let quality = if job.ply == 1 {
            classify_move(None, score, job.mover)
        } else {
            scores
                .get(&(job.ply - 1))
                .and_then(|previous| classify_move(Some(*previous), score, job.mover))
        };
        scores.insert(job.ply, score);

        let outcome = EvalOutcome {
            ply_id: job.ply_id,
            evaluator: name.clone(),
            result: EvaluationResult {
                score,
                best_moves: search.best_moves(),
                quality,
            },
        };
        if results.send(outcome).is_err() {
            break;
        }
    }

    evaluator.engine.shutdown().await;
    debug!(evaluator = %name, "评估任务结束");
}
