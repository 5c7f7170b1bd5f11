//! UCI 引擎客户端
//!
//! 只实现对局需要的命令子集：握手、设置选项、新对局、按局面搜索、停止、退出。

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{EngineError, Result};
use crate::evaluate::Score;
use crate::options::{EngineSettings, SearchLimits};
use crate::parser::{parse_line, InfoLine, UciMessage};

/// 握手阶段（uciok / readyok）的等待上限
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// 搜索在 movetime 之外额外允许的时间
pub const SEARCH_GRACE: Duration = Duration::from_secs(10);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// 一条主变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvLine {
    pub multipv: u32,
    /// 轮到走棋一方视角
    pub score: Option<Score>,
    pub moves: Vec<String>,
}

/// 一次搜索的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// 无着法可走时为 None
    pub best_move: Option<String>,
    pub ponder: Option<String>,
    /// 按 multipv 排序
    pub lines: Vec<PvLine>,
}

impl SearchResult {
    /// 第一主变的分数（轮到走棋一方视角）
    pub fn score(&self) -> Option<Score> {
        self.lines.first().and_then(|l| l.score)
    }

    /// 每条主变的第一步
    pub fn best_moves(&self) -> Vec<String> {
        self.lines
            .iter()
            .filter_map(|l| l.moves.first().cloned())
            .collect()
    }
}

/// UCI 引擎
pub struct UciEngine {
    name: String,
    lines: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
    child: Option<Child>,
    /// 发出 go 之后、读到 bestmove 之前为 true
    searching: bool,
}

impl UciEngine {
    /// 启动引擎子进程
    pub fn spawn(name: &str, path: &str) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(EngineError::Closed)?;
        let stdout = child.stdout.take().ok_or(EngineError::Closed)?;

        info!(engine = name, path, "引擎进程已启动");
        let mut engine = Self::from_io(name, stdout, stdin);
        engine.child = Some(child);
        Ok(engine)
    }

    /// 基于任意读写流构造（测试用脚本引擎也走这里）
    pub fn from_io<R, W>(name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        Self {
            name: name.into(),
            lines: BufReader::new(reader).lines(),
            writer: Box::new(writer),
            child: None,
            searching: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        debug!(engine = %self.name, "-> {}", command);
        self.writer.write_all(command.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_message(&mut self) -> Result<UciMessage> {
        let line = self.lines.next_line().await?.ok_or(EngineError::Closed)?;
        trace!(engine = %self.name, "<- {}", line);
        Ok(parse_line(&line))
    }

    async fn wait_for(&mut self, expected: UciMessage) -> Result<()> {
        let wait = async {
            loop {
                if self.read_message().await? == expected {
                    return Ok::<(), EngineError>(());
                }
            }
        };
        timeout(HANDSHAKE_TIMEOUT, wait)
            .await
            .map_err(|_| EngineError::Timeout {
                secs: HANDSHAKE_TIMEOUT.as_secs(),
            })?
    }

    /// 握手并设置选项
    pub async fn init(&mut self, settings: &EngineSettings) -> Result<()> {
        self.send("uci").await?;
        self.wait_for(UciMessage::UciOk).await?;

        for (name, value) in settings.setoptions() {
            self.send(&format!("setoption name {} value {}", name, value))
                .await?;
        }

        self.send("isready").await?;
        self.wait_for(UciMessage::ReadyOk).await?;
        self.new_game().await?;

        info!(engine = %self.name, "引擎初始化完成");
        Ok(())
    }

    /// 开始新对局
    pub async fn new_game(&mut self) -> Result<()> {
        self.stop().await?;
        self.send("ucinewgame").await?;
        self.send("isready").await?;
        self.wait_for(UciMessage::ReadyOk).await
    }

    /// 停止尚未结束的搜索并丢弃它的结果
    pub async fn stop(&mut self) -> Result<()> {
        if !self.searching {
            return Ok(());
        }

        debug!(engine = %self.name, "停止上一次搜索");
        self.send("stop").await?;
        let drain = async {
            loop {
                if let UciMessage::BestMove { .. } = self.read_message().await? {
                    return Ok::<(), EngineError>(());
                }
            }
        };
        timeout(HANDSHAKE_TIMEOUT, drain)
            .await
            .map_err(|_| EngineError::Timeout {
                secs: HANDSHAKE_TIMEOUT.as_secs(),
            })??;
        self.searching = false;
        Ok(())
    }

    /// 在给定局面上搜索
    pub async fn search(&mut self, fen: &str, limits: &SearchLimits) -> Result<SearchResult> {
        self.stop().await?;

        self.send(&format!("position fen {}", fen)).await?;
        self.send(&limits.go_command()).await?;
        self.searching = true;

        let budget = limits.move_time + SEARCH_GRACE;
        let result = timeout(budget, self.collect_search())
            .await
            .map_err(|_| EngineError::Timeout {
                secs: budget.as_secs(),
            })??;
        self.searching = false;

        debug!(
            engine = %self.name,
            best = ?result.best_move,
            score = ?result.score(),
            "搜索完成"
        );
        Ok(result)
    }

    async fn collect_search(&mut self) -> Result<SearchResult> {
        let mut latest: BTreeMap<u32, InfoLine> = BTreeMap::new();

        loop {
            match self.read_message().await? {
                UciMessage::Info(info) => {
                    if info.score.is_some() || !info.pv.is_empty() {
                        latest.insert(info.multipv, info);
                    }
                }
                UciMessage::BestMove { best, ponder } => {
                    let lines = latest
                        .into_iter()
                        .map(|(multipv, info)| PvLine {
                            multipv,
                            score: info.score,
                            moves: info.pv,
                        })
                        .collect();
                    return Ok(SearchResult {
                        best_move: best,
                        ponder,
                        lines,
                    });
                }
                UciMessage::UciOk | UciMessage::ReadyOk | UciMessage::Other => {}
            }
        }
    }

    /// 退出引擎；子进程不响应时强制结束
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.send("quit").await {
            debug!(engine = %self.name, error = %e, "发送 quit 失败");
        }
        self.searching = false;

        if let Some(mut child) = self.child.take() {
            match timeout(Duration::from_secs(1), child.wait()).await {
                Ok(Ok(status)) => debug!(engine = %self.name, %status, "引擎进程已退出"),
                _ => {
                    warn!(engine = %self.name, "引擎未响应 quit，强制结束");
                    if let Err(e) = child.kill().await {
                        warn!(engine = %self.name, error = %e, "结束引擎进程失败");
                    }
                }
            }
        }
    }
}

/// 按名称和路径创建引擎
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn launch(&self, name: &str, path: &str) -> Result<UciEngine>;
}

/// 以子进程方式启动
pub struct ProcessLauncher;

#[async_trait]
impl EngineLauncher for ProcessLauncher {
    async fn launch(&self, name: &str, path: &str) -> Result<UciEngine> {
        UciEngine::spawn(name, path)
    }
}
