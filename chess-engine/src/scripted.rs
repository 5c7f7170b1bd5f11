//! 脚本化 UCI 引擎
//!
//! 在进程内用一个任务扮演 UCI 引擎，按预设顺序回答每个 go 命令。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::evaluate::Score;
use crate::uci::{EngineLauncher, UciEngine};

/// 对一个 go 命令的回答
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// 立即给出分数和着法
    Answer { best: Option<String>, score: Score },
    /// 不回答，直到收到 stop
    Silent,
    /// 关闭输出，模拟引擎崩溃
    Crash,
}

impl ScriptedReply {
    /// 走一步，分数为均势
    pub fn play(uci: &str) -> Self {
        ScriptedReply::Answer {
            best: Some(uci.to_string()),
            score: Score::Centipawns(0),
        }
    }

    /// 只给分数
    pub fn score(score: Score) -> Self {
        ScriptedReply::Answer { best: None, score }
    }
}

/// 对端收到的全部命令
pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// 创建脚本引擎；脚本用完后对端关闭输出
pub fn scripted_engine(name: &str, replies: Vec<ScriptedReply>) -> (UciEngine, CommandLog) {
    let (engine_side, peer_side) = duplex(16 * 1024);
    let (reader, writer) = split(engine_side);
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));

    tokio::spawn(run_peer(name.to_string(), peer_side, replies.into(), log.clone()));

    (UciEngine::from_io(name, reader, writer), log)
}

async fn run_peer(
    name: String,
    stream: tokio::io::DuplexStream,
    mut replies: VecDeque<ScriptedReply>,
    log: CommandLog,
) {
    let (reader, mut writer) = split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut pending = false;

    while let Ok(Some(line)) = lines.next_line().await {
        log.lock().await.push(line.clone());

        let output = match line.split_whitespace().next() {
            Some("uci") => format!("id name {}\nuciok\n", name),
            Some("isready") => "readyok\n".to_string(),
            Some("go") => match replies.pop_front() {
                Some(ScriptedReply::Answer { best, score }) => {
                    let score = match score {
                        Score::Centipawns(cp) => format!("cp {}", cp),
                        Score::Mate(n) => format!("mate {}", n),
                    };
                    match best {
                        Some(mv) => format!(
                            "info depth 1 multipv 1 score {} pv {}\nbestmove {}\n",
                            score, mv, mv
                        ),
                        None => format!("info depth 1 multipv 1 score {}\nbestmove (none)\n", score),
                    }
                }
                Some(ScriptedReply::Silent) => {
                    pending = true;
                    continue;
                }
                Some(ScriptedReply::Crash) | None => break,
            },
            Some("stop") if pending => {
                pending = false;
                "bestmove (none)\n".to_string()
            }
            Some("quit") => break,
            _ => continue,
        };

        if writer.write_all(output.as_bytes()).await.is_err() {
            break;
        }
    }

    debug!(engine = %name, "脚本引擎结束");
}

/// 按路径分发脚本的启动器
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<HashMap<String, VecDeque<Vec<ScriptedReply>>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为下一次以 `path` 启动的引擎准备脚本
    pub async fn push(&self, path: &str, replies: Vec<ScriptedReply>) {
        self.scripts
            .lock()
            .await
            .entry(path.to_string())
            .or_default()
            .push_back(replies);
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self, name: &str, path: &str) -> Result<UciEngine> {
        let replies = self
            .scripts
            .lock()
            .await
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| EngineError::Spawn {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no script"),
            })?;
        Ok(scripted_engine(name, replies).0)
    }
}
