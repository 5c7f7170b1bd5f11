//! 服务端配置
//!
//! 从 TOML 文件加载；缺省字段取默认值。

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chess_engine::{EngineSettings, SearchLimits, DEFAULT_MOVE_TIME_MS};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use protocol::{DGT_BAUD_RATE, SETTLE_WINDOW_MS};

fn default_address() -> String {
    "127.0.0.1:9527".to_string()
}

fn default_baud_rate() -> u32 {
    DGT_BAUD_RATE
}

fn default_settle_ms() -> u64 {
    SETTLE_WINDOW_MS
}

fn default_move_time_ms() -> u64 {
    DEFAULT_MOVE_TIME_MS
}

/// 服务端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// 控制面监听地址
    #[serde(default = "default_address")]
    pub address: String,

    /// 电子棋盘串口；未配置时不能选择人类棋手
    #[serde(default)]
    pub dgt_port: Option<String>,

    #[serde(default = "default_baud_rate")]
    pub dgt_baud_rate: u32,

    /// 去抖窗口（毫秒）
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// 引擎名 -> 可执行文件路径
    #[serde(default)]
    pub engines: HashMap<String, String>,

    #[serde(default)]
    pub bots: Vec<BotConfig>,

    #[serde(default)]
    pub humans: Vec<HumanConfig>,

    /// 评估引擎
    #[serde(default)]
    pub eval: Option<EvalConfig>,
}

/// 引擎棋手
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// `engines` 中的引擎名
    pub engine: String,
    #[serde(default)]
    pub skill_level: Option<u32>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default = "default_move_time_ms")]
    pub move_time_ms: u64,
    #[serde(default)]
    pub depth: Option<u32>,
    /// "Name=Value" 形式的引擎选项
    #[serde(default)]
    pub options: Vec<String>,
}

impl BotConfig {
    pub fn settings(&self) -> Result<EngineSettings> {
        let settings = EngineSettings {
            threads: self.threads,
            skill_level: self.skill_level,
            multi_pv: None,
            extra: Vec::new(),
        };
        settings
            .with_options(&self.options)
            .with_context(|| format!("bot {}", self.name))
    }

    pub fn limits(&self) -> SearchLimits {
        SearchLimits::new(self.move_time_ms, self.depth)
    }
}

/// 电子棋盘前的人类棋手
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanConfig {
    pub name: String,
}

/// 评估引擎配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub engine: String,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub threads: Option<u32>,
    #[serde(default = "default_move_time_ms")]
    pub move_time_ms: u64,
    /// 推荐着法条数
    #[serde(default)]
    pub multi_pv: Option<u32>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl EvalConfig {
    pub fn settings(&self) -> Result<EngineSettings> {
        let settings = EngineSettings {
            threads: self.threads,
            skill_level: None,
            multi_pv: self.multi_pv,
            extra: Vec::new(),
        };
        settings.with_options(&self.options).context("eval engine")
    }

    pub fn limits(&self) -> SearchLimits {
        SearchLimits::new(self.move_time_ms, self.depth)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            dgt_port: None,
            dgt_baud_rate: default_baud_rate(),
            settle_ms: default_settle_ms(),
            engines: HashMap::new(),
            bots: Vec::new(),
            humans: Vec::new(),
            eval: None,
        }
    }
}

impl Config {
    /// 从文件加载并校验
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "加载配置");

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        info!(
            bots = config.bots.len(),
            humans = config.humans.len(),
            board = config.dgt_port.is_some(),
            "配置已加载"
        );
        Ok(config)
    }

    /// 解析 TOML 文本并校验
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// 检查引用的引擎名都已定义，引擎选项格式正确
    pub fn validate(&self) -> Result<()> {
        for bot in &self.bots {
            self.engine_path(&bot.engine)
                .with_context(|| format!("bot {}", bot.name))?;
            bot.settings()?;
        }
        if let Some(eval) = &self.eval {
            self.engine_path(&eval.engine).context("eval")?;
            eval.settings()?;
        }
        if self.settle_ms == 0 {
            bail!("settle_ms must be positive");
        }
        Ok(())
    }

    /// 引擎可执行文件路径
    pub fn engine_path(&self, engine: &str) -> Result<&str> {
        match self.engines.get(engine) {
            Some(path) => Ok(path.as_str()),
            None => bail!("unknown engine {}", engine),
        }
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn bot_names(&self) -> Vec<String> {
        self.bots.iter().map(|bot| bot.name.clone()).collect()
    }

    pub fn human_names(&self) -> Vec<String> {
        self.humans.iter().map(|human| human.name.clone()).collect()
    }
}
