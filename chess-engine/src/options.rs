//! 引擎设置与搜索限制

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// 默认线程数
pub const DEFAULT_THREADS: u32 = 1;

/// 默认每步思考时间（毫秒）
pub const DEFAULT_MOVE_TIME_MS: u64 = 500;

/// 引擎初始化时设置的选项
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EngineSettings {
    pub threads: Option<u32>,
    /// 0-20
    pub skill_level: Option<u32>,
    /// 多主变数量，评估引擎用来给出多个推荐着法
    pub multi_pv: Option<u32>,
    /// 其它 (Name, Value) 选项
    pub extra: Vec<(String, String)>,
}

impl EngineSettings {
    /// 按顺序展开为 setoption 列表
    pub fn setoptions(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        if let Some(threads) = self.threads {
            options.push(("Threads".to_string(), threads.to_string()));
        }
        if let Some(skill) = self.skill_level {
            options.push(("Skill Level".to_string(), skill.to_string()));
        }
        if let Some(multi_pv) = self.multi_pv {
            options.push(("MultiPV".to_string(), multi_pv.to_string()));
        }
        options.extend(self.extra.iter().cloned());
        options
    }

    /// 追加 "Name=Value" 形式的选项
    pub fn with_options<S: AsRef<str>>(mut self, options: &[S]) -> Result<Self> {
        for option in options {
            self.extra.push(parse_option(option.as_ref())?);
        }
        Ok(self)
    }
}

/// 解析 "Name=Value"，名称可以带空格（如 "Skill Level=3"）
pub fn parse_option(option: &str) -> Result<(String, String)> {
    match option.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(EngineError::InvalidOption {
            option: option.to_string(),
        }),
    }
}

/// 单次搜索的限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub move_time: Duration,
    pub depth: Option<u32>,
}

impl SearchLimits {
    pub fn new(move_time_ms: u64, depth: Option<u32>) -> Self {
        Self {
            move_time: Duration::from_millis(move_time_ms),
            depth,
        }
    }

    /// go 命令
    pub fn go_command(&self) -> String {
        let mut cmd = format!("go movetime {}", self.move_time.as_millis());
        if let Some(depth) = self.depth {
            cmd.push_str(&format!(" depth {}", depth));
        }
        cmd
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MOVE_TIME_MS, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option() {
        assert_eq!(
            parse_option("Skill Level=3").unwrap(),
            ("Skill Level".to_string(), "3".to_string())
        );
        assert_eq!(
            parse_option("UCI_Elo = 1500").unwrap(),
            ("UCI_Elo".to_string(), "1500".to_string())
        );
        assert!(parse_option("Hash").is_err());
        assert!(parse_option("=5").is_err());
    }

    #[test]
    fn test_setoptions_order() {
        let settings = EngineSettings {
            threads: Some(4),
            skill_level: Some(10),
            multi_pv: None,
            extra: vec![],
        }
        .with_options(&["Hash=64"])
        .unwrap();

        let names: Vec<String> = settings.setoptions().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Threads", "Skill Level", "Hash"]);
    }

    #[test]
    fn test_go_command() {
        assert_eq!(SearchLimits::new(500, None).go_command(), "go movetime 500");
        assert_eq!(
            SearchLimits::new(250, Some(17)).go_command(),
            "go movetime 250 depth 17"
        );
    }
}
