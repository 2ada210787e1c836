//! 运行时设置
//!
//! 默认值可以通过环境变量（或工作目录下的 `.env`）覆盖。非法的值会被忽略并记录警告，
//! 不会阻止程序启动。

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

pub const ENV_PYTHON: &str = "SERENA_CLI_PYTHON";
pub const ENV_RECOMMENDED_PYTHON: &str = "SERENA_CLI_RECOMMENDED_PYTHON";
pub const ENV_INSTALL_TIMEOUT: &str = "SERENA_CLI_INSTALL_TIMEOUT_SECS";
pub const ENV_PACKAGE: &str = "SERENA_CLI_PACKAGE";
pub const ENV_GIT_SOURCE: &str = "SERENA_CLI_GIT_SOURCE";
pub const ENV_CHECK_COMMAND: &str = "SERENA_CLI_CHECK_COMMAND";
pub const ENV_DISABLE_MCP: &str = "SERENA_CLI_DISABLE_MCP";

/// 兼容的 Python 版本集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityPolicy {
    pub major: u32,
    /// 按推荐程度排序，第一个用于需要固定解释器版本的安装命令
    pub minors: Vec<u32>,
}

impl Default for CompatibilityPolicy {
    fn default() -> Self {
        Self {
            major: 3,
            minors: vec![11, 12],
        }
    }
}

impl CompatibilityPolicy {
    /// 解析形如 `3.11,3.12` 的版本列表，所有条目必须属于同一个主版本
    pub fn parse(raw: &str) -> Option<Self> {
        let mut major = None;
        let mut minors = Vec::new();

        for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (maj, min) = item.split_once('.')?;
            let maj: u32 = maj.trim().parse().ok()?;
            let min: u32 = min.trim().parse().ok()?;

            match major {
                None => major = Some(maj),
                Some(m) if m != maj => return None,
                _ => {}
            }
            if !minors.contains(&min) {
                minors.push(min);
            }
        }

        Some(Self {
            major: major?,
            minors,
        })
    }

    pub fn accepts(&self, major: u32, minor: u32) -> bool {
        major == self.major && self.minors.contains(&minor)
    }

    /// 首选版本，例如 `3.11`
    pub fn preferred(&self) -> String {
        match self.minors.first() {
            Some(minor) => format!("{}.{}", self.major, minor),
            None => self.major.to_string(),
        }
    }

    /// 人类可读的版本列表，例如 `3.11 or 3.12`
    pub fn describe(&self) -> String {
        self.minors
            .iter()
            .map(|minor| format!("{}.{}", self.major, minor))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// 按顺序尝试的 Python 解释器
    pub python_candidates: Vec<String>,
    pub policy: CompatibilityPolicy,
    pub install_timeout_secs: u64,
    pub check_timeout_secs: u64,
    /// PyPI 包名
    pub package: String,
    /// uv 安装时使用的源
    pub git_source: String,
    /// 用于判断 Serena 是否已安装的命令
    pub check_command: String,
    pub mcp_disabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let python_candidates = if cfg!(target_os = "windows") {
            vec!["python".to_string(), "py".to_string()]
        } else {
            vec!["python3".to_string(), "python".to_string()]
        };

        Self {
            python_candidates,
            policy: CompatibilityPolicy::default(),
            install_timeout_secs: 300,
            check_timeout_secs: 15,
            package: "serena-agent".to_string(),
            git_source: "git+https://github.com/oraios/serena".to_string(),
            check_command: "serena --help".to_string(),
            mcp_disabled: false,
        }
    }
}

impl Settings {
    /// 从进程环境变量读取设置
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(python) = lookup(ENV_PYTHON).filter(|v| !v.trim().is_empty()) {
            settings.python_candidates = vec![python.trim().to_string()];
        }

        if let Some(raw) = lookup(ENV_RECOMMENDED_PYTHON) {
            match CompatibilityPolicy::parse(&raw) {
                Some(policy) if !policy.minors.is_empty() => settings.policy = policy,
                _ => warn!("⚠️ 忽略无效的 {}: {:?}", ENV_RECOMMENDED_PYTHON, raw),
            }
        }

        if let Some(raw) = lookup(ENV_INSTALL_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => settings.install_timeout_secs = secs,
                _ => warn!("⚠️ 忽略无效的 {}: {:?}", ENV_INSTALL_TIMEOUT, raw),
            }
        }

        if let Some(package) = lookup(ENV_PACKAGE).filter(|v| !v.trim().is_empty()) {
            settings.package = package.trim().to_string();
        }
        if let Some(source) = lookup(ENV_GIT_SOURCE).filter(|v| !v.trim().is_empty()) {
            settings.git_source = source.trim().to_string();
        }
        if let Some(check) = lookup(ENV_CHECK_COMMAND).filter(|v| !v.trim().is_empty()) {
            settings.check_command = check.trim().to_string();
        }

        if let Some(raw) = lookup(ENV_DISABLE_MCP) {
            settings.mcp_disabled = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        settings
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }
}
