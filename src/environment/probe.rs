use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::errors::SerenaError;

/// 在目标解释器中执行，输出一行 JSON 描述平台信息
const PROBE_SCRIPT: &str = r#"import json, os, platform, sys
conda = os.path.isdir(os.path.join(sys.prefix, "conda-meta"))
print(json.dumps({
    "system": platform.system(),
    "release": platform.release(),
    "machine": platform.machine(),
    "executable": sys.executable,
    "version": "%d.%d.%d" % tuple(sys.version_info[:3]),
    "venv": hasattr(sys, "real_prefix") or getattr(sys, "base_prefix", sys.prefix) != sys.prefix,
    "conda_env": os.environ.get("CONDA_DEFAULT_ENV") if conda else None,
}))"#;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Python 版本号
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self { major, minor, micro }
    }
}

impl FromStr for PythonVersion {
    type Err = SerenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE.get_or_init(|| {
            Regex::new(r"(\d+)\.(\d+)(?:\.(\d+))?").expect("version regex is valid")
        });

        let invalid = || SerenaError::InvalidArgument(format!("unrecognized python version: {}", s));
        let caps = re.captures(s.trim()).ok_or_else(invalid)?;

        let part = |idx: usize| -> Result<u32, SerenaError> {
            match caps.get(idx) {
                Some(m) => m.as_str().parse().map_err(|_| invalid()),
                None => Ok(0),
            }
        };

        Ok(Self {
            major: part(1)?,
            minor: part(2)?,
            micro: part(3)?,
        })
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

impl Serialize for PythonVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PythonVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// 一次进程调用内捕获的平台快照，捕获后不再改变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSnapshot {
    /// 小写的操作系统名称: linux / darwin / windows
    pub os_name: String,
    pub os_release: String,
    pub architecture: String,
    pub interpreter_path: String,
    pub python_version: PythonVersion,
    /// 是否运行在 venv、virtualenv 或具名 conda 环境中
    pub in_isolated_env: bool,
}

impl PlatformSnapshot {
    pub fn new(os_name: &str, architecture: &str, python_version: PythonVersion) -> Self {
        Self {
            os_name: os_name.to_ascii_lowercase(),
            os_release: String::new(),
            architecture: architecture.to_string(),
            interpreter_path: "python3".to_string(),
            python_version,
            in_isolated_env: false,
        }
    }

    pub fn with_release(mut self, release: &str) -> Self {
        self.os_release = release.to_string();
        self
    }

    pub fn with_interpreter(mut self, path: &str) -> Self {
        self.interpreter_path = path.to_string();
        self
    }

    pub fn isolated(mut self, in_isolated_env: bool) -> Self {
        self.in_isolated_env = in_isolated_env;
        self
    }

    pub fn is_windows(&self) -> bool {
        self.os_name == "windows"
    }

    /// 例如 `linux 6.8.0 (x86_64)`
    pub fn describe(&self) -> String {
        if self.os_release.is_empty() {
            format!("{} ({})", self.os_name, self.architecture)
        } else {
            format!("{} {} ({})", self.os_name, self.os_release, self.architecture)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    system: String,
    release: String,
    machine: String,
    executable: String,
    version: String,
    #[serde(alias = "isolated")]
    venv: bool,
    /// 解释器属于 conda 安装时的环境名
    #[serde(default)]
    conda_env: Option<String>,
}

impl ProbeOutput {
    /// conda 的 base 环境不算隔离环境
    fn is_isolated(&self) -> bool {
        let named_conda_env = self
            .conda_env
            .as_deref()
            .map(str::trim)
            .is_some_and(|name| !name.is_empty() && name != "base");
        self.venv || named_conda_env
    }
}

/// 解析探测脚本的输出（取最后一个非空行）
pub fn parse_probe_output(stdout: &str) -> Result<PlatformSnapshot> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| SerenaError::InterpreterNotFound("probe produced no output".to_string()))?;

    let raw: ProbeOutput = serde_json::from_str(line.trim())?;
    let in_isolated_env = raw.is_isolated();
    Ok(PlatformSnapshot {
        os_name: raw.system.to_ascii_lowercase(),
        os_release: raw.release,
        architecture: raw.machine,
        interpreter_path: raw.executable,
        python_version: raw.version.parse()?,
        in_isolated_env,
    })
}

/// 平台信息来源
#[async_trait]
pub trait PlatformProbe: Send + Sync {
    async fn capture(&self) -> Result<PlatformSnapshot>;
}

/// 通过执行 Python 解释器获取平台信息
#[derive(Debug, Clone)]
pub struct InterpreterProbe {
    candidates: Vec<String>,
}

impl InterpreterProbe {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    async fn probe_candidate(&self, candidate: &str) -> Result<PlatformSnapshot> {
        let mut command = AsyncCommand::new(candidate);
        command.arg("-c").arg(PROBE_SCRIPT).kill_on_drop(true);

        let output = tokio::time::timeout(PROBE_TIMEOUT, command.output())
            .await
            .map_err(|_| SerenaError::InterpreterNotFound(format!("{} timed out", candidate)))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SerenaError::InterpreterNotFound(format!("{}: {}", candidate, stderr.trim())).into());
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl PlatformProbe for InterpreterProbe {
    async fn capture(&self) -> Result<PlatformSnapshot> {
        let mut failures = Vec::new();

        for candidate in &self.candidates {
            debug!("🔍 探测解释器: {}", candidate);
            match self.probe_candidate(candidate).await {
                Ok(snapshot) => {
                    info!(
                        "🐍 Python {} ({}) on {}",
                        snapshot.python_version,
                        snapshot.interpreter_path,
                        snapshot.describe()
                    );
                    return Ok(snapshot);
                }
                Err(e) => {
                    warn!("⚠️ 解释器 {} 不可用: {}", candidate, e);
                    failures.push(format!("{}: {}", candidate, e));
                }
            }
        }

        Err(SerenaError::InterpreterNotFound(failures.join("; ")).into())
    }
}

/// 返回固定快照，用于测试和离线场景
#[derive(Debug, Clone)]
pub struct StaticProbe(pub PlatformSnapshot);

#[async_trait]
impl PlatformProbe for StaticProbe {
    async fn capture(&self) -> Result<PlatformSnapshot> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        assert_eq!("3.11.5".parse::<PythonVersion>().unwrap(), PythonVersion::new(3, 11, 5));
        assert_eq!("3.13.0rc1".parse::<PythonVersion>().unwrap(), PythonVersion::new(3, 13, 0));
        assert_eq!("Python 3.12".parse::<PythonVersion>().unwrap(), PythonVersion::new(3, 12, 0));
        assert!("unknown".parse::<PythonVersion>().is_err());
    }

    #[test]
    fn test_parse_probe_output() {
        let stdout = "some warning\n{\"system\": \"Darwin\", \"release\": \"23.1.0\", \"machine\": \"arm64\", \
                      \"executable\": \"/usr/bin/python3\", \"version\": \"3.11.5\", \"venv\": true, \"conda_env\": null}\n";
        let snapshot = parse_probe_output(stdout).unwrap();

        assert_eq!(snapshot.os_name, "darwin");
        assert_eq!(snapshot.architecture, "arm64");
        assert_eq!(snapshot.python_version, PythonVersion::new(3, 11, 5));
        assert!(snapshot.in_isolated_env);
        assert_eq!(snapshot.describe(), "darwin 23.1.0 (arm64)");
    }

    #[test]
    fn test_named_conda_env_is_isolated() {
        let line = |conda_env: &str| {
            format!(
                "{{\"system\": \"Linux\", \"release\": \"6.5.0\", \"machine\": \"x86_64\", \
                 \"executable\": \"/opt/conda/envs/work/bin/python\", \"version\": \"3.11.8\", \
                 \"venv\": false, \"conda_env\": {}}}",
                conda_env
            )
        };

        assert!(parse_probe_output(&line("\"work\"")).unwrap().in_isolated_env);
        assert!(!parse_probe_output(&line("\"base\"")).unwrap().in_isolated_env);
        assert!(!parse_probe_output(&line("null")).unwrap().in_isolated_env);
    }

    #[test]
    fn test_parse_probe_output_empty() {
        assert!(parse_probe_output("\n\n").is_err());
    }

    #[test]
    fn test_snapshot_serializes_version_as_string() {
        let snapshot = PlatformSnapshot::new("Linux", "x86_64", PythonVersion::new(3, 13, 0));
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["python_version"], "3.13.0");
        assert_eq!(value["os_name"], "linux");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported() {
        let probe = InterpreterProbe::new(vec!["definitely-not-a-python-binary".to_string()]);
        let err = probe.capture().await.unwrap_err();
        assert!(err.to_string().contains("python interpreter not found"));
    }
}
