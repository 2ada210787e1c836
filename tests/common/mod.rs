#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use serena_cli::config::Settings;
use serena_cli::environment::{InstallationMethod, PlatformSnapshot, PythonVersion, StaticProbe};
use serena_cli::installer::{ExecutionOutcome, Executor, SerenaManager};
use serena_cli::mcp::ToolDispatchGateway;
use serena_cli::project::{ConfigManager, ConfigScope, ProjectDetector, ProjectInfo, ProjectSize};
use serena_cli::tools::serena_registry;

pub fn linux_snapshot(version: &str) -> PlatformSnapshot {
    PlatformSnapshot::new("linux", "x86_64", version.parse::<PythonVersion>().unwrap())
        .with_release("6.5.0")
        .with_interpreter("/usr/bin/python3")
}

/// 记录每次执行的命令，按方法名决定成功与否
#[derive(Default)]
pub struct RecordingExecutor {
    pub installed: Mutex<bool>,
    pub succeeding_methods: Vec<String>,
    pub calls: Mutex<Vec<(String, String)>>,
    pub working_dirs: Mutex<Vec<(String, Option<PathBuf>)>>,
    pub delay: Option<Duration>,
}

impl RecordingExecutor {
    pub fn installed() -> Self {
        Self {
            installed: Mutex::new(true),
            ..Self::default()
        }
    }

    pub fn succeeding(methods: &[&str]) -> Self {
        Self {
            succeeding_methods: methods.iter().map(|m| m.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn install_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(method, _)| method != "check")
            .map(|(method, _)| method.clone())
            .collect()
    }

    pub fn working_dir_of(&self, method: &str) -> Option<PathBuf> {
        self.working_dirs
            .lock()
            .iter()
            .find(|(name, _)| name == method)
            .and_then(|(_, dir)| dir.clone())
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, method: &InstallationMethod, working_dir: Option<&Path>, _timeout: Duration) -> ExecutionOutcome {
        self.calls.lock().push((method.method.clone(), method.command.clone()));
        self.working_dirs
            .lock()
            .push((method.method.clone(), working_dir.map(Path::to_path_buf)));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let succeeded = if method.method == "check" {
            *self.installed.lock()
        } else {
            self.succeeding_methods.contains(&method.method)
        };
        if succeeded && method.method != "check" {
            *self.installed.lock() = true;
        }

        ExecutionOutcome {
            succeeded,
            stdout: String::new(),
            stderr: if succeeded { String::new() } else { format!("{} failed", method.method) },
            exit_code: Some(if succeeded { 0 } else { 1 }),
            timed_out: false,
            duration_ms: 1,
        }
    }
}

/// 固定项目的检测器
pub struct FixedDetector {
    pub current: Option<PathBuf>,
    pub has_serena: bool,
}

impl ProjectDetector for FixedDetector {
    fn detect_current_project(&self) -> Option<PathBuf> {
        self.current.clone()
    }

    fn get_project_info(&self, path: &Path) -> Result<Option<ProjectInfo>> {
        Ok(Some(ProjectInfo {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            project_type: "python".to_string(),
            languages: BTreeSet::from(["python".to_string()]),
            size: ProjectSize {
                total_files: 3,
                total_size_mb: 0.01,
            },
            has_serena: self.has_serena,
            has_cli_config: false,
        }))
    }
}

/// 内存中的配置存储
#[derive(Default)]
pub struct MemoryConfig {
    pub entries: Mutex<HashMap<PathBuf, Value>>,
}

impl MemoryConfig {
    pub fn project(&self, project: &Path) -> Option<Value> {
        self.entries.lock().get(&project.join("project.yml")).cloned()
    }
}

impl ConfigManager for MemoryConfig {
    fn config_path(&self, scope: ConfigScope, project: Option<&Path>) -> Result<PathBuf> {
        Ok(match (scope, project) {
            (ConfigScope::Project, Some(project)) => project.join("project.yml"),
            _ => PathBuf::from("/memory/config.yml"),
        })
    }

    fn get_config(&self, scope: ConfigScope, project: Option<&Path>) -> Result<Option<Value>> {
        let path = self.config_path(scope, project)?;
        Ok(self.entries.lock().get(&path).cloned())
    }

    fn save_config(&self, scope: ConfigScope, project: Option<&Path>, config: &Value) -> Result<PathBuf> {
        let path = self.config_path(scope, project)?;
        self.entries.lock().insert(path.clone(), config.clone());
        Ok(path)
    }
}

pub struct Harness {
    pub manager: Arc<SerenaManager>,
    pub executor: Arc<RecordingExecutor>,
    pub config: Arc<MemoryConfig>,
}

impl Harness {
    pub fn new(snapshot: PlatformSnapshot, executor: RecordingExecutor, detector: FixedDetector) -> Self {
        let executor = Arc::new(executor);
        let config = Arc::new(MemoryConfig::default());
        let manager = Arc::new(SerenaManager::new(
            Settings::default(),
            Arc::new(StaticProbe(snapshot)),
            executor.clone(),
            Arc::new(detector),
            config.clone(),
        ));
        Self {
            manager,
            executor,
            config,
        }
    }

    pub fn gateway(&self) -> ToolDispatchGateway {
        ToolDispatchGateway::with_registry(serena_registry(Arc::clone(&self.manager)).unwrap(), false).unwrap()
    }
}
