use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::executor::{ExecutionOutcome, Executor, InstallationExecutor};
use crate::config::Settings;
use crate::environment::{
    CompatibilityGuide, CompatibilityResolver, InstallationMethod, InterpreterProbe, PlatformProbe, PlatformSnapshot,
    VENV_DIR,
};
use crate::errors::SerenaError;
use crate::project::config_store::{apply_updates, default_config};
use crate::project::{ConfigManager, ConfigScope, FsProjectDetector, ProjectDetector, ProjectInfo, YamlConfigManager};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerenaStatus {
    pub project_path: Option<PathBuf>,
    pub serena_installed: bool,
    pub serena_enabled: bool,
    pub python_version: Option<String>,
    pub compatible: Option<bool>,
    pub project: Option<ProjectInfo>,
    pub checked_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallAttempt {
    pub method: String,
    pub command: String,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnableReport {
    pub project_path: PathBuf,
    pub already_installed: bool,
    pub forced: bool,
    pub installed_with: Option<String>,
    pub attempts: Vec<InstallAttempt>,
    pub warnings: Vec<String>,
    pub config_path: PathBuf,
}

/// 协调平台探测、兼容性判断和安装执行
pub struct SerenaManager {
    settings: Settings,
    resolver: CompatibilityResolver,
    probe: Arc<dyn PlatformProbe>,
    executor: Arc<dyn Executor>,
    detector: Arc<dyn ProjectDetector>,
    config: Arc<dyn ConfigManager>,
    snapshot: OnceCell<PlatformSnapshot>,
}

impl SerenaManager {
    pub fn new(
        settings: Settings,
        probe: Arc<dyn PlatformProbe>,
        executor: Arc<dyn Executor>,
        detector: Arc<dyn ProjectDetector>,
        config: Arc<dyn ConfigManager>,
    ) -> Self {
        Self {
            resolver: CompatibilityResolver::from_settings(&settings),
            settings,
            probe,
            executor,
            detector,
            config,
            snapshot: OnceCell::new(),
        }
    }

    /// 使用真实的解释器探测、进程执行和文件系统实现
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let probe = Arc::new(InterpreterProbe::new(settings.python_candidates.clone()));
        let config = Arc::new(YamlConfigManager::new()?);

        Ok(Self::new(
            settings,
            probe,
            Arc::new(InstallationExecutor::new()),
            Arc::new(FsProjectDetector::new()),
            config,
        ))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn resolver(&self) -> &CompatibilityResolver {
        &self.resolver
    }

    pub fn detector(&self) -> &dyn ProjectDetector {
        self.detector.as_ref()
    }

    pub fn config_manager(&self) -> &dyn ConfigManager {
        self.config.as_ref()
    }

    /// 平台快照，每个进程只捕获一次
    pub async fn snapshot(&self) -> Result<&PlatformSnapshot> {
        self.snapshot.get_or_try_init(|| self.probe.capture()).await
    }

    pub async fn installation_guide(&self) -> Result<CompatibilityGuide> {
        let snapshot = self.snapshot().await?;
        Ok(self.resolver.resolve(snapshot))
    }

    /// PATH 上可用，或者项目的 `.serena-venv` 里已有 serena 可执行文件
    pub async fn is_installed(&self, project: Option<&Path>) -> bool {
        if let Some(entry) = project.map(venv_entry_point).filter(|p| p.is_file()) {
            debug!("✅ 项目虚拟环境中已安装: {}", entry.display());
            return true;
        }

        let check = InstallationMethod::new("check", "Verify that Serena is on PATH", self.settings.check_command.clone());
        self.executor
            .execute(&check, project, self.settings.check_timeout())
            .await
            .succeeded
    }

    /// 显式路径必须存在；未指定时从当前目录检测
    pub fn resolve_project(&self, project: Option<&Path>) -> Result<PathBuf> {
        match project {
            Some(path) if path.is_dir() => Ok(path.to_path_buf()),
            Some(path) => Err(anyhow::Error::from(SerenaError::ProjectNotFound(format!(
                "{} does not exist",
                path.display()
            )))),
            None => self.detector.detect_current_project().ok_or_else(|| {
                anyhow::Error::from(SerenaError::ProjectNotFound(
                    "no project detected in the current directory".to_string(),
                ))
            }),
        }
    }

    fn project_config_enabled(&self, project: &Path) -> bool {
        match self.config.get_config(ConfigScope::Project, Some(project)) {
            Ok(Some(config)) => config
                .pointer("/serena/enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            Ok(None) => false,
            Err(e) => {
                warn!("⚠️ 读取项目配置失败: {}", e);
                false
            }
        }
    }

    pub async fn status(&self, project: Option<&Path>) -> Result<SerenaStatus> {
        let project_path = match project {
            Some(path) => Some(path.to_path_buf()),
            None => self.detector.detect_current_project(),
        };

        let project_info = match &project_path {
            Some(path) => self.detector.get_project_info(path)?,
            None => None,
        };

        let serena_enabled = match &project_path {
            Some(path) => {
                project_info.as_ref().map(|p| p.has_serena).unwrap_or(false) || self.project_config_enabled(path)
            }
            None => false,
        };

        let (python_version, compatible) = match self.snapshot().await {
            Ok(snapshot) => (
                Some(snapshot.python_version.to_string()),
                Some(self.resolver.is_compatible(snapshot)),
            ),
            Err(e) => {
                warn!("⚠️ 无法获取 Python 信息: {:#}", e);
                (None, None)
            }
        };

        let serena_installed = self.is_installed(project_path.as_deref()).await;

        Ok(SerenaStatus {
            project_path,
            serena_installed,
            serena_enabled,
            python_version,
            compatible,
            project: project_info,
            checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }

    /// 为项目启用 Serena：必要时安装，然后写入项目配置
    pub async fn enable(&self, project: Option<&Path>, force: bool) -> Result<EnableReport> {
        let project_path = self.resolve_project(project)?;
        info!("🚀 为项目启用 Serena: {}", project_path.display());

        let guide = self.installation_guide().await?;
        if !guide.compatible {
            let incompatible = SerenaError::EnvironmentIncompatible {
                found: guide.python_version.clone(),
                recommended: guide.recommended_version.clone(),
            };
            warn!("⚠️ {}，继续尝试安装", incompatible);
        }

        let already_installed = !force && self.is_installed(Some(&project_path)).await;
        let mut attempts = Vec::new();
        let mut installed_with = None;

        if already_installed {
            info!("✅ Serena 已安装，跳过安装步骤（使用 --force 重新安装）");
        } else {
            for method in &guide.installation_methods {
                let outcome = self
                    .executor
                    .execute(method, Some(&project_path), self.settings.install_timeout())
                    .await;
                let succeeded = outcome.succeeded;
                attempts.push(InstallAttempt {
                    method: method.method.clone(),
                    command: method.command.clone(),
                    outcome,
                });

                if succeeded {
                    installed_with = Some(method.method.clone());
                    break;
                }
                warn!("⚠️ 安装方法 {} 失败，尝试下一个", method.method);
            }

            if installed_with.is_none() {
                return Err(SerenaError::InstallationFailed(failure_summary(&attempts, &guide)).into());
            }
        }

        let mut config = self
            .config
            .get_config(ConfigScope::Project, Some(&project_path))?
            .unwrap_or_else(|| default_config(ConfigScope::Project));

        let mut updates = json!({
            "serena.enabled": true,
            "serena.enabled_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        if let (Some(method), Some(obj)) = (&installed_with, updates.as_object_mut()) {
            obj.insert("serena.installed_with".to_string(), json!(method));
        }
        if let Some(obj) = updates.as_object() {
            apply_updates(&mut config, obj);
        }

        let config_path = self
            .config
            .save_config(ConfigScope::Project, Some(&project_path), &config)?;
        info!("🎉 Serena 已在项目中启用: {}", project_path.display());

        Ok(EnableReport {
            project_path,
            already_installed,
            forced: force,
            installed_with,
            attempts,
            warnings: guide.warnings,
            config_path,
        })
    }
}

/// venv 方法安装出的 serena 入口
fn venv_entry_point(project: &Path) -> PathBuf {
    let venv = project.join(VENV_DIR);
    if cfg!(target_os = "windows") {
        venv.join("Scripts").join("serena.exe")
    } else {
        venv.join("bin").join("serena")
    }
}

fn failure_summary(attempts: &[InstallAttempt], guide: &CompatibilityGuide) -> String {
    let mut lines = Vec::new();
    for attempt in attempts {
        let reason = if attempt.outcome.timed_out {
            "timed out".to_string()
        } else {
            match attempt.outcome.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "could not be started".to_string(),
            }
        };
        let tail = attempt.outcome.stderr_tail(3);
        if tail.is_empty() {
            lines.push(format!("[{}] {}", attempt.method, reason));
        } else {
            lines.push(format!("[{}] {}: {}", attempt.method, reason, tail));
        }
    }

    lines.push("retry with --force, or install manually with one of:".to_string());
    for method in &guide.installation_methods {
        lines.push(format!("  {}", method.command));
    }
    for warning in &guide.warnings {
        lines.push(format!("note: {}", warning));
    }
    lines.join("\n")
}
