use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::errors::SerenaError;

pub const GLOBAL_CONFIG_DIR: &str = ".serena-cli";
pub const GLOBAL_CONFIG_FILE: &str = "config.yml";
pub const PROJECT_CONFIG_DIR: &str = ".serena-cli";
pub const PROJECT_CONFIG_FILE: &str = "project.yml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigScope {
    Global,
    Project,
}

impl FromStr for ConfigScope {
    type Err = SerenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ConfigScope::Global),
            "project" => Ok(ConfigScope::Project),
            other => Err(SerenaError::InvalidArgument(format!(
                "config_type: expected `global` or `project`, got `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Global => write!(f, "global"),
            ConfigScope::Project => write!(f, "project"),
        }
    }
}

/// 配置存储
pub trait ConfigManager: Send + Sync {
    fn config_path(&self, scope: ConfigScope, project: Option<&Path>) -> Result<PathBuf>;

    /// 配置文件不存在时返回 `None`
    fn get_config(&self, scope: ConfigScope, project: Option<&Path>) -> Result<Option<Value>>;

    fn save_config(&self, scope: ConfigScope, project: Option<&Path>, config: &Value) -> Result<PathBuf>;
}

pub fn project_config_path(project: &Path) -> PathBuf {
    project.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE)
}

pub fn default_config(scope: ConfigScope) -> Value {
    match scope {
        ConfigScope::Global => json!({
            "serena": {
                "auto_install": true,
                "preferred_method": "uv",
            },
            "mcp": {
                "enabled": true,
            },
            "logging": {
                "level": "info",
            },
        }),
        ConfigScope::Project => json!({
            "serena": {
                "enabled": false,
                "context": "ide-assistant",
            },
        }),
    }
}

/// 合并更新：顶层键直接覆盖，`a.b.c` 形式的键写入嵌套对象
pub fn apply_updates(config: &mut Value, updates: &Map<String, Value>) {
    if !config.is_object() {
        *config = Value::Object(Map::new());
    }

    for (key, value) in updates {
        let mut target = &mut *config;
        let mut segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
        let Some(last) = segments.pop() else {
            continue;
        };

        for segment in segments {
            let Value::Object(obj) = target else {
                break;
            };
            let entry = obj.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            target = entry;
        }

        if let Value::Object(obj) = target {
            obj.insert(last.to_string(), value.clone());
        }
    }
}

/// YAML 文件配置存储
#[derive(Debug, Clone)]
pub struct YamlConfigManager {
    global_dir: PathBuf,
}

impl YamlConfigManager {
    /// 全局配置位于 `~/.serena-cli/config.yml`
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| SerenaError::Config("cannot determine home directory".to_string()))?;
        Ok(Self::with_global_dir(home.join(GLOBAL_CONFIG_DIR)))
    }

    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_dir: global_dir.into(),
        }
    }
}

impl ConfigManager for YamlConfigManager {
    fn config_path(&self, scope: ConfigScope, project: Option<&Path>) -> Result<PathBuf> {
        match scope {
            ConfigScope::Global => Ok(self.global_dir.join(GLOBAL_CONFIG_FILE)),
            ConfigScope::Project => {
                let project = project.ok_or_else(|| {
                    SerenaError::Config("project configuration requires a project path".to_string())
                })?;
                Ok(project_config_path(project))
            }
        }
    }

    fn get_config(&self, scope: ConfigScope, project: Option<&Path>) -> Result<Option<Value>> {
        let path = self.config_path(scope, project)?;
        if !path.is_file() {
            debug!("配置文件不存在: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(Some(Value::Object(Map::new())));
        }

        let value: Value = serde_yaml::from_str(&content)
            .map_err(|e| SerenaError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(value))
    }

    fn save_config(&self, scope: ConfigScope, project: Option<&Path>, config: &Value) -> Result<PathBuf> {
        let path = self.config_path(scope, project)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(config)?;
        fs::write(&path, content)?;
        info!("💾 已保存{}配置: {}", scope, path.display());
        Ok(path)
    }
}
