use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::base::{optional_str, MCPTool, Schema, SchemaObject, SchemaString};
use crate::installer::SerenaManager;

/// 平台、兼容性和项目信息汇总
pub struct SerenaInfoTool {
    manager: Arc<SerenaManager>,
}

impl SerenaInfoTool {
    pub fn new(manager: Arc<SerenaManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MCPTool for SerenaInfoTool {
    fn name(&self) -> &str {
        "serena_info"
    }

    fn description(&self) -> &str {
        "Describe the platform, Python compatibility, installation methods and the current project"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::Object(SchemaObject::new("Serena info parameters").property(
                "project_path",
                SchemaString::described("Project directory; defaults to the detected current project"),
            ))
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let project_path = match optional_str(&params, "project_path") {
            Some(path) => Some(Path::new(path).to_path_buf()),
            None => self.manager.detector().detect_current_project(),
        };
        let project = match &project_path {
            Some(path) => self.manager.detector().get_project_info(path)?,
            None => None,
        };

        let mut payload = json!({
            "project_path": project_path,
            "project": project,
            "platform": Value::Null,
            "compatibility": Value::Null,
        });

        match self.manager.snapshot().await {
            Ok(snapshot) => {
                payload["platform"] = serde_json::to_value(snapshot)?;
                payload["compatibility"] = serde_json::to_value(self.manager.resolver().resolve(snapshot))?;
            }
            Err(e) => {
                warn!("⚠️ 平台探测失败: {:#}", e);
                payload["platform_error"] = json!(format!("{:#}", e));
            }
        }

        Ok(payload)
    }
}
