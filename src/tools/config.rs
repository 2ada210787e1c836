use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::base::{optional_str, MCPTool, Schema, SchemaObject, SchemaString};
use crate::installer::SerenaManager;
use crate::project::config_store::{apply_updates, default_config};
use crate::project::ConfigScope;

/// 读取或修改全局/项目配置；只读调用不写盘，配置不存在时返回默认值
pub struct EditConfigTool {
    manager: Arc<SerenaManager>,
}

impl EditConfigTool {
    pub fn new(manager: Arc<SerenaManager>) -> Self {
        Self { manager }
    }

    fn project_for(&self, scope: ConfigScope, params: &Value) -> Result<Option<PathBuf>> {
        match scope {
            ConfigScope::Global => Ok(None),
            ConfigScope::Project => {
                let explicit = optional_str(params, "project_path").map(Path::new);
                self.manager.resolve_project(explicit).map(Some)
            }
        }
    }
}

#[async_trait]
impl MCPTool for EditConfigTool {
    fn name(&self) -> &str {
        "edit_config"
    }

    fn description(&self) -> &str {
        "Show or update the global or project configuration"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::Object(
                SchemaObject::new("Configuration parameters")
                    .required_property(
                        "config_type",
                        SchemaString::one_of("Which configuration to edit", &["global", "project"]),
                    )
                    .property(
                        "project_path",
                        SchemaString::described("Project directory for project configuration"),
                    )
                    .property(
                        "updates",
                        Schema::Object(SchemaObject::new(
                            "Values to merge; dotted keys such as `serena.enabled` address nested entries",
                        )),
                    ),
            )
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let scope: ConfigScope = optional_str(&params, "config_type").unwrap_or("project").parse()?;
        let project = self.project_for(scope, &params)?;
        let store = self.manager.config_manager();

        let existing = store.get_config(scope, project.as_deref())?;
        let exists = existing.is_some();
        let mut config = existing.unwrap_or_else(|| default_config(scope));

        let updates = params.get("updates").and_then(Value::as_object);
        if let Some(updates) = updates {
            apply_updates(&mut config, updates);
        }

        let path = if updates.is_some() {
            store.save_config(scope, project.as_deref(), &config)?
        } else {
            store.config_path(scope, project.as_deref())?
        };
        let created = !exists && updates.is_some();
        info!("⚙️ {} 配置: {}", scope, path.display());

        Ok(json!({
            "config_type": scope,
            "path": path,
            "exists": exists || created,
            "created": created,
            "updated": updates.is_some(),
            "config": config,
        }))
    }
}
