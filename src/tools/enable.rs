use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::base::{optional_str, MCPTool, Schema, SchemaBoolean, SchemaObject, SchemaString};
use crate::installer::SerenaManager;

pub struct SerenaEnableTool {
    manager: Arc<SerenaManager>,
}

impl SerenaEnableTool {
    pub fn new(manager: Arc<SerenaManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MCPTool for SerenaEnableTool {
    fn name(&self) -> &str {
        "serena_enable"
    }

    fn description(&self) -> &str {
        "Install Serena if needed and enable it for a project"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::Object(
                SchemaObject::new("Serena enable parameters")
                    .property(
                        "project_path",
                        SchemaString::described("Project directory; defaults to the detected current project"),
                    )
                    .property(
                        "force",
                        SchemaBoolean::described("Reinstall even when Serena is already installed"),
                    ),
            )
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let project = optional_str(&params, "project_path").map(Path::new);
        let force = params.get("force").and_then(Value::as_bool).unwrap_or(false);

        let report = self.manager.enable(project, force).await?;
        Ok(serde_json::to_value(report)?)
    }
}
