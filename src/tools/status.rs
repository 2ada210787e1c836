use std::path::Path;
use std::sync::{Arc, OnceLock};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::base::{optional_str, MCPTool, Schema, SchemaObject, SchemaString};
use crate::installer::SerenaManager;

pub struct SerenaStatusTool {
    manager: Arc<SerenaManager>,
}

impl SerenaStatusTool {
    pub fn new(manager: Arc<SerenaManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl MCPTool for SerenaStatusTool {
    fn name(&self) -> &str {
        "serena_status"
    }

    fn description(&self) -> &str {
        "Report whether Serena is installed and enabled for a project, with Python compatibility"
    }

    fn parameters_schema(&self) -> &Schema {
        static SCHEMA: OnceLock<Schema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            Schema::Object(SchemaObject::new("Serena status parameters").property(
                "project_path",
                SchemaString::described("Project directory; defaults to the detected current project"),
            ))
        })
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        let project = optional_str(&params, "project_path").map(Path::new);
        let status = self.manager.status(project).await?;
        Ok(serde_json::to_value(status)?)
    }
}
