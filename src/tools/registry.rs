use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::base::MCPTool;
use super::{EditConfigTool, SerenaEnableTool, SerenaInfoTool, SerenaStatusTool};
use crate::installer::SerenaManager;

/// 工具描述，`tools/list` 和 `mcp-tools` 的输出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// 只读的工具表，保持注册顺序
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn MCPTool>>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn MCPTool>> {
        self.tools.iter().find(|tool| tool.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.parameters_schema().to_json_schema(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[derive(Default)]
pub struct ToolRegistryBuilder {
    tools: Vec<Arc<dyn MCPTool>>,
}

impl ToolRegistryBuilder {
    pub fn register<T: MCPTool + 'static>(self, tool: T) -> Self {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(mut self, tool: Arc<dyn MCPTool>) -> Self {
        debug!("注册工具: {}", tool.name());
        self.tools.push(tool);
        self
    }

    /// 工具名必须唯一
    pub fn build(self) -> Result<ToolRegistry> {
        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name().to_string()) {
                return Err(anyhow!("duplicate tool name: {}", tool.name()));
            }
        }
        Ok(ToolRegistry { tools: self.tools })
    }
}

/// 标准工具集：serena_status、edit_config、serena_enable、serena_info
pub fn serena_registry(manager: Arc<SerenaManager>) -> Result<ToolRegistry> {
    ToolRegistry::builder()
        .register(SerenaStatusTool::new(Arc::clone(&manager)))
        .register(EditConfigTool::new(Arc::clone(&manager)))
        .register(SerenaEnableTool::new(Arc::clone(&manager)))
        .register(SerenaInfoTool::new(manager))
        .build()
}
