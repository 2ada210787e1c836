pub mod base;
pub mod config;
pub mod enable;
pub mod info;
pub mod registry;
pub mod status;

pub use base::{MCPTool, Schema, SchemaBoolean, SchemaInteger, SchemaObject, SchemaString};
pub use config::EditConfigTool;
pub use enable::SerenaEnableTool;
pub use info::SerenaInfoTool;
pub use registry::{serena_registry, ToolDescriptor, ToolRegistry, ToolRegistryBuilder};
pub use status::SerenaStatusTool;
