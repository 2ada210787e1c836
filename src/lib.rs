//! # Serena CLI
//!
//! 检查本机 Python 环境与 Serena 编码代理的兼容性，给出安装方案并执行安装，
//! 同一组工具既可以通过命令行调用，也可以通过 MCP (Model Context Protocol) stdio 服务暴露给 LLM 客户端。
//!
//! ## 特性
//!
//! - 🐍 **环境检查** - 探测操作系统、架构和 Python 版本，判断是否满足推荐版本
//! - 📦 **安装编排** - 按 uv、venv、pip 顺序尝试安装，带超时和失败回退
//! - ⚙️ **配置管理** - 全局和项目级 YAML 配置
//! - 🚀 **MCP协议** - 基于 stdio 的 JSON-RPC 工具服务
//!
//! ## 快速开始
//!
//! ```no_run
//! use std::sync::Arc;
//! use serena_cli::{config::Settings, installer::SerenaManager, mcp::ToolDispatchGateway, tools::serena_registry};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manager = Arc::new(SerenaManager::from_settings(Settings::from_env())?);
//! let gateway = ToolDispatchGateway::with_registry(serena_registry(manager)?, false)?;
//! let result = gateway.dispatch("serena_status", serena_cli::json!({})).await;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod environment;
pub mod errors;
pub mod installer;
pub mod mcp;
pub mod project;
pub mod tools;

pub use errors::{Result, SerenaError};

// Re-export commonly used types
pub use async_trait::async_trait;
pub use serde_json::{json, Value};
