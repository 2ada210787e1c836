//! 工具调度网关
//!
//! CLI 和 MCP 传输层各自持有一个网关实例，调用同一个 `dispatch`。网关边界之下的任何错误或
//! panic 都会被转换成 `ToolResult::error`，不会终止调用方的进程或连接。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::errors::SerenaError;
use crate::tools::{ToolDescriptor, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// 统一的工具调用结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(payload: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            payload,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            payload: Value::Null,
            error: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GatewayState {
    Uninitialized,
    Ready,
    Serving,
    Stopped,
}

pub struct ToolDispatchGateway {
    registry: OnceLock<ToolRegistry>,
    state: Mutex<GatewayState>,
    transport_available: bool,
    /// 同一网关上的调用串行执行，避免并发安装
    dispatch_lock: AsyncMutex<()>,
}

impl ToolDispatchGateway {
    pub fn new(transport_available: bool) -> Self {
        Self {
            registry: OnceLock::new(),
            state: Mutex::new(GatewayState::Uninitialized),
            transport_available,
            dispatch_lock: AsyncMutex::new(()),
        }
    }

    pub fn with_registry(registry: ToolRegistry, transport_available: bool) -> Result<Self> {
        let gateway = Self::new(transport_available);
        gateway.initialize(registry)?;
        Ok(gateway)
    }

    /// Uninitialized → Ready
    pub fn initialize(&self, registry: ToolRegistry) -> Result<()> {
        let mut state = self.state.lock();
        if *state != GatewayState::Uninitialized {
            return Err(anyhow!("gateway already initialized (state: {:?})", *state));
        }

        let count = registry.len();
        self.registry
            .set(registry)
            .map_err(|_| anyhow!("gateway registry already set"))?;
        *state = GatewayState::Ready;
        info!("📋 网关就绪，已注册 {} 个工具", count);
        Ok(())
    }

    /// Ready → Serving
    pub fn begin_serving(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            GatewayState::Ready => {
                *state = GatewayState::Serving;
                Ok(())
            }
            GatewayState::Serving => Ok(()),
            other => Err(anyhow!("cannot start serving from state {:?}", other)),
        }
    }

    /// 任意状态 → Stopped，不可恢复
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state != GatewayState::Stopped {
            info!("🛑 网关停止 (之前状态: {:?})", *state);
            *state = GatewayState::Stopped;
        }
    }

    pub fn state(&self) -> GatewayState {
        *self.state.lock()
    }

    pub fn is_transport_available(&self) -> bool {
        self.transport_available
    }

    pub fn tools_info(&self) -> Vec<ToolDescriptor> {
        self.registry.get().map(ToolRegistry::descriptors).unwrap_or_default()
    }

    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let _guard = self.dispatch_lock.lock().await;

        let state = self.state();
        let registry = match (state, self.registry.get()) {
            (GatewayState::Ready | GatewayState::Serving, Some(registry)) => registry,
            _ => return ToolResult::error(format!("gateway is not accepting calls (state: {:?})", state)),
        };

        let Some(tool) = registry.get(name) else {
            warn!("❓ 未知工具: {}", name);
            return ToolResult::error(SerenaError::UnknownTool(name.to_string()).to_string());
        };

        let args = if args.is_null() { Value::Object(Map::new()) } else { args };
        if let Err(e) = tool.validate_params(&args) {
            warn!("⚠️ 工具 {} 参数无效: {}", name, e);
            return ToolResult::error(e.to_string());
        }

        debug!("🔄 执行工具 {} 参数: {}", name, args);
        match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(payload)) => {
                info!("✅ 工具 {} 执行成功", name);
                ToolResult::success(payload)
            }
            Ok(Err(e)) => {
                error!("❌ 工具 {} 执行失败: {:#}", name, e);
                ToolResult::error(format!("{:#}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("💥 工具 {} 内部错误: {}", name, message);
                ToolResult::error(format!("tool {} failed unexpectedly: {}", name, message))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
