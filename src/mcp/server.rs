use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::error_codes;
use super::gateway::ToolDispatchGateway;
use super::{InitializeResult, Request, Response, ServerInfo, MCP_VERSION};
use crate::config::{Settings, ENV_DISABLE_MCP};
use crate::errors::SerenaError;

/// stdio 传输可用性检测
pub struct StdioTransport;

impl StdioTransport {
    /// stdin 是终端或者通过环境变量禁用时，传输不可用
    pub fn probe(settings: &Settings) -> std::result::Result<(), SerenaError> {
        if settings.mcp_disabled {
            return Err(SerenaError::TransportUnavailable(format!("disabled by {}", ENV_DISABLE_MCP)));
        }
        if std::io::stdin().is_terminal() {
            return Err(SerenaError::TransportUnavailable(
                "stdin is a terminal, no MCP client attached".to_string(),
            ));
        }
        Ok(())
    }
}

/// MCP stdio 服务器
pub struct Server {
    /// 服务器名称
    name: String,
    /// 服务器版本
    version: String,
    /// 是否已初始化
    initialized: bool,
    gateway: Arc<ToolDispatchGateway>,
}

enum Flow {
    Continue,
    Shutdown,
}

impl Server {
    pub fn new(name: impl Into<String>, version: impl Into<String>, gateway: Arc<ToolDispatchGateway>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            initialized: false,
            gateway,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 在进程的 stdin/stdout 上运行
    pub async fn run(&mut self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.run_with(reader, writer).await
    }

    /// 逐行读取请求直到 EOF、读取错误或 `shutdown`，结束后网关进入 Stopped
    pub async fn run_with<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.gateway.begin_serving()?;
        info!("🔧 MCP服务器已启动，等待请求...");

        let outcome = self.serve_lines(&mut reader, &mut writer).await;

        self.gateway.stop();
        info!("👋 MCP服务器关闭");
        outcome
    }

    async fn serve_lines<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("📡 客户端断开连接");
                    return Ok(());
                }
                Ok(n) => debug!("📥 收到 {} 字节: {}", n, line.trim()),
                Err(e) => {
                    warn!("❌ 读取stdin错误: {}", e);
                    return Ok(());
                }
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request = match Self::parse_request(trimmed) {
                Ok(request) => request,
                Err(response) => {
                    Self::write_response(writer, &response).await?;
                    continue;
                }
            };

            let (response, flow) = self.handle_request(request).await;
            if let Some(response) = response {
                Self::write_response(writer, &response).await?;
            }
            if let Flow::Shutdown = flow {
                return Ok(());
            }
        }
    }

    /// 非 JSON 返回 -32700；合法 JSON 但不是请求返回 -32600，并尽量带回 id
    fn parse_request(line: &str) -> std::result::Result<Request, Response> {
        let value: Value = serde_json::from_str(line).map_err(|e| {
            warn!("❌ 请求解析失败: {}", e);
            Response::error(Value::Null, error_codes::PARSE_ERROR, format!("Parse error: {}", e))
        })?;

        let id = value.get("id").cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| {
            warn!("❌ 无效请求: {}", e);
            Response::error(id, error_codes::INVALID_REQUEST, format!("Invalid request: {}", e))
        })
    }

    async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
        let response_json = serde_json::to_string(response)?;
        debug!("📤 发送响应: {}", response_json);
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn handle_request(&mut self, request: Request) -> (Option<Response>, Flow) {
        let Some(id) = request.id.clone() else {
            if request.method == "notifications/initialized" {
                debug!("客户端已完成初始化");
            } else {
                debug!("忽略通知: {}", request.method);
            }
            return (None, Flow::Continue);
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, &request.params),
            "ping" => Response::success(id, json!({})),
            _ if !self.initialized => Response::error(
                id,
                error_codes::SERVER_NOT_INITIALIZED,
                "Server not initialized".to_string(),
            ),
            "shutdown" => {
                self.initialized = false;
                return (Some(Response::success(id, Value::Null)), Flow::Shutdown);
            }
            "tools/list" => self.handle_list_tools(id),
            "tools/call" => self.handle_tool_call(id, &request.params).await,
            other => Response::error(id, error_codes::METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };

        (Some(response), Flow::Continue)
    }

    fn handle_initialize(&mut self, id: Value, params: &Value) -> Response {
        if let Some(client) = params.get("clientInfo") {
            let client_name = client.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
            let client_version = client.get("version").and_then(|v| v.as_str()).unwrap_or("");
            info!("🤝 客户端连接: {} {}", client_name, client_version);
        }

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: json!({ "tools": {} }),
            server_info: ServerInfo {
                name: self.name.clone(),
                version: self.version.clone(),
            },
        };

        match serde_json::to_value(result) {
            Ok(value) => {
                self.initialized = true;
                Response::success(id, value)
            }
            Err(e) => Response::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        }
    }

    fn handle_list_tools(&self, id: Value) -> Response {
        let tools = self.gateway.tools_info();
        match serde_json::to_value(tools) {
            Ok(tools) => Response::success(id, json!({ "tools": tools })),
            Err(e) => Response::error(id, error_codes::INTERNAL_ERROR, format!("获取工具列表失败: {}", e)),
        }
    }

    async fn handle_tool_call(&self, id: Value, params: &Value) -> Response {
        let Some(tool_name) = params.get("name").and_then(Value::as_str) else {
            return Response::error(id, error_codes::INVALID_PARAMS, "Missing tool name".to_string());
        };
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let result = self.gateway.dispatch(tool_name, arguments).await;
        let text = match serde_json::to_string_pretty(&result) {
            Ok(text) => text,
            Err(e) => return Response::error(id, error_codes::INTERNAL_ERROR, e.to_string()),
        };

        Response::success(
            id,
            json!({
                "content": [{ "type": "text", "text": text }],
                "isError": !result.is_success(),
            }),
        )
    }
}
