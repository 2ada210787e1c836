use thiserror::Error;

pub type Result<T> = anyhow::Result<T>;

#[derive(Error, Debug)]
pub enum SerenaError {
    #[error("python {found} may not be compatible with Serena (recommended: {recommended})")]
    EnvironmentIncompatible { found: String, recommended: String },

    #[error("MCP transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing argument: {0}")]
    MissingArgument(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("installation failed: {0}")]
    InstallationFailed(String),

    #[error("python interpreter not found: {0}")]
    InterpreterNotFound(String),

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerenaError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SerenaError::EnvironmentIncompatible { .. } => "ENVIRONMENT_INCOMPATIBLE",
            SerenaError::TransportUnavailable(_) => "TRANSPORT_UNAVAILABLE",
            SerenaError::UnknownTool(_) => "UNKNOWN_TOOL",
            SerenaError::MissingArgument(_) => "MISSING_ARGUMENT",
            SerenaError::InvalidArgument(_) => "INVALID_ARGUMENT",
            SerenaError::InstallationFailed(_) => "INSTALLATION_FAILED",
            SerenaError::InterpreterNotFound(_) => "INTERPRETER_NOT_FOUND",
            SerenaError::ProjectNotFound(_) => "PROJECT_NOT_FOUND",
            SerenaError::Config(_) => "CONFIG_ERROR",
            SerenaError::Io(_) => "IO_ERROR",
            SerenaError::Yaml(_) => "YAML_ERROR",
            SerenaError::Json(_) => "JSON_ERROR",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            SerenaError::EnvironmentIncompatible { .. } => {
                "请使用 Python 3.11 或 3.12，或使用 `uv tool install --python 3.11` 安装"
            }
            SerenaError::TransportUnavailable(_) => "MCP 不可用，请直接使用 CLI 命令: serena-cli enable / status / config",
            SerenaError::UnknownTool(_) => "运行 `serena-cli mcp-tools` 查看可用工具",
            SerenaError::MissingArgument(_) | SerenaError::InvalidArgument(_) => {
                "请检查参数格式并确保所有必需参数都已提供"
            }
            SerenaError::InstallationFailed(_) => "检查网络连接后使用 --force 重试，或手动执行安装命令",
            SerenaError::InterpreterNotFound(_) => "请安装 Python 3.11 或 3.12，或设置 SERENA_CLI_PYTHON",
            SerenaError::ProjectNotFound(_) => "请在项目目录中运行，或通过 --project 指定路径",
            SerenaError::Config(_) | SerenaError::Yaml(_) => "请检查配置文件格式是否为合法的 YAML",
            SerenaError::Io(_) | SerenaError::Json(_) => "请稍后重试，如果问题持续存在请查看日志",
        }
    }

    /// 调用方是否可以通过重试或 --force 恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SerenaError::EnvironmentIncompatible { .. }
                | SerenaError::TransportUnavailable(_)
                | SerenaError::InstallationFailed(_)
                | SerenaError::Io(_)
        )
    }
}
