use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use serena_cli::config::Settings;
use serena_cli::environment::CompatibilityGuide;
use serena_cli::installer::SerenaManager;
use serena_cli::mcp::{Server, StdioTransport, ToolDispatchGateway, ToolResult};
use serena_cli::project::ConfigScope;
use serena_cli::tools::serena_registry;
use serena_cli::SerenaError;

/// Serena 环境检查与安装工具
#[derive(Parser)]
#[command(name = "serena-cli")]
#[command(about = "检查 Python 环境兼容性，安装并启用 Serena，同时提供 MCP 工具服务")]
#[command(version)]
struct Cli {
    /// 启用详细日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 以 JSON 格式输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 检查 Python 环境是否兼容 Serena
    CheckEnv,
    /// 显示平台、兼容性和项目信息
    Info {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// 显示 Serena 安装和启用状态
    Status {
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// 查看或修改配置
    Config {
        /// 配置类型: global 或 project
        #[arg(short = 't', long = "type", default_value = "project")]
        config_type: String,
        #[arg(short, long)]
        project: Option<PathBuf>,
        /// 设置配置项，格式 key=value，可多次指定
        #[arg(short, long = "set", action = clap::ArgAction::Append)]
        set: Vec<String>,
    },
    /// 在项目中安装并启用 Serena
    Enable {
        /// 即使已安装也重新安装
        #[arg(short, long)]
        force: bool,
        #[arg(short, long)]
        project: Option<PathBuf>,
    },
    /// 列出可用的 MCP 工具
    McpTools,
    /// 启动 MCP stdio 服务器
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { ExitCode::FAILURE } else { ExitCode::SUCCESS };
            // clap 自己负责格式化帮助和错误信息
            let _ = e.print();
            return code;
        }
    };

    // 加载环境变量
    dotenv::dotenv().ok();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            if let Some(serena_error) = e.downcast_ref::<SerenaError>() {
                eprintln!("💡 {}", serena_error.suggestion());
            }
            ExitCode::FAILURE
        }
    }
}

/// 日志输出到 stderr，保证 stdout 只承载 MCP 协议和命令结果
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "serena_cli=debug" } else { "serena_cli=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::from_env();
    debug!("运行设置: {:?}", settings);

    let transport = StdioTransport::probe(&settings);
    let manager = Arc::new(SerenaManager::from_settings(settings)?);
    let gateway = Arc::new(ToolDispatchGateway::with_registry(
        serena_registry(Arc::clone(&manager))?,
        transport.is_ok(),
    )?);

    match cli.command {
        Commands::CheckEnv => check_env(&manager, cli.json).await,
        Commands::Info { project } => {
            let result = gateway.dispatch("serena_info", project_args(project)).await;
            Ok(report(&result, cli.json, print_info))
        }
        Commands::Status { project } => {
            let result = gateway.dispatch("serena_status", project_args(project)).await;
            Ok(report(&result, cli.json, print_status))
        }
        Commands::Config {
            config_type,
            project,
            set,
        } => {
            let scope: ConfigScope = config_type.parse()?;
            let mut args = project_args(project);
            args["config_type"] = json!(scope.to_string());
            if !set.is_empty() {
                args["updates"] = Value::Object(parse_assignments(&set)?);
            }
            let result = gateway.dispatch("edit_config", args).await;
            Ok(report(&result, cli.json, print_config))
        }
        Commands::Enable { force, project } => {
            let mut args = project_args(project);
            args["force"] = json!(force);
            let result = gateway.dispatch("serena_enable", args).await;
            Ok(report(&result, cli.json, print_enable))
        }
        Commands::McpTools => {
            let tools = gateway.tools_info();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&tools)?);
            } else {
                println!("🛠️ 可用的 MCP 工具 ({} 个):", tools.len());
                for tool in &tools {
                    println!("  • {} - {}", tool.name, tool.description);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve => match transport {
            Ok(()) => {
                info!("🚀 启动 Serena MCP 服务器...");
                let mut server = Server::new("serena-cli", env!("CARGO_PKG_VERSION"), Arc::clone(&gateway));
                server.run().await?;
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                warn!("⚠️ {}", e);
                println!("⚠️ {}", e);
                println!("💡 {}", e.suggestion());
                print_cli_commands();
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

async fn check_env(manager: &SerenaManager, as_json: bool) -> Result<ExitCode> {
    let guide = manager.installation_guide().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&guide)?);
    } else {
        print_guide(&guide);
    }

    if guide.compatible {
        Ok(ExitCode::SUCCESS)
    } else {
        let err = SerenaError::EnvironmentIncompatible {
            found: guide.python_version.clone(),
            recommended: guide.recommended_version.clone(),
        };
        eprintln!("❌ {}", err);
        Ok(ExitCode::FAILURE)
    }
}

fn project_args(project: Option<PathBuf>) -> Value {
    let mut args = json!({});
    if let Some(project) = project {
        args["project_path"] = json!(project);
    }
    args
}

/// `key=value`，值按 YAML 标量解析，解析失败时保留原字符串
fn parse_assignments(assignments: &[String]) -> Result<Map<String, Value>> {
    let mut updates = Map::new();
    for assignment in assignments {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!(SerenaError::InvalidArgument(format!("expected key=value, got {:?}", assignment))))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(anyhow!(SerenaError::InvalidArgument(format!("empty key in {:?}", assignment))));
        }
        let value = serde_yaml::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        updates.insert(key.to_string(), value);
    }
    Ok(updates)
}

fn report(result: &ToolResult, as_json: bool, render: fn(&Value)) -> ExitCode {
    if as_json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("❌ {}", e),
        }
    } else if result.is_success() {
        render(&result.payload);
    } else {
        eprintln!("❌ {}", result.error.as_deref().unwrap_or("unknown error"));
    }

    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn flag(value: &Value) -> &'static str {
    match value.as_bool() {
        Some(true) => "✅",
        Some(false) => "❌",
        None => "❓",
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_guide(guide: &CompatibilityGuide) {
    println!("🐍 Python 版本: {}", guide.python_version);
    println!("📌 推荐版本: {}", guide.recommended_version);
    println!("💻 当前平台: {}", guide.current_platform);
    println!("{} 兼容性: {}", if guide.compatible { "✅" } else { "❌" }, if guide.compatible { "兼容" } else { "不兼容" });
    println!();
    println!("📦 安装方式:");
    for (index, method) in guide.installation_methods.iter().enumerate() {
        println!("  {}. [{}] {}", index + 1, method.method, method.description);
        println!("     {}", method.command);
    }
    for warning in &guide.warnings {
        println!("⚠️ {}", warning);
    }
}

fn print_status(payload: &Value) {
    println!("📁 项目: {}", text(&payload["project_path"]));
    println!("{} Serena 已安装", flag(&payload["serena_installed"]));
    println!("{} Serena 已启用", flag(&payload["serena_enabled"]));
    println!("🐍 Python: {} {}", text(&payload["python_version"]), flag(&payload["compatible"]));
    if let Some(name) = payload["project"]["name"].as_str() {
        println!("🏷️ 项目名称: {} ({})", name, text(&payload["project"]["type"]));
    }
    println!("🕐 检查时间: {}", text(&payload["checked_at"]));
}

fn print_info(payload: &Value) {
    println!("📁 项目: {}", text(&payload["project_path"]));
    let project = &payload["project"];
    if project.is_object() {
        println!("🏷️ 名称: {}", text(&project["name"]));
        println!("📂 类型: {}", text(&project["type"]));
        if let Some(languages) = project["languages"].as_array() {
            let languages: Vec<String> = languages.iter().map(text).collect();
            println!("🔤 语言: {}", languages.join(", "));
        }
        println!("📊 文件数: {}  大小: {} MB", text(&project["size"]["total_files"]), text(&project["size"]["total_size_mb"]));
    }

    match serde_json::from_value::<CompatibilityGuide>(payload["compatibility"].clone()) {
        Ok(guide) => {
            println!();
            print_guide(&guide);
        }
        Err(_) => println!("⚠️ 平台信息不可用: {}", text(&payload["platform_error"])),
    }
}

fn print_config(payload: &Value) {
    let created = if payload["created"].as_bool() == Some(true) {
        " (新建)"
    } else if payload["exists"].as_bool() == Some(false) {
        " (默认值，未保存)"
    } else {
        ""
    };
    println!("⚙️ {} 配置: {}{}", text(&payload["config_type"]), text(&payload["path"]), created);
    match serde_yaml::to_string(&payload["config"]) {
        Ok(yaml) => print!("{}", yaml),
        Err(_) => println!("{}", payload["config"]),
    }
}

fn print_enable(payload: &Value) {
    println!("📁 项目: {}", text(&payload["project_path"]));
    if payload["already_installed"].as_bool() == Some(true) && payload["installed_with"].is_null() {
        println!("✅ Serena 已安装，无需重新安装 (使用 --force 强制重装)");
    }
    if let Some(attempts) = payload["attempts"].as_array() {
        for attempt in attempts {
            println!("  {} [{}] {}", flag(&attempt["outcome"]["succeeded"]), text(&attempt["method"]), text(&attempt["command"]));
        }
    }
    if let Some(method) = payload["installed_with"].as_str() {
        println!("🎉 已通过 {} 安装", method);
    }
    if let Some(warnings) = payload["warnings"].as_array() {
        for warning in warnings {
            println!("⚠️ {}", text(warning));
        }
    }
    println!("✅ Serena 已在项目中启用，配置: {}", text(&payload["config_path"]));
}

fn print_cli_commands() {
    println!();
    println!("📋 可用的 CLI 命令:");
    println!("  serena-cli check-env            检查 Python 环境兼容性");
    println!("  serena-cli info [--project P]   显示平台与项目信息");
    println!("  serena-cli status [--project P] 显示 Serena 状态");
    println!("  serena-cli config --type T      查看或修改配置");
    println!("  serena-cli enable [--force]     安装并启用 Serena");
    println!("  serena-cli mcp-tools            列出 MCP 工具");
}
