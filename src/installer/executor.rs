use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

use crate::environment::InstallationMethod;

/// 单次命令执行的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    /// 进程未正常退出（超时、无法启动、被信号终止）时为空
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    fn launch_failure(message: String, started: Instant) -> Self {
        Self {
            succeeded: false,
            stderr: message,
            duration_ms: started.elapsed().as_millis() as u64,
            ..Default::default()
        }
    }

    /// stderr 的最后几行，用于错误摘要
    pub fn stderr_tail(&self, lines: usize) -> String {
        let collected: Vec<&str> = self.stderr.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = collected.len().saturating_sub(lines);
        collected[start..].join("\n")
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// `working_dir` 为空时沿用当前进程的工作目录
    async fn execute(&self, method: &InstallationMethod, working_dir: Option<&Path>, timeout: Duration)
        -> ExecutionOutcome;
}

/// 通过系统 shell 执行安装命令
#[derive(Debug, Clone, Default)]
pub struct InstallationExecutor;

impl InstallationExecutor {
    pub fn new() -> Self {
        Self
    }

    fn shell_command(command: &str) -> AsyncCommand {
        if cfg!(target_os = "windows") {
            let mut cmd = AsyncCommand::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = AsyncCommand::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

async fn read_stream<R: AsyncRead + Unpin>(stream: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!("读取子进程输出失败: {}", e);
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// 结束 shell 及其派生的全部进程
#[cfg(unix)]
async fn terminate_tree(pid: u32) {
    // shell 以 process_group(0) 启动，进程组 id 等于它的 pid
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        debug!("killpg({}) 失败: {}", pid, std::io::Error::last_os_error());
    }
}

#[cfg(windows)]
async fn terminate_tree(pid: u32) {
    let result = AsyncCommand::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        debug!("taskkill {} 失败: {}", pid, e);
    }
}

#[async_trait]
impl Executor for InstallationExecutor {
    async fn execute(
        &self,
        method: &InstallationMethod,
        working_dir: Option<&Path>,
        timeout: Duration,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let command = method.command.trim();

        if command.is_empty() || command.starts_with('#') {
            return ExecutionOutcome::launch_failure(
                format!("method {} has no runnable command", method.method),
                started,
            );
        }

        info!("🔧 执行安装方法 [{}]: {}", method.method, command);

        let mut cmd = Self::shell_command(command);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            debug!("📁 工作目录: {}", dir.display());
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("❌ 无法启动安装命令: {}", e);
                return ExecutionOutcome::launch_failure(format!("failed to launch `{}`: {}", command, e), started);
            }
        };

        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let collect = async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), read_stream(stdout), read_stream(stderr));
            status.map(|status| (status, stdout, stderr))
        };

        let waited = tokio::time::timeout(timeout, collect).await;
        match waited {
            Ok(Ok((status, stdout, stderr))) => {
                let outcome = ExecutionOutcome {
                    succeeded: status.success(),
                    stdout,
                    stderr,
                    exit_code: status.code(),
                    timed_out: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                };

                if outcome.succeeded {
                    info!("✅ [{}] 完成，耗时 {}ms", method.method, outcome.duration_ms);
                } else {
                    warn!("❌ [{}] 退出码 {:?}", method.method, outcome.exit_code);
                    debug!("stderr: {}", outcome.stderr);
                }
                outcome
            }
            Ok(Err(e)) => {
                error!("❌ 等待安装进程失败: {}", e);
                ExecutionOutcome::launch_failure(format!("failed to wait for `{}`: {}", command, e), started)
            }
            Err(_) => {
                if let Some(pid) = pid {
                    terminate_tree(pid).await;
                }
                if let Err(e) = child.kill().await {
                    debug!("结束安装进程失败: {}", e);
                }
                warn!("⏰ [{}] 超过 {:?} 未完成，已终止", method.method, timeout);
                ExecutionOutcome {
                    succeeded: false,
                    stderr: format!("timed out after {}s", timeout.as_secs_f64()),
                    timed_out: true,
                    duration_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                }
            }
        }
    }
}
