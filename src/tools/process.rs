//! 外部进程执行器：argv 直接传参（不经 sh -c），带超时与结构化审计日志
//!
//! 超时后子进程随 Child 一起被杀掉（kill_on_drop）；非零退出码转为 ToolError::Failed，
//! stderr 只进日志与错误详情，不会出现在用户回复中。

use std::ffi::OsString;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::core::ToolError;

/// 进程输出
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// 一个外部程序（如 yt-dlp、python3）的调用方式
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
}

impl CommandRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// 以 argv 执行程序，超时返回 ToolError::Timeout
    pub async fn run<I, S>(&self, args: I, timeout: Duration) -> Result<ProcessOutput, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let result = tokio::time::timeout(timeout, cmd.output()).await;

        let outcome = match &result {
            Ok(Ok(out)) if out.status.success() => "ok",
            Ok(Ok(_)) => "error",
            Ok(Err(_)) => "spawn_error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": self.program,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&args),
        });
        tracing::info!(audit = %audit, "tool");

        let output = result
            .map_err(|_| ToolError::Timeout {
                tool: self.program.clone(),
                secs: timeout.as_secs(),
            })?
            .map_err(|e| ToolError::Spawn {
                tool: self.program.clone(),
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(ProcessOutput { stdout, stderr })
    }
}

fn args_preview(args: &[OsString]) -> String {
    let s = args
        .iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ");
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
