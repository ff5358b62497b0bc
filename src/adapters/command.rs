use crate::utils::error::{DominanceError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// 外部指令：程式與固定參數
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// 由 `["python3", "script.py"]` 形式建立
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// 執行指令並回傳 stdout；非零結束碼或逾時皆視為錯誤
pub async fn run_command(spec: &CommandSpec, extra_args: &[String], timeout: Duration) -> Result<String> {
    let command_line = spec.display();
    tracing::debug!("Running command: {} ({} extra args)", command_line, extra_args.len());

    let child = Command::new(&spec.program)
        .args(&spec.args)
        .args(extra_args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| DominanceError::CommandError {
            command: command_line.clone(),
            message: format!("failed to spawn: {}", e),
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(DominanceError::CommandTimeout {
                command: command_line,
                seconds: timeout.as_secs(),
            })
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DominanceError::CommandError {
            command: command_line,
            message: format!("exited with {}: {}", output.status, stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
