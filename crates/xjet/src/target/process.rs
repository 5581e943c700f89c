//! A concrete [`Runner`] that spawns an external child process and
//! speaks the packet protocol over its stdio, length-prefixed
//! (`u32le` size + frame). This is the one production-ready `Runner`
//! the core ships with; it needs no embedded JS VM, only a
//! `RunnerConfig`-named executable that understands the wire format.

use super::{Emit, Runner};
use crate::config::RunnerConfig;
use crate::error::XjetError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};

pub struct ProcessRunner {
    config: RunnerConfig,
    command: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig, command: String, args: Vec<String>) -> Self {
        Self { config, command, args, child: Mutex::new(None), stdin: Mutex::new(None) }
    }
}

async fn read_frame(reader: &mut (impl tokio::io::AsyncRead + Unpin)) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    if reader.read_exact(&mut len_bytes).await.is_err() {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame(writer: &mut ChildStdin, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(&(bytes.len() as u32).to_le_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[async_trait]
impl Runner for ProcessRunner {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn configured_id(&self) -> Option<&str> {
        self.config.id.as_deref()
    }

    fn connection_timeout(&self) -> Duration {
        self.config.connection_timeout()
    }

    fn dispatch_timeout(&self) -> Duration {
        self.config.dispatch_timeout()
    }

    async fn connect(&self, emit: Emit, runner_id: &str, argv: &HashMap<String, String>) -> Result<(), XjetError> {
        let mut command = Command::new(&self.command);
        command.args(&self.args).arg("--runner-id").arg(runner_id);
        for (key, value) in argv {
            command.arg(format!("--{key}")).arg(value);
        }
        command.stdin(std::process::Stdio::piped()).stdout(std::process::Stdio::piped()).stderr(std::process::Stdio::inherit());

        let mut child = command.spawn().map_err(|e| XjetError::SandboxRuntime {
            path: self.command.clone().into(),
            source: Box::new(e),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            XjetError::Config(format!("runner `{}` did not expose a stdin handle", self.config.name))
        })?;
        let mut stdout = child.stdout.take().ok_or_else(|| {
            XjetError::Config(format!("runner `{}` did not expose a stdout handle", self.config.name))
        })?;

        tokio::spawn(async move {
            while let Ok(Some(frame)) = read_frame(&mut stdout).await {
                if emit.send(frame).is_err() {
                    break;
                }
            }
        });

        *self.child.lock().unwrap() = Some(child);
        *self.stdin.lock().unwrap() = Some(stdin);
        Ok(())
    }

    async fn dispatch(&self, bytes: Vec<u8>, _suite_id: &str) -> Result<(), XjetError> {
        let mut guard = self.stdin.lock().unwrap().take().ok_or_else(|| {
            XjetError::Config(format!("runner `{}` is not connected", self.config.name))
        })?;
        write_frame(&mut guard, &bytes).await.map_err(XjetError::Io)?;
        *self.stdin.lock().unwrap() = Some(guard);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), XjetError> {
        self.stdin.lock().unwrap().take();
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.start_kill();
        }
        Ok(())
    }
}
