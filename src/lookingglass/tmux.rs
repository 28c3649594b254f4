// tmux-driven SSH sessions to the looking glass
//
// Each session is a detached tmux session running `ssh -tt <destination>`.
// The looking glass only speaks to an interactive terminal, so queries are
// typed with send-keys and the result is scraped with capture-pane.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

use super::{SessionHandle, SessionProvider};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct TmuxSettings {
    /// SSH destination, e.g. `lg@bgp.tools`
    pub destination: String,
    /// Wait after connecting before typing the query
    pub connect_settle: Duration,
    /// Wait after typing the query before capturing the pane
    pub query_settle: Duration,
    /// How many times to poll for the session to exit after logout
    pub exit_polls: u32,
    pub exit_poll_interval: Duration,
}

impl Default for TmuxSettings {
    fn default() -> Self {
        TmuxSettings {
            destination: "lg@bgp.tools".to_string(),
            connect_settle: Duration::from_secs(4),
            query_settle: Duration::from_secs(6),
            exit_polls: 30,
            exit_poll_interval: Duration::from_millis(500),
        }
    }
}

pub struct TmuxSessionProvider {
    settings: TmuxSettings,
}

impl TmuxSessionProvider {
    pub fn new(settings: TmuxSettings) -> Self {
        TmuxSessionProvider { settings }
    }

    async fn tmux(&self, args: &[&str]) -> AppResult<std::process::Output> {
        tracing::trace!("tmux {:?}", args);
        Command::new("tmux")
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::CommandExecution(format!("tmux: {}", e)))
    }

    async fn tmux_checked(&self, args: &[&str]) -> AppResult<String> {
        let output = self.tmux(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::Session(format!("tmux {} failed: {}", args[0], stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn has_session(&self, name: &str) -> bool {
        matches!(self.tmux(&["has-session", "-t", name]).await, Ok(out) if out.status.success())
    }

    async fn kill_session(&self, name: &str) {
        if let Err(e) = self.tmux(&["kill-session", "-t", name]).await {
            tracing::warn!("[{}] kill-session failed: {}", name, e);
        }
    }
}

#[async_trait]
impl SessionProvider for TmuxSessionProvider {
    async fn acquire_session(&self, label: &str) -> AppResult<SessionHandle> {
        if self.has_session(label).await {
            tracing::debug!("[{}] leftover session found, killing it", label);
            self.kill_session(label).await;
        }

        let ssh = format!("ssh -tt {}", self.settings.destination);
        self.tmux_checked(&["new-session", "-d", "-s", label, ssh.as_str()]).await?;
        tracing::debug!("[{}] connecting to {}", label, self.settings.destination);

        tokio::time::sleep(self.settings.connect_settle).await;

        if !self.has_session(label).await {
            return Err(AppError::Session(format!(
                "ssh to {} exited before the query could be sent",
                self.settings.destination
            )));
        }

        Ok(SessionHandle {
            name: label.to_string(),
        })
    }

    async fn run(&self, handle: &SessionHandle, command: &str) -> AppResult<String> {
        self.tmux_checked(&["send-keys", "-t", handle.name.as_str(), command, "C-m"])
            .await?;

        tokio::time::sleep(self.settings.query_settle).await;

        let pane = format!("{}:0", handle.name);
        self.tmux_checked(&["capture-pane", "-t", pane.as_str(), "-p", "-S", "-99999"])
            .await
    }

    async fn release(&self, handle: &SessionHandle) {
        if let Err(e) = self.tmux_checked(&["send-keys", "-t", handle.name.as_str(), "C-d"]).await {
            tracing::debug!("[{}] logout keystroke failed: {}", handle.name, e);
        }

        for _ in 0..self.settings.exit_polls {
            if !self.has_session(&handle.name).await {
                tracing::debug!("[{}] session closed", handle.name);
                return;
            }
            tokio::time::sleep(self.settings.exit_poll_interval).await;
        }

        tracing::warn!("[{}] session did not exit, killing it", handle.name);
        self.kill_session(&handle.name).await;
    }
}
