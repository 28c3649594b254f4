// Looking-glass access - interactive sessions, transcript cleaning, AS name lookups

pub mod clean;
pub mod tmux;
pub mod whois;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::collect::CaptureSource;
use crate::error::{retry_with_backoff, AppResult, RetryConfig};
use crate::routes::{Asn, Prefix};

/// Opaque reference to a live interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub name: String,
}

/// Narrow capability over an interactive remote session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Open a session. `label` is unique per in-flight prefix.
    async fn acquire_session(&self, label: &str) -> AppResult<SessionHandle>;

    /// Run one command and return the raw transcript.
    async fn run(&self, handle: &SessionHandle, command: &str) -> AppResult<String>;

    /// Terminate and release anything tied to the session. Must not fail.
    async fn release(&self, handle: &SessionHandle);
}

/// Vendor query for one prefix, filtered to paths containing `target_asn`.
pub fn show_route_command(prefix: &Prefix, target_asn: Asn) -> String {
    format!("show route {} short match {}", prefix, target_asn)
}

/// Capture collaborator: one session per prefix, cleaned transcript or nothing.
pub struct LookingGlass {
    sessions: Arc<dyn SessionProvider>,
    retry: RetryConfig,
    run_timeout: Duration,
}

impl LookingGlass {
    pub fn new(sessions: Arc<dyn SessionProvider>, retry: RetryConfig, run_timeout: Duration) -> Self {
        LookingGlass {
            sessions,
            retry,
            run_timeout,
        }
    }

    async fn capture_in_session(&self, handle: &SessionHandle, command: &str) -> Option<String> {
        match tokio::time::timeout(self.run_timeout, self.sessions.run(handle, command)).await {
            Ok(Ok(raw)) => Some(raw),
            Ok(Err(e)) => {
                tracing::warn!("[{}] query failed: {}", handle.name, e);
                None
            }
            Err(_) => {
                tracing::warn!("[{}] query timed out after {:?}", handle.name, self.run_timeout);
                None
            }
        }
    }
}

#[async_trait]
impl CaptureSource for LookingGlass {
    async fn capture(&self, prefix: &Prefix, target_asn: Asn) -> Option<String> {
        let label = format!("bgp_{}", prefix.cache_key());
        let operation_name = format!("session for {}", prefix);

        let handle = match retry_with_backoff(
            || self.sessions.acquire_session(&label),
            &self.retry,
            &operation_name,
        )
        .await
        {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Could not open looking glass session for {}: {}", prefix, e);
                return None;
            }
        };

        let command = show_route_command(prefix, target_asn);
        tracing::debug!("[{}] {}", handle.name, command);
        let raw = self.capture_in_session(&handle, &command).await;
        self.sessions.release(&handle).await;

        let cleaned = clean::clean_transcript(&raw?);
        if cleaned.trim().is_empty() {
            tracing::warn!("Empty transcript for {}", prefix);
            return None;
        }
        Some(cleaned)
    }
}
