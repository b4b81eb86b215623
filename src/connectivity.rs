//! Network link monitoring.
//!
//! [`TcpProbe`] treats the link as up when a TCP connection to a known
//! address succeeds within the probe timeout. Reconnecting is delegated to
//! an optional external command (e.g. `nmcli device connect wlan0`) that is
//! spawned and left to run on its own. While one command is still running,
//! further reconnect requests are ignored.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Reports link state and requests reconnection.
#[async_trait]
pub trait Connectivity: Send + Sync + 'static {
    /// Whether the network link is currently usable.
    async fn is_connected(&self) -> bool;

    /// Ask the link to come back. Must return promptly; the outcome is
    /// observed through later [`is_connected`](Self::is_connected) calls.
    async fn reconnect(&self);
}

/// TCP reachability probe with an optional reconnect command.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
    reconnect_command: Option<Vec<String>>,
    reconnecting: Arc<AtomicBool>,
}

impl TcpProbe {
    /// Probe `address` (`host:port`) with the given connect timeout.
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            reconnect_command: None,
            reconnecting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Program and arguments to spawn when the link is down.
    pub fn with_reconnect_command(mut self, command: Vec<String>) -> Self {
        self.reconnect_command = Some(command).filter(|c| !c.is_empty());
        self
    }

    /// Probe target.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connectivity for TcpProbe {
    async fn is_connected(&self) -> bool {
        match tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(address = %self.address, error = %e, "link probe failed");
                false
            }
            Err(_) => {
                debug!(address = %self.address, timeout = ?self.timeout, "link probe timed out");
                false
            }
        }
    }

    async fn reconnect(&self) {
        let Some((program, args)) = self.reconnect_command.as_deref().and_then(|c| c.split_first())
        else {
            return;
        };
        if self.reconnecting.swap(true, Ordering::AcqRel) {
            debug!(%program, "reconnect already in progress");
            return;
        }
        match tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(false)
            .spawn()
        {
            Ok(mut child) => {
                let program = program.clone();
                let reconnecting = Arc::clone(&self.reconnecting);
                tokio::spawn(async move {
                    match child.wait().await {
                        Ok(status) if status.success() => {
                            debug!(%program, "reconnect command finished");
                        }
                        Ok(status) => warn!(%program, %status, "reconnect command failed"),
                        Err(e) => warn!(%program, error = %e, "reconnect command lost"),
                    }
                    reconnecting.store(false, Ordering::Release);
                });
            }
            Err(e) => {
                self.reconnecting.store(false, Ordering::Release);
                warn!(%program, error = %e, "cannot spawn reconnect command");
            }
        }
    }
}
