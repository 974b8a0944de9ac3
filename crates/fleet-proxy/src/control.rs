//! Proxy process control: stop, restart, reload, and liveness.
//!
//! The proxy daemon itself is supervised elsewhere; these operations only
//! ask the service manager to act on it.

use std::future::Future;
use std::pin::Pin;

use tokio::process::Command;
use tracing::{debug, info};

use fleet_core::{FleetError, FleetResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Operations on the running proxy, injected for testability.
pub trait ProxyControl: Send + Sync {
    /// Apply the merged config without dropping connections.
    fn reload(&self) -> BoxFuture<'_, FleetResult<()>>;
    fn restart(&self) -> BoxFuture<'_, FleetResult<()>>;
    fn stop(&self) -> BoxFuture<'_, FleetResult<()>>;
    /// Whether at least one proxy process is running.
    fn is_running(&self) -> BoxFuture<'_, FleetResult<bool>>;
}

/// Controls the proxy through `service <name> <op>` and `pgrep -x <name>`.
#[derive(Debug, Clone)]
pub struct ServiceProxyControl {
    service_name: String,
    service_program: String,
    pgrep_program: String,
}

impl ServiceProxyControl {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_program: "service".to_string(),
            pgrep_program: "pgrep".to_string(),
        }
    }

    /// Override the programs used for service operations and liveness.
    pub fn with_programs(
        mut self,
        service_program: impl Into<String>,
        pgrep_program: impl Into<String>,
    ) -> Self {
        self.service_program = service_program.into();
        self.pgrep_program = pgrep_program.into();
        self
    }

    async fn service(&self, op: &str) -> FleetResult<()> {
        let output = Command::new(&self.service_program)
            .arg(&self.service_name)
            .arg(op)
            .output()
            .await
            .map_err(|e| {
                FleetError::TransportUnavailable(format!("{} {op}: {e}", self.service_program))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::Reload(format!(
                "{} {} {op} exited with {}: {}",
                self.service_program,
                self.service_name,
                output.status,
                stderr.trim()
            )));
        }
        info!(service = %self.service_name, %op, "proxy service command succeeded");
        Ok(())
    }

    /// Number of running processes named exactly like the service.
    pub async fn process_count(&self) -> FleetResult<usize> {
        let output = Command::new(&self.pgrep_program)
            .arg("-x")
            .arg(&self.service_name)
            .output()
            .await
            .map_err(|e| FleetError::TransportUnavailable(format!("{}: {e}", self.pgrep_program)))?;

        // pgrep exits 1 when nothing matches.
        if !output.status.success() {
            return Ok(0);
        }
        let count = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        debug!(service = %self.service_name, count, "proxy processes");
        Ok(count)
    }
}

impl ProxyControl for ServiceProxyControl {
    fn reload(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(self.service("reload"))
    }

    fn restart(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(self.service("restart"))
    }

    fn stop(&self) -> BoxFuture<'_, FleetResult<()>> {
        Box::pin(self.service("stop"))
    }

    fn is_running(&self) -> BoxFuture<'_, FleetResult<bool>> {
        Box::pin(async move { Ok(self.process_count().await? > 0) })
    }
}
