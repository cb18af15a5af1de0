//! PPP and IPoE health-check collaborators

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use wanmgr_core::{Error, HealthCheckService, PppControl};

use crate::command;
use crate::signal::{self, Signal};

/// PPP control for hosts without a PPP manager
///
/// Session creation fails so PPP interfaces never reach the PPP states;
/// everything else is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPpp;

#[async_trait]
impl PppControl for NullPpp {
    async fn create_session(&self, ifname: &str, ppp_path: &str) -> Result<(), Error> {
        Err(Error::system(format!(
            "no PPP manager available for {} ({})",
            ifname, ppp_path
        )))
    }

    async fn delete_session(&self, ifname: &str, _ppp_path: &str) -> Result<(), Error> {
        debug!("No PPP session to delete on {}", ifname);
        Ok(())
    }

    async fn restart_update_info(&self, _ifname: &str, _ppp_path: &str) -> Result<bool, Error> {
        Ok(false)
    }
}

/// Runs the IPoE health-check helper as a child process
pub struct ProcessHealthCheck {
    command: Vec<String>,
    children: Mutex<HashMap<u32, Child>>,
}

impl ProcessHealthCheck {
    /// `command` is the helper invocation; `{ifname}` is substituted
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for ProcessHealthCheck {
    fn default() -> Self {
        Self::new(crate::default_health_check_command())
    }
}

#[async_trait]
impl HealthCheckService for ProcessHealthCheck {
    async fn start(&self, ifname: &str) -> Result<u32, Error> {
        let argv = command::expand(&self.command, ifname);
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::config("health check command is empty"));
        };

        let child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|e| Error::process(format!("Failed to start {}: {}", program, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::process(format!("{} exited immediately", program)))?;

        info!("Health check started on {} (pid {})", ifname, pid);
        self.children.lock().await.insert(pid, child);
        Ok(pid)
    }

    async fn stop(&self, pid: u32) -> Result<(), Error> {
        let child = self.children.lock().await.remove(&pid);
        match child {
            Some(mut child) => {
                child
                    .kill()
                    .await
                    .map_err(|e| Error::process(format!("Failed to stop pid {}: {}", pid, e)))?;
            }
            None if signal::pid_alive(pid) => {
                // Started before a manager restart
                signal::send(pid, Signal::Terminate)?;
            }
            None => {
                warn!("Health check pid {} already gone", pid);
            }
        }
        info!("Health check stopped (pid {})", pid);
        Ok(())
    }
}
