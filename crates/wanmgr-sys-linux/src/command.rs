//! External command execution
//!
//! All system changes go through short-lived commands (`ip`, `resolvconf`
//! and the like). A command that reports the requested state already holds
//! is treated as success, so callers can re-apply state freely.

use tokio::process::Command;
use tracing::debug;
use wanmgr_core::Error;

/// stderr fragments meaning "already in the requested state"
const ALREADY_APPLIED: &[&str] = &[
    "File exists",
    "No such process",
    "Cannot find device",
    "Cannot assign requested address",
    "does not exist",
];

/// Run `program` with `args`, returning its stdout
pub async fn run(program: &str, args: &[&str]) -> Result<String, Error> {
    debug!("exec: {} {}", program, args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::system(format!("Failed to run {}: {}", program, e)))?;

    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(Error::system(format!(
        "{} {} failed ({}): {}",
        program,
        args.join(" "),
        output.status,
        stderr.trim()
    )))
}

/// Run a state-changing command, accepting "already applied" failures
pub async fn apply(program: &str, args: &[&str]) -> Result<(), Error> {
    match run(program, args).await {
        Ok(_) => Ok(()),
        Err(Error::System(msg)) if already_applied(&msg) => {
            debug!("already applied: {}", msg);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn already_applied(msg: &str) -> bool {
    ALREADY_APPLIED.iter().any(|fragment| msg.contains(fragment))
}

/// Expand `{ifname}` in a command template
pub fn expand(template: &[String], ifname: &str) -> Vec<String> {
    template
        .iter()
        .map(|arg| arg.replace("{ifname}", ifname))
        .collect()
}
