//! macOS batch execution via a transient sh script

use super::{BatchExecutor, CommandBatch, ExecError, RouteCommand};
use std::io::Write;
use std::process::Command;
use tracing::debug;

pub struct MacExecutor;

impl MacExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a batch as an sh script. BSD `route` has no metric option, so
/// the metric is omitted here; per-line failures are suppressed with
/// `|| true`.
fn render(batch: &CommandBatch) -> String {
    let mut script = String::from("#!/bin/sh\n");
    if batch.needs_gateway() {
        script.push_str("GW=$(route -n get default | awk '/gateway:/{print $2; exit}')\n");
        script.push_str("[ -n \"$GW\" ] || exit 1\n");
    }
    for command in batch.commands() {
        match command {
            RouteCommand::Add {
                destination, mask, ..
            } => {
                script.push_str(&format!(
                    "route -n add -net {} -netmask {} \"$GW\" || true\n",
                    destination, mask
                ));
            }
            RouteCommand::Delete { destination, mask } => {
                script.push_str(&format!(
                    "route -n delete -net {} -netmask {} || true\n",
                    destination, mask
                ));
            }
            RouteCommand::FlushDnsCache => {
                script.push_str("dscacheutil -flushcache || true\n");
                script.push_str("killall -HUP mDNSResponder || true\n");
            }
        }
    }
    script
}

impl BatchExecutor for MacExecutor {
    fn execute(&self, batch: &CommandBatch) -> Result<(), ExecError> {
        // NamedTempFile removes the script on every exit path
        let mut script_file = tempfile::Builder::new()
            .prefix("vpn-bypass-")
            .suffix(".sh")
            .tempfile()?;
        script_file.write_all(render(batch).as_bytes())?;
        script_file.flush()?;

        debug!("Executing {} instructions via sh", batch.len());
        let output = Command::new("sh").arg(script_file.path()).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExecError::BatchFailed(format!(
                "{} ({})",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
