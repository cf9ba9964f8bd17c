//! Linux batch execution via a transient sh script

use super::{BatchExecutor, CommandBatch, ExecError, RouteCommand};
use crate::cidr;
use std::io::Write;
use std::process::Command;
use tracing::debug;

pub struct LinuxExecutor;

impl LinuxExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a batch as an sh script. Per-line failures are suppressed
/// with `|| true`; the script only exits non-zero when no default
/// gateway can be determined.
fn render(batch: &CommandBatch) -> String {
    let mut script = String::from("#!/bin/sh\n");
    if batch.needs_gateway() {
        script.push_str("GW=$(ip -4 route show default | awk '{print $3; exit}')\n");
        script.push_str("[ -n \"$GW\" ] || exit 1\n");
    }
    for command in batch.commands() {
        match command {
            RouteCommand::Add {
                destination,
                mask,
                metric,
            } => {
                let prefix_len = cidr::mask_prefix(*mask);
                script.push_str(&format!(
                    "ip route add {}/{} via \"$GW\" metric {} || true\n",
                    destination, prefix_len, metric
                ));
            }
            RouteCommand::Delete { destination, mask } => {
                // ip route del only matches a network route when given
                // its prefix
                let prefix_len = cidr::mask_prefix(*mask);
                script.push_str(&format!(
                    "ip route del {}/{} || true\n",
                    destination, prefix_len
                ));
            }
            RouteCommand::FlushDnsCache => {
                script.push_str("resolvectl flush-caches || true\n");
            }
        }
    }
    script
}

impl BatchExecutor for LinuxExecutor {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_batch() -> CommandBatch {
        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::FlushDnsCache);
        batch.push(RouteCommand::Add {
            destination: Ipv4Addr::new(1, 2, 3, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            metric: 25,
        });
        batch.push(RouteCommand::Add {
            destination: Ipv4Addr::new(93, 184, 216, 34),
            mask: Ipv4Addr::new(255, 255, 255, 255),
            metric: 25,
        });
        batch
    }

    #[test]
    fn test_render_add_batch() {
        let script = render(&sample_batch());
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("GW=$(ip -4 route show default"));
        assert!(script.contains("[ -n \"$GW\" ] || exit 1"));
        assert!(script.contains("resolvectl flush-caches || true"));
        assert!(script.contains("ip route add 1.2.3.0/24 via \"$GW\" metric 25 || true"));
        assert!(script.contains("ip route add 93.184.216.34/32 via \"$GW\" metric 25 || true"));
    }

    #[test]
    fn test_render_delete_batch_has_no_gateway_preamble() {
        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::Delete {
            destination: Ipv4Addr::new(1, 2, 3, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        });
        let script = render(&batch);
        assert!(!script.contains("GW="));
        assert!(script.contains("ip route del 1.2.3.0/24 || true"));
    }

    #[test]
    fn test_execute_delete_batch() {
        // Deletes are suppressed with || true, so the script exits zero
        // even without root.
        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::Delete {
            destination: Ipv4Addr::new(203, 0, 113, 1),
            mask: Ipv4Addr::new(255, 255, 255, 255),
        });
        assert!(LinuxExecutor::new().execute(&batch).is_ok());
    }
}
