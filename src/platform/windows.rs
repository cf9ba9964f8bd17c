//! Windows batch execution via a transient .bat script

use super::{BatchExecutor, CommandBatch, ExecError, RouteCommand};
use std::io::Write;
use std::process::Command;
use tracing::debug;

pub struct WindowsExecutor;

impl WindowsExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a batch as a .bat script. The gateway is read from the live
/// route table; `route delete` matches by destination alone, so the
/// instruction's mask is ignored here. The trailing `exit /b 0` keeps
/// per-line failures (deleting an absent route) from failing the batch.
fn render(batch: &CommandBatch) -> String {
    let mut script = String::from("@echo off\r\n");
    if batch.needs_gateway() {
        script.push_str(
            r#"for /F "tokens=3" %%* in ('route print ^| findstr "\<0.0.0.0\>"') do set "gw=%%*""#,
        );
        script.push_str("\r\n");
        script.push_str("if not defined gw exit /b 1\r\n");
    }
    for command in batch.commands() {
        match command {
            RouteCommand::Add {
                destination,
                mask,
                metric,
            } => {
                script.push_str(&format!(
                    "route add {} mask {} %gw% metric {}\r\n",
                    destination, mask, metric
                ));
            }
            RouteCommand::Delete { destination, .. } => {
                script.push_str(&format!("route delete {}\r\n", destination));
            }
            RouteCommand::FlushDnsCache => {
                script.push_str("ipconfig /flushdns\r\n");
            }
        }
    }
    script.push_str("exit /b 0\r\n");
    script
}

impl BatchExecutor for WindowsExecutor {
    fn execute(&self, batch: &CommandBatch) -> Result<(), ExecError> {
        // NamedTempFile removes the script on every exit path
        let mut script_file = tempfile::Builder::new()
            .prefix("vpn-bypass-")
            .suffix(".bat")
            .tempfile()?;
        script_file.write_all(render(batch).as_bytes())?;
        script_file.flush()?;

        debug!("Executing {} instructions via cmd", batch.len());
        let output = Command::new("cmd")
            .arg("/C")
            .arg(script_file.path())
            .output()?;

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

    #[test]
    fn test_render_add_batch() {
        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::FlushDnsCache);
        batch.push(RouteCommand::Add {
            destination: Ipv4Addr::new(1, 2, 3, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            metric: 25,
        });
        let script = render(&batch);
        assert!(script.starts_with("@echo off\r\n"));
        assert!(script.contains(r#"for /F "tokens=3" %%*"#));
        assert!(script.contains("if not defined gw exit /b 1"));
        assert!(script.contains("ipconfig /flushdns"));
        assert!(script.contains("route add 1.2.3.0 mask 255.255.255.0 %gw% metric 25"));
        assert!(script.ends_with("exit /b 0\r\n"));
    }

    #[test]
    fn test_render_delete_ignores_mask() {
        let mut batch = CommandBatch::new();
        batch.push(RouteCommand::Delete {
            destination: Ipv4Addr::new(93, 184, 216, 34),
            mask: Ipv4Addr::new(255, 255, 255, 255),
        });
        let script = render(&batch);
        assert!(!script.contains("for /F"));
        assert!(script.contains("route delete 93.184.216.34\r\n"));
        assert!(!script.contains("mask 255.255.255.255"));
    }
}
