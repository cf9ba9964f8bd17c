//! OS command batch execution
//!
//! Spawning one process per route mutation is expensive, so every
//! mutation for one logical operation is collected into a single batch,
//! rendered as a platform script, and executed once. The script is a
//! transient file removed on every exit path. The OS still applies each
//! route individually; a mid-batch failure leaves the table partially
//! updated and unrecovered, which the teardown-then-reapply convergence
//! policy absorbs on the next run.

#[cfg(target_os = "macos")]
pub mod mac;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to write command script: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command batch failed: {0}")]
    BatchFailed(String),
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// One OS route-table instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCommand {
    /// The gateway is a placeholder the executor resolves from the live
    /// routing table at execution time, never cached.
    Add {
        destination: Ipv4Addr,
        mask: Ipv4Addr,
        metric: u32,
    },
    /// The mask travels with the instruction; backends whose OS deletes
    /// by destination alone ignore it.
    Delete {
        destination: Ipv4Addr,
        mask: Ipv4Addr,
    },
    FlushDnsCache,
}

/// Ordered instruction sequence for one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<RouteCommand>,
}

impl CommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: RouteCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[RouteCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether any instruction needs the current default gateway.
    pub fn needs_gateway(&self) -> bool {
        self.commands
            .iter()
            .any(|command| matches!(command, RouteCommand::Add { .. }))
    }
}

/// Executes a batch as one external script invocation.
///
/// Success/failure is reported per batch, not per instruction.
/// Individual add/delete failures inside the script are tolerated
/// (deleting an absent route is normal under teardown-then-reapply);
/// a batch failure means the script could not run to completion or no
/// default gateway could be determined.
pub trait BatchExecutor {
    fn execute(&self, batch: &CommandBatch) -> Result<(), ExecError>;
}

/// Get the appropriate batch executor for the current platform.
pub fn system_executor() -> Result<Box<dyn BatchExecutor>, ExecError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(mac::MacExecutor::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxExecutor::new()))
    }

    #[cfg(target_os = "windows")]
    {
        Ok(Box::new(windows::WindowsExecutor::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(ExecError::UnsupportedPlatform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::BatchFailed("exit status 1".to_string());
        assert_eq!(err.to_string(), "Command batch failed: exit status 1");

        let err = ExecError::UnsupportedPlatform;
        assert_eq!(err.to_string(), "Unsupported platform");
    }

    #[test]
    fn test_batch_needs_gateway() {
        let mut batch = CommandBatch::new();
        assert!(batch.is_empty());
        assert!(!batch.needs_gateway());

        batch.push(RouteCommand::Delete {
            destination: Ipv4Addr::new(1, 2, 3, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
        });
        batch.push(RouteCommand::FlushDnsCache);
        assert!(!batch.needs_gateway());

        batch.push(RouteCommand::Add {
            destination: Ipv4Addr::new(1, 2, 3, 0),
            mask: Ipv4Addr::new(255, 255, 255, 0),
            metric: 25,
        });
        assert!(batch.needs_gateway());
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn test_system_executor_returns_ok() {
        #[cfg(any(target_os = "macos", target_os = "linux", target_os = "windows"))]
        {
            assert!(system_executor().is_ok());
        }
    }
}
