//! Concrete collaborators for a real host.
//!
//! Everything here shells out to system tools or talks to the terminal. The
//! core modules only see these through their traits.

pub mod compose;
pub mod installer;
pub mod prompts;
pub mod wallets;

pub use compose::ComposeRuntime;
pub use installer::ShellInstaller;
pub use prompts::{DialoguerConfirm, DialoguerPassword};
pub use wallets::OfflineWallets;

use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::lifecycle::RuntimeError;

/// Run a command to completion and capture its output.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<Output, RuntimeError> {
    debug!(program, ?args, "Running");
    Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| RuntimeError::Spawn {
            program: program.to_string(),
            source,
        })
}

/// Run a command and fail unless it exits successfully.
pub(crate) async fn run_checked(program: &str, args: &[&str]) -> Result<Output, RuntimeError> {
    let output = run(program, args).await?;
    if !output.status.success() {
        return Err(RuntimeError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// Whether `program` resolves on the `PATH`.
pub(crate) async fn on_path(program: &str) -> bool {
    run("which", &[program])
        .await
        .is_ok_and(|output| output.status.success())
}
