//! Terminal prompts.

use dialoguer::{Confirm as ConfirmPrompt, Password};
use std::io::IsTerminal;
use tracing::warn;

use crate::credentials::{CredentialsError, PasswordPrompt};
use crate::publication::Confirm;

/// Check if stdin is a TTY.
fn is_tty() -> bool {
    std::io::stdin().is_terminal()
}

/// Yes/no prompt on the terminal. Declines when there is no terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerConfirm;

impl Confirm for DialoguerConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        if !is_tty() {
            warn!("Not a terminal, declining prompt (use --yes to skip it)");
            return false;
        }
        ConfirmPrompt::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Prompt failed, declining");
                false
            })
    }
}

/// Hidden password prompt on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPassword;

impl PasswordPrompt for DialoguerPassword {
    fn password(&self, prompt: &str) -> Result<String, CredentialsError> {
        if !is_tty() {
            return Err(CredentialsError::Prompt(
                "a terminal is required to enter the password".to_string(),
            ));
        }
        Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(|e| CredentialsError::Prompt(e.to_string()))
    }
}
