use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{info, warn};

use crate::error::{HarnessError, Result};

/// Source of a yes/no answer for destructive actions.
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Accepts without asking (`--yes`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        info!("{question} yes (assumed)");
        Ok(true)
    }
}

/// Prompts on stdout and reads one line from stdin.
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        let mut stdout = io::stdout();
        write!(stdout, "{question} [y/N] ")
            .and_then(|_| stdout.flush())
            .map_err(|e| HarnessError::io("writing prompt", e))?;
        let mut answer = String::new();
        io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| HarnessError::io("reading confirmation", e))?;
        Ok(is_affirmative(&answer))
    }
}

/// `y` or `yes`, any case. Everything else, including EOF, is a no.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Remove a leftover shared artifact from an earlier run, asking first.
///
/// Returns whether a file was removed. Declining is [`HarnessError::Declined`].
pub fn clear_stale_artifact(path: &Path, confirm: &mut dyn Confirm) -> Result<bool> {
    if !path.exists() {
        return Ok(false);
    }
    warn!("Stale engine output found at {}", path.display());
    let question = format!("Remove existing {}?", path.display());
    if !confirm.confirm(&question)? {
        return Err(HarnessError::Declined(path.to_path_buf()));
    }
    fs::remove_file(path).map_err(|e| HarnessError::io(format!("removing {}", path.display()), e))?;
    info!("Removed {}", path.display());
    Ok(true)
}
