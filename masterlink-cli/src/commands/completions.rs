//! Shell completion generation.

use anyhow::{Result, bail};
use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::env;
use std::io;
use std::path::Path;

use crate::Cli;

/// Write the completion script for `shell` (or the login shell) to stdout.
pub(crate) fn cmd_completions(shell: Option<Shell>) -> Result<()> {
    let Some(shell) = shell.or_else(detect_shell) else {
        bail!("Could not detect your shell; name one, e.g. `masterlink completions bash`");
    };
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
    Ok(())
}

fn detect_shell() -> Option<Shell> {
    if let Ok(path) = env::var("SHELL") {
        return shell_from_path(&path);
    }
    if cfg!(windows) && env::var("PSModulePath").is_ok() {
        return Some(Shell::PowerShell);
    }
    None
}

fn shell_from_path(path: &str) -> Option<Shell> {
    match Path::new(path).file_name().and_then(|n| n.to_str())? {
        "bash" => Some(Shell::Bash),
        "zsh" => Some(Shell::Zsh),
        "fish" => Some(Shell::Fish),
        "elvish" => Some(Shell::Elvish),
        "pwsh" | "powershell" => Some(Shell::PowerShell),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_from_path() {
        assert_eq!(shell_from_path("/bin/bash"), Some(Shell::Bash));
        assert_eq!(shell_from_path("/usr/local/bin/fish"), Some(Shell::Fish));
        assert_eq!(shell_from_path("zsh"), Some(Shell::Zsh));
        assert_eq!(shell_from_path("/bin/tcsh"), None);
        assert_eq!(shell_from_path(""), None);
    }
}
