//! `action` command implementation.

use anyhow::{Context, Result, bail};
use console::style;
use masterlink::{Fields, MasterCommunicator, api};

use crate::Cli;

/// Execute one basic action and report the master's answer.
pub(crate) fn cmd_action(
    cli: &Cli,
    communicator: &MasterCommunicator,
    action_type: u8,
    number: u8,
) -> Result<()> {
    let fields = Fields::new()
        .with("action_type", action_type)
        .with("action_number", number);
    let reply = communicator
        .do_command(api::basic_action(), &fields)
        .with_context(|| format!("Basic action {action_type} {number} failed"))?;

    let resp = reply.get_str("resp").unwrap_or_default();
    if resp != "OK" {
        bail!("Master rejected basic action {action_type} {number}: {resp:?}");
    }
    if !cli.quiet {
        eprintln!(
            "{} Basic action {action_type} {number} executed",
            style("✓").green()
        );
    }
    Ok(())
}
