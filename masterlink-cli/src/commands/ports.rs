//! `list-ports` command implementation.

use anyhow::{Context, Result};
use console::style;
use masterlink::{NativePortEnumerator, PortEnumerator, PortInfo};

/// One line of the human-readable port list.
pub(crate) fn describe(port: &PortInfo) -> String {
    let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!(
        "  {} {}{vid_pid}{product}",
        style("•").green(),
        style(&port.name).cyan()
    )
}

/// List serial ports, as JSON on stdout or as a list on stderr.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
    }
    for port in &ports {
        eprintln!("{}", describe(port));
    }
    Ok(())
}
