//! Serial port resolution.
//!
//! A port named by flag, environment or config file always wins. Without one,
//! an interactive terminal is offered the detected ports via dialoguer.

use anyhow::{Context, Result, anyhow, bail};
use console::style;
use dialoguer::{Select, theme::ColorfulTheme};
use masterlink::{NativePortEnumerator, PortEnumerator, PortInfo};
use std::io::{self, IsTerminal as _};

use crate::commands::ports::describe;

const NO_PORT: &str = "No serial port given; use --port, MASTERLINK_PORT or the config file";

/// Pick the port to open.
pub(crate) fn resolve_port(explicit: Option<String>) -> Result<String> {
    if let Some(port) = explicit {
        return Ok(port);
    }
    if !(io::stdin().is_terminal() && io::stderr().is_terminal()) {
        bail!(NO_PORT);
    }
    let ports = NativePortEnumerator::list_ports().context("Failed to enumerate serial ports")?;
    select_port(ports)
}

fn select_port(mut ports: Vec<PortInfo>) -> Result<String> {
    match ports.len() {
        0 => bail!("{NO_PORT} (no serial ports detected)"),
        1 => {
            let port = ports.remove(0);
            eprintln!(
                "{} Using the only detected port {}",
                style("ℹ").blue(),
                style(&port.name).green()
            );
            Ok(port.name)
        },
        _ => {
            // Keep labels on one line in narrow terminals
            let width = console::Term::stderr().size().1 as usize;
            let labels: Vec<String> = ports
                .iter()
                .map(|port| {
                    console::truncate_str(
                        describe(port).trim_start(),
                        width.saturating_sub(4),
                        "\u{2026}",
                    )
                    .into_owned()
                })
                .collect();

            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select the master's serial port")
                .items(&labels)
                .default(0)
                .interact_opt()
                .context("Port selection failed")?;
            let index = selection.ok_or_else(|| anyhow!("Port selection cancelled"))?;
            Ok(ports.swap_remove(index).name)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str) -> PortInfo {
        PortInfo {
            name: name.to_string(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }

    #[test]
    fn test_explicit_port_wins() {
        let port = resolve_port(Some("/dev/ttyS1".to_string())).unwrap();
        assert_eq!(port, "/dev/ttyS1");
    }

    #[test]
    fn test_select_without_ports_fails() {
        let err = select_port(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("No serial port"));
    }

    #[test]
    fn test_select_single_port_skips_prompt() {
        assert_eq!(select_port(vec![port("COM4")]).unwrap(), "COM4");
    }
}
