//! `maintenance` command implementation.
//!
//! Stdin lines go to the master's CLI; its output is printed as it arrives.
//! `exit`, end of input or Ctrl-C leave the session.

use anyhow::{Context, Result};
use console::style;
use crossbeam_channel::{Receiver, TryRecvError};
use log::debug;
use masterlink::MasterCommunicator;
use std::io::{self, BufRead as _, Write as _};
use std::thread;
use std::time::Duration;

use crate::{Cli, was_interrupted};

/// How long one poll for master output blocks.
const POLL: Duration = Duration::from_millis(100);

/// Decode as much of `buffer` as possible, keeping an incomplete trailing
/// UTF-8 sequence for the next chunk.
fn drain_utf8_lossy(buffer: &mut Vec<u8>) -> String {
    let mut output = String::new();
    loop {
        match std::str::from_utf8(buffer) {
            Ok(valid) => {
                output.push_str(valid);
                buffer.clear();
                return output;
            },
            Err(err) => {
                let valid_up_to = err.valid_up_to();
                output.push_str(&String::from_utf8_lossy(&buffer[..valid_up_to]));
                match err.error_len() {
                    Some(invalid_len) => {
                        output.push('\u{FFFD}');
                        buffer.drain(..valid_up_to + invalid_len);
                    },
                    None => {
                        buffer.drain(..valid_up_to);
                        return output;
                    },
                }
            },
        }
    }
}

/// Normalise line endings and drop other control characters.
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .chars()
        .filter_map(|ch| match ch {
            '\n' | '\t' => Some(ch),
            '\r' => Some('\n'),
            _ if ch.is_control() => None,
            _ => Some(ch),
        })
        .collect()
}

/// Forward stdin lines until end of input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                },
                Err(e) => {
                    debug!("stdin closed: {e}");
                    break;
                },
            }
        }
    });
    rx
}

/// Run an interactive maintenance session.
pub(crate) fn cmd_maintenance(cli: &Cli, communicator: &MasterCommunicator) -> Result<()> {
    communicator
        .start_maintenance_mode()
        .context("Failed to enter maintenance mode")?;
    if !cli.quiet {
        eprintln!(
            "{} Maintenance session on {} (type {} or press Ctrl-C to leave)",
            style("🔧").cyan(),
            style(communicator.port_name()).green(),
            style("exit").bold()
        );
    }

    let result = session(communicator);
    communicator
        .stop_maintenance_mode()
        .context("Failed to leave maintenance mode")?;
    if !cli.quiet {
        eprintln!("{} Maintenance session closed", style("✓").green());
    }
    result
}

fn session(communicator: &MasterCommunicator) -> Result<()> {
    let input = spawn_stdin_reader();
    let mut pending = Vec::new();
    let mut stdout = io::stdout();

    while !was_interrupted() {
        if let Some(chunk) = communicator.get_maintenance_data(POLL)? {
            pending.extend_from_slice(&chunk);
            write!(stdout, "{}", clean_text(&drain_utf8_lossy(&mut pending)))?;
            stdout.flush()?;
        }

        match input.try_recv() {
            Ok(line) if line.trim() == "exit" => break,
            Ok(line) => {
                let mut data = line.into_bytes();
                data.extend_from_slice(b"\r\n");
                communicator.send_maintenance_data(&data)?;
            },
            Err(TryRecvError::Empty) => {},
            Err(TryRecvError::Disconnected) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_keeps_incomplete_sequence() {
        let mut buffer = "héllo".as_bytes().to_vec();
        let tail = buffer.split_off(2);
        assert_eq!(drain_utf8_lossy(&mut buffer), "h");
        assert_eq!(buffer, vec![0xC3]);

        buffer.extend_from_slice(&tail);
        assert_eq!(drain_utf8_lossy(&mut buffer), "éllo");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_replaces_invalid_bytes() {
        let mut buffer = vec![b'a', 0xFF, b'b'];
        assert_eq!(drain_utf8_lossy(&mut buffer), "a\u{FFFD}b");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("ok\r\n> \x07"), "ok\n> ");
        assert_eq!(clean_text("a\rb\tc"), "a\nb\tc");
    }
}
