//! `watch` command implementation.
//!
//! Registers an output-list consumer and prints every output change the
//! master reports, plus raw passthrough traffic on request, until Ctrl-C.

use anyhow::Result;
use console::style;
use crossbeam_channel::RecvTimeoutError;
use masterlink::{
    BackgroundConsumer, ChannelHandler, CommunicationStatistics, Fields, MasterCommunicator, api,
    protocol::printable,
};
use std::time::Duration;

use crate::{Cli, was_interrupted};

/// Events buffered between the reader thread and the printer.
const EVENT_QUEUE: usize = 256;

/// How long one poll for events blocks.
const POLL: Duration = Duration::from_millis(100);

/// Human-readable rendering of an output-list event.
fn describe_outputs(fields: &Fields) -> String {
    match fields.get_outputs("outputs") {
        Some([]) => "all outputs off".to_string(),
        Some(outputs) => outputs
            .iter()
            .map(|(output, dimmer)| format!("output {output} on at {dimmer}%"))
            .collect::<Vec<_>>()
            .join(", "),
        None => "malformed output event".to_string(),
    }
}

fn describe_statistics(stats: &CommunicationStatistics) -> String {
    format!(
        "{} bytes read, {} bytes written, {} calls ok, {} timed out, {}",
        stats.bytes_read,
        stats.bytes_written,
        stats.calls_succeeded.len(),
        stats.calls_timedout.len(),
        if stats.online { "online" } else { "offline" }
    )
}

/// Print output events (and passthrough chunks) until interrupted.
pub(crate) fn cmd_watch(
    cli: &Cli,
    communicator: &MasterCommunicator,
    passthrough: bool,
    json: bool,
) -> Result<()> {
    let (tx, events) = crossbeam_channel::bounded(EVENT_QUEUE);
    communicator.register_consumer(BackgroundConsumer::new(
        api::output_list(),
        0,
        ChannelHandler::new(tx),
    ));
    if passthrough {
        communicator.enable_passthrough();
    }
    if !cli.quiet {
        eprintln!(
            "{} Watching {} (Ctrl-C to stop)",
            style("👀").cyan(),
            style(communicator.port_name()).green()
        );
    }

    while !was_interrupted() {
        match events.recv_timeout(POLL) {
            Ok(fields) if json => println!("{}", serde_json::json!({ "event": fields })),
            Ok(fields) => println!("{}", describe_outputs(&fields)),
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if passthrough {
            while let Some(chunk) = communicator.get_passthrough_data(Duration::ZERO)? {
                if json {
                    println!("{}", serde_json::json!({ "passthrough": chunk }));
                } else {
                    println!("{} {}", style("passthrough").dim(), printable(&chunk));
                }
            }
        }
    }

    let stats = communicator.get_communication_statistics();
    if json {
        println!("{}", serde_json::json!({ "statistics": stats }));
    } else if !cli.quiet {
        eprintln!("{} {}", style("📊").cyan(), describe_statistics(&stats));
    }
    Ok(())
}
