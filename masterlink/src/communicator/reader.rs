//! The reader loop: the only consumer of inbound bytes.
//!
//! Each iteration pulls one bounded read from the transport, appends it to
//! the reassembly buffer and classifies what is at the front of the buffer:
//!
//! 1. the reply to the outstanding request (or its checksum failure)
//! 2. a late reply to a request whose caller already gave up
//! 3. a frame for one or more background consumers
//! 4. a possible frame prefix: wait for more bytes
//! 5. anything else: one byte is set aside as unclaimed
//!
//! Unclaimed bytes of one iteration form a single chunk, routed to the
//! maintenance channel in maintenance mode and to the passthrough buffer
//! otherwise (when enabled).
//!
//! A possible frame prefix that sees a whole idle read without growing is
//! flushed as unclaimed, unless a request is still waiting for its reply.
//!
//! In passthrough-only mode bytes skip classification entirely, except while
//! the request that was outstanding at the switch may still be answered.

use {
    super::{
        Shared,
        consumer::BackgroundConsumer,
        mode::Mode,
        stats::Direction,
    },
    crate::{
        error::Error,
        protocol::{Decoded, MatchHint, printable},
    },
    log::{debug, error, info, trace, warn},
    std::{
        sync::{Arc, atomic::Ordering},
        thread,
        time::{Duration, Instant},
    },
};

enum Step {
    /// Drop this many bytes from the front of the buffer.
    Consumed(usize),
    /// The front may be an incomplete frame.
    Wait,
    /// The front byte belongs to nobody.
    Skip,
}

pub(crate) fn run(shared: Arc<Shared>) {
    let backoff = shared.config.transport_backoff;
    let mut reader = Reader {
        shared,
        buffer: Vec::new(),
        backoff,
    };
    debug!("Reader loop started");
    while reader.shared.running.load(Ordering::Acquire) {
        reader.iterate();
    }
    debug!("Reader loop stopped");
}

struct Reader {
    shared: Arc<Shared>,
    buffer: Vec<u8>,
    backoff: Duration,
}

impl Reader {
    fn iterate(&mut self) {
        let config = &self.shared.config;
        let data = match self
            .shared
            .transport
            .read(config.read_chunk_size, config.read_timeout)
        {
            Ok(data) => {
                self.backoff = config.transport_backoff;
                data
            },
            Err(e) => {
                self.on_transport_error(&e);
                return;
            },
        };
        let mode = *self.shared.mode.lock();
        if data.is_empty() {
            self.flush_stalled(mode);
            return;
        }
        self.shared.debug.record(Direction::Read, &data);

        let awaiting_reply = self.shared.correlator.current().is_some();
        if mode == Mode::PassthroughOnly && !awaiting_reply {
            let mut chunk = std::mem::take(&mut self.buffer);
            chunk.extend_from_slice(&data);
            self.shared.passthrough.push(chunk);
            return;
        }

        self.buffer.extend_from_slice(&data);
        let unclaimed = self.process(mode);
        self.route_unclaimed(unclaimed, mode);
    }

    /// Give up on a frame prefix the master never completed.
    fn flush_stalled(&mut self, mode: Mode) {
        if self.buffer.is_empty() || self.shared.correlator.current().is_some() {
            return;
        }
        let stalled = std::mem::take(&mut self.buffer);
        debug!("Flushing {} stalled bytes", stalled.len());
        self.route_unclaimed(stalled, mode);
    }

    fn process(&mut self, mode: Mode) -> Vec<u8> {
        // Only the outstanding reply is matched while leaving for passthrough-only
        let consumers = if mode == Mode::PassthroughOnly {
            Arc::default()
        } else {
            self.shared.consumers.snapshot()
        };
        let mut unclaimed = Vec::new();
        while !self.buffer.is_empty() {
            match self.step(&consumers, &mut unclaimed) {
                Step::Consumed(n) => {
                    self.buffer.drain(..n.min(self.buffer.len()));
                },
                Step::Wait => break,
                Step::Skip => {
                    unclaimed.push(self.buffer.remove(0));
                },
            }
        }
        unclaimed
    }

    fn step(&self, consumers: &[Arc<BackgroundConsumer>], unclaimed: &mut Vec<u8>) -> Step {
        let buf = self.buffer.as_slice();
        let correlator = &self.shared.correlator;
        let mut waiting = false;

        if let Some((command, cid)) = correlator.current() {
            match command.try_decode(buf, Some(MatchHint::cid(cid))) {
                Decoded::Frame {
                    consumed, fields, ..
                } => {
                    trace!("Reply to {} (cid {cid})", command.action());
                    if !correlator.resolve(cid, Ok(fields)) {
                        debug!(
                            "Reply to {} (cid {cid}) arrived after its caller gave up",
                            command.action()
                        );
                    }
                    return Step::Consumed(consumed);
                },
                Decoded::Corrupt {
                    consumed,
                    expected,
                    actual,
                    ..
                } => {
                    warn!(
                        "CRC check failed for {} (cid {cid}): expected {expected:#06x}, got {actual:#06x}",
                        command.action()
                    );
                    correlator.resolve(
                        cid,
                        Err(Error::CrcCheckFailed {
                            command: command.action(),
                            expected,
                            actual,
                        }),
                    );
                    return Step::Consumed(consumed);
                },
                Decoded::Incomplete => waiting = true,
                Decoded::NoMatch => {},
            }
        }

        for (command, cid) in correlator.abandoned() {
            match command.try_decode(buf, Some(MatchHint::cid(cid))) {
                Decoded::Frame { consumed, .. } | Decoded::Corrupt { consumed, .. } => {
                    debug!("Discarding late reply to {} (cid {cid})", command.action());
                    correlator.forget(command.action(), cid);
                    return Step::Consumed(consumed);
                },
                Decoded::Incomplete => waiting = true,
                Decoded::NoMatch => {},
            }
        }

        let mut hits = Vec::new();
        let mut corrupt = None;
        for consumer in consumers {
            match consumer.command().try_decode(buf, Some(consumer.hint())) {
                Decoded::Frame {
                    consumed, fields, ..
                } => hits.push((consumer, consumed, fields)),
                Decoded::Corrupt { consumed, .. } => {
                    corrupt.get_or_insert((consumer.command().action(), consumed));
                },
                Decoded::Incomplete => waiting = true,
                Decoded::NoMatch => {},
            }
        }

        if let Some(&(_, frame_len, _)) = hits.first() {
            let mut forward = false;
            for (consumer, consumed, fields) in &hits {
                if *consumed != frame_len {
                    continue;
                }
                trace!("Event {} for background consumer", consumer.command().action());
                consumer.deliver(fields);
                forward |= consumer.forwards_passthrough();
            }
            if forward {
                unclaimed.extend_from_slice(&buf[..frame_len]);
            }
            return Step::Consumed(frame_len);
        }

        if waiting {
            return Step::Wait;
        }
        if let Some((action, consumed)) = corrupt {
            warn!("Discarding {action} event with bad checksum");
            return Step::Consumed(consumed);
        }
        Step::Skip
    }

    fn route_unclaimed(&self, unclaimed: Vec<u8>, mode: Mode) {
        if unclaimed.is_empty() {
            return;
        }
        if mode == Mode::Maintenance {
            self.shared.maintenance.push(unclaimed);
        } else if mode == Mode::PassthroughOnly
            || self.shared.passthrough_enabled.load(Ordering::Acquire)
        {
            self.shared.passthrough.push(unclaimed);
        } else {
            trace!("Dropping unclaimed bytes: {}", printable(&unclaimed));
        }
    }

    fn on_transport_error(&mut self, e: &Error) {
        error!(
            "Error while reading from {}: {e}; retrying in {:?}",
            self.shared.transport.name(),
            self.backoff
        );
        self.buffer.clear();
        self.shared
            .correlator
            .fail(|request| Error::CommunicationTimedOut {
                command: request.command.action(),
                timeout: request.timeout,
            });

        let resume = Instant::now() + self.backoff;
        let slice = self.shared.config.read_timeout.max(Duration::from_millis(10));
        while self.shared.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= resume {
                break;
            }
            thread::sleep(slice.min(resume - now));
        }
        self.backoff = (self.backoff * 2).min(self.shared.config.max_transport_backoff);
        if self.shared.running.load(Ordering::Acquire) {
            info!("Resuming reads from {}", self.shared.transport.name());
        }
    }
}
