//! The master communicator.
//!
//! A [`MasterCommunicator`] multiplexes one serial link between:
//!
//! - synchronous commands ([`MasterCommunicator::do_command`]), one in
//!   flight at a time, correlated to their reply by command id
//! - background consumers for unsolicited frames from the master
//! - a maintenance session (the master's interactive CLI)
//! - a passthrough relay for a device sharing the link
//!
//! ```text
//!   callers ──do_command──►┐                 ┌──► pending reply (oneshot)
//!                          │   Transport     │
//!   maintenance / ─────────┼──► write ──►    │──► background consumers
//!   passthrough writes     │   ◄── read ◄────┤
//!                          │   reader loop   └──► maintenance / passthrough
//! ```
//!
//! Lock order is correlator slot, then mode, then the transport writer.

mod config;
mod consumer;
mod mode;
mod passthrough;
mod pending;
mod reader;
mod stats;

pub use {
    config::{CommunicatorConfig, DEFAULT_COMMAND_TIMEOUT, DEFAULT_READ_TIMEOUT},
    consumer::{BackgroundConsumer, ChannelHandler, ConsumerHandler, HandlerError},
    mode::Mode,
    stats::{CommunicationStatistics, DebugEntry, Direction},
};
use {
    crate::{
        error::{Error, ErrorKind, Result},
        protocol::{CommandSpec, Fields, api},
        transport::Transport,
    },
    consumer::ConsumerRegistry,
    log::{debug, error, info, warn},
    parking_lot::Mutex,
    passthrough::ChunkQueue,
    pending::{Correlator, PendingRequest},
    stats::{CallStats, DebugBuffer},
    std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
        time::{Duration, Instant},
    },
};

/// Leaves the master's CLI.
const EXIT_MAINTENANCE: &[u8] = b"exit\r\n";

/// The instant `timeout` from now, or `None` (no deadline) when that lies
/// beyond what [`Instant`] can represent.
pub(crate) fn deadline(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// State shared between callers and the reader thread.
pub(crate) struct Shared {
    transport: Arc<Transport>,
    config: CommunicatorConfig,
    correlator: Correlator,
    consumers: ConsumerRegistry,
    mode: Mutex<Mode>,
    passthrough_enabled: AtomicBool,
    passthrough: ChunkQueue,
    maintenance: ChunkQueue,
    stats: CallStats,
    debug: DebugBuffer,
    running: AtomicBool,
}

impl Shared {
    fn write(&self, data: &[u8]) -> Result<()> {
        self.transport.write(data)?;
        self.debug.record(Direction::Write, data);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Protocol engine for one master link.
pub struct MasterCommunicator {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl MasterCommunicator {
    /// Create a communicator over `transport`. Call [`start`](Self::start)
    /// before issuing commands.
    pub fn new(transport: Transport, config: CommunicatorConfig) -> Self {
        Self::with_shared_transport(Arc::new(transport), config)
    }

    /// Like [`new`](Self::new), keeping a handle on the transport.
    pub fn with_shared_transport(transport: Arc<Transport>, config: CommunicatorConfig) -> Self {
        let shared = Shared {
            transport,
            correlator: Correlator::new(),
            consumers: ConsumerRegistry::default(),
            mode: Mutex::new(Mode::Normal),
            passthrough_enabled: AtomicBool::new(false),
            passthrough: ChunkQueue::new("Passthrough", config.passthrough_capacity),
            maintenance: ChunkQueue::new("Maintenance", config.passthrough_capacity),
            stats: CallStats::new(config.call_history, config.offline_threshold),
            debug: DebugBuffer::new(config.debug_buffer_duration),
            running: AtomicBool::new(false),
            config,
        };
        Self {
            shared: Arc::new(shared),
            reader: Mutex::new(None),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &CommunicatorConfig {
        &self.shared.config
    }

    /// Name of the underlying port.
    pub fn port_name(&self) -> &str {
        self.shared.transport.name()
    }

    /// Start the reader thread. Starting twice is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return Ok(());
        }
        if self.shared.config.init_master {
            self.init_master()?;
        }

        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("masterlink-reader".to_string())
            .spawn(move || reader::run(shared))
            .inspect_err(|_| self.shared.running.store(false, Ordering::Release))?;
        *reader = Some(handle);
        info!("Communicator started on {}", self.port_name());
        Ok(())
    }

    /// Stop the reader thread and fail the outstanding request. Stopping a
    /// stopped communicator is a no-op.
    pub fn stop(&self) {
        let Some(handle) = self.reader.lock().take() else {
            return;
        };
        self.shared.running.store(false, Ordering::Release);
        self.shared.correlator.fail(|_| Error::NotRunning);
        if handle.join().is_err() {
            error!("Reader thread panicked");
        }
        info!("Communicator on {} stopped", self.port_name());
    }

    /// Whether the reader thread is running.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Bring a master that was left in CLI mode back to API mode.
    fn init_master(&self) -> Result<()> {
        info!("Initializing master on {}", self.port_name());
        let quiet = self.shared.config.read_timeout;
        let mut wake = vec![b' '; 18];
        wake.extend_from_slice(b"\r\n");
        for chunk in [wake.as_slice(), EXIT_MAINTENANCE, &[b' '; 10][..]] {
            self.shared.write(chunk)?;
            let drained = self.shared.transport.drain_input(quiet)?;
            debug!("Drained {drained} bytes after init sequence step");
        }
        Ok(())
    }

    /// Register a listener for unsolicited frames.
    ///
    /// Consumers are tried in registration order; registering the same
    /// consumer twice is a no-op.
    pub fn register_consumer(&self, consumer: impl Into<Arc<BackgroundConsumer>>) {
        let consumer = consumer.into();
        let action = consumer.command().action();
        if self.shared.consumers.register(consumer) {
            debug!("Registered background consumer for {action}");
        }
    }

    /// Send `command` and wait for its reply with the default timeout.
    pub fn do_command(&self, command: &'static CommandSpec, fields: &Fields) -> Result<Fields> {
        self.do_command_with_timeout(command, fields, self.shared.config.default_timeout)
    }

    /// Send `command` and wait up to `timeout` for its reply.
    ///
    /// The deadline covers waiting for the link as well as for the reply.
    /// Commands without a reply shape return empty fields once written.
    pub fn do_command_with_timeout(
        &self,
        command: &'static CommandSpec,
        fields: &Fields,
        timeout: Duration,
    ) -> Result<Fields> {
        let result = self.execute(command, fields, timeout);
        match &result {
            Ok(_) if command.expects_reply() => self.shared.stats.record_success(),
            Err(e) if e.kind() == ErrorKind::Timeout => {
                warn!("{e}");
                self.shared.stats.record_timeout();
            },
            Err(e) if e.kind() == ErrorKind::Checksum => self.shared.stats.record_failure(),
            _ => {},
        }
        result
    }

    fn execute(
        &self,
        command: &'static CommandSpec,
        fields: &Fields,
        timeout: Duration,
    ) -> Result<Fields> {
        if !self.shared.is_running() {
            return Err(Error::NotRunning);
        }
        let timed_out = || Error::CommunicationTimedOut {
            command: command.action(),
            timeout,
        };
        let deadline = deadline(timeout);
        let (tx, rx) = crossbeam_channel::bounded(1);

        let cid = {
            let Some(mut slot) = self.shared.correlator.acquire(deadline) else {
                return Err(timed_out());
            };
            if !self.shared.is_running() {
                return Err(Error::NotRunning);
            }
            match *self.shared.mode.lock() {
                Mode::Maintenance => return Err(Error::InMaintenanceMode),
                Mode::PassthroughOnly => return Err(Error::InPassthroughMode),
                Mode::Normal => {},
            }

            let cid = slot.next_cid();
            let request = command.create_input(cid, fields)?;
            if command.expects_reply() {
                slot.set(PendingRequest {
                    command,
                    cid,
                    timeout,
                    reply: tx,
                });
            }
            if let Err(e) = self.shared.write(&request) {
                slot.clear();
                drop(slot);
                self.shared.correlator.release();
                return Err(e);
            }
            cid
        };

        if !command.expects_reply() {
            return Ok(Fields::new());
        }
        let received = match deadline {
            Some(deadline) => rx.recv_deadline(deadline).ok(),
            None => rx.recv().ok(),
        };
        match received {
            Some(result) => result,
            None if self.shared.correlator.abandon(cid) => Err(timed_out()),
            // Resolved between the timeout and the abandon
            None => rx.try_recv().unwrap_or_else(|_| Err(timed_out())),
        }
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        *self.shared.mode.lock()
    }

    /// Whether the maintenance session is open.
    pub fn in_maintenance_mode(&self) -> bool {
        self.mode() == Mode::Maintenance
    }

    /// Switch the master to its interactive CLI.
    ///
    /// An outstanding request gets [`maintenance_drain`] to finish before it
    /// is failed with [`Error::InMaintenanceMode`].
    ///
    /// [`maintenance_drain`]: CommunicatorConfig::maintenance_drain
    pub fn start_maintenance_mode(&self) -> Result<()> {
        if !self.shared.is_running() {
            return Err(Error::NotRunning);
        }
        {
            let mut mode = self.shared.mode.lock();
            match *mode {
                Mode::Maintenance => return Err(Error::InMaintenanceMode),
                Mode::PassthroughOnly => return Err(Error::InPassthroughMode),
                Mode::Normal => *mode = Mode::Maintenance,
            }
        }

        let drain = deadline(self.shared.config.maintenance_drain);
        if !self.shared.correlator.wait_idle(drain) {
            self.shared.correlator.fail(|_| Error::InMaintenanceMode);
        }
        self.shared.maintenance.clear();

        let request = api::to_cli_mode().create_input(0, &Fields::new())?;
        if let Err(e) = self.shared.write(&request) {
            *self.shared.mode.lock() = Mode::Normal;
            return Err(e);
        }
        info!("Entered maintenance mode");
        Ok(())
    }

    /// Next chunk of maintenance output, waiting up to `timeout`.
    pub fn get_maintenance_data(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if !self.in_maintenance_mode() {
            return Err(Error::NotInMaintenanceMode);
        }
        Ok(self.shared.maintenance.pop(timeout))
    }

    /// Send raw bytes to the master's CLI.
    pub fn send_maintenance_data(&self, data: &[u8]) -> Result<()> {
        let mode = self.shared.mode.lock();
        if *mode != Mode::Maintenance {
            return Err(Error::NotInMaintenanceMode);
        }
        self.shared.write(data)
    }

    /// Leave the master's CLI and accept commands again.
    pub fn stop_maintenance_mode(&self) -> Result<()> {
        let mut mode = self.shared.mode.lock();
        if *mode != Mode::Maintenance {
            return Err(Error::NotInMaintenanceMode);
        }
        self.shared.write(EXIT_MAINTENANCE)?;
        *mode = Mode::Normal;
        drop(mode);
        info!("Left maintenance mode");
        Ok(())
    }

    /// Start buffering unclaimed inbound bytes for the passthrough device.
    pub fn enable_passthrough(&self) {
        if !self.shared.passthrough_enabled.swap(true, Ordering::AcqRel) {
            debug!("Passthrough enabled");
        }
    }

    /// Whether passthrough is enabled.
    pub fn passthrough_enabled(&self) -> bool {
        self.shared.passthrough_enabled.load(Ordering::Acquire)
    }

    /// Write raw bytes on behalf of the passthrough device.
    pub fn send_passthrough_data(&self, data: &[u8]) -> Result<()> {
        let mode = self.shared.mode.lock();
        if *mode == Mode::Maintenance {
            return Err(Error::InMaintenanceMode);
        }
        if !self.passthrough_enabled() {
            return Err(Error::PassthroughDisabled);
        }
        self.shared.write(data)
    }

    /// Next chunk for the passthrough device, waiting up to `timeout`.
    pub fn get_passthrough_data(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        if !self.passthrough_enabled() {
            return Err(Error::PassthroughDisabled);
        }
        Ok(self.shared.passthrough.pop(timeout))
    }

    /// Hand the whole link to the passthrough device.
    ///
    /// Commands are rejected with [`Error::InPassthroughMode`] until
    /// [`stop_passthrough_only`](Self::stop_passthrough_only). An outstanding
    /// request can still receive its reply for up to [`maintenance_drain`]
    /// before it is failed.
    ///
    /// [`maintenance_drain`]: CommunicatorConfig::maintenance_drain
    pub fn start_passthrough_only(&self) -> Result<()> {
        {
            let mut mode = self.shared.mode.lock();
            match *mode {
                Mode::Maintenance => return Err(Error::InMaintenanceMode),
                Mode::PassthroughOnly => return Ok(()),
                Mode::Normal => *mode = Mode::PassthroughOnly,
            }
        }
        self.enable_passthrough();

        let drain = deadline(self.shared.config.maintenance_drain);
        if !self.shared.correlator.wait_idle(drain) {
            self.shared.correlator.fail(|_| Error::InPassthroughMode);
        }
        info!("Entered passthrough-only mode");
        Ok(())
    }

    /// Return from passthrough-only mode. A no-op in any other mode.
    pub fn stop_passthrough_only(&self) -> Result<()> {
        let mut mode = self.shared.mode.lock();
        if *mode == Mode::PassthroughOnly {
            *mode = Mode::Normal;
            drop(mode);
            info!("Left passthrough-only mode");
        }
        Ok(())
    }

    /// Snapshot of the byte counters and call history.
    pub fn get_communication_statistics(&self) -> CommunicationStatistics {
        self.shared.stats.snapshot(self.shared.transport.stats())
    }

    /// Seconds since the last successful call; 0 if there was none yet.
    pub fn seconds_since_last_success(&self) -> f64 {
        self.shared.stats.seconds_since_last_success()
    }

    /// Whether the master answers.
    ///
    /// Turns false after [`offline_threshold`] consecutive timeouts or
    /// checksum failures and back on the next successful call.
    ///
    /// [`offline_threshold`]: CommunicatorConfig::offline_threshold
    pub fn is_online(&self) -> bool {
        self.shared.stats.is_online()
    }

    /// Recent transfers, oldest first.
    pub fn debug_buffer(&self) -> Vec<DebugEntry> {
        self.shared.debug.entries()
    }
}

impl Drop for MasterCommunicator {
    fn drop(&mut self) {
        self.stop();
    }
}
