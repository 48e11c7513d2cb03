//! Communication statistics, health signal and debug buffer.

use {
    crate::{protocol::printable, transport::TransportStats},
    log::{info, warn},
    parking_lot::Mutex,
    std::{
        collections::VecDeque,
        time::{Duration, Instant, SystemTime},
    },
};

/// Snapshot of the link statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommunicationStatistics {
    /// Bytes received from the master.
    pub bytes_read: u64,
    /// Bytes sent to the master.
    pub bytes_written: u64,
    /// When the most recent successful calls completed (oldest first).
    pub calls_succeeded: Vec<SystemTime>,
    /// When the most recent calls timed out (oldest first).
    pub calls_timedout: Vec<SystemTime>,
    /// When the last call succeeded.
    pub last_success: Option<SystemTime>,
    /// Timeouts since the last success.
    pub consecutive_failures: u32,
    /// Whether the master is considered reachable.
    pub online: bool,
}

struct Inner {
    calls_succeeded: VecDeque<SystemTime>,
    calls_timedout: VecDeque<SystemTime>,
    last_success: Option<(Instant, SystemTime)>,
    consecutive_failures: u32,
}

pub(crate) struct CallStats {
    history: usize,
    offline_threshold: u32,
    inner: Mutex<Inner>,
}

impl CallStats {
    pub(crate) fn new(history: usize, offline_threshold: u32) -> Self {
        Self {
            history: history.max(1),
            offline_threshold: offline_threshold.max(1),
            inner: Mutex::new(Inner {
                calls_succeeded: VecDeque::new(),
                calls_timedout: VecDeque::new(),
                last_success: None,
                consecutive_failures: 0,
            }),
        }
    }

    pub(crate) fn record_success(&self) {
        let now = SystemTime::now();
        let mut inner = self.inner.lock();
        if inner.consecutive_failures >= self.offline_threshold {
            info!("Master is back online");
        }
        inner.consecutive_failures = 0;
        inner.last_success = Some((Instant::now(), now));
        push_bounded(&mut inner.calls_succeeded, now, self.history);
    }

    pub(crate) fn record_timeout(&self) {
        let mut inner = self.inner.lock();
        self.count_failure(&mut inner);
        push_bounded(&mut inner.calls_timedout, SystemTime::now(), self.history);
    }

    /// A call that got an answer, but a corrupt one.
    pub(crate) fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.count_failure(&mut inner);
    }

    fn count_failure(&self, inner: &mut Inner) {
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        if inner.consecutive_failures == self.offline_threshold {
            warn!(
                "Master considered offline after {} consecutive failed calls",
                inner.consecutive_failures
            );
        }
    }

    pub(crate) fn is_online(&self) -> bool {
        self.inner.lock().consecutive_failures < self.offline_threshold
    }

    pub(crate) fn seconds_since_last_success(&self) -> f64 {
        self.inner
            .lock()
            .last_success
            .map_or(0.0, |(at, _)| at.elapsed().as_secs_f64())
    }

    pub(crate) fn snapshot(&self, transport: TransportStats) -> CommunicationStatistics {
        let inner = self.inner.lock();
        CommunicationStatistics {
            bytes_read: transport.bytes_read,
            bytes_written: transport.bytes_written,
            calls_succeeded: inner.calls_succeeded.iter().copied().collect(),
            calls_timedout: inner.calls_timedout.iter().copied().collect(),
            last_success: inner.last_success.map(|(_, at)| at),
            consecutive_failures: inner.consecutive_failures,
            online: inner.consecutive_failures < self.offline_threshold,
        }
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, max: usize) {
    queue.push_back(value);
    while queue.len() > max {
        queue.pop_front();
    }
}

/// Direction of a debug buffer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Received from the master.
    Read,
    /// Sent to the master.
    Write,
}

/// One recorded transfer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DebugEntry {
    /// When the transfer happened.
    pub at: SystemTime,
    /// Which way the bytes went.
    pub direction: Direction,
    /// Bytes rendered with [`printable`].
    pub data: String,
}

pub(crate) struct DebugBuffer {
    max_age: Duration,
    entries: Mutex<VecDeque<(Instant, DebugEntry)>>,
}

impl DebugBuffer {
    pub(crate) fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn record(&self, direction: Direction, data: &[u8]) {
        if self.max_age.is_zero() || data.is_empty() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.push_back((
            now,
            DebugEntry {
                at: SystemTime::now(),
                direction,
                data: printable(data),
            },
        ));
        while entries
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > self.max_age)
        {
            entries.pop_front();
        }
    }

    pub(crate) fn entries(&self) -> Vec<DebugEntry> {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|(at, _)| now.duration_since(*at) <= self.max_age)
            .map(|(_, entry)| entry.clone())
            .collect()
    }
}
