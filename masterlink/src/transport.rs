//! Byte-level access to the serial link.
//!
//! [`Transport`] owns two handles on the same [`Port`]: one for the reader
//! thread, one shared by writers. It knows nothing about framing; it moves
//! bytes and counts them.

use {
    crate::{error::Result, port::Port},
    log::trace,
    parking_lot::Mutex,
    std::{
        io::{ErrorKind, Read, Write},
        sync::atomic::{AtomicU64, Ordering},
        time::Duration,
    },
};

/// Cumulative byte counters of a [`Transport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransportStats {
    /// Bytes received from the master.
    pub bytes_read: u64,
    /// Bytes sent to the master.
    pub bytes_written: u64,
}

/// Serial transport with separate read and write paths.
pub struct Transport {
    reader: Mutex<Box<dyn Port>>,
    writer: Mutex<Box<dyn Port>>,
    name: String,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl Transport {
    /// Wrap an open port.
    pub fn new(port: Box<dyn Port>) -> Result<Self> {
        let reader = port.try_clone()?;
        let name = port.name().to_string();
        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(port),
            name,
            bytes_read: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    /// Open a native serial port and wrap it.
    #[cfg(feature = "native")]
    pub fn open(config: &crate::port::SerialConfig) -> Result<Self> {
        let port = crate::port::NativePort::open(config)?;
        Self::new(Box::new(port))
    }

    /// Name of the underlying port.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read up to `max_bytes`, waiting at most `timeout`.
    ///
    /// Returns an empty buffer when nothing arrived in time.
    pub fn read(&self, max_bytes: usize, timeout: Duration) -> Result<Vec<u8>> {
        let mut port = self.reader.lock();
        if port.timeout() != timeout {
            port.set_timeout(timeout)?;
        }

        let mut buf = vec![0u8; max_bytes.max(1)];
        let n = match port.read(&mut buf) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                0
            },
            Err(e) => return Err(e.into()),
        };
        buf.truncate(n);

        if n > 0 {
            self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            trace!("<- {}", crate::protocol::printable(&buf));
        }
        Ok(buf)
    }

    /// Write all bytes and flush.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        let mut port = self.writer.lock();
        port.write_all(data)?;
        port.flush()?;
        self.bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        trace!("-> {}", crate::protocol::printable(data));
        Ok(())
    }

    /// Read and discard input until the line stays quiet for `quiet`.
    ///
    /// Returns the number of bytes discarded.
    pub fn drain_input(&self, quiet: Duration) -> Result<usize> {
        let mut drained = 0;
        loop {
            let chunk = self.read(1024, quiet)?;
            if chunk.is_empty() {
                return Ok(drained);
            }
            drained += chunk.len();
        }
    }

    /// Byte counters since construction.
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::port::SimulatedPort};

    #[test]
    fn test_read_empty_on_timeout() {
        let (port, _device) = SimulatedPort::pair("sim");
        let transport = Transport::new(Box::new(port)).unwrap();

        let data = transport.read(16, Duration::from_millis(10)).unwrap();
        assert!(data.is_empty());
        assert_eq!(transport.stats(), TransportStats::default());
    }

    #[test]
    fn test_counts_bytes_both_ways() {
        let (port, device) = SimulatedPort::pair("sim");
        let transport = Transport::new(Box::new(port)).unwrap();

        transport.write(b"STRBA").unwrap();
        device.inject(b"hello");
        let data = transport.read(3, Duration::from_millis(50)).unwrap();
        assert_eq!(data, b"hel");

        assert_eq!(
            transport.stats(),
            TransportStats {
                bytes_read: 3,
                bytes_written: 5,
            }
        );
        assert_eq!(device.written(), b"STRBA");
    }

    #[test]
    fn test_io_error_propagates() {
        let (port, device) = SimulatedPort::pair("sim");
        let transport = Transport::new(Box::new(port)).unwrap();

        device.fail_next_reads(1);
        let err = transport.read(8, Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Transport);
    }

    #[test]
    fn test_drain_input_discards_pending_bytes() {
        let (port, device) = SimulatedPort::pair("sim");
        let transport = Transport::new(Box::new(port)).unwrap();

        device.inject(b"leftover CLI output");
        let drained = transport.drain_input(Duration::from_millis(10)).unwrap();
        assert_eq!(drained, 19);
        assert_eq!(device.pending_inbound(), 0);
    }
}
