//! In-memory serial link for tests and demos.
//!
//! [`SimulatedPort::pair`] returns the host side (a [`Port`]) and the device
//! side ([`SimulatedDevice`]). The device can inject bytes at any time, answer
//! scripted requests, and make upcoming reads fail to exercise error paths.

use {
    crate::{
        error::{Error, Result},
        port::Port,
    },
    parking_lot::{Condvar, Mutex},
    std::{
        collections::VecDeque,
        io::{self, Read, Write},
        sync::Arc,
        time::{Duration, Instant},
    },
};

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct LinkState {
    /// Bytes travelling device -> host.
    inbound: VecDeque<u8>,
    /// Everything the host ever wrote.
    outbound: Vec<u8>,
    /// Written bytes not yet matched against the script.
    unmatched: Vec<u8>,
    /// Expected request -> reply, consumed in order.
    script: VecDeque<(Vec<u8>, Vec<u8>)>,
    responder: Option<Responder>,
    failing_reads: usize,
    disconnected: bool,
}

struct Link {
    state: Mutex<LinkState>,
    changed: Condvar,
}

impl Link {
    fn on_write(&self, buf: &[u8]) {
        let mut state = self.state.lock();
        state.outbound.extend_from_slice(buf);
        state.unmatched.extend_from_slice(buf);

        let reply = state.responder.as_mut().and_then(|responder| responder(buf));
        if let Some(reply) = reply {
            state.inbound.extend(reply);
        }
        run_script(&mut state);

        self.changed.notify_all();
    }
}

fn run_script(state: &mut LinkState) {
    while let Some((request, _)) = state.script.front() {
        let Some(pos) = find(&state.unmatched, request) else {
            break;
        };
        let end = pos + request.len();
        state.unmatched.drain(..end);
        if let Some((_, reply)) = state.script.pop_front() {
            state.inbound.extend(reply);
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Host side of a simulated serial link.
pub struct SimulatedPort {
    link: Arc<Link>,
    name: String,
    timeout: Duration,
    baud_rate: u32,
    open: bool,
}

impl SimulatedPort {
    /// Create a connected host/device pair.
    pub fn pair(name: impl Into<String>) -> (Self, SimulatedDevice) {
        let link = Arc::new(Link {
            state: Mutex::new(LinkState::default()),
            changed: Condvar::new(),
        });
        let port = Self {
            link: Arc::clone(&link),
            name: name.into(),
            timeout: Duration::from_millis(100),
            baud_rate: 115200,
            open: true,
        };
        (port, SimulatedDevice { link })
    }
}

impl Read for SimulatedPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let deadline = Instant::now() + self.timeout;
        let mut state = self.link.state.lock();
        loop {
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "simulated read failure",
                ));
            }
            if state.disconnected {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "device disconnected",
                ));
            }
            if !state.inbound.is_empty() {
                break;
            }
            if self
                .link
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
            }
        }

        let n = buf.len().min(state.inbound.len());
        for (dst, src) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for SimulatedPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.link.on_write(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for SimulatedPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.link.state.lock().inbound.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone(&self) -> Result<Box<dyn Port>> {
        if !self.open {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "port closed",
            )));
        }
        Ok(Box::new(Self {
            link: Arc::clone(&self.link),
            name: self.name.clone(),
            timeout: self.timeout,
            baud_rate: self.baud_rate,
            open: true,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

/// Device side of a simulated serial link.
#[derive(Clone)]
pub struct SimulatedDevice {
    link: Arc<Link>,
}

impl SimulatedDevice {
    /// Make bytes available to the host.
    pub fn inject(&self, bytes: &[u8]) {
        self.link.state.lock().inbound.extend(bytes.iter().copied());
        self.link.changed.notify_all();
    }

    /// Reply with `reply` once the host has written `request`.
    ///
    /// Expectations are matched in the order they were added.
    pub fn expect(&self, request: impl Into<Vec<u8>>, reply: impl Into<Vec<u8>>) {
        let mut state = self.link.state.lock();
        state.script.push_back((request.into(), reply.into()));
        // The request may already be on the wire
        run_script(&mut state);
        drop(state);
        self.link.changed.notify_all();
    }

    /// Install a function that sees every host write and may answer it.
    pub fn on_request<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        self.link.state.lock().responder = Some(Box::new(responder));
    }

    /// Everything the host has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.link.state.lock().outbound.clone()
    }

    /// Block until the host has written at least `len` bytes in total.
    pub fn wait_for_written(&self, len: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.link.state.lock();
        while state.outbound.len() < len {
            if self
                .link
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.outbound.len() >= len;
            }
        }
        true
    }

    /// Make the next `count` host reads fail with an I/O error.
    pub fn fail_next_reads(&self, count: usize) {
        self.link.state.lock().failing_reads += count;
        self.link.changed.notify_all();
    }

    /// Simulate the device going away (or coming back).
    pub fn set_disconnected(&self, disconnected: bool) {
        self.link.state.lock().disconnected = disconnected;
        self.link.changed.notify_all();
    }

    /// Bytes injected but not yet read by the host.
    pub fn pending_inbound(&self) -> usize {
        self.link.state.lock().inbound.len()
    }
}
