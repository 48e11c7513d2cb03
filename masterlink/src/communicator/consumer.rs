//! Background consumers: standing listeners for unsolicited frames.
//!
//! Handlers run on the reader thread. They must return quickly: anything
//! slower than pushing onto a queue stalls every other frame on the link.
//! [`ChannelHandler`] is the handler to reach for; closures are accepted for
//! trivial bookkeeping.

use {
    crate::protocol::{CommandSpec, Fields, MatchHint},
    crossbeam_channel::{Sender, TrySendError},
    log::{error, warn},
    parking_lot::RwLock,
    std::{
        panic::{AssertUnwindSafe, catch_unwind},
        sync::Arc,
    },
};

/// Error a handler may report. Logged, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of decoded frames for one [`BackgroundConsumer`].
///
/// Called on the reader thread; implementations must not block.
pub trait ConsumerHandler: Send + Sync {
    /// Handle one decoded frame.
    fn handle(&self, fields: &Fields) -> Result<(), HandlerError>;
}

impl<F> ConsumerHandler for F
where
    F: Fn(&Fields) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, fields: &Fields) -> Result<(), HandlerError> {
        self(fields)
    }
}

/// Handler that forwards frames to a channel without blocking.
///
/// A full channel drops the frame with a warning.
pub struct ChannelHandler {
    tx: Sender<Fields>,
}

impl ChannelHandler {
    /// Forward into `tx`.
    pub fn new(tx: Sender<Fields>) -> Self {
        Self { tx }
    }
}

impl ConsumerHandler for ChannelHandler {
    fn handle(&self, fields: &Fields) -> Result<(), HandlerError> {
        match self.tx.try_send(fields.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("Consumer channel full, dropping frame");
                Ok(())
            },
            Err(TrySendError::Disconnected(_)) => Err("consumer channel disconnected".into()),
        }
    }
}

/// A registration for unsolicited frames of one command shape.
pub struct BackgroundConsumer {
    command: &'static CommandSpec,
    hint: MatchHint,
    handler: Box<dyn ConsumerHandler>,
    passthrough: bool,
}

impl BackgroundConsumer {
    /// Listen for `command` frames carrying correlation id `cid`.
    ///
    /// Events from the master normally carry id 0.
    pub fn new(
        command: &'static CommandSpec,
        cid: u8,
        handler: impl ConsumerHandler + 'static,
    ) -> Self {
        Self::with_hint(command, MatchHint::cid(cid), handler)
    }

    /// Listen for `command` frames with a closure as handler.
    pub fn from_fn<F>(command: &'static CommandSpec, cid: u8, handler: F) -> Self
    where
        F: Fn(&Fields) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self::new(command, cid, handler)
    }

    /// Listen for `command` frames with an explicit disambiguation hint.
    pub fn with_hint(
        command: &'static CommandSpec,
        hint: MatchHint,
        handler: impl ConsumerHandler + 'static,
    ) -> Self {
        Self {
            command,
            hint,
            handler: Box::new(handler),
            passthrough: false,
        }
    }

    /// Also forward the raw frame bytes to the passthrough buffer.
    #[must_use]
    pub fn with_passthrough(mut self, passthrough: bool) -> Self {
        self.passthrough = passthrough;
        self
    }

    /// Command shape this consumer listens for.
    pub fn command(&self) -> &'static CommandSpec {
        self.command
    }

    /// Disambiguation hint.
    pub fn hint(&self) -> MatchHint {
        self.hint
    }

    /// Whether matched frames are also forwarded to passthrough.
    pub fn forwards_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Run the handler, containing errors and panics.
    pub(crate) fn deliver(&self, fields: &Fields) {
        let action = self.command.action();
        match catch_unwind(AssertUnwindSafe(|| self.handler.handle(fields))) {
            Ok(Ok(())) => {},
            Ok(Err(e)) => error!("Background consumer for {action} failed: {e}"),
            Err(_) => error!("Background consumer for {action} panicked"),
        }
    }
}

/// Consumers in registration order.
///
/// The reader takes a cheap snapshot per iteration, so registering never
/// waits on frame processing.
#[derive(Default)]
pub(crate) struct ConsumerRegistry {
    consumers: RwLock<Arc<Vec<Arc<BackgroundConsumer>>>>,
}

impl ConsumerRegistry {
    /// Append a consumer. Registering the same consumer twice is a no-op.
    pub(crate) fn register(&self, consumer: Arc<BackgroundConsumer>) -> bool {
        let mut consumers = self.consumers.write();
        if consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            return false;
        }
        let mut next = Vec::with_capacity(consumers.len() + 1);
        next.extend(consumers.iter().cloned());
        next.push(consumer);
        *consumers = Arc::new(next);
        true
    }

    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<BackgroundConsumer>>> {
        Arc::clone(&self.consumers.read())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::protocol::api,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn test_register_is_idempotent() {
        let registry = ConsumerRegistry::default();
        let consumer = Arc::new(BackgroundConsumer::from_fn(
            api::output_list(),
            0,
            |_| Ok(()),
        ));

        assert!(registry.register(Arc::clone(&consumer)));
        assert!(!registry.register(consumer));
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_deliver_contains_panics() {
        let consumer = BackgroundConsumer::from_fn(api::output_list(), 0, |_| panic!("boom"));
        consumer.deliver(&Fields::new());
    }

    #[test]
    fn test_closure_handler_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let consumer = BackgroundConsumer::from_fn(api::output_list(), 0, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        consumer.deliver(&Fields::new());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_channel_handler_never_blocks() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let handler = ChannelHandler::new(tx);
        let fields = Fields::new().with("x", 1u8);

        handler.handle(&fields).unwrap();
        // Second frame is dropped rather than blocking the reader
        handler.handle(&fields).unwrap();
        assert_eq!(rx.len(), 1);

        drop(rx);
        assert!(handler.handle(&fields).is_err());
    }
}
