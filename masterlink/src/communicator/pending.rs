//! Single-slot request/reply correlation.
//!
//! At most one request is outstanding. Its caller waits on a oneshot channel
//! that the reader thread (or a mode switch) resolves exactly once.

use {
    crate::{
        error::{Error, Result},
        protocol::{CommandSpec, Fields},
    },
    crossbeam_channel::Sender,
    log::debug,
    parking_lot::{Condvar, Mutex, MutexGuard},
    std::{collections::VecDeque, time::Instant},
};

/// Abandoned requests remembered for late-reply discard.
const ABANDONED_HISTORY: usize = 8;

pub(crate) struct PendingRequest {
    pub(crate) command: &'static CommandSpec,
    pub(crate) cid: u8,
    pub(crate) timeout: std::time::Duration,
    pub(crate) reply: Sender<Result<Fields>>,
}

pub(crate) struct Slot {
    pending: Option<PendingRequest>,
    abandoned: VecDeque<(&'static CommandSpec, u8)>,
    last_cid: u8,
}

impl Slot {
    /// Next correlation id: 1..=255, never 0.
    pub(crate) fn next_cid(&mut self) -> u8 {
        self.last_cid = self.last_cid % 255 + 1;
        self.last_cid
    }

    pub(crate) fn set(&mut self, request: PendingRequest) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(request);
    }

    pub(crate) fn clear(&mut self) {
        self.pending = None;
    }
}

pub(crate) struct Correlator {
    slot: Mutex<Slot>,
    free: Condvar,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                abandoned: VecDeque::new(),
                last_cid: 0,
            }),
            free: Condvar::new(),
        }
    }

    /// Wait until no request is outstanding.
    ///
    /// Returns `None` if the slot is still taken at `deadline`. Without a
    /// deadline this waits as long as it takes.
    pub(crate) fn acquire(&self, deadline: Option<Instant>) -> Option<MutexGuard<'_, Slot>> {
        let mut slot = self.slot.lock();
        while slot.pending.is_some() {
            match deadline {
                Some(deadline) => {
                    if self.free.wait_until(&mut slot, deadline).timed_out()
                        && slot.pending.is_some()
                    {
                        return None;
                    }
                },
                None => self.free.wait(&mut slot),
            }
        }
        Some(slot)
    }

    /// Wake callers waiting in [`Correlator::acquire`].
    pub(crate) fn release(&self) {
        self.free.notify_all();
    }

    /// Wait up to `deadline` for the outstanding request to finish.
    pub(crate) fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut slot = self.slot.lock();
        while slot.pending.is_some() {
            match deadline {
                Some(deadline) => {
                    if self.free.wait_until(&mut slot, deadline).timed_out() {
                        return slot.pending.is_none();
                    }
                },
                None => self.free.wait(&mut slot),
            }
        }
        true
    }

    /// Command and correlation id of the outstanding request.
    pub(crate) fn current(&self) -> Option<(&'static CommandSpec, u8)> {
        self.slot
            .lock()
            .pending
            .as_ref()
            .map(|p| (p.command, p.cid))
    }

    /// Deliver the outcome of request `cid`.
    ///
    /// Returns false if that request is no longer outstanding.
    pub(crate) fn resolve(&self, cid: u8, result: Result<Fields>) -> bool {
        let mut slot = self.slot.lock();
        if !slot.pending.as_ref().is_some_and(|p| p.cid == cid) {
            return false;
        }
        if let Some(request) = slot.pending.take() {
            // The caller may have given up already; a full or closed channel is fine
            let _ = request.reply.try_send(result);
        }
        drop(slot);
        self.free.notify_all();
        true
    }

    /// The caller of `cid` stopped waiting. Frees the slot if it is still taken.
    ///
    /// Returns false if the request was resolved in the meantime.
    pub(crate) fn abandon(&self, cid: u8) -> bool {
        let mut slot = self.slot.lock();
        if !slot.pending.as_ref().is_some_and(|p| p.cid == cid) {
            return false;
        }
        if let Some(request) = slot.pending.take() {
            remember(&mut slot.abandoned, request.command, request.cid);
        }
        drop(slot);
        self.free.notify_all();
        true
    }

    /// Fail the outstanding request, if any, with the error built by `make`.
    pub(crate) fn fail(&self, make: impl FnOnce(&PendingRequest) -> Error) -> bool {
        let mut slot = self.slot.lock();
        let Some(request) = slot.pending.take() else {
            return false;
        };
        debug!(
            "Failing outstanding {} (cid {})",
            request.command.action(),
            request.cid
        );
        let _ = request.reply.try_send(Err(make(&request)));
        remember(&mut slot.abandoned, request.command, request.cid);
        drop(slot);
        self.free.notify_all();
        true
    }

    /// Requests whose replies may still arrive.
    pub(crate) fn abandoned(&self) -> Vec<(&'static CommandSpec, u8)> {
        self.slot.lock().abandoned.iter().copied().collect()
    }

    /// Forget an abandoned request once its late reply has been discarded.
    pub(crate) fn forget(&self, action: &str, cid: u8) {
        self.slot
            .lock()
            .abandoned
            .retain(|(c, id)| !(c.action() == action && *id == cid));
    }
}

fn remember(
    abandoned: &mut VecDeque<(&'static CommandSpec, u8)>,
    command: &'static CommandSpec,
    cid: u8,
) {
    if !command.expects_reply() {
        return;
    }
    abandoned.push_back((command, cid));
    while abandoned.len() > ABANDONED_HISTORY {
        abandoned.pop_front();
    }
}
