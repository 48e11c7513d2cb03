//! Bounded FIFO of byte chunks with a blocking, timed pop.
//!
//! Backs both the passthrough relay and the maintenance data channel.

use {
    log::warn,
    parking_lot::{Condvar, Mutex},
    std::{collections::VecDeque, time::Duration},
};

pub(crate) struct ChunkQueue {
    label: &'static str,
    capacity: usize,
    chunks: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
}

impl ChunkQueue {
    pub(crate) fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            capacity: capacity.max(1),
            chunks: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Append a chunk, dropping the oldest one when full.
    pub(crate) fn push(&self, chunk: Vec<u8>) {
        if chunk.is_empty() {
            return;
        }
        let mut chunks = self.chunks.lock();
        if chunks.len() >= self.capacity {
            let dropped = chunks.pop_front().map_or(0, |c| c.len());
            warn!(
                "{} buffer full ({} chunks), dropping {dropped} oldest bytes",
                self.label, self.capacity
            );
        }
        chunks.push_back(chunk);
        drop(chunks);
        self.available.notify_one();
    }

    /// Pop the oldest chunk, waiting up to `timeout`.
    ///
    /// A timeout too large for a deadline waits until a chunk arrives.
    pub(crate) fn pop(&self, timeout: Duration) -> Option<Vec<u8>> {
        let deadline = super::deadline(timeout);
        let mut chunks = self.chunks.lock();
        loop {
            if let Some(chunk) = chunks.pop_front() {
                return Some(chunk);
            }
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut chunks, deadline).timed_out() {
                        return chunks.pop_front();
                    }
                },
                None => self.available.wait(&mut chunks),
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.chunks.lock().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.chunks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::sync::Arc, std::thread};

    #[test]
    fn test_fifo_order() {
        let queue = ChunkQueue::new("test", 4);
        queue.push(b"hello".to_vec());
        queue.push(b"world".to_vec());

        assert_eq!(queue.pop(Duration::ZERO).as_deref(), Some(&b"hello"[..]));
        assert_eq!(queue.pop(Duration::ZERO).as_deref(), Some(&b"world"[..]));
        assert_eq!(queue.pop(Duration::from_millis(5)), None);
    }

    #[test]
    fn test_drops_oldest_when_full() {
        let queue = ChunkQueue::new("test", 2);
        queue.push(vec![1]);
        queue.push(vec![2]);
        queue.push(vec![3]);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(Duration::ZERO), Some(vec![2]));
        assert_eq!(queue.pop(Duration::ZERO), Some(vec![3]));
    }

    #[test]
    fn test_empty_chunks_are_ignored() {
        let queue = ChunkQueue::new("test", 2);
        queue.push(Vec::new());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pop_wakes_on_push() {
        let queue = Arc::new(ChunkQueue::new("test", 2));
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(b"late".to_vec());
        });

        assert_eq!(queue.pop(Duration::from_secs(2)), Some(b"late".to_vec()));
        handle.join().unwrap();
    }

    #[test]
    fn test_unbounded_timeout_waits_for_push() {
        let queue = Arc::new(ChunkQueue::new("test", 2));
        let producer = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(b"eventually".to_vec());
        });

        assert_eq!(queue.pop(Duration::MAX), Some(b"eventually".to_vec()));
        handle.join().unwrap();
    }
}
