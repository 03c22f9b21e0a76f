use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::audio_chunk::AudioChunk;

#[derive(Debug, Default)]
struct QueueInner {
    chunks: Vec<AudioChunk>,
    closed: bool,
}

/// Ordered hand-off of captured chunks from the host's calling thread to a
/// single drain task.
///
/// - Append never blocks on the consumer and capacity is unbounded.
/// - [`take_all`](Self::take_all) swaps the whole queue out under the lock,
///   so the producer never observes a partially drained queue.
/// - The queue has an open/closed gate. Appending the sentinel closes it in
///   the same critical section, so nothing captured after end-of-speech can
///   follow the sentinel. Appends to a closed queue are dropped.
#[derive(Debug, Default)]
pub struct PendingQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl PendingQueue {
    /// An open, empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// A closed, empty queue. Nothing is accepted until [`reopen`](Self::reopen).
    pub fn closed() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                chunks: Vec::new(),
                closed: true,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a data chunk. Returns `false` if the queue is closed or the
    /// chunk is empty.
    ///
    /// An empty chunk is the sentinel, and only
    /// [`close_with_sentinel`](Self::close_with_sentinel) appends that.
    pub fn push(&self, chunk: AudioChunk) -> bool {
        if chunk.is_sentinel() {
            log::trace!("empty chunk refused");
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.chunks.push(chunk);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Append the end-of-speech sentinel and close the queue.
    ///
    /// Returns `false` (and appends nothing) if the queue was already closed,
    /// so the sentinel is emitted at most once per open/close cycle.
    pub fn close_with_sentinel(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        inner.chunks.push(AudioChunk::sentinel());
        inner.closed = true;
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Reopen the queue for a new request, discarding anything left over.
    pub fn reopen(&self) {
        let mut inner = self.inner.lock();
        if !inner.chunks.is_empty() {
            log::warn!("discarding {} stale chunks on reopen", inner.chunks.len());
            inner.chunks.clear();
        }
        inner.closed = false;
    }

    /// Close the queue without a sentinel.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Take every queued chunk, leaving the queue empty.
    pub fn take_all(&self) -> Vec<AudioChunk> {
        std::mem::take(&mut self.inner.lock().chunks)
    }

    /// Like [`take_all`](Self::take_all), but waits up to `timeout` for the
    /// queue to become non-empty first.
    pub fn wait_take_all(&self, timeout: Duration) -> Vec<AudioChunk> {
        let mut inner = self.inner.lock();
        if inner.chunks.is_empty() {
            let _ = self.available.wait_for(&mut inner, timeout);
        }
        std::mem::take(&mut inner.chunks)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;
    use crate::models::audio_chunk::AudioFormat;

    fn chunk(tag: u8, len: usize) -> AudioChunk {
        AudioChunk::new(AudioFormat::S16, 48000, 1, vec![tag; len])
    }

    #[test]
    fn drain_returns_append_order_then_empty() {
        let queue = PendingQueue::new();
        let appended: Vec<AudioChunk> = (1..=5).map(|i| chunk(i, i as usize * 2)).collect();
        for c in &appended {
            assert!(queue.push(c.clone()));
        }

        assert_eq!(queue.take_all(), appended);
        assert!(queue.take_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn sentinel_closes_queue() {
        let queue = PendingQueue::new();
        queue.push(chunk(1, 4));
        assert!(queue.close_with_sentinel());
        assert!(!queue.push(chunk(2, 4)));
        assert!(!queue.close_with_sentinel());

        let taken = queue.take_all();
        assert_eq!(taken.len(), 2);
        assert!(taken[1].is_sentinel());
    }

    #[test]
    fn empty_chunk_does_not_close_queue() {
        let queue = PendingQueue::new();
        assert!(!queue.push(AudioChunk::sentinel()));
        assert!(!queue.is_closed());
        assert!(queue.is_empty());

        assert!(queue.push(chunk(1, 4)));
        assert_eq!(queue.take_all().len(), 1);
    }

    #[test]
    fn closed_queue_drops_until_reopened() {
        let queue = PendingQueue::closed();
        assert!(!queue.push(chunk(1, 2)));
        assert!(queue.is_empty());

        queue.reopen();
        assert!(queue.push(chunk(1, 2)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn reopen_discards_leftovers() {
        let queue = PendingQueue::new();
        queue.push(chunk(1, 2));
        queue.close();
        queue.reopen();
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_take_all_times_out_empty() {
        let queue = PendingQueue::new();
        let start = Instant::now();
        assert!(queue.wait_take_all(Duration::from_millis(20)).is_empty());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn wait_take_all_wakes_on_push() {
        let queue = Arc::new(PendingQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(chunk(7, 4));
            })
        };

        let mut got = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while got.is_empty() && Instant::now() < deadline {
            got = queue.wait_take_all(Duration::from_secs(1));
        }
        producer.join().unwrap();
        assert_eq!(got, vec![chunk(7, 4)]);
    }

    #[test]
    fn concurrent_producer_preserves_order() {
        let queue = Arc::new(PendingQueue::new());
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..200u8 {
                    queue.push(chunk(i, 1));
                }
                queue.close_with_sentinel();
            })
        };

        let mut seen = Vec::new();
        'drain: loop {
            for c in queue.wait_take_all(Duration::from_millis(5)) {
                if c.is_sentinel() {
                    break 'drain;
                }
                seen.push(c.data()[0]);
            }
        }
        producer.join().unwrap();
        assert_eq!(seen, (0..200u8).collect::<Vec<_>>());
    }
}
