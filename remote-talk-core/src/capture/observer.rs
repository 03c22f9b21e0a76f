use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::buffer_commit::{BufferCommit, BufferCommitObserver};
use crate::models::audio_chunk::AudioChunk;
use crate::models::error::HookError;
use crate::processing::pending_queue::PendingQueue;

/// Per-request capture settings, snapshotted by the session before the
/// engine starts and left untouched until the request has fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureSettings {
    pub force_mono: bool,
}

/// Capture counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStats {
    pub chunks: u64,
    pub bytes: u64,
    pub dropped: u64,
}

/// Copies every committed playback region into the pending queue.
///
/// Runs as an "after" observer on buffer unlock, on the host's thread. It
/// never waits for the consumer: the queue is unbounded and the only lock
/// taken is the queue's own append lock. Commits that arrive while no
/// request is active land on a closed queue and are dropped.
pub struct AudioCaptureObserver {
    queue: Arc<PendingQueue>,
    settings: RwLock<CaptureSettings>,
    chunks: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
}

impl AudioCaptureObserver {
    pub fn new(queue: Arc<PendingQueue>) -> Self {
        Self {
            queue,
            settings: RwLock::new(CaptureSettings::default()),
            chunks: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub fn set_settings(&self, settings: CaptureSettings) {
        *self.settings.write() = settings;
    }

    pub fn settings(&self) -> CaptureSettings {
        *self.settings.read()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Copy one commit into the queue. Returns `true` if a chunk was queued.
    pub fn capture(&self, commit: &BufferCommit<'_>) -> bool {
        // an empty chunk would read as end-of-speech downstream
        if commit.is_empty() {
            return false;
        }

        let mut chunk = AudioChunk::new(
            commit.format.format,
            commit.format.frequency,
            commit.format.channels,
            commit.to_vec(),
        );
        if self.settings().force_mono {
            chunk = chunk.to_mono();
            // less than one frame downmixes to nothing
            if chunk.is_sentinel() {
                log::trace!("buffer {:#x} commit shorter than a frame; not captured", commit.buffer);
                return false;
            }
        }

        let len = chunk.byte_len() as u64;
        if self.queue.push(chunk) {
            self.chunks.fetch_add(1, Ordering::Relaxed);
            self.bytes.fetch_add(len, Ordering::Relaxed);
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}

impl BufferCommitObserver for AudioCaptureObserver {
    fn after_unlock(&self, commit: &BufferCommit<'_>, status: i32) -> Result<(), HookError> {
        if status < 0 {
            log::trace!("buffer {:#x} unlock failed ({:#x}); not captured", commit.buffer, status);
            return Ok(());
        }
        self.capture(commit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::buffer_commit::BufferFormat;
    use crate::hook::registry::{dispatch, ObserverList};
    use crate::models::audio_chunk::AudioFormat;

    const STEREO_S16: BufferFormat = BufferFormat {
        format: AudioFormat::S16,
        frequency: 48000,
        channels: 2,
    };

    fn commit<'a>(a: &'a [u8], b: &'a [u8]) -> BufferCommit<'a> {
        BufferCommit {
            buffer: 0x1000,
            format: STEREO_S16,
            regions: [a, b],
        }
    }

    #[test]
    fn copies_both_regions_in_order() {
        let queue = Arc::new(PendingQueue::new());
        let observer = AudioCaptureObserver::new(queue.clone());

        observer.after_unlock(&commit(&[1, 2, 3, 4], &[5, 6, 7, 8]), 0).unwrap();

        let taken = queue.take_all();
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(taken[0].channels(), 2);
        assert_eq!(observer.stats().bytes, 8);
    }

    #[test]
    fn empty_commit_is_not_a_sentinel() {
        let queue = Arc::new(PendingQueue::new());
        let observer = AudioCaptureObserver::new(queue.clone());

        observer.after_unlock(&commit(&[], &[]), 0).unwrap();

        assert!(queue.is_empty());
        assert!(!queue.is_closed());
    }

    #[test]
    fn failed_unlock_not_captured() {
        let queue = Arc::new(PendingQueue::new());
        let observer = AudioCaptureObserver::new(queue.clone());
        observer.after_unlock(&commit(&[1, 2, 3, 4], &[]), -1).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn force_mono_downmixes() {
        let queue = Arc::new(PendingQueue::new());
        let observer = AudioCaptureObserver::new(queue.clone());
        observer.set_settings(CaptureSettings { force_mono: true });

        let data: Vec<u8> = [10i16, 30, -10, -30].iter().flat_map(|s| s.to_le_bytes()).collect();
        observer.capture(&commit(&data, &[]));

        let chunk = &queue.take_all()[0];
        assert_eq!(chunk.channels(), 1);
        let expected: Vec<u8> = [20i16, -20].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(chunk.data(), expected.as_slice());
    }

    #[test]
    fn partial_frame_with_force_mono_keeps_queue_open() {
        let queue = Arc::new(PendingQueue::new());
        let observer = AudioCaptureObserver::new(queue.clone());
        observer.set_settings(CaptureSettings { force_mono: true });

        // half of one stereo S16 frame
        assert!(!observer.capture(&commit(&[1, 2], &[])));
        assert!(!queue.is_closed());
        assert!(queue.is_empty());

        let data: Vec<u8> = [10i16, 30].iter().flat_map(|s| s.to_le_bytes()).collect();
        assert!(observer.capture(&commit(&data, &[])));
        let taken = queue.take_all();
        assert_eq!(taken.len(), 1);
        assert!(!taken[0].is_sentinel());
        assert_eq!(observer.stats().chunks, 1);
    }

    #[test]
    fn closed_queue_counts_drops() {
        let queue = Arc::new(PendingQueue::closed());
        let observer = AudioCaptureObserver::new(queue.clone());
        assert!(!observer.capture(&commit(&[1, 2, 3, 4], &[])));
        assert_eq!(observer.stats().dropped, 1);
        assert_eq!(observer.stats().chunks, 0);
    }

    #[test]
    fn runs_as_after_observer_in_dispatch() {
        let queue = Arc::new(PendingQueue::new());
        let observers: ObserverList<dyn BufferCommitObserver> = ObserverList::new();
        observers.add(Arc::new(AudioCaptureObserver::new(queue.clone())));

        let region = [9u8; 16];
        let c = commit(&region, &[]);
        let status = dispatch(
            &observers,
            "Unlock",
            |o| o.before_unlock(&c),
            || {
                // nothing captured before the host call completes
                assert!(queue.is_empty());
                0
            },
            |o, s| o.after_unlock(&c, *s),
        );

        assert_eq!(status, 0);
        assert_eq!(queue.take_all()[0].byte_len(), 16);
    }
}
