use crate::models::audio_chunk::AudioFormat;
use crate::models::error::HookError;

/// Sample layout of a host playback buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferFormat {
    pub format: AudioFormat,
    pub frequency: u32,
    pub channels: u16,
}

/// The arguments of one buffer unlock/commit call, as seen by observers.
///
/// A circular playback buffer is committed as up to two regions: the tail
/// of the buffer and, on wrap-around, its head.
#[derive(Debug, Clone, Copy)]
pub struct BufferCommit<'a> {
    /// Identity of the host buffer object.
    pub buffer: usize,
    pub format: BufferFormat,
    pub regions: [&'a [u8]; 2],
}

impl BufferCommit<'_> {
    pub fn byte_len(&self) -> usize {
        self.regions[0].len() + self.regions[1].len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }

    /// The committed bytes, region 1 then region 2.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(self.byte_len());
        data.extend_from_slice(self.regions[0]);
        data.extend_from_slice(self.regions[1]);
        data
    }
}

/// Observer of the host's buffer unlock/commit calls.
///
/// Both callbacks run synchronously on the host's calling thread. Keep them
/// short and never block.
pub trait BufferCommitObserver: Send + Sync {
    fn before_unlock(&self, _commit: &BufferCommit<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// `status` is the host call's own return code.
    fn after_unlock(&self, _commit: &BufferCommit<'_>, _status: i32) -> Result<(), HookError> {
        Ok(())
    }
}
