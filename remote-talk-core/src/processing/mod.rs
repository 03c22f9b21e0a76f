pub mod downmix;
pub mod pending_queue;
pub mod wav_format;
