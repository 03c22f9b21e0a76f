pub mod audio_chunk;
pub mod config;
pub mod error;
pub mod state;
pub mod stats;
