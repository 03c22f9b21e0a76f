pub mod buffer_commit;
pub mod observer;
