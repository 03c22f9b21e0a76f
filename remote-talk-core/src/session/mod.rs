pub mod talk_server;
pub mod task;
