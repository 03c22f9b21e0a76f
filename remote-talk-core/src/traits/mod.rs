pub mod host_output;
pub mod talk_interface;
