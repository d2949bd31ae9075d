pub mod config;
pub mod render;
pub mod source;
pub mod watch;
