pub mod cache;
pub mod config;
pub mod db;
pub mod dirs;
pub mod domain;
pub mod email;
pub mod federation;
pub mod processing;
pub mod scheduler;
pub mod stream;
pub mod timeline;
pub mod worker;

mod daemon;
pub use daemon::{Daemon, Pipeline, RuntimeConfig};
