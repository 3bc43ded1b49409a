//! Shared infrastructure: errors, configuration, the sandbox layout, the
//! SQLite broker and schemas, document migrations and trace scrubbing.

pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod migration;
pub mod sandbox;
pub mod schemas;
pub mod time;
pub mod trace;
