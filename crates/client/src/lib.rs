pub mod api;
pub mod channel;
pub mod config;
pub mod console;
pub mod dedup;
pub mod error;
pub mod interaction;
pub mod runtime;
pub mod store;
pub mod sync;
