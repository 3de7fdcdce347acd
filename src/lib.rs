pub mod config;
pub mod document;
pub mod error;
pub mod logging;
pub mod ot;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod server;
