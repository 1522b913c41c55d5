//! rterm: an interactive console for R with a shell passthrough mode.

pub mod app;
pub mod config;
pub mod console;
pub mod driver;
pub mod editor;
pub mod embed;
pub mod error;
pub mod interrupt;
pub mod modes;
pub mod session;
pub mod shell;
