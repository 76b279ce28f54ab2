//! Core domain + application logic for the Paperboy print bot.
//!
//! This crate is framework-agnostic. Telegram and the CUPS/IPP spooler live
//! behind ports (traits) implemented in adapter crates.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flow;
pub mod job;
pub mod logging;
pub mod media;
pub mod messaging;
pub mod pending;
pub mod printer;
pub mod spooler;

pub use errors::{Error, PrintError, Result};
