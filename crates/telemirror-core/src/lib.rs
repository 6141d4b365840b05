//! Core of the chat mirror: routing, filtering, relay orchestration and the
//! original -> mirror identity store.
//!
//! Nothing here talks to Telegram directly; the adapter crate implements
//! `RelayPort` and feeds `MirrorEvent`s into the dispatcher.

pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod filter;
pub mod logging;
pub mod messaging;
pub mod router;
pub mod store;
pub mod utils;

pub use errors::{Error, Result};
