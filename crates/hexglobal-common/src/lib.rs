//! Wire types shared across the HexGlobal hub and client.
//!
//! This crate provides:
//! - The broadcast [`Event`] and its JSON codec ([`event`])
//! - Protocol constants and display helpers ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod event;
pub mod types;

pub use event::{Event, EventError};
