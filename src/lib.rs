//! NFC tag security layer.
//!
//! An NDEF record codec, compact signed tag payloads with expiry, and a
//! behavioral threat detector over bounded per-tag access windows, tied
//! together by [`reader::TagAccessOrchestrator`].

pub mod config;
pub mod crypto;
pub mod hardware;
pub mod ndef;
pub mod reader;
pub mod security;
pub mod store;

pub use config::{ConfigError, SecurityConfig};
pub use reader::{AccessError, AccessReport, DenialReason, TagAccessOrchestrator, TagData};
