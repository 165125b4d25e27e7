//! Boba Translate - On-demand UI string translation
//!
//! Resolves the strings a kiosk screen needs into the customer's chosen
//! language through a shared in-memory cache, batched oracle requests and
//! per-consumer generations that keep superseded results off screen.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod language;
pub mod translate;
