//! # Janitor Core
//!
//! Runtime-free logic for Inbox Janitor: the extraction data model, the
//! file fingerprint, text statistics and the OCR trigger, the quality scorer
//! and review gate, the importance policy, the extraction cache and
//! preference store abstractions with in-memory implementations, and the
//! preference learning state machine.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Engines, SQLite
//! stores and the orchestration live in the `inbox-janitor` crate.

pub mod cache;
pub mod fingerprint;
pub mod gate;
pub mod importance;
pub mod models;
pub mod ocr_trigger;
pub mod preference;
pub mod quality;
pub mod text_stats;
