//! # Inbox Janitor
//!
//! Adaptive text extraction for a document inbox. Each document gets the
//! cheapest extraction that yields usable text, a deterministic quality
//! score, and a review decision; expensive OCR results are cached by file
//! fingerprint, and routing preferences are learned from human corrections.
//!
//! ```text
//! bytes ─▶ selector ─▶ cache? ─▶ direct text ─▶ OCR engine? ─▶ score ─▶ cache write
//!                                                                │
//!                                                                ▼
//!                                   review gate ─▶ plan builder ─▶ approval
//!                                                        ▲             │
//!                                                        └─ learning ◀─┘
//! ```
//!
//! Pure logic (scoring, gating, the preference state machine, the cache
//! write-gate) lives in `janitor-core`; this crate adds SQLite storage,
//! engine clients, the worker pool and the CLI.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`], [`migrate`] | SQLite pool and schema |
//! | [`sqlite_cache`], [`sqlite_preferences`] | Persistent stores |
//! | [`extract`] | Baseline direct text extraction |
//! | [`engines`] | OCR and vision engine traits and clients |
//! | [`selector`] | Extraction strategy selection |
//! | [`learning`] | Preference learning engine |
//! | [`batch`] | Directory scanning and the worker pool |

pub mod batch;
pub mod cache_cmd;
pub mod config;
pub mod db;
pub mod engines;
pub mod extract;
pub mod extract_cmd;
pub mod learning;
pub mod locks;
pub mod migrate;
pub mod prefs_cmd;
pub mod progress;
pub mod selector;
pub mod sqlite_cache;
pub mod sqlite_preferences;
pub mod stats;
