//! `sipguard`: an anomaly-detection engine for SIP call-detail records.
//! The four cooperating components (window clock, CDR aggregator,
//! Hellinger engine, detection controller) are laid out leaf modules
//! first, mirroring their dependency order.

pub mod aggregator;
pub mod alert;
pub mod category;
pub mod cdr;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod controller;
pub mod domain;
pub mod engine;
pub mod error;
pub mod shutdown;
