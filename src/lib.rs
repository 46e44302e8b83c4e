//! Vulnintel - ingestion core for a vulnerability-intelligence pipeline
//!
//! This crate takes raw, untrusted vulnerability descriptions collected from
//! many independent sources for one CVE identifier, filters out invalid
//! records (cheaply where possible, through a rate-limited language-model
//! call where necessary), and reconciles the survivors into one canonical
//! record with full merge provenance.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
