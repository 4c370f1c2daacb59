//! # Kafil Support
//!
//! Shared helpers for the Kafil crates.
//!
//! This crate provides:
//! - Text rendering for resolution chains and type names in diagnostics

pub mod rendering;
