//! # Rabt Support
//!
//! Shared utilities for the Rabt DI framework.
//!
//! This crate provides:
//! - Text rendering for error messages
//! - Identifier similarity scoring for "did you mean?" hints

pub mod rendering;
