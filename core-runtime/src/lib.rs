//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback session core:
//! - Logging and tracing infrastructure
//! - Configuration management (bridges and user preferences)
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the session controller depends
//! on. It establishes the logging conventions, fail-fast configuration and
//! event broadcasting used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
