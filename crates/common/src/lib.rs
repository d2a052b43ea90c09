//! Common utilities and types shared across Room Controller components.

#![warn(clippy::pedantic)]

/// Module for common data types
pub mod types;

/// Module for common configuration
pub mod config;
