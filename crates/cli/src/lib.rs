//! vcp CLI library
//!
//! This module exports the CLI components for use in integration tests.

pub mod alias;
pub mod backend;
pub mod commands;
pub mod config;
pub mod exit_code;
pub mod output;
