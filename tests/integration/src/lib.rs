//! Integration test utilities for the bot
//!
//! This crate provides a mock gateway server and fixtures for running
//! the event pump end to end over a real socket.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
