//! Test utilities for the MediPort client.
//!
//! This crate provides utilities to facilitate testing of the client against a backend. See the
//! modules for all available utilities.

pub mod server;
pub mod tracing;
