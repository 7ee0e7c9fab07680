//! Command line access to the MediPort backend.
//!
//! This builds on top of the [`mediport_client`] and exposes login, session inspection and the
//! patient, medication, prescription and user endpoints as subcommands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod observability;
