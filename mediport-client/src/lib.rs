//! # MediPort Client
//!
//! The client is used to interface with the MediPort hospital-operations backend. It keeps the
//! authenticated session, derives the user's [`Role`](mediport_types::Role) from the login
//! token, and calls the patient, medication, prescription and user endpoints with the stored
//! credentials.
//!
//! ## Usage
//!
//! ```no_run
//! use mediport_client::{Client, FileStorage, SessionContext};
//! use mediport_types::Permission;
//!
//! #[tokio::main]
//! # async fn main() -> mediport_client::Result<()> {
//!     let client = Client::builder("http://localhost:8000/").build()?;
//!     let context = SessionContext::new(client, FileStorage::new(".mediport/session.json"))?;
//!
//!     context.login("ana", "correct horse").await?;
//!
//!     let authorized = context.require()?;
//!     if authorized.can(Permission::ViewPatients) {
//!         for patient in authorized.list_patients().await? {
//!             println!("{}", patient.full_name());
//!         }
//!     }
//! # Ok(())
//! # }
//! ```
//!
//! Role-based checks such as [`Authorized::can`] only decide which actions to offer. The backend
//! authorizes every request independently.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod action;
mod authorized;
mod client;
mod error;
mod medications;
mod patients;
mod prescriptions;
mod session;
pub mod storage;
pub mod token;
mod users;

pub use action::Action;
pub use authorized::{Authorized, Validate};
pub use client::*;
pub use error::*;
pub use medications::*;
pub use patients::*;
pub use prescriptions::*;
pub use session::*;
pub use storage::{FileStorage, LegacySlots, MemoryStorage, SessionStorage};
pub use users::*;
