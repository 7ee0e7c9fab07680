//! Shared types of the MediPort client.
//!
//! This crate holds the role-based authorization model used to gate actions in MediPort
//! frontends:
//!
//!  - [`auth`] defines [`Role`](auth::Role), [`Permission`](auth::Permission) and the table
//!    assigning permissions to roles.
//!  - [`role_code`] translates between the backend's single-character role codes and roles.
//!
//! Permission checks computed from these types are a convenience for deciding which actions to
//! offer. They are not a trust boundary: the backend re-validates every request.
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod auth;
pub mod role_code;

pub use auth::{Permission, Role, RolePermissionTable};
pub use role_code::BackendRoleCode;
