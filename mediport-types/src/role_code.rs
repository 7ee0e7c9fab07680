//! Backend role codes.
//!
//! The MediPort backend identifies roles by a single character, for example `D` for
//! administrators. The two directions of the translation are declared as separate tables because
//! backend codes and frontend role names evolve independently. A code added to one table must be
//! mirrored in the other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// A single-character role identifier used by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct BackendRoleCode(char);

impl BackendRoleCode {
    /// Creates a code from a character.
    pub const fn new(code: char) -> Self {
        Self(code)
    }

    /// Returns the code character.
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl From<char> for BackendRoleCode {
    fn from(code: char) -> Self {
        Self(code)
    }
}

/// Error returned when a string is not a single-character role code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role code {0:?}: expected exactly one character")]
pub struct InvalidRoleCode(pub String);

impl FromStr for BackendRoleCode {
    type Err = InvalidRoleCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Ok(Self(code)),
            _ => Err(InvalidRoleCode(s.to_owned())),
        }
    }
}

impl TryFrom<String> for BackendRoleCode {
    type Error = InvalidRoleCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BackendRoleCode> for String {
    fn from(code: BackendRoleCode) -> Self {
        code.0.to_string()
    }
}

impl fmt::Display for BackendRoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Translates a backend role code into a [`Role`].
///
/// Returns `None` for unrecognized codes.
pub fn backend_role_to_frontend(code: BackendRoleCode) -> Option<Role> {
    match code.0 {
        'M' => Some(Role::Doctor),
        'R' => Some(Role::Receptionist),
        'F' => Some(Role::Pharmacist),
        'A' => Some(Role::Nurse),
        'D' => Some(Role::Administrator),
        _ => None,
    }
}

/// Translates a [`Role`] into the code the backend uses for it.
///
/// Returns `None` for roles the backend does not know about.
pub fn frontend_role_to_backend(role: Role) -> Option<BackendRoleCode> {
    let code = match role {
        Role::Doctor => 'M',
        Role::Receptionist => 'R',
        Role::Pharmacist => 'F',
        Role::Nurse => 'A',
        Role::Administrator => 'D',
        Role::TransportTech => return None,
    };
    Some(BackendRoleCode(code))
}
