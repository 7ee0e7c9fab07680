use mediport_types::role_code::{backend_role_to_frontend, frontend_role_to_backend};
use mediport_types::{BackendRoleCode, Role};
use serde::{Deserialize, Serialize};

use crate::DecodeError;
use crate::action::Action;
use crate::authorized::{Authorized, Validate, required};

const USERS: [&str; 1] = ["angajati"];

/// A staff member as listed by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    /// The backend role code, kept verbatim.
    #[serde(rename = "rol")]
    pub role_code: String,
    /// Family name.
    #[serde(rename = "nume")]
    pub last_name: String,
    /// Given name.
    #[serde(rename = "prenume")]
    pub first_name: String,
    /// Email address, used to log in.
    pub email: String,
}

impl User {
    /// Returns the user's role.
    ///
    /// Unrecognized role codes yield `None`, never a default role.
    pub fn role(&self) -> Option<Role> {
        let code = self.role_code.parse::<BackendRoleCode>().ok()?;
        backend_role_to_frontend(code)
    }

    /// Returns the user's full name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }
}

/// A user to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    /// The role to assign.
    pub role: Role,
    /// Family name.
    pub last_name: String,
    /// Given name.
    pub first_name: String,
    /// Email address, used to log in.
    pub email: String,
}

#[derive(Serialize)]
struct NewUserBody<'a> {
    rol: BackendRoleCode,
    nume: &'a str,
    prenume: &'a str,
    email: &'a str,
}

impl Validate for NewUser {
    fn validate(&self) -> crate::Result<()> {
        required("nume", &self.last_name)?;
        required("prenume", &self.first_name)?;
        required("email", &self.email)
    }
}

impl Authorized {
    /// Lists all users.
    pub async fn list_users(&self) -> crate::Result<Vec<User>> {
        self.get_json(&USERS).await
    }

    /// Creates a user.
    ///
    /// Fails with [`DecodeError::UnmappedRole`] if the backend has no code for the user's role.
    pub async fn create_user(&self, user: &NewUser) -> crate::Result<()> {
        user.validate()?;
        let rol = frontend_role_to_backend(user.role).ok_or(DecodeError::UnmappedRole(user.role))?;
        let _permit = self.begin(Action::CreateUser)?;

        let body = NewUserBody {
            rol,
            nume: &user.last_name,
            prenume: &user.first_name,
            email: &user.email,
        };
        let request = self.request(reqwest::Method::POST, &USERS)?.json(&body);
        self.send(request).await?;
        tracing::info!(role = %user.role, "created user");
        Ok(())
    }
}
