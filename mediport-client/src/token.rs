//! Decoding of the role claim carried in access tokens.
//!
//! Tokens are decoded without verifying their signature. The role obtained this way only drives
//! which actions a frontend offers; the backend verifies the token on every request.

use jsonwebtoken::{DecodingKey, Validation, decode};
use mediport_types::role_code::backend_role_to_frontend;
use mediport_types::{BackendRoleCode, Role};
use serde::Deserialize;

use crate::DecodeError;

#[derive(Deserialize)]
struct RoleClaims {
    rol: Option<String>,
}

fn insecure_validation() -> Validation {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();
    validation
}

/// Extracts the backend role code from the `rol` claim of `token`.
pub fn decode_role_code(token: &str) -> Result<BackendRoleCode, DecodeError> {
    let data = decode::<RoleClaims>(token, &DecodingKey::from_secret(&[]), &insecure_validation())?;
    let rol = data.claims.rol.ok_or(DecodeError::MissingRoleClaim)?;
    Ok(rol.parse()?)
}

/// Extracts the [`Role`] from the `rol` claim of `token`.
///
/// Codes unknown to [`backend_role_to_frontend`] fail with [`DecodeError::UnknownRoleCode`]
/// instead of being mapped to a default role.
pub fn decode_role(token: &str) -> Result<Role, DecodeError> {
    let code = decode_role_code(token)?;
    backend_role_to_frontend(code).ok_or(DecodeError::UnknownRoleCode(code))
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode, get_current_timestamp};
    use serde_json::json;

    use super::*;

    fn sign(claims: serde_json::Value) -> String {
        let key = EncodingKey::from_secret(b"some backend secret");
        encode(&Header::default(), &claims, &key).unwrap()
    }

    #[test]
    fn decodes_role() {
        let token = sign(json!({"sub": "ana", "rol": "D", "exp": get_current_timestamp() + 60}));
        assert_eq!(decode_role(&token).unwrap(), Role::Administrator);
    }

    #[test]
    fn ignores_expiry_and_audience() {
        let token = sign(json!({"rol": "M", "exp": 1, "aud": "somewhere-else"}));
        assert_eq!(decode_role(&token).unwrap(), Role::Doctor);
    }

    #[test]
    fn malformed_token() {
        let result = decode_role("abcdef");
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn missing_claim() {
        let token = sign(json!({"sub": "ana"}));
        let result = decode_role(&token);
        assert!(matches!(result, Err(DecodeError::MissingRoleClaim)));
    }

    #[test]
    fn unknown_code() {
        let token = sign(json!({"rol": "Z"}));
        let result = decode_role(&token);
        assert!(matches!(result, Err(DecodeError::UnknownRoleCode(code)) if code.as_char() == 'Z'));
    }

    #[test]
    fn invalid_code() {
        let token = sign(json!({"rol": "DM"}));
        let result = decode_role(&token);
        assert!(matches!(result, Err(DecodeError::InvalidRoleCode(_))));
    }
}
