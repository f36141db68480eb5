use idbridge_domain::types::{IdentityRecord, PasswordType};
use idbridge_domain_handlers::error::{DomainError, Result};
use md5::Md5;
use sha2::{Digest, Sha256};

fn hex_digest<D: Digest>(input: &str) -> String {
    hex::encode(D::digest(input.as_bytes()))
}

/// Hashes a clear password the way the identity platform stores it for the
/// given scheme.
pub fn hash_password(
    password_type: &PasswordType,
    password: &str,
    salt: &str,
) -> Result<String> {
    match password_type {
        PasswordType::Plain => Ok(password.to_owned()),
        PasswordType::Salt => Ok(hex_digest::<Sha256>(&format!(
            "{}{}",
            hex_digest::<Sha256>(password),
            salt
        ))),
        PasswordType::Md5Salt => Ok(hex_digest::<Md5>(&format!(
            "{}{}",
            hex_digest::<Md5>(password),
            salt
        ))),
        other => Err(DomainError::AuthenticationError(format!(
            r#"Unsupported password type "{}""#,
            other.as_str()
        ))),
    }
}

/// Checks a clear password against the stored one, using the scheme and
/// salt recorded on the identity.
pub fn passwords_match(record: &IdentityRecord, password: &str) -> Result<bool> {
    Ok(hash_password(&record.password_type, password, &record.password_salt)? == record.password)
}
