use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use dashmap::DashMap;
use rand::rngs::OsRng;

use crate::errors::{CommandCode, StoreError, StoreResult};
use crate::store::Credential;

/// Users known to the embedded store, keyed by (auth database, username).
///
/// Only argon2 hashes are kept; plain passwords never outlive the call that
/// registers or verifies them.
#[derive(Default)]
pub(crate) struct UserRegistry {
    users: DashMap<(String, String), String>,
}

impl UserRegistry {
    pub(crate) fn new() -> Self {
        UserRegistry {
            users: DashMap::new(),
        }
    }

    /// Registers a user or replaces the password of an existing one.
    pub(crate) fn add_user(&self, source: &str, username: &str, password: &str) -> StoreResult<()> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default().hash_password(password.as_bytes(), &salt);

        match hash {
            Ok(hash) => {
                self.users
                    .insert((source.to_string(), username.to_string()), hash.to_string());
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to create user {}: {:?}", username, e);
                Err(StoreError::command(
                    "Failed to create user",
                    CommandCode::BadValue,
                ))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn has_users(&self) -> bool {
        !self.users.is_empty()
    }

    /// Verifies a credential against the registered hash.
    pub(crate) fn authenticate(&self, credential: &Credential) -> StoreResult<()> {
        let key = (credential.source().to_string(), credential.username().to_string());
        let expected_hash = match self.users.get(&key) {
            Some(hash) => hash.value().clone(),
            None => {
                log::error!(
                    "Authentication failed for user {} on {}: unknown user",
                    credential.username(),
                    credential.source()
                );
                return Err(auth_failed());
            }
        };

        let parsed_hash = PasswordHash::new(&expected_hash).map_err(|e| {
            log::error!("Stored credential of {} is not a valid hash: {:?}", credential.username(), e);
            auth_failed()
        })?;

        Argon2::default()
            .verify_password(credential.password().unsecure().as_bytes(), &parsed_hash)
            .map_err(|_| {
                log::error!(
                    "Authentication failed for user {} on {}: wrong password",
                    credential.username(),
                    credential.source()
                );
                auth_failed()
            })
    }
}

fn auth_failed() -> StoreError {
    StoreError::command("Authentication failed.", CommandCode::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use secure_string::SecureString;

    #[test]
    fn registered_user_authenticates() {
        let registry = UserRegistry::new();
        registry.add_user("admin", "svc", "s3cret").unwrap();
        assert!(registry.has_users());

        let credential = Credential::new("svc", "admin", SecureString::from("s3cret"));
        assert!(registry.authenticate(&credential).is_ok());
    }

    #[test]
    fn wrong_password_or_source_fails() {
        let registry = UserRegistry::new();
        registry.add_user("admin", "svc", "s3cret").unwrap();

        let wrong_password = Credential::new("svc", "admin", SecureString::from("nope"));
        let err = registry.authenticate(&wrong_password).unwrap_err();
        assert_eq!(err.code(), Some(CommandCode::AuthenticationFailed));
        assert_eq!(err.kind(), &ErrorKind::ConnectionError);

        let wrong_source = Credential::new("svc", "events", SecureString::from("s3cret"));
        assert!(registry.authenticate(&wrong_source).is_err());
    }
}
