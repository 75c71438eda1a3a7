use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use domains::{AdminGate, DomainError, Result};

/// Checks the presented credential against the configured admin secret.
///
/// The secret may be stored either as plain text or as an Argon2 PHC hash
/// (`$argon2id$...`). Without a configured secret every request is refused
/// with a configuration error rather than being let through.
pub struct SharedSecretGate {
    secret: Option<SecretString>,
}

impl SharedSecretGate {
    pub fn new(secret: Option<SecretString>) -> Self {
        let secret = secret.filter(|s| !s.expose_secret().is_empty());
        if secret.is_none() {
            warn!("no admin secret configured; admin endpoints will refuse all requests");
        }
        Self { secret }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }
}

fn verify(presented: &str, expected: &str) -> bool {
    if expected.starts_with("$argon2") {
        // Verifies if a provided password matches a stored Argon2 hash.
        return match PasswordHash::new(expected) {
            Ok(hash) => Argon2::default()
                .verify_password(presented.as_bytes(), &hash)
                .is_ok(),
            Err(err) => {
                error!(error = %err, "admin secret looks like an argon2 hash but does not parse");
                false
            }
        };
    }
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

impl AdminGate for SharedSecretGate {
    fn authorize(&self, presented: Option<&str>) -> Result<()> {
        let Some(secret) = &self.secret else {
            return Err(DomainError::Configuration("admin secret is not configured".into()));
        };
        match presented {
            Some(candidate) if verify(candidate, secret.expose_secret()) => Ok(()),
            _ => Err(DomainError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};

    fn gate(secret: &str) -> SharedSecretGate {
        SharedSecretGate::new(Some(SecretString::from(secret.to_string())))
    }

    #[test]
    fn plain_secret_must_match_exactly() {
        let gate = gate("letmein");
        assert!(gate.authorize(Some("letmein")).is_ok());
        assert!(matches!(gate.authorize(Some("letmein ")), Err(DomainError::Unauthorized)));
        assert!(matches!(gate.authorize(Some("")), Err(DomainError::Unauthorized)));
        assert!(matches!(gate.authorize(None), Err(DomainError::Unauthorized)));
    }

    #[test]
    fn argon2_hashed_secret_is_verified() {
        let salt = SaltString::from_b64("c29tZXNhbHRzb21lc2FsdA").unwrap();
        let hash = Argon2::default()
            .hash_password(b"curator-pass", &salt)
            .unwrap()
            .to_string();

        let gate = gate(&hash);
        assert!(gate.authorize(Some("curator-pass")).is_ok());
        assert!(gate.authorize(Some("wrong")).is_err());
        // the hash itself is not a valid credential
        assert!(gate.authorize(Some(&hash)).is_err());
    }

    #[test]
    fn missing_secret_is_a_server_error() {
        for gate in [SharedSecretGate::new(None), gate("")] {
            assert!(!gate.is_configured());
            assert!(matches!(
                gate.authorize(Some("anything")),
                Err(DomainError::Configuration(_))
            ));
        }
    }
}
