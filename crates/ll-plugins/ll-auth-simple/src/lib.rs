//! # ll-auth-simple
//!
//! Shared-secret implementation of `IdentityProvider`.
//! Verifies signed session tokens and the Argon2-hashed admin key.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use ll_core::traits::IdentityProvider;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Session tokens look like `uid.<uuid>.<sig>` where `sig` is the first
/// 16 hex characters of SHA-256(salt || uuid). The token issuer and this
/// verifier share the salt; nothing else is stored server-side.
pub struct SimpleIdentityProvider {
    session_salt: String,
    admin_key_hash: String,
}

impl SimpleIdentityProvider {
    /// Accepts the session salt and the Argon2 PHC hash of the admin key
    /// (both typically loaded from environment variables).
    pub fn new(salt: &str, admin_key_hash: &str) -> Self {
        Self {
            session_salt: salt.to_string(),
            admin_key_hash: admin_key_hash.to_string(),
        }
    }

    fn sign(&self, user_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.session_salt.as_bytes());
        hasher.update(user_id.as_bytes());
        let hash = hex::encode(hasher.finalize());
        hash[..16].to_string()
    }

    /// Issues a token for a user id. Exposed so operators can mint tokens
    /// from the same salt the verifier holds.
    pub fn issue_token(&self, user_id: Uuid) -> String {
        let id = user_id.to_string();
        let sig = self.sign(&id);
        format!("uid.{id}.{sig}")
    }
}

impl IdentityProvider for SimpleIdentityProvider {
    fn resolve_user(&self, bearer: &str) -> Option<Uuid> {
        let rest = bearer.strip_prefix("uid.")?;
        let (id_part, sig) = rest.rsplit_once('.')?;
        let user_id = Uuid::parse_str(id_part).ok()?;
        if self.sign(id_part) == sig {
            Some(user_id)
        } else {
            None
        }
    }

    fn verify_admin_key(&self, key: &str) -> bool {
        let parsed_hash = match PasswordHash::new(&self.admin_key_hash) {
            Ok(p) => p,
            Err(_) => return false,
        };
        Argon2::default()
            .verify_password(key.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};

    fn provider() -> SimpleIdentityProvider {
        SimpleIdentityProvider::new("test-salt", "")
    }

    #[test]
    fn issued_token_round_trips() {
        let p = provider();
        let user = Uuid::new_v4();
        let token = p.issue_token(user);
        assert_eq!(p.resolve_user(&token), Some(user));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let p = provider();
        let token = p.issue_token(Uuid::new_v4());
        let other = Uuid::new_v4();
        // Swap in a different uuid but keep the original signature.
        let sig = token.rsplit('.').next().unwrap();
        let forged = format!("uid.{other}.{sig}");
        assert_eq!(p.resolve_user(&forged), None);
    }

    #[test]
    fn wrong_salt_is_rejected() {
        let issuer = SimpleIdentityProvider::new("salt-a", "");
        let verifier = SimpleIdentityProvider::new("salt-b", "");
        let token = issuer.issue_token(Uuid::new_v4());
        assert_eq!(verifier.resolve_user(&token), None);
    }

    #[test]
    fn malformed_tokens_are_guests() {
        let p = provider();
        assert_eq!(p.resolve_user(""), None);
        assert_eq!(p.resolve_user("uid.not-a-uuid.deadbeef"), None);
        assert_eq!(p.resolve_user("session.123"), None);
    }

    #[test]
    fn admin_key_verifies_against_argon2_hash() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"hunter2", &salt)
            .unwrap()
            .to_string();
        let p = SimpleIdentityProvider::new("s", &hash);
        assert!(p.verify_admin_key("hunter2"));
        assert!(!p.verify_admin_key("hunter3"));
    }

    #[test]
    fn bad_stored_hash_never_verifies() {
        let p = SimpleIdentityProvider::new("s", "not-a-phc-hash");
        assert!(!p.verify_admin_key("anything"));
    }
}
