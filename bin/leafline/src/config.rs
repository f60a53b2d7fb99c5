//! Environment-driven configuration, read once at startup.

use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    /// How long a cart hold keeps inventory before the sweep reclaims it.
    pub reservation_ttl_secs: i64,
    /// Sales tax in basis points (825 = 8.25%).
    pub tax_rate_bp: i64,
    pub session_salt: String,
    /// Argon2 PHC hash of the admin key; the key itself is never stored.
    pub admin_key_hash: String,
    pub upload_root: String,
    pub upload_url_prefix: String,
    pub payment_account_id: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let get = |name: &str, default: &str| env::var(name).unwrap_or_else(|_| default.to_string());

        let bind_addr = get("BIND_ADDR", "127.0.0.1:8080");
        let database_url = get("DATABASE_URL", "sqlite:leafline.db");

        let reservation_ttl_secs = get("RESERVATION_TTL_SECS", "900")
            .parse::<i64>()
            .context("invalid RESERVATION_TTL_SECS")?;
        let tax_rate_bp = get("TAX_RATE_BP", "800")
            .parse::<i64>()
            .context("invalid TAX_RATE_BP")?;

        let session_salt =
            env::var("LL_SESSION_SALT").context("LL_SESSION_SALT must be set")?;
        let admin_key_hash =
            env::var("ADMIN_KEY_HASH").context("ADMIN_KEY_HASH must be set")?;

        let upload_root = get("UPLOAD_ROOT", "./data/uploads");
        let upload_url_prefix = get("UPLOAD_URL_PREFIX", "/static/uploads");
        let payment_account_id = get("PAYMENT_ACCOUNT_ID", "acct_leafline");

        Ok(Self {
            bind_addr,
            database_url,
            reservation_ttl_secs,
            tax_rate_bp,
            session_salt,
            admin_key_hash,
            upload_root,
            upload_url_prefix,
            payment_account_id,
        })
    }
}
