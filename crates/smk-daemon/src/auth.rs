//! Basic-Auth credential check.
//!
//! Each principal (`app`, `firmware`, ...) has one password, stored as the hex
//! SHA-256 of `"smoke" + password + "stack"` under `key:<principal>`. The
//! middleware puts the authenticated [`Principal`] into request extensions.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};
use smk_store::KeyValueStore;
use tracing::{debug, info, warn};

use crate::{error::ApiError, keys, state::AppContext};

const SALT_PREFIX: &str = "smoke";
const SALT_SUFFIX: &str = "stack";
/// Env var prefix for boot-time password seeding: `SMOKESTACK_PASSWORD_APP`.
pub const PASSWORD_ENV_PREFIX: &str = "SMOKESTACK_PASSWORD_";

const FIRMWARE: &str = "firmware";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Writes by the firmware describe the device itself and never leave a
    /// pending command behind.
    pub fn is_firmware(&self) -> bool {
        self.0 == FIRMWARE
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SALT_PREFIX.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(SALT_SUFFIX.as_bytes());
    hex::encode(hasher.finalize())
}

/// Check `candidate` against a stored digest without an early exit on the
/// first differing byte.
pub fn verify_password(stored_digest: &str, candidate: &str) -> bool {
    constant_time_eq(stored_digest.as_bytes(), hash_password(candidate).as_bytes())
}

fn constant_time_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut diff = 0u8;
    for (a, b) in lhs.iter().zip(rhs.iter()) {
        diff |= a ^ b;
    }
    diff == 0
}

pub async fn set_password(
    store: &dyn KeyValueStore,
    principal: &str,
    password: &str,
) -> anyhow::Result<()> {
    store
        .set(&keys::credential(principal), &hash_password(password))
        .await
}

/// `Authorization: Basic <base64(user:password)>` → `(user, password)`.
fn parse_basic(headers: &HeaderMap) -> Result<(String, String), ApiError> {
    let missing = || ApiError::Auth("missing or malformed Basic credentials".to_string());

    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(missing)?;
    let encoded = value
        .strip_prefix("Basic ")
        .or_else(|| value.strip_prefix("basic "))
        .ok_or_else(missing)?;
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| missing())?;
    let decoded = String::from_utf8(decoded).map_err(|_| missing())?;
    let (user, password) = decoded.split_once(':').ok_or_else(missing)?;
    Ok((user.to_string(), password.to_string()))
}

pub async fn require_basic_auth(
    State(ctx): State<Arc<AppContext>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (user, password) = parse_basic(req.headers())?;

    if !ctx.config.is_principal(&user) {
        debug!(user = %user, "unknown principal");
        return Err(ApiError::Auth("invalid credentials".to_string()));
    }

    let stored = ctx.store.get(&keys::credential(&user)).await?;
    match stored {
        Some(digest) if verify_password(&digest, &password) => {}
        Some(_) => {
            debug!(user = %user, "password mismatch");
            return Err(ApiError::Auth("invalid credentials".to_string()));
        }
        None => {
            warn!(user = %user, "no credential stored for principal");
            return Err(ApiError::Auth("invalid credentials".to_string()));
        }
    }

    req.extensions_mut().insert(Principal(user));
    Ok(next.run(req).await)
}

/// Store passwords from `SMOKESTACK_PASSWORD_<PRINCIPAL>` for principals that
/// have no credential yet. Existing credentials (possibly rotated through
/// `/api/client/password`) are never overwritten. Returns how many were set.
pub async fn seed_credentials_from_env(ctx: &AppContext) -> anyhow::Result<usize> {
    let mut seeded = 0;
    for principal in &ctx.config.auth.principals {
        let var = format!("{PASSWORD_ENV_PREFIX}{}", principal.to_ascii_uppercase());
        let Ok(password) = std::env::var(&var) else {
            continue;
        };
        if password.is_empty() {
            continue;
        }
        if ctx.store.exists(&keys::credential(principal)).await? {
            continue;
        }
        set_password(ctx.store.as_ref(), principal, &password).await?;
        info!(principal = %principal, env = %var, "credential seeded");
        seeded += 1;
    }
    Ok(seeded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn basic(user_pass: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        let v = format!("Basic {}", STANDARD.encode(user_pass));
        h.insert(AUTHORIZATION, HeaderValue::from_str(&v).unwrap());
        h
    }

    #[test]
    fn digest_is_salted_sha256_hex() {
        let d = hash_password("password");
        assert_eq!(d.len(), 64);
        assert_ne!(d, hash_password("password1"));
        // Salt is part of the input, so the bare digest differs.
        let bare = hex::encode(Sha256::digest(b"password"));
        assert_ne!(d, bare);
    }

    #[test]
    fn verify_accepts_only_the_stored_password() {
        let stored = hash_password("hickory");
        assert!(verify_password(&stored, "hickory"));
        assert!(!verify_password(&stored, "Hickory"));
        assert!(!verify_password(&stored, ""));
        // Truncated or legacy digests never match.
        assert!(!verify_password(&stored[..32], "hickory"));
        assert!(!verify_password("", "hickory"));
    }

    #[test]
    fn parses_user_and_password_with_colons() {
        let (u, p) = parse_basic(&basic("app:pa:ss")).unwrap();
        assert_eq!(u, "app");
        assert_eq!(p, "pa:ss");
    }

    #[test]
    fn rejects_missing_or_non_basic_header() {
        assert!(parse_basic(&HeaderMap::new()).is_err());

        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(parse_basic(&h).is_err());
    }
}
