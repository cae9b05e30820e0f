//! HMAC bearer tokens for the login handshake.
//!
//! A token binds an account and application id to an expiry time and is
//! HMAC-SHA256 signed with a shared secret. Layout (hex-encoded on the
//! wire): `[1-byte account len][account][1-byte app len][app][8-byte expiry][32-byte tag]`

use ring::hmac;

use crate::error::{PlumeError, PlumeResult};

const TAG_LEN: usize = 32;

/// Claims recovered from a verified token.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub account: String,
    pub app: String,
    /// Unix seconds.
    pub expires_at: u64,
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn signed_portion(account: &str, app: &str, expiry: u64) -> PlumeResult<Vec<u8>> {
    if account.is_empty() || account.len() > u8::MAX as usize {
        return Err(PlumeError::Token(format!(
            "invalid account length: {}",
            account.len()
        )));
    }
    if app.len() > u8::MAX as usize {
        return Err(PlumeError::Token(format!("invalid app length: {}", app.len())));
    }
    let mut data = Vec::with_capacity(2 + account.len() + app.len() + 8);
    data.push(account.len() as u8);
    data.extend_from_slice(account.as_bytes());
    data.push(app.len() as u8);
    data.extend_from_slice(app.as_bytes());
    data.extend_from_slice(&expiry.to_be_bytes());
    Ok(data)
}

/// Issue a bearer token for `account`, valid for `ttl_secs`.
pub fn issue(secret: &[u8], account: &str, app: &str, ttl_secs: u64) -> PlumeResult<String> {
    let expiry = unix_now() + ttl_secs;
    let data = signed_portion(account, app, expiry)?;

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, &data);

    let mut token = data;
    token.extend_from_slice(tag.as_ref());
    Ok(hex::encode(token))
}

/// Verify a bearer token: signature first, then expiry. Returns the claims
/// on success.
pub fn verify(secret: &[u8], token: &str) -> PlumeResult<Claims> {
    let raw = hex::decode(token).map_err(|e| PlumeError::Token(format!("invalid encoding: {e}")))?;

    if raw.len() < 2 + 8 + TAG_LEN {
        return Err(PlumeError::Token(format!("token too short: {} bytes", raw.len())));
    }

    let account_len = raw[0] as usize;
    let app_off = 1 + account_len;
    if raw.len() < app_off + 1 {
        return Err(PlumeError::Token("malformed token".into()));
    }
    let app_len = raw[app_off] as usize;
    let expiry_off = app_off + 1 + app_len;
    if raw.len() != expiry_off + 8 + TAG_LEN {
        return Err(PlumeError::Token("malformed token".into()));
    }

    let account = std::str::from_utf8(&raw[1..app_off])
        .map_err(|_| PlumeError::Token("account is not utf-8".into()))?
        .to_string();
    let app = std::str::from_utf8(&raw[app_off + 1..expiry_off])
        .map_err(|_| PlumeError::Token("app is not utf-8".into()))?
        .to_string();
    let expiry_bytes: [u8; 8] = raw[expiry_off..expiry_off + 8]
        .try_into()
        .map_err(|_| PlumeError::Token("malformed token".into()))?;
    let expires_at = u64::from_be_bytes(expiry_bytes);

    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    hmac::verify(&key, &raw[..expiry_off + 8], &raw[expiry_off + 8..])
        .map_err(|_| PlumeError::Token("invalid token signature".into()))?;

    if unix_now() > expires_at {
        return Err(PlumeError::Token("token expired".into()));
    }

    Ok(Claims {
        account,
        app,
        expires_at,
    })
}

/// Generate a random 32-byte shared secret.
pub fn generate_secret() -> Vec<u8> {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    let mut secret = vec![0u8; 32];
    if rng.fill(&mut secret).is_err() {
        // SystemRandom failure is unrecoverable for key material.
        panic!("system RNG failure");
    }
    secret
}
