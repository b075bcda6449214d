use anyhow::Result;
use pasetors::claims::{Claims, ClaimsValidationRules};
use pasetors::keys::SymmetricKey;
use pasetors::token::UntrustedToken;
use pasetors::{local, version4::V4, Local};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

use crate::domain::admin::{AdminIdentity, ADMIN_ROLE};
use crate::infra::db::Db;

const TOKEN_ISSUER: &str = "atelier";

/// Everything a successful login hands back: a session id for the cookie,
/// a bearer token, and the shared expiry. Either credential alone
/// authorizes later requests.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session_id: String,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub identity: AdminIdentity,
}

#[derive(Clone)]
pub struct AuthService {
    db: Db,
    admin_username: String,
    admin_password: String,
    session_key: [u8; 32],
    token_key: [u8; 32],
    session_ttl_hours: u64,
}

impl AuthService {
    pub fn new(
        db: Db,
        admin_username: String,
        admin_password: String,
        session_key: [u8; 32],
        token_key: [u8; 32],
        session_ttl_hours: u64,
    ) -> Self {
        Self {
            db,
            admin_username,
            admin_password,
            session_key,
            token_key,
            session_ttl_hours,
        }
    }

    /// Check the supplied pair against the configured admin credentials
    /// and, on match, establish a session and issue a token. `Ok(None)`
    /// means bad credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<Option<LoginOutcome>> {
        let username_ok: bool = username
            .as_bytes()
            .ct_eq(self.admin_username.as_bytes())
            .into();
        let password_ok: bool = password
            .as_bytes()
            .ct_eq(self.admin_password.as_bytes())
            .into();
        if !(username_ok && password_ok) {
            return Ok(None);
        }

        let now = OffsetDateTime::now_utc();
        let expires_at = now + Duration::hours(self.session_ttl_hours as i64);

        // Opportunistic hygiene: drop sessions that can never verify again.
        sqlx::query("DELETE FROM admin_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(self.db.pool())
            .await?;

        let session_id = generate_session_id();
        let token_hash = hash_session(&self.session_key, &session_id);
        sqlx::query(
            "INSERT INTO admin_sessions (token_hash, username, expires_at, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&token_hash)
        .bind(&self.admin_username)
        .bind(expires_at)
        .bind(now)
        .execute(self.db.pool())
        .await?;

        let token = self.issue_token()?;

        Ok(Some(LoginOutcome {
            session_id,
            token,
            expires_at,
            identity: AdminIdentity::admin(&self.admin_username),
        }))
    }

    /// Resolve a session cookie value to its identity, if the session
    /// exists and has not expired.
    pub async fn authenticate_session(&self, session_id: &str) -> Result<Option<AdminIdentity>> {
        let token_hash = hash_session(&self.session_key, session_id);
        let now = OffsetDateTime::now_utc();

        let row: Option<(String,)> = sqlx::query_as(
            "SELECT username FROM admin_sessions WHERE token_hash = ? AND expires_at > ?",
        )
        .bind(&token_hash)
        .bind(now)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(|(username,)| AdminIdentity::admin(username)))
    }

    /// Remove a session. Returns whether a row was actually deleted.
    pub async fn destroy_session(&self, session_id: &str) -> Result<bool> {
        let token_hash = hash_session(&self.session_key, session_id);
        let result = sqlx::query("DELETE FROM admin_sessions WHERE token_hash = ?")
            .bind(&token_hash)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Verify a bearer token and return the identity it carries. Invalid,
    /// tampered, or expired tokens all come back as `None`; the role claim
    /// is returned as-is for the caller to judge.
    pub fn authenticate_token(&self, token: &str) -> Result<Option<AdminIdentity>> {
        let claims = match self.decrypt_claims(token)? {
            Some(claims) => claims,
            None => return Ok(None),
        };

        let username = match claim_string(&claims, "sub") {
            Some(username) => username,
            None => return Ok(None),
        };
        let role = claim_string(&claims, "role").unwrap_or_default();

        Ok(Some(AdminIdentity { username, role }))
    }

    fn issue_token(&self) -> Result<String> {
        let duration = std::time::Duration::from_secs(self.session_ttl_hours * 60 * 60);
        let mut claims = Claims::new_expires_in(&duration)?;
        claims.issuer(TOKEN_ISSUER)?;
        claims.audience(TOKEN_ISSUER)?;
        claims.subject(&self.admin_username)?;
        claims.add_additional("role", ADMIN_ROLE)?;

        let key = SymmetricKey::<V4>::from(&self.token_key)?;
        Ok(local::encrypt(&key, &claims, None, None)?)
    }

    fn decrypt_claims(&self, token: &str) -> Result<Option<Claims>> {
        let key = SymmetricKey::<V4>::from(&self.token_key)?;
        let mut rules = ClaimsValidationRules::new();
        rules.validate_issuer_with(TOKEN_ISSUER);
        rules.validate_audience_with(TOKEN_ISSUER);

        let untrusted = match UntrustedToken::<Local, V4>::try_from(token) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        let trusted = match local::decrypt(&key, &untrusted, &rules, None, None) {
            Ok(token) => token,
            Err(_) => return Ok(None),
        };
        Ok(trusted.payload_claims().cloned())
    }
}

fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sessions are stored keyed, hashed: the database never holds a value
/// that could be replayed as a cookie.
fn hash_session(key: &[u8; 32], session_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    hasher.update(session_id.as_bytes());
    hex::encode(hasher.finalize())
}

fn claim_string(claims: &Claims, name: &str) -> Option<String> {
    claims
        .get_claim(name)
        .and_then(|value| value.as_str())
        .map(|value| value.to_string())
}
