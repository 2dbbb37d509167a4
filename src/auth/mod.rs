use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config;

/// Bearer-token claims. `sub` is the canonical subject id; the remaining
/// claims are advisory convenience for clients. Authorization decisions
/// always re-read roles from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub org_id: Uuid,
    pub department_id: Option<Uuid>,
    pub email: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(
        sub: Uuid,
        org_id: Uuid,
        department_id: Option<Uuid>,
        email: String,
        role: String,
    ) -> Self {
        let now = Utc::now();
        let expiry_hours = config::config().security.jwt_expiry_hours;
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self { sub, org_id, department_id, email, role, exp, iat: now.timestamp() }
    }

    /// Same claims, fresh iat/exp. Used by the refresh endpoint.
    pub fn renewed(&self) -> Self {
        Self::new(
            self.sub,
            self.org_id,
            self.department_id,
            self.email.clone(),
            self.role.clone(),
        )
    }
}

#[derive(Debug)]
pub enum JwtError {
    TokenGeneration(String),
    InvalidToken(String),
    ExpiredBeyondRefreshWindow,
    InvalidSecret,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::TokenGeneration(msg) => write!(f, "JWT generation error: {}", msg),
            JwtError::InvalidToken(msg) => write!(f, "Invalid JWT token: {}", msg),
            JwtError::ExpiredBeyondRefreshWindow => write!(f, "Token expired beyond refresh window"),
            JwtError::InvalidSecret => write!(f, "Invalid JWT secret"),
        }
    }
}

impl std::error::Error for JwtError {}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key)
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str) -> Result<Claims, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let token_data = decode::<Claims>(token, &decoding_key, &Validation::default())
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;
    Ok(token_data.claims)
}

/// Validate a token for refresh: the signature must be valid, but an
/// expired `exp` is accepted if it falls inside the configured window.
pub fn validate_jwt_for_refresh(token: &str) -> Result<Claims, JwtError> {
    let secret = &config::config().security.jwt_secret;
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = false;

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))?;

    let window_hours = config::config().security.jwt_refresh_window_hours as i64;
    let cutoff = token_data.claims.exp + Duration::hours(window_hours).num_seconds();
    if Utc::now().timestamp() > cutoff {
        return Err(JwtError::ExpiredBeyondRefreshWindow);
    }

    Ok(token_data.claims)
}

/// Salted SHA-256 password hash, hex encoded.
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

/// Opaque token for invitation links.
pub fn new_invitation_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_roundtrip() {
        let salt = new_salt();
        let hash = hash_password("hunter2", &salt);
        assert!(verify_password("hunter2", &salt, &hash));
        assert!(!verify_password("hunter3", &salt, &hash));
    }

    #[test]
    fn password_hash_depends_on_salt() {
        let a = hash_password("hunter2", "salt-a");
        let b = hash_password("hunter2", "salt-b");
        assert_ne!(a, b);
    }

    #[test]
    fn jwt_roundtrip() {
        // Development config carries a non-empty default secret
        let claims = Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "alice@example.com".to_string(),
            "admin".to_string(),
        );
        let token = generate_jwt(&claims).expect("token");
        let decoded = validate_jwt(&token).expect("claims");
        assert_eq!(decoded.sub, claims.sub);
        assert_eq!(decoded.org_id, claims.org_id);
        assert_eq!(decoded.email, claims.email);
    }

    #[test]
    fn refresh_accepts_expired_token_inside_window_only() {
        let mut claims = Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            "carol@example.com".to_string(),
            "member".to_string(),
        );

        // Expired an hour ago: well inside the development refresh window
        claims.exp = (Utc::now() - Duration::hours(1)).timestamp();
        let token = generate_jwt(&claims).expect("token");
        let refreshed = validate_jwt_for_refresh(&token).expect("inside window");
        assert_eq!(refreshed.sub, claims.sub);

        // Expired a year ago: past any configured window
        claims.exp = (Utc::now() - Duration::days(365)).timestamp();
        let token = generate_jwt(&claims).expect("token");
        match validate_jwt_for_refresh(&token) {
            Err(JwtError::ExpiredBeyondRefreshWindow) => {}
            other => panic!("expected refresh-window rejection, got {:?}", other),
        }
    }

    #[test]
    fn renewed_claims_keep_subject() {
        let claims = Claims::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            "bob@example.com".to_string(),
            "member".to_string(),
        );
        let renewed = claims.renewed();
        assert_eq!(renewed.sub, claims.sub);
        assert_eq!(renewed.department_id, claims.department_id);
        assert!(renewed.exp >= claims.exp);
    }
}
