//! Token verification. In JWKS mode, `jwtk` only proves the signature and
//! standard claims are valid, then the payload segment is re-decoded by hand
//! for the actual claim map, because jwtk does not hand back an owned `Map`.
//! Static key mode leans on `jsonwebtoken` directly instead, whose
//! `TokenData::claims` gives us the map without the detour.

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use jwtk::jwk::RemoteJwksVerifier;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;
use url::Url;

/// 10-minute floor on JWKS re-fetch / cache lifetime.
pub const JWKS_CACHE_FLOOR_SECONDS: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtOptions {
    /// Required for static-key verification (`HS256`, `RS256`, `ES256`, ...). Ignored when `jwks_url` is set.
    #[serde(default)]
    pub signing_method: Option<String>,
    #[serde(default)]
    pub jwks_url: Option<Url>,
    /// Inline static key material (HMAC secret, or PEM for asymmetric algorithms).
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub key_url: Option<Url>,
    pub role_claim: String,
    #[serde(default)]
    pub allowed_sub: Option<String>,
    #[serde(default)]
    pub allowed_aud: Option<String>,
    /// `0` or absent disables the check.
    #[serde(default)]
    pub max_age_sec: Option<u64>,
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u32,
}

fn default_jwks_cache_seconds() -> u32 {
    JWKS_CACHE_FLOOR_SECONDS
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("JWT validation failure: {0}")]
    Jwks(#[from] jwtk::Error),
    #[error("static key verification failure: {0}")]
    Static(#[from] jsonwebtoken::errors::Error),
    #[error("base64 decoding failure: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("JSON decoding failure: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no jwksUrl, keyUrl, keyPath, or key was configured")]
    NoKeyMaterial,
    #[error("unrecognized signing method: {0}")]
    UnknownAlgorithm(String),
    #[error("failed to load static key material: {0}")]
    KeyLoad(String),
    #[error("startup verification of {server} failed with status {status}")]
    UnexpectedResponse { server: String, status: reqwest::StatusCode },
    #[error("JWT claims have an unexpected format")]
    MalformedClaims,
    #[error("token subject does not match the configured allowed subject")]
    DisallowedSubject,
    #[error("token audience does not match the configured allowed audience")]
    DisallowedAudience,
    #[error("token is older than the configured max age")]
    TooOld,
    #[error("HTTP request failure: {0}")]
    Reqwest(#[from] reqwest::Error),
}

enum Backend {
    Jwks { verifier: RemoteJwksVerifier, jwks_url: Url },
    Static { algorithm: Algorithm, key: DecodingKey },
}

pub struct TokenVerifier {
    client: reqwest::Client,
    backend: Backend,
    options: JwtOptions,
}

impl TokenVerifier {
    /// Construction fails if a configured JWKS endpoint cannot be reached --
    /// the startup fetch must succeed.
    #[instrument(level = "debug", skip(options), err)]
    pub async fn new(options: JwtOptions) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        let cache_seconds = options.jwks_cache_seconds.max(JWKS_CACHE_FLOOR_SECONDS);

        let backend = if let Some(jwks_url) = options.jwks_url.clone() {
            let status = client.get(jwks_url.clone()).send().await?.status();
            if !status.is_success() {
                return Err(VerifyError::UnexpectedResponse { server: jwks_url.to_string(), status });
            }
            let verifier = RemoteJwksVerifier::new(
                jwks_url.to_string(),
                None,
                Duration::from_secs(cache_seconds.into()),
            );
            Backend::Jwks { verifier, jwks_url }
        } else {
            let method = options
                .signing_method
                .as_deref()
                .ok_or(VerifyError::NoKeyMaterial)?;
            let algorithm = parse_algorithm(method)?;
            let key_bytes = load_static_key(&client, &options).await?;
            let key = decoding_key_for(algorithm, &key_bytes)?;
            Backend::Static { algorithm, key }
        };

        Ok(Self { client, backend, options })
    }

    #[instrument(level = "debug", skip_all, err)]
    pub async fn verify(&self, token: &str) -> Result<Map<String, Value>, VerifyError> {
        let claims = match &self.backend {
            Backend::Jwks { verifier, .. } => {
                verifier.verify::<Map<String, Value>>(token).await?;
                decode_claims_segment(token)?
            }
            Backend::Static { algorithm, key } => {
                let validation = Validation::new(*algorithm);
                jsonwebtoken::decode::<Map<String, Value>>(token, key, &validation)?.claims
            }
        };
        self.check_policy(&claims)?;
        Ok(claims)
    }

    fn check_policy(&self, claims: &Map<String, Value>) -> Result<(), VerifyError> {
        if let Some(allowed_sub) = &self.options.allowed_sub {
            if claims.get("sub").and_then(Value::as_str) != Some(allowed_sub.as_str()) {
                return Err(VerifyError::DisallowedSubject);
            }
        }
        if let Some(allowed_aud) = &self.options.allowed_aud {
            let matches = match claims.get("aud") {
                Some(Value::String(s)) => s == allowed_aud,
                Some(Value::Array(values)) => {
                    values.iter().any(|v| v.as_str() == Some(allowed_aud.as_str()))
                }
                _ => false,
            };
            if !matches {
                return Err(VerifyError::DisallowedAudience);
            }
        }
        if let Some(max_age) = self.options.max_age_sec.filter(|secs| *secs > 0) {
            let iat = claims.get("iat").and_then(Value::as_i64).ok_or(VerifyError::TooOld)?;
            if chrono::Utc::now().timestamp() - iat > max_age as i64 {
                return Err(VerifyError::TooOld);
            }
        }
        Ok(())
    }

    pub fn role_claim(&self) -> &str {
        &self.options.role_claim
    }
}

/// Re-decodes the payload segment by hand, same as `TokenChecker::attempt_jwt` --
/// `jwtk`'s verifier proves the signature but doesn't hand back an owned claim map.
fn decode_claims_segment(token: &str) -> Result<Map<String, Value>, VerifyError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_sig)) = (segments.next(), segments.next(), segments.next()) else {
        return Err(VerifyError::MalformedClaims);
    };
    let decoded = URL_SAFE_NO_PAD.decode(payload)?;
    match serde_json::from_slice(&decoded)? {
        Value::Object(claims) => Ok(claims),
        _ => Err(VerifyError::MalformedClaims),
    }
}

async fn load_static_key(client: &reqwest::Client, options: &JwtOptions) -> Result<Vec<u8>, VerifyError> {
    if let Some(url) = &options.key_url {
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(VerifyError::UnexpectedResponse { server: url.to_string(), status });
        }
        Ok(response.bytes().await?.to_vec())
    } else if let Some(path) = &options.key_path {
        std::fs::read(path).map_err(|e| VerifyError::KeyLoad(e.to_string()))
    } else if let Some(inline) = &options.key {
        Ok(inline.clone().into_bytes())
    } else {
        Err(VerifyError::NoKeyMaterial)
    }
}

fn parse_algorithm(name: &str) -> Result<Algorithm, VerifyError> {
    match name.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        "EDDSA" => Ok(Algorithm::EdDSA),
        other => Err(VerifyError::UnknownAlgorithm(other.to_string())),
    }
}

fn decoding_key_for(algorithm: Algorithm, key_bytes: &[u8]) -> Result<DecodingKey, VerifyError> {
    use Algorithm::*;
    match algorithm {
        HS256 | HS384 | HS512 => Ok(DecodingKey::from_secret(key_bytes)),
        RS256 | RS384 | RS512 | PS256 | PS384 | PS512 => {
            DecodingKey::from_rsa_pem(key_bytes).map_err(VerifyError::from)
        }
        ES256 | ES384 => DecodingKey::from_ec_pem(key_bytes).map_err(VerifyError::from),
        EdDSA => DecodingKey::from_ed_pem(key_bytes).map_err(VerifyError::from),
    }
}
