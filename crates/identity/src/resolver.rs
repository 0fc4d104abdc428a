//! Identity resolution: turns request headers (and, in `jwt` mode, a
//! verified token) into the set of role names to evaluate. `JwtClaims`'s
//! redacted `Debug` keeps claim values out of log lines.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::token::{TokenVerifier, VerifyError};

/// Claims from a verified JWT. Values are redacted in `Debug` output.
#[derive(Clone, Deserialize, Serialize, Default)]
pub struct JwtClaims(pub Map<String, Value>);

impl std::fmt::Debug for JwtClaims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = self.0.keys().map(|k| (k, "***")).collect::<BTreeMap<_, _>>();
        write!(f, "JwtClaims({redacted:?})")
    }
}

/// Who made the request, for logging and for the `jwt:` condition receiver.
#[derive(Debug, Clone)]
pub enum CallerIdentity {
    Anonymous,
    Header { role_names: Vec<String> },
    Jwt { claims: JwtClaims },
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Header { role_names } => write!(f, "header({})", role_names.join(",")),
            Self::Jwt { .. } => write!(f, "jwt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum IdentityConfig {
    Header { header_name: String },
    Jwt(Box<crate::token::JwtOptions>),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("required header {0:?} is missing")]
    MissingHeader(String),
    #[error("header {0:?} carried no role names")]
    EmptyHeader(String),
    #[error("Authorization header is missing")]
    MissingAuthorizationHeader,
    #[error("Authorization header is not a bearer token")]
    NotABearerToken,
    #[error("token verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("role claim {0:?} was not present among the JWT claims")]
    MissingRoleClaim(String),
    #[error("role claim {0:?} was neither a string nor an array of strings")]
    MalformedRoleClaim(String),
}

/// `Resolve`: request headers (+ a verifier, in `jwt` mode) -> (role names, caller identity).
pub async fn resolve(
    config: &IdentityConfig,
    headers: &BTreeMap<String, String>,
    verifier: Option<&TokenVerifier>,
) -> Result<(Vec<String>, CallerIdentity), IdentityError> {
    match config {
        IdentityConfig::Header { header_name } => resolve_header(header_name, headers),
        IdentityConfig::Jwt(_) => {
            let verifier = verifier.expect("jwt identity mode requires a constructed TokenVerifier");
            resolve_jwt(headers, verifier).await
        }
    }
}

fn resolve_header(
    header_name: &str,
    headers: &BTreeMap<String, String>,
) -> Result<(Vec<String>, CallerIdentity), IdentityError> {
    let raw = headers
        .get(&header_name.to_ascii_lowercase())
        .ok_or_else(|| IdentityError::MissingHeader(header_name.to_string()))?;

    let role_names: Vec<String> =
        raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect();

    if role_names.is_empty() {
        return Err(IdentityError::EmptyHeader(header_name.to_string()));
    }

    Ok((role_names.clone(), CallerIdentity::Header { role_names }))
}

async fn resolve_jwt(
    headers: &BTreeMap<String, String>,
    verifier: &TokenVerifier,
) -> Result<(Vec<String>, CallerIdentity), IdentityError> {
    let header = headers.get("authorization").ok_or(IdentityError::MissingAuthorizationHeader)?;
    let token = header.strip_prefix("Bearer ").ok_or(IdentityError::NotABearerToken)?;

    let claims = verifier.verify(token).await?;
    let role_names = role_names_from_claims(&claims, verifier.role_claim())?;

    Ok((role_names, CallerIdentity::Jwt { claims: JwtClaims(claims) }))
}

fn role_names_from_claims(claims: &Map<String, Value>, role_claim: &str) -> Result<Vec<String>, IdentityError> {
    match claims.get(role_claim) {
        Some(Value::String(s)) => {
            Ok(s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        }
        Some(Value::Array(values)) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(|| IdentityError::MalformedRoleClaim(role_claim.to_string())))
            .collect(),
        Some(_) => Err(IdentityError::MalformedRoleClaim(role_claim.to_string())),
        None => Err(IdentityError::MissingRoleClaim(role_claim.to_string())),
    }
}
