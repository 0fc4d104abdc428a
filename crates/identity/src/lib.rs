//! Caller identity resolution and JWT/JWKS token verification.

pub mod resolver;
pub mod token;

pub use resolver::{resolve, CallerIdentity, IdentityConfig, IdentityError, JwtClaims};
pub use token::{JwtOptions, TokenVerifier, VerifyError, JWKS_CACHE_FLOOR_SECONDS};
