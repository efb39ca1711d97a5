//! Bearer token generation and validation.
//!
//! Tokens are HS256-signed JWTs carrying the user id as subject plus the
//! temporal and issuer claims. They are stateless; there is no revocation.

pub mod jwt;

pub use jwt::{Claims, ClaimsBuilder, TokenAuthenticator, TokenError};
