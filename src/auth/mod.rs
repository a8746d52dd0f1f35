//! Authentication and authorization.
//!
//! Tenants log in with HTTP Basic credentials and receive an HS256 bearer
//! token. Every later request presents that token:
//!
//! - **gate**: runs on every request, skips public prefixes, validates the
//!   token and attaches a [`Principal`]
//! - **policy**: handlers check the principal's permissions per operation
//!
//! ## Token format
//!
//! `base64url(header).base64url(payload).base64url(signature)` with the
//! header `{"alg":"HS256","typ":"JWT"}` and claims `sub`, `roles`
//! (space-delimited), `iat` and `exp` (both epoch milliseconds).
//!
//! ## Usage
//!
//! ```ignore
//! let tokens = Arc::new(TokenService::new(&TokenConfig::new(secret, DEFAULT_EXPIRATION_MS))?);
//! let token = tokens.issue(&Username::new("acme"), "incident.get incident.create");
//! assert!(tokens.validate(&token, &Username::new("acme")));
//! ```

mod codec;
mod context;
mod credentials;
mod error;
mod gate;
pub mod policy;
mod signature;
mod token;

pub use codec::ClaimMap;
pub use context::Principal;
pub use credentials::{BasicCredentials, CredentialAuthenticator, parse_basic};
pub use error::{
    AuthError, GENERIC_AUTH_MESSAGE, INVALID_TOKEN_MESSAGE, NO_TOKEN_MESSAGE, TokenRejection,
};
pub use gate::{AuthGate, DEFAULT_PUBLIC_PREFIXES, GateConfig, GateOutcome, auth_middleware};
pub use policy::{Operation, authorize, require};
pub use signature::SignatureEngine;
pub use token::{Claims, DEFAULT_EXPIRATION_MS, TokenConfig, TokenService, now_millis};
