//! Token issuance and validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::codec::{self, ClaimMap};
use crate::auth::error::{AuthError, TokenRejection};
use crate::auth::signature::SignatureEngine;
use crate::types::{Permission, Username};

/// Default token lifetime: one hour.
pub const DEFAULT_EXPIRATION_MS: i64 = 60 * 60 * 1000;

/// Signing secret and token lifetime. Loaded once at startup.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub secret: String,
    /// Lifetime of an issued token in milliseconds.
    #[serde(default = "default_expiration_ms")]
    pub expiration_ms: i64,
}

fn default_expiration_ms() -> i64 {
    DEFAULT_EXPIRATION_MS
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>, expiration_ms: i64) -> Self {
        Self {
            secret: secret.into(),
            expiration_ms,
        }
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("expiration_ms", &self.expiration_ms)
            .finish()
    }
}

/// Claims of a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims(ClaimMap);

impl Claims {
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").map(String::as_str)
    }

    /// `roles` split on whitespace. Empty when the claim is absent.
    pub fn roles(&self) -> Vec<Permission> {
        self.0
            .get("roles")
            .map(|roles| split_roles(roles))
            .unwrap_or_default()
    }

    pub fn issued_at(&self) -> Option<i64> {
        self.0.get("iat").and_then(|v| v.parse().ok())
    }

    pub fn expires_at(&self) -> Option<i64> {
        self.0.get("exp").and_then(|v| v.parse().ok())
    }
}

fn split_roles(roles: &str) -> Vec<Permission> {
    roles.split_whitespace().map(Permission::from).collect()
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Issues and validates HS256 bearer tokens.
#[derive(Debug, Clone)]
pub struct TokenService {
    signer: SignatureEngine,
    expiration_ms: i64,
}

impl TokenService {
    pub fn new(config: &TokenConfig) -> Result<Self, AuthError> {
        if config.expiration_ms <= 0 {
            return Err(AuthError::Misconfigured(format!(
                "token expiration must be positive, got {}ms",
                config.expiration_ms
            )));
        }

        Ok(Self {
            signer: SignatureEngine::new(config.secret.as_bytes())?,
            expiration_ms: config.expiration_ms,
        })
    }

    /// Issue a token for `subject` carrying the space-delimited `roles`.
    pub fn issue(&self, subject: &Username, roles: &str) -> String {
        self.issue_at(subject, roles, now_millis())
    }

    /// Issue a token as if the current time were `now_ms`.
    pub fn issue_at(&self, subject: &Username, roles: &str, now_ms: i64) -> String {
        let mut payload = Map::new();
        payload.insert("sub".to_string(), Value::from(subject.as_str()));
        payload.insert("roles".to_string(), Value::from(roles));
        payload.insert("iat".to_string(), Value::from(now_ms));
        payload.insert(
            "exp".to_string(),
            Value::from(now_ms.saturating_add(self.expiration_ms)),
        );

        let signing_input = codec::encode(&codec::header(), &payload);
        let signature = self.signer.sign(&signing_input);

        debug!(subject = %subject, "issued token");
        format!("{}.{}", signing_input, signature)
    }

    /// The `sub` claim. Does not verify the signature.
    pub fn extract_subject(&self, token: &str) -> Result<Username, AuthError> {
        let claims = read_claims(token)?;
        claims
            .get("sub")
            .map(|s| Username::new(s.as_str()))
            .ok_or(AuthError::InvalidToken(TokenRejection::Subject))
    }

    /// The `roles` claim split on whitespace. Does not verify the signature.
    pub fn extract_roles(&self, token: &str) -> Result<Vec<Permission>, AuthError> {
        let claims = read_claims(token)?;
        Ok(claims
            .get("roles")
            .map(|roles| split_roles(roles))
            .unwrap_or_default())
    }

    pub fn is_expired(&self, token: &str) -> Result<bool, AuthError> {
        self.is_expired_at(token, now_millis())
    }

    pub fn is_expired_at(&self, token: &str, now_ms: i64) -> Result<bool, AuthError> {
        let claims = read_claims(token)?;
        let exp = expiry(&claims).ok_or(AuthError::InvalidToken(TokenRejection::Malformed))?;
        Ok(now_ms > exp)
    }

    /// True iff the signature verifies, the subject matches and the token
    /// has not expired.
    pub fn validate(&self, token: &str, expected_subject: &Username) -> bool {
        self.check(token, expected_subject).is_ok()
    }

    pub fn check(&self, token: &str, expected_subject: &Username) -> Result<Claims, TokenRejection> {
        self.check_at(token, expected_subject, now_millis())
    }

    /// Run the full validation sequence, stopping at the first failure.
    ///
    /// The signature is verified before any claim is looked at.
    pub fn check_at(
        &self,
        token: &str,
        expected_subject: &Username,
        now_ms: i64,
    ) -> Result<Claims, TokenRejection> {
        let segments = codec::decode(token).map_err(|_| TokenRejection::Malformed)?;

        let header = codec::decode_claims(segments.header).map_err(|_| TokenRejection::Malformed)?;
        if header.get("alg").map(String::as_str) != Some("HS256") {
            debug!("token header names an unsupported algorithm");
            return Err(TokenRejection::Malformed);
        }

        if !self
            .signer
            .verify(&segments.signing_input(), segments.signature)
        {
            return Err(TokenRejection::Signature);
        }

        let claims =
            codec::decode_claims(segments.payload).map_err(|_| TokenRejection::Malformed)?;

        if claims.get("sub").map(String::as_str) != Some(expected_subject.as_str()) {
            return Err(TokenRejection::Subject);
        }

        let exp = expiry(&claims).ok_or(TokenRejection::Malformed)?;
        if now_ms > exp {
            return Err(TokenRejection::Expired);
        }

        Ok(Claims(claims))
    }
}

fn read_claims(token: &str) -> Result<ClaimMap, AuthError> {
    let segments =
        codec::decode(token).map_err(|_| AuthError::InvalidToken(TokenRejection::Malformed))?;
    codec::decode_claims(segments.payload)
        .map_err(|_| AuthError::InvalidToken(TokenRejection::Malformed))
}

fn expiry(claims: &ClaimMap) -> Option<i64> {
    claims.get("exp").and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    const TTL: i64 = 10_000;

    fn service() -> TokenService {
        TokenService::new(&TokenConfig::new("test-secret", TTL)).unwrap()
    }

    fn alice() -> Username {
        Username::new("alice")
    }

    #[test]
    fn test_config_rejects_bad_values() {
        assert!(matches!(
            TokenService::new(&TokenConfig::new("", TTL)),
            Err(AuthError::Misconfigured(_))
        ));
        assert!(matches!(
            TokenService::new(&TokenConfig::new("secret", 0)),
            Err(AuthError::Misconfigured(_))
        ));
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let rendered = format!("{:?}", TokenConfig::new("hunter2", TTL));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("10000"));
    }

    #[test]
    fn test_issue_then_validate() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get incident.create");
        assert_eq!(token.split('.').count(), 3);
        assert!(svc.validate(&token, &alice()));
    }

    #[test]
    fn test_issued_claims() {
        let svc = service();
        let token = svc.issue_at(&alice(), "incident.get", 1_000);
        let claims = svc.check_at(&token, &alice(), 1_000).unwrap();

        assert_eq!(claims.subject(), Some("alice"));
        assert_eq!(claims.issued_at(), Some(1_000));
        assert_eq!(claims.expires_at(), Some(1_000 + TTL));
        assert_eq!(claims.roles(), vec![Permission::new("incident.get")]);
    }

    #[test]
    fn test_expiry_boundary() {
        let svc = service();
        let issued = 5_000;
        let token = svc.issue_at(&alice(), "incident.get", issued);

        assert!(svc.check_at(&token, &alice(), issued).is_ok());
        assert!(svc.check_at(&token, &alice(), issued + TTL).is_ok());
        assert_eq!(
            svc.check_at(&token, &alice(), issued + TTL + 1),
            Err(TokenRejection::Expired)
        );
        assert!(svc.is_expired_at(&token, issued + TTL + 1).unwrap());
        assert!(!svc.is_expired_at(&token, issued).unwrap());
    }

    #[test]
    fn test_expired_token_fails_validate() {
        let svc = service();
        let token = svc.issue_at(&alice(), "incident.get", now_millis() - TTL - 1);
        assert!(!svc.validate(&token, &alice()));
        assert!(svc.is_expired(&token).unwrap());
    }

    #[test]
    fn test_subject_mismatch() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get");
        assert_eq!(
            svc.check(&token, &Username::new("bob")),
            Err(TokenRejection::Subject)
        );
        assert!(!svc.validate(&token, &Username::new("bob")));
    }

    #[test]
    fn test_every_signature_byte_is_checked() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get");
        let (prefix, signature) = token.rsplit_once('.').unwrap();

        for i in 0..signature.len() {
            let mut bytes = signature.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = format!("{}.{}", prefix, String::from_utf8(bytes).unwrap());
            assert!(!svc.validate(&tampered, &alice()), "byte {} not covered", i);
        }
    }

    #[test]
    fn test_payload_tamper_detected() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get");
        let segments = codec::decode(&token).unwrap();

        let forged_payload = URL_SAFE_NO_PAD.encode(
            format!(
                r#"{{"exp":{},"iat":0,"roles":"incident.get incident.delete","sub":"alice"}}"#,
                now_millis() + TTL
            )
            .as_bytes(),
        );
        let forged = format!("{}.{}.{}", segments.header, forged_payload, segments.signature);

        assert_eq!(
            svc.check(&forged, &alice()),
            Err(TokenRejection::Signature)
        );
        assert!(!svc.validate(&forged, &alice()));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let ours = service();
        let theirs = TokenService::new(&TokenConfig::new("someone-else", TTL)).unwrap();
        let token = theirs.issue(&alice(), "incident.get");
        assert_eq!(
            ours.check(&token, &alice()),
            Err(TokenRejection::Signature)
        );
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get");
        let segments = codec::decode(&token).unwrap();
        let none_header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let forged = format!("{}.{}.{}", none_header, segments.payload, segments.signature);

        assert_eq!(
            svc.check(&forged, &alice()),
            Err(TokenRejection::Malformed)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let svc = service();
        assert_eq!(
            svc.check("not-a-token", &alice()),
            Err(TokenRejection::Malformed)
        );
        assert!(matches!(
            svc.extract_subject("a.b"),
            Err(AuthError::InvalidToken(TokenRejection::Malformed))
        ));
        assert!(matches!(
            svc.is_expired("x.y.z"),
            Err(AuthError::InvalidToken(TokenRejection::Malformed))
        ));
    }

    #[test]
    fn test_extract_roles_roundtrip() {
        let svc = service();
        let token = svc.issue(&alice(), "a b c");
        let roles = svc.extract_roles(&token).unwrap();
        assert_eq!(
            roles,
            vec![Permission::new("a"), Permission::new("b"), Permission::new("c")]
        );
    }

    #[test]
    fn test_extract_roles_collapses_whitespace() {
        let svc = service();
        let token = svc.issue(&alice(), "  incident.get\tincident.update  ");
        let roles = svc.extract_roles(&token).unwrap();
        assert_eq!(
            roles,
            vec![Permission::new("incident.get"), Permission::new("incident.update")]
        );
    }

    #[test]
    fn test_extract_roles_absent_claim_is_empty() {
        let svc = service();
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"alice","exp":1}"#);
        let token = format!("h.{}.s", payload);
        assert!(svc.extract_roles(&token).unwrap().is_empty());
    }

    #[test]
    fn test_extract_subject() {
        let svc = service();
        let token = svc.issue(&alice(), "incident.get");
        assert_eq!(svc.extract_subject(&token).unwrap(), alice());

        let payload = URL_SAFE_NO_PAD.encode(br#"{"roles":"x"}"#);
        let token = format!("h.{}.s", payload);
        assert!(matches!(
            svc.extract_subject(&token),
            Err(AuthError::InvalidToken(TokenRejection::Subject))
        ));
    }

    #[test]
    fn test_tokens_are_standard_hs256() {
        let svc = service();
        let token = svc.issue_at(&alice(), "incident.get", 42);
        let segments = codec::decode(&token).unwrap();

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments.header).unwrap()).unwrap();
        assert_eq!(header, serde_json::json!({"alg": "HS256", "typ": "JWT"}));

        let payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(segments.payload).unwrap()).unwrap();
        assert_eq!(
            payload,
            serde_json::json!({
                "sub": "alice",
                "roles": "incident.get",
                "iat": 42,
                "exp": 42 + TTL,
            })
        );
    }

    #[test]
    fn test_standard_decoder_accepts_issued_token() {
        #[derive(Deserialize)]
        struct StandardClaims {
            sub: String,
            roles: String,
        }

        let token = service().issue(&alice(), "incident.get incident.update");

        let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let decoded = jsonwebtoken::decode::<StandardClaims>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(b"test-secret"),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.claims.sub, "alice");
        assert_eq!(decoded.claims.roles, "incident.get incident.update");
    }
}
