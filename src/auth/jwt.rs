use crate::auth::expiration::TokenExpiration;
use crate::auth::options::TokenOptions;
use crate::types::{AppError, Claims, Result, TokenError};
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde_json::Value;
use std::fmt;

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// Shared secret used for both signing and verifying.
///
/// Never printed; `Debug` is redacted.
#[derive(Clone)]
pub struct Secret(Vec<u8>);

impl Secret {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(secret.as_ref().to_vec())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(..)")
    }
}

/// HMAC token signing and verification.
///
/// Signing injects `iat`/`exp` (and the claims named by [`TokenOptions`]);
/// verification checks the signature and the timing claims with second
/// precision and no leeway.
#[derive(Debug, Clone)]
pub struct TokenService {
    secret: Secret,
}

impl TokenService {
    /// Creates a new TokenService signing with `secret`.
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    /// Signs `payload` as the claims of a new token.
    ///
    /// `payload` must be a JSON object. Fails with [`AppError::Signing`] when the
    /// secret is empty, when the payload is not an object, when it already carries `exp`, when an option would overwrite a
    /// claim already present, or when the algorithm is not HMAC.
    pub fn sign(
        &self,
        payload: Value,
        options: &TokenOptions,
        expiration: &TokenExpiration,
    ) -> Result<String> {
        self.sign_at(payload, options, expiration, Utc::now().timestamp())
    }

    pub(crate) fn sign_at(
        &self,
        payload: Value,
        options: &TokenOptions,
        expiration: &TokenExpiration,
        now: i64,
    ) -> Result<String> {
        if self.secret.is_empty() {
            return Err(AppError::Signing(
                "secretOrPrivateKey must have a value".to_string(),
            ));
        }

        let Value::Object(mut claims) = payload else {
            return Err(AppError::Signing(
                "payload must be a JSON object".to_string(),
            ));
        };

        let algorithm = options.algorithm.unwrap_or(Algorithm::HS256);
        if !HMAC_ALGORITHMS.contains(&algorithm) {
            return Err(AppError::Signing(format!(
                "algorithm {algorithm:?} is not supported with a shared secret"
            )));
        }

        if claims.contains_key("exp") {
            return Err(AppError::Signing(
                "payload already has an \"exp\" property; expiration comes from tokenExpiration"
                    .to_string(),
            ));
        }

        let timestamp = claims.get("iat").and_then(Value::as_i64).unwrap_or(now);
        if options.no_timestamp {
            claims.remove("iat");
        } else {
            claims.insert("iat".to_string(), Value::from(timestamp));
        }

        if let Some(not_before) = &options.not_before {
            insert_claim(&mut claims, "nbf", Value::from(not_before.offset_from(timestamp)))?;
        }
        claims.insert("exp".to_string(), Value::from(expiration.offset_from(timestamp)));

        if let Some(subject) = &options.subject {
            insert_claim(&mut claims, "sub", Value::from(subject.as_str()))?;
        }
        if let Some(issuer) = &options.issuer {
            insert_claim(&mut claims, "iss", Value::from(issuer.as_str()))?;
        }
        if let Some(audience) = &options.audience {
            insert_claim(&mut claims, "aud", Value::from(audience.as_str()))?;
        }
        if let Some(jwt_id) = &options.jwt_id {
            insert_claim(&mut claims, "jti", Value::from(jwt_id.as_str()))?;
        }

        let mut header = Header::new(algorithm);
        header.kid = options.key_id.clone();

        encode(
            &header,
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| AppError::Signing(format!("Failed to generate token: {}", e)))
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub(crate) fn verify_at(
        &self,
        token: &str,
        now: i64,
    ) -> std::result::Result<Claims, TokenError> {
        // Nothing verifies against an empty key.
        if self.secret.is_empty() {
            return Err(TokenError::Invalid(
                "secret or public key must be provided".to_string(),
            ));
        }

        // Timing claims are checked below with exact-second semantics.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(map_decode_error)?;

        if let Some(nbf) = claims.get("nbf") {
            let nbf = nbf
                .as_i64()
                .ok_or_else(|| TokenError::Invalid("invalid nbf value".to_string()))?;
            if nbf > now {
                return Err(TokenError::NotActive {
                    not_before: timestamp_to_datetime(nbf),
                });
            }
        }

        if let Some(exp) = claims.get("exp") {
            let exp = exp
                .as_i64()
                .ok_or_else(|| TokenError::Invalid("invalid exp value".to_string()))?;
            if now >= exp {
                return Err(TokenError::Expired {
                    expired_at: timestamp_to_datetime(exp),
                });
            }
        }

        Ok(claims)
    }
}

fn insert_claim(claims: &mut Claims, name: &str, value: Value) -> Result<()> {
    if claims.contains_key(name) {
        return Err(AppError::Signing(format!(
            "payload already has a \"{name}\" property"
        )));
    }
    claims.insert(name.to_string(), value);
    Ok(())
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature => TokenError::SignatureMismatch,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            TokenError::InvalidAlgorithm
        }
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenError::Malformed(err.to_string()),
        _ => TokenError::Invalid(err.to_string()),
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn create_test_service() -> TokenService {
        TokenService::new(Secret::new("test-secret-key-that-is-at-least-32-chars"))
    }

    fn one_hour() -> TokenExpiration {
        TokenExpiration::parse("1h").unwrap()
    }

    #[test]
    fn test_sign_and_verify_round_trip() {
        let service = create_test_service();
        let token = service
            .sign_at(json!({"username": "a"}), &TokenOptions::default(), &one_hour(), NOW)
            .expect("should sign");
        let claims = service.verify_at(&token, NOW + 1).expect("should verify");

        assert_eq!(claims.get("username"), Some(&json!("a")));
        assert_eq!(claims.get("iat"), Some(&json!(NOW)));
        assert_eq!(claims.get("exp"), Some(&json!(NOW + 3600)));
        assert_eq!(claims.len(), 3);
    }

    #[test]
    fn test_token_has_three_segments() {
        let service = create_test_service();
        let token = service
            .sign(json!({"a": 1}), &TokenOptions::default(), &one_hour())
            .expect("should sign");
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_wrong_secret_is_signature_mismatch() {
        let signer = TokenService::new(Secret::new("secret-one"));
        let verifier = TokenService::new(Secret::new("secret-two"));

        let token = signer
            .sign_at(json!({"a": 1}), &TokenOptions::default(), &one_hour(), NOW)
            .unwrap();

        assert_eq!(
            verifier.verify_at(&token, NOW),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        let service = create_test_service();
        let result = service.verify_at("garbage", NOW);
        assert!(matches!(result, Err(TokenError::Malformed(_))), "{result:?}");
    }

    #[test]
    fn test_tampered_payload_fails() {
        let service = create_test_service();
        let token = service
            .sign_at(json!({"role": "user"}), &TokenOptions::default(), &one_hour(), NOW)
            .unwrap();
        let forged = service
            .sign_at(json!({"role": "admin"}), &TokenOptions::default(), &one_hour(), NOW)
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert_eq!(
            service.verify_at(&spliced, NOW),
            Err(TokenError::SignatureMismatch)
        );
    }

    #[test]
    fn test_expired_at_exact_second() {
        let service = create_test_service();
        let expiration = TokenExpiration::parse("10s").unwrap();
        let token = service
            .sign_at(json!({}), &TokenOptions::default(), &expiration, NOW)
            .unwrap();

        assert!(service.verify_at(&token, NOW + 9).is_ok());
        assert!(matches!(
            service.verify_at(&token, NOW + 10),
            Err(TokenError::Expired { .. })
        ));
    }

    #[test]
    fn test_sub_second_lifetime_is_expired_immediately() {
        let service = create_test_service();
        let expiration = TokenExpiration::parse("1ms").unwrap();
        let token = service
            .sign_at(json!({"a": 1}), &TokenOptions::default(), &expiration, NOW)
            .unwrap();

        match service.verify_at(&token, NOW) {
            Err(TokenError::Expired { expired_at }) => assert_eq!(expired_at.timestamp(), NOW),
            other => panic!("expected expiry, got {other:?}"),
        }
    }

    #[test]
    fn test_not_before() {
        let service = create_test_service();
        let options = TokenOptions::new().with_not_before(TokenExpiration::parse("1m").unwrap());
        let token = service
            .sign_at(json!({}), &options, &one_hour(), NOW)
            .unwrap();

        assert!(matches!(
            service.verify_at(&token, NOW + 59),
            Err(TokenError::NotActive { .. })
        ));
        assert!(service.verify_at(&token, NOW + 60).is_ok());
    }

    #[test]
    fn test_options_inject_registered_claims() {
        let service = create_test_service();
        let options = TokenOptions::new()
            .with_subject("user-9")
            .with_issuer("tokengate")
            .with_audience("api")
            .with_jwt_id("abc")
            .with_algorithm(Algorithm::HS384);
        let token = service
            .sign_at(json!({"x": true}), &options, &one_hour(), NOW)
            .unwrap();

        let claims = service.verify_at(&token, NOW).unwrap();
        assert_eq!(claims["sub"], json!("user-9"));
        assert_eq!(claims["iss"], json!("tokengate"));
        assert_eq!(claims["aud"], json!("api"));
        assert_eq!(claims["jti"], json!("abc"));

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS384);
    }

    #[test]
    fn test_key_id_lands_in_header() {
        let service = create_test_service();
        let token = service
            .sign_at(json!({}), &TokenOptions::new().with_key_id("k1"), &one_hour(), NOW)
            .unwrap();
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_payload_iat_is_kept_as_timestamp_base() {
        let service = create_test_service();
        let token = service
            .sign_at(json!({"iat": NOW - 100}), &TokenOptions::default(), &one_hour(), NOW)
            .unwrap();
        let claims = service.verify_at(&token, NOW).unwrap();
        assert_eq!(claims["iat"], json!(NOW - 100));
        assert_eq!(claims["exp"], json!(NOW - 100 + 3600));
    }

    #[test]
    fn test_no_timestamp_omits_iat() {
        let service = create_test_service();
        let token = service
            .sign_at(json!({}), &TokenOptions::new().without_timestamp(), &one_hour(), NOW)
            .unwrap();
        let claims = service.verify_at(&token, NOW).unwrap();
        assert!(!claims.contains_key("iat"));
        assert_eq!(claims["exp"], json!(NOW + 3600));
    }

    #[test]
    fn test_non_object_payload_is_signing_error() {
        let service = create_test_service();
        let result = service.sign_at(json!("just a string"), &TokenOptions::default(), &one_hour(), NOW);
        assert!(matches!(result, Err(AppError::Signing(_))));
    }

    #[test]
    fn test_payload_exp_is_signing_error() {
        let service = create_test_service();
        let result = service.sign_at(json!({"exp": NOW}), &TokenOptions::default(), &one_hour(), NOW);
        assert!(matches!(result, Err(AppError::Signing(_))));
    }

    #[test]
    fn test_conflicting_subject_is_signing_error() {
        let service = create_test_service();
        let result = service.sign_at(
            json!({"sub": "already"}),
            &TokenOptions::new().with_subject("other"),
            &one_hour(),
            NOW,
        );
        assert!(matches!(result, Err(AppError::Signing(_))));
    }

    #[test]
    fn test_asymmetric_algorithm_is_signing_error() {
        let service = create_test_service();
        let result = service.sign_at(
            json!({}),
            &TokenOptions::new().with_algorithm(Algorithm::RS256),
            &one_hour(),
            NOW,
        );
        assert!(matches!(result, Err(AppError::Signing(_))));
    }

    #[test]
    fn test_empty_secret_refuses_to_sign() {
        let service = TokenService::new(Secret::new(""));
        let result = service.sign_at(json!({"a": 1}), &TokenOptions::default(), &one_hour(), NOW);
        match result {
            Err(AppError::Signing(msg)) => assert!(msg.contains("must have a value")),
            other => panic!("expected signing error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_secret_refuses_to_verify() {
        // A token genuinely signed with an empty key must still be rejected.
        let forged = encode(
            &Header::new(Algorithm::HS256),
            &json!({"a": 1, "exp": NOW + 3600}),
            &EncodingKey::from_secret(b""),
        )
        .unwrap();

        let service = TokenService::new(Secret::new(""));
        assert_eq!(
            service.verify_at(&forged, NOW),
            Err(TokenError::Invalid(
                "secret or public key must be provided".to_string()
            ))
        );
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new("do-not-print");
        assert_eq!(format!("{secret:?}"), "Secret(..)");
    }
}
