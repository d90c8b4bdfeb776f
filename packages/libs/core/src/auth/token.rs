//! 토큰 검증 및 서비스 토큰 발급
//!
//! Bridge에서 Bearer 토큰을 검증해 claims를 추출하고,
//! webhook 호출에 첨부할 서비스 토큰을 발급합니다.

use base64::{engine::general_purpose, Engine as _};
use rusty_paseto::prelude::*;
use serde_json::Value;

use super::claims::{is_expired, Claims, SERVICE_ROLE};
use crate::error::{Error, Result};
use crate::external::{ClaimsVerifier, ServiceTokenIssuer};

/// `Authorization` 헤더 값에서 Bearer 토큰 추출
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 토큰 검증기
///
/// PASETO 키가 설정되어 있으면 PASETO v4.local만 허용합니다.
/// 키가 없으면 개발/로컬 환경용 디코딩 방식을 사용합니다.
/// - `json:<json>` 형식
/// - base64/base64url 인코딩된 JSON 문자열
pub struct TokenValidator {
    /// PASETO 복호화 키 (현재 + 이전 키들)
    symmetric_keys: Vec<String>,
}

impl TokenValidator {
    /// 새 검증기 생성
    pub fn new(symmetric_keys: Vec<String>) -> Self {
        Self { symmetric_keys }
    }

    /// 토큰 검증 및 Claims 추출
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let token = token.trim();
        if token.is_empty() {
            return Err(invalid("missing token"));
        }

        let claims = if self.symmetric_keys.is_empty() {
            decode_dev_token(token)?
        } else {
            self.validate_paseto(token)?
                .ok_or_else(|| invalid("paseto validation failed"))?
        };

        if is_expired(&claims) {
            return Err(invalid("token has expired"));
        }

        Ok(claims)
    }

    fn validate_paseto(&self, token: &str) -> Result<Option<Claims>> {
        for key in &self.symmetric_keys {
            let Some(key_bytes) = parse_key_material(key) else {
                continue;
            };

            let key = PasetoSymmetricKey::<V4, Local>::from(Key::from(key_bytes));
            let parsed = PasetoParser::<V4, Local>::default().parse(token, &key);

            match parsed {
                Ok(Value::Object(claims)) => return Ok(Some(claims)),
                Ok(_) => return Err(invalid("claims must be a JSON object")),
                Err(_) => continue,
            }
        }

        Ok(None)
    }
}

impl ClaimsVerifier for TokenValidator {
    fn parse_token(&self, token: &str) -> Result<Claims> {
        self.validate(token)
    }
}

fn decode_dev_token(token: &str) -> Result<Claims> {
    // 1) json: prefix (테스트/개발용)
    if let Some(raw) = token.strip_prefix("json:") {
        return serde_json::from_str::<Claims>(raw)
            .map_err(|e| invalid(&format!("malformed claims: {e}")));
    }

    // 2) base64url (no padding) -> JSON
    if let Ok(bytes) = general_purpose::URL_SAFE_NO_PAD.decode(token) {
        if let Ok(claims) = serde_json::from_slice::<Claims>(&bytes) {
            return Ok(claims);
        }
    }

    // 3) base64 (standard) -> JSON
    if let Ok(bytes) = general_purpose::STANDARD.decode(token) {
        if let Ok(claims) = serde_json::from_slice::<Claims>(&bytes) {
            return Ok(claims);
        }
    }

    Err(invalid("unable to decode access token"))
}

/// PASETO v4.local 서비스 토큰 발급기
///
/// 발급되는 토큰의 claims는 `{id: <node id>, role: "SpaceCloud"}`입니다.
pub struct PasetoServiceIssuer {
    key: [u8; 32],
    node_id: String,
}

impl PasetoServiceIssuer {
    /// 키 재료(hex/base64/raw 32바이트)로 발급기 생성
    pub fn new(key_material: &str, node_id: impl Into<String>) -> Result<Self> {
        let key = parse_key_material(key_material).ok_or_else(|| Error::NotConfigured {
            component: "service token key (32 bytes)".to_string(),
        })?;
        Ok(Self {
            key,
            node_id: node_id.into(),
        })
    }
}

impl ServiceTokenIssuer for PasetoServiceIssuer {
    fn service_token(&self) -> Result<String> {
        let key = PasetoSymmetricKey::<V4, Local>::from(Key::from(self.key));
        let id = CustomClaim::try_from(("id", self.node_id.as_str()))
            .map_err(|e| Error::crypto(e.to_string()))?;
        let role =
            CustomClaim::try_from(("role", SERVICE_ROLE)).map_err(|e| Error::crypto(e.to_string()))?;

        PasetoBuilder::<V4, Local>::default()
            .set_claim(id)
            .set_claim(role)
            .build(&key)
            .map_err(|e| Error::crypto(e.to_string()))
    }
}

fn invalid(reason: &str) -> Error {
    Error::TokenVerificationFailed {
        reason: reason.to_string(),
    }
}

fn parse_key_material(raw: &str) -> Option<[u8; 32]> {
    let trimmed = raw.trim();

    if trimmed.len() == 64 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(trimmed).ok()?.as_slice().try_into().ok();
    }

    for engine in [&general_purpose::URL_SAFE_NO_PAD, &general_purpose::STANDARD] {
        if let Ok(bytes) = engine.decode(trimmed) {
            if bytes.len() == 32 {
                return bytes.as_slice().try_into().ok();
            }
        }
    }

    trimmed.as_bytes().try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_HEX: &str = "707172737475767778797a7b7c7d7e7f808182838485868788898a8b8c8d8e8f";

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(Some("Bearer ")), None);
        assert_eq!(bearer_token(Some("Basic abc")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_dev_token_formats() {
        let validator = TokenValidator::new(vec![]);

        let claims = validator.validate(r#"json:{"id":"user_1","role":"admin"}"#).unwrap();
        assert_eq!(claims["id"], "user_1");

        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"id":"user_2"}"#);
        let claims = validator.validate(&encoded).unwrap();
        assert_eq!(claims["id"], "user_2");

        let err = validator.validate("not-a-token").unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_expired_dev_token() {
        let validator = TokenValidator::new(vec![]);
        let err = validator.parse_token(r#"json:{"id":"u","exp":1000}"#).unwrap_err();
        assert!(matches!(err, Error::TokenVerificationFailed { .. }));
    }

    #[test]
    fn test_service_token_round_trip() {
        let issuer = PasetoServiceIssuer::new(KEY_HEX, "node-1").unwrap();
        let token = issuer.service_token().unwrap();
        assert!(token.starts_with("v4.local."));

        let validator = TokenValidator::new(vec![KEY_HEX.to_string()]);
        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims["id"], "node-1");
        assert_eq!(claims["role"], SERVICE_ROLE);

        let other = TokenValidator::new(vec!["x".repeat(32)]);
        assert!(other.validate(&token).is_err());
    }

    #[test]
    fn test_parse_key_material() {
        assert!(parse_key_material(KEY_HEX).is_some());
        assert!(parse_key_material(&"k".repeat(32)).is_some());
        assert!(parse_key_material("short").is_none());
    }
}
