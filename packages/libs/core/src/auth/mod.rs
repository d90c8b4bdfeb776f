//! 인증 관련 타입 및 로직
//!
//! # 개요
//!
//! 규칙 평가에 필요한 호출자 정보(claims)는 Bearer 토큰에서 얻습니다.
//!
//! - **Access Token**: End User용 PASETO v4.local (암호화)
//! - **Service Token**: webhook 호출 시 내부 서비스임을 증명하는 PASETO 토큰
//! - **Internal Identity**: `id == "internal-sc-user"`인 claims는 Deny를 제외한 모든 규칙을 통과

mod claims;
mod token;

pub use claims::{is_expired, is_internal, Claims, INTERNAL_USER_ID, SERVICE_ROLE};
pub use token::{bearer_token, PasetoServiceIssuer, TokenValidator};
