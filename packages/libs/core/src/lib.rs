//! stk-core: Santokit 보안 규칙 엔진
//!
//! 이 크레이트는 Bridge와 데이터 플레인 핸들러가 공유하는 보안 규칙 평가 로직을 제공합니다.
//! 요청마다 규칙 트리를 평가해 허용/거부를 결정하고, 결과 문서에 나중에 적용할
//! 후처리 액션(필드 제거, 강제 값, 암호화/복호화)을 만들어 냅니다.
//!
//! # 모듈 구조
//!
//! - `permissions`: 규칙 모델, 값 해석, 타입 비교, 규칙 평가, 결과 후처리
//! - `auth`: 토큰 claims 검증과 서비스 토큰 발급
//! - `crypto`: 필드 암호화/해시
//! - `external`: 엔진이 의존하는 외부 협력자 인터페이스
//! - `error`: 공통 에러 타입

pub mod auth;
pub mod crypto;
pub mod error;
pub mod external;
pub mod permissions;

pub use error::{Error, Result};
