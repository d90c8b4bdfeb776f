//! 외부 협력자 인터페이스
//!
//! 규칙 엔진은 토큰 검증, 서비스 토큰 발급, HTTP 호출, 데이터 저장소 조회를
//! 직접 구현하지 않고 아래 trait을 통해서만 사용합니다.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::auth::Claims;
use crate::error::Result;

/// Bearer 토큰을 검증하고 claims를 돌려주는 검증기
#[cfg_attr(test, mockall::automock)]
pub trait ClaimsVerifier: Send + Sync {
    fn parse_token(&self, token: &str) -> Result<Claims>;
}

/// 내부 서비스 토큰 발급기 (webhook 호출 시 사용)
#[cfg_attr(test, mockall::automock)]
pub trait ServiceTokenIssuer: Send + Sync {
    fn service_token(&self) -> Result<String>;
}

/// 외부 HTTP 호출기
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpInvoker: Send + Sync {
    async fn invoke(
        &self,
        method: &str,
        url: &str,
        caller_token: &str,
        service_token: &str,
        payload: &Value,
    ) -> Result<Value>;
}

/// 데이터 저장소 존재 확인
///
/// 레코드가 없으면 `Ok(None)`을 반환합니다. 없는 것 자체는 에러가 아닙니다.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn find_one(
        &self,
        store: &str,
        collection: &str,
        find: &Map<String, Value>,
    ) -> Result<Option<Value>>;
}

/// 규칙 평가기가 사용하는 협력자 묶음
#[derive(Clone)]
pub struct Collaborators {
    pub verifier: Arc<dyn ClaimsVerifier>,
    pub issuer: Option<Arc<dyn ServiceTokenIssuer>>,
    pub invoker: Option<Arc<dyn HttpInvoker>>,
    pub store: Option<Arc<dyn DataStore>>,
}

impl Collaborators {
    /// 토큰 검증기만 가진 협력자 묶음 생성
    pub fn new(verifier: Arc<dyn ClaimsVerifier>) -> Self {
        Self {
            verifier,
            issuer: None,
            invoker: None,
            store: None,
        }
    }

    pub fn with_issuer(mut self, issuer: Arc<dyn ServiceTokenIssuer>) -> Self {
        self.issuer = Some(issuer);
        self
    }

    pub fn with_invoker(mut self, invoker: Arc<dyn HttpInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.store = Some(store);
        self
    }
}
