//! 외부 호출 클라이언트
//!
//! 규칙 엔진의 Webhook/Query 규칙이 사용하는 reqwest 기반 구현입니다.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use stk_core::external::{DataStore, HttpInvoker};
use stk_core::{Error, Result};

/// Webhook 호출기
///
/// 호출자 토큰은 `Authorization: Bearer`, 서비스 토큰은 `X-SC-Token: Bearer`로 전달합니다.
pub struct ReqwestInvoker {
    client: Client,
}

impl ReqwestInvoker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpInvoker for ReqwestInvoker {
    async fn invoke(
        &self,
        method: &str,
        url: &str,
        caller_token: &str,
        service_token: &str,
        payload: &Value,
    ) -> Result<Value> {
        let webhook_error = |message: String| Error::Webhook {
            url: url.to_string(),
            message,
        };

        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| webhook_error(format!("invalid method: {e}")))?;

        let mut request = self
            .client
            .request(method, url)
            .header("X-SC-Token", format!("Bearer {service_token}"))
            .json(payload);
        if !caller_token.is_empty() {
            request = request.bearer_auth(caller_token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| webhook_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(webhook_error(format!("responded with status {status}")));
        }

        // 본문이 비어 있거나 JSON이 아니어도 성공으로 처리
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(url, error = %e, "failed to read webhook response body");
                return Ok(Value::Null);
            }
        };
        Ok(serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}

/// 데이터 서비스 조회 요청
#[derive(Debug, Serialize)]
struct ReadRequest<'a> {
    find: &'a Map<String, Value>,
    op: &'static str,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    #[serde(default)]
    result: Value,
}

/// HTTP 데이터 서비스
///
/// `POST {base_url}/v1/{store}/{collection}/read`에 `{find, op: "one"}`을 보냅니다.
pub struct HttpDataStore {
    client: Client,
    base_url: String,
}

impl HttpDataStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn read_url(&self, store: &str, collection: &str) -> String {
        format!("{}/v1/{}/{}/read", self.base_url, store, collection)
    }
}

#[async_trait]
impl DataStore for HttpDataStore {
    async fn find_one(
        &self,
        store: &str,
        collection: &str,
        find: &Map<String, Value>,
    ) -> Result<Option<Value>> {
        let data_error = |message: String| Error::DataStore { message };

        let response = self
            .client
            .post(self.read_url(store, collection))
            .json(&ReadRequest { find, op: "one" })
            .send()
            .await
            .map_err(|e| data_error(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(data_error(format!(
                    "{store}/{collection} read responded with status {status}"
                )))
            }
            _ => {}
        }

        let body: ReadResponse = response
            .json()
            .await
            .map_err(|e| data_error(format!("malformed read response: {e}")))?;
        Ok(match body.result {
            Value::Null => None,
            Value::Array(items) if items.is_empty() => None,
            record => Some(record),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_url() {
        let store = HttpDataStore::new(Client::new(), "http://data:4122/");
        assert_eq!(store.read_url("mongo", "members"), "http://data:4122/v1/mongo/members/read");
    }

    #[test]
    fn test_read_request_body() {
        let find = serde_json::json!({"userId": "u1"}).as_object().cloned().unwrap();
        let body = serde_json::to_value(ReadRequest { find: &find, op: "one" }).unwrap();
        assert_eq!(body, serde_json::json!({"find": {"userId": "u1"}, "op": "one"}));
    }
}
