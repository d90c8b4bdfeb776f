//! 규칙 평가 / 후처리 핸들러
//!
//! 엔진을 직접 링크하지 않는 호출자(데이터 플레인 서비스 등)를 위한 엔드포인트입니다.
//!
//! - `POST /v1/evaluate`: 리소스에 대한 규칙 평가. 거부되면 403 (토큰 실패는 401)
//! - `POST /v1/post-process`: 평가 결과로 받은 액션을 결과 문서에 적용

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use stk_core::auth::bearer_token;
use stk_core::permissions::{
    AggregateRequest, CreateRequest, DeferredActions, DeleteRequest, FileOperation, Operation,
    ReadRequest, UpdateRequest,
};

use crate::error::{BridgeError, Result};
use crate::state::AppState;

/// 평가 대상 리소스
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Resource {
    Crud {
        db: String,
        col: String,
        op: Operation,
    },
    Function {
        service: String,
        endpoint: String,
    },
    File {
        path: String,
        op: FileOperation,
    },
    Event {
        #[serde(rename = "eventType")]
        event_type: String,
    },
}

/// /v1/evaluate 요청 본문
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub project: String,

    pub resource: Resource,

    /// 작업별 인자 (예: read → `{op, find}`, function → params, event → data)
    #[serde(default)]
    pub args: Value,
}

/// /v1/evaluate 응답 본문
#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    /// 결과 문서에 적용할 후처리 액션
    pub actions: DeferredActions,

    /// 규칙에 의해 바뀐 인자 (호출자는 이 값으로 실제 작업을 수행해야 함)
    pub args: Value,
}

/// /v1/post-process 요청 본문
#[derive(Debug, Deserialize)]
pub struct PostProcessRequest {
    #[serde(default)]
    pub actions: DeferredActions,

    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Serialize)]
pub struct PostProcessResponse {
    pub result: Value,
}

/// /v1/evaluate 핸들러
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>> {
    let token = bearer_token(headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()))
        .unwrap_or_default();
    let policy = &state.policy;
    let project = request.project.as_str();

    let (actions, args) = match request.resource {
        Resource::Crud { db, col, op } => match op {
            Operation::Create => {
                let mut req: CreateRequest = parse_args(request.args)?;
                policy
                    .is_create_authorised(project, &db, &col, token, &mut req)
                    .await?;
                (DeferredActions::new(), to_json(&req)?)
            }
            Operation::Read => {
                let mut req: ReadRequest = parse_args(request.args)?;
                let actions = policy
                    .is_read_authorised(project, &db, &col, token, &mut req)
                    .await?;
                (actions, to_json(&req)?)
            }
            Operation::Update => {
                let mut req: UpdateRequest = parse_args(request.args)?;
                policy
                    .is_update_authorised(project, &db, &col, token, &mut req)
                    .await?;
                (DeferredActions::new(), to_json(&req)?)
            }
            Operation::Delete => {
                let mut req: DeleteRequest = parse_args(request.args)?;
                policy
                    .is_delete_authorised(project, &db, &col, token, &mut req)
                    .await?;
                (DeferredActions::new(), to_json(&req)?)
            }
            Operation::Aggregate => {
                let mut req: AggregateRequest = parse_args(request.args)?;
                let actions = policy
                    .is_aggregate_authorised(project, &db, &col, token, &mut req)
                    .await?;
                (actions, to_json(&req)?)
            }
        },
        Resource::Function { service, endpoint } => {
            let mut params = request.args;
            let (_, actions) = policy
                .is_func_call_authorised(project, &service, &endpoint, token, &mut params)
                .await?;
            (actions, params)
        }
        Resource::File { path, op } => {
            let extra: Map<String, Value> = parse_args(request.args)?;
            let actions = policy
                .is_file_op_authorised(project, token, &path, op, extra)
                .await?;
            (actions, Value::Null)
        }
        Resource::Event { event_type } => {
            let mut data = request.args;
            policy
                .is_eventing_authorised(project, token, &event_type, &mut data)
                .await?;
            (DeferredActions::new(), data)
        }
    };

    Ok(Json(EvaluateResponse { actions, args }))
}

/// /v1/post-process 핸들러
pub async fn post_process(
    State(state): State<Arc<AppState>>,
    Json(mut request): Json<PostProcessRequest>,
) -> Result<Json<PostProcessResponse>> {
    state
        .policy
        .post_process(&request.actions, &mut request.result)?;
    Ok(Json(PostProcessResponse {
        result: request.result,
    }))
}

fn parse_args<T: DeserializeOwned + Default>(args: Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| BridgeError::BadRequest {
        message: format!("invalid args: {e}"),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| BridgeError::Internal {
        message: format!("failed to encode args: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use stk_core::auth::TokenValidator;
    use stk_core::external::Collaborators;
    use stk_core::permissions::{ModuleConfig, PolicyModule, SecurityPolicy};
    use tower::ServiceExt;

    use crate::config::Config;

    const POLICY: &str = r#"
crud:
  mongo:
    collections:
      todos:
        rules:
          read:
            rule: and
            clauses:
              - rule: force
                field: args.find.owner
                value: auth.id
              - rule: remove
                fields: [res.password]
          delete:
            rule: match
            type: string
            eval: "=="
            f1: auth.role
            f2: admin
            error: only admins can delete todos
eventing:
  default:
    rule: allow
"#;

    fn app() -> axum::Router {
        let config = Config {
            port: 0,
            project: "todo-app".to_string(),
            policy_path: String::new(),
            aes_key: None,
            paseto_keys: vec![],
            service_key: None,
            node_id: "bridge".to_string(),
            data_url: None,
            call_timeout_secs: 1,
        };
        let module = PolicyModule::new(
            ModuleConfig::new("todo-app", SecurityPolicy::from_yaml(POLICY).unwrap()),
            Collaborators::new(Arc::new(TokenValidator::new(vec![]))),
        );
        crate::create_router(Arc::new(AppState::from_parts(config, module)))
    }

    async fn post(app: axum::Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {token}"));
        }
        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_evaluate_read_returns_actions_and_rewritten_args() {
        let (status, body) = post(
            app(),
            "/v1/evaluate",
            Some(r#"json:{"id":"u1"}"#),
            json!({
                "project": "todo-app",
                "resource": {"type": "crud", "db": "mongo", "col": "todos", "op": "read"},
                "args": {"op": "all", "find": {"done": false}}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["actions"], json!([{"action": "remove", "field": "res.password"}]));
        assert_eq!(body["args"]["find"], json!({"done": false, "owner": "u1"}));
    }

    #[tokio::test]
    async fn test_evaluate_denial_uses_custom_message() {
        let (status, body) = post(
            app(),
            "/v1/evaluate",
            Some(r#"json:{"id":"u1","role":"user"}"#),
            json!({
                "project": "todo-app",
                "resource": {"type": "crud", "db": "mongo", "col": "todos", "op": "delete"},
                "args": {"find": {"id": "t1"}}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["message"], "only admins can delete todos");
        assert!(body["error"]["requestId"].is_string());
    }

    #[tokio::test]
    async fn test_evaluate_without_token_is_unauthorized() {
        let (status, _) = post(
            app(),
            "/v1/evaluate",
            None,
            json!({
                "project": "todo-app",
                "resource": {"type": "crud", "db": "mongo", "col": "todos", "op": "read"}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_evaluate_event_allows_without_token() {
        let (status, body) = post(
            app(),
            "/v1/evaluate",
            None,
            json!({
                "project": "todo-app",
                "resource": {"type": "event", "eventType": "order-created"},
                "args": {"orderId": 1}
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["args"], json!({"orderId": 1}));
    }

    #[tokio::test]
    async fn test_post_process_endpoint() {
        let (status, body) = post(
            app(),
            "/v1/post-process",
            None,
            json!({
                "actions": [
                    {"action": "remove", "field": "res.password"},
                    {"action": "force", "field": "res.owner", "value": "u1"}
                ],
                "result": [{"title": "a", "password": "x"}]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], json!([{"title": "a", "owner": "u1"}]));

        let (status, body) = post(
            app(),
            "/v1/post-process",
            None,
            json!({"actions": [], "result": 42}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INVALID_RESULT_TYPE");
    }
}
