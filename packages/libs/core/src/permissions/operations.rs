//! 리소스별 권한 확인
//!
//! 정책에서 리소스에 해당하는 규칙을 찾고, 작업 종류에 맞는 `args`를 만들어 평가합니다.
//! Force/Remove 규칙이 `args`를 바꾸면 그 결과가 요청 객체에 다시 반영됩니다.
//! (예: `args.find.userId`를 강제하면 실제 조회 조건이 바뀜)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::actions::DeferredActions;
use super::module::{default_deadline, PolicyModule};
use super::policy::{FileOperation, Operation};
use crate::auth::Claims;
use crate::error::Result;

/// 문서 생성 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// `one` 또는 `all` (`all`이면 `doc`은 문서 배열)
    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub doc: Value,
}

/// 조회 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub find: Map<String, Value>,
}

/// 수정 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub find: Map<String, Value>,

    #[serde(default)]
    pub update: Map<String, Value>,
}

/// 삭제 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub find: Map<String, Value>,
}

/// 집계 요청
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    #[serde(default)]
    pub op: String,

    #[serde(default)]
    pub pipeline: Value,
}

fn base_args(op: &str) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("op".to_string(), Value::String(op.to_string()));
    args
}

fn take_object(args: &mut Map<String, Value>, key: &str, target: &mut Map<String, Value>) {
    if let Some(Value::Object(value)) = args.remove(key) {
        *target = value;
    }
}

impl PolicyModule {
    /// 문서 생성 권한 확인
    ///
    /// 문서마다 따로 평가하며, 결과 문서가 없으므로 액션은 버립니다.
    pub async fn is_create_authorised(
        &self,
        project: &str,
        db: &str,
        col: &str,
        token: &str,
        req: &mut CreateRequest,
    ) -> Result<()> {
        let config = self.config();
        let rule = config.policy.crud_rule(db, col, Operation::Create)?;

        let (rows, bulk) = match (&req.op[..], &req.doc) {
            ("all", Value::Array(rows)) => (rows.clone(), true),
            (_, doc) => (vec![doc.clone()], false),
        };

        let mut evaluated = Vec::with_capacity(rows.len());
        for row in rows {
            let mut args = base_args(&req.op);
            args.insert("doc".to_string(), row);

            let deadline = default_deadline(&config);
            let (_, ctx) = self
                .run(config.clone(), rule, project, token, args, deadline)
                .await?;
            evaluated.push(ctx.into_args().remove("doc").unwrap_or(Value::Null));
        }

        req.doc = if bulk {
            Value::Array(evaluated)
        } else {
            evaluated.pop().unwrap_or(Value::Null)
        };
        tracing::debug!(db, col, op = "create", "operation authorised");
        Ok(())
    }

    /// 조회 권한 확인
    pub async fn is_read_authorised(
        &self,
        project: &str,
        db: &str,
        col: &str,
        token: &str,
        req: &mut ReadRequest,
    ) -> Result<DeferredActions> {
        let config = self.config();
        let rule = config.policy.crud_rule(db, col, Operation::Read)?;

        let mut args = base_args(&req.op);
        args.insert("find".to_string(), Value::Object(req.find.clone()));

        let deadline = default_deadline(&config);
        let (actions, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        take_object(&mut ctx.into_args(), "find", &mut req.find);
        tracing::debug!(db, col, op = "read", "operation authorised");
        Ok(actions)
    }

    /// 수정 권한 확인
    pub async fn is_update_authorised(
        &self,
        project: &str,
        db: &str,
        col: &str,
        token: &str,
        req: &mut UpdateRequest,
    ) -> Result<()> {
        let config = self.config();
        let rule = config.policy.crud_rule(db, col, Operation::Update)?;

        let mut args = base_args(&req.op);
        args.insert("find".to_string(), Value::Object(req.find.clone()));
        args.insert("update".to_string(), Value::Object(req.update.clone()));

        let deadline = default_deadline(&config);
        let (_, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        let mut args = ctx.into_args();
        take_object(&mut args, "find", &mut req.find);
        take_object(&mut args, "update", &mut req.update);
        tracing::debug!(db, col, op = "update", "operation authorised");
        Ok(())
    }

    /// 삭제 권한 확인
    pub async fn is_delete_authorised(
        &self,
        project: &str,
        db: &str,
        col: &str,
        token: &str,
        req: &mut DeleteRequest,
    ) -> Result<()> {
        let config = self.config();
        let rule = config.policy.crud_rule(db, col, Operation::Delete)?;

        let mut args = base_args(&req.op);
        args.insert("find".to_string(), Value::Object(req.find.clone()));

        let deadline = default_deadline(&config);
        let (_, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        take_object(&mut ctx.into_args(), "find", &mut req.find);
        tracing::debug!(db, col, op = "delete", "operation authorised");
        Ok(())
    }

    /// 집계 권한 확인
    pub async fn is_aggregate_authorised(
        &self,
        project: &str,
        db: &str,
        col: &str,
        token: &str,
        req: &mut AggregateRequest,
    ) -> Result<DeferredActions> {
        let config = self.config();
        let rule = config.policy.crud_rule(db, col, Operation::Aggregate)?;

        let mut args = base_args(&req.op);
        args.insert("pipeline".to_string(), req.pipeline.clone());

        let deadline = default_deadline(&config);
        let (actions, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        if let Some(pipeline) = ctx.into_args().remove("pipeline") {
            req.pipeline = pipeline;
        }
        tracing::debug!(db, col, op = "aggr", "operation authorised");
        Ok(actions)
    }

    /// 원격 서비스 호출 권한 확인
    ///
    /// 서비스에 전달할 수 있도록 검증된 claims도 함께 반환합니다.
    pub async fn is_func_call_authorised(
        &self,
        project: &str,
        service: &str,
        endpoint: &str,
        token: &str,
        params: &mut Value,
    ) -> Result<(Option<Claims>, DeferredActions)> {
        let config = self.config();
        let rule = config.policy.function_rule(service, endpoint)?;

        let mut args = base_args("call");
        args.insert("params".to_string(), params.clone());

        let deadline = default_deadline(&config);
        let (actions, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        let claims = ctx.claims().cloned();
        if let Some(updated) = ctx.into_args().remove("params") {
            *params = updated;
        }
        tracing::debug!(service, endpoint, "function call authorised");
        Ok((claims, actions))
    }

    /// 파일 작업 권한 확인
    ///
    /// `extra`는 `args`에 그대로 추가됩니다 (예: 업로드 메타데이터).
    pub async fn is_file_op_authorised(
        &self,
        project: &str,
        token: &str,
        path: &str,
        op: FileOperation,
        extra: Map<String, Value>,
    ) -> Result<DeferredActions> {
        let config = self.config();
        let (rule, params) = config.policy.file_rule(path, op)?;

        let mut args = extra;
        args.insert("op".to_string(), Value::String(op.as_str().to_string()));
        args.insert("path".to_string(), Value::String(path.to_string()));
        args.insert("params".to_string(), Value::Object(params));

        let deadline = default_deadline(&config);
        let (actions, _) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        tracing::debug!(path, op = op.as_str(), "file operation authorised");
        Ok(actions)
    }

    /// 이벤트 발행 권한 확인
    pub async fn is_eventing_authorised(
        &self,
        project: &str,
        token: &str,
        event_type: &str,
        data: &mut Value,
    ) -> Result<()> {
        let config = self.config();
        let rule = config.policy.eventing_rule(event_type)?;

        let mut args = base_args("event");
        args.insert("data".to_string(), data.clone());

        let deadline = default_deadline(&config);
        let (_, ctx) = self
            .run(config.clone(), rule, project, token, args, deadline)
            .await?;
        if let Some(updated) = ctx.into_args().remove("data") {
            *data = updated;
        }
        tracing::debug!(event_type, "event authorised");
        Ok(())
    }
}
