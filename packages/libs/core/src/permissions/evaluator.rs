//! 규칙 평가기
//!
//! 요청 컨텍스트에 대해 규칙 트리를 재귀적으로 평가합니다.
//!
//! # 평가 순서
//!
//! 1. 호출자의 프로젝트가 설정된 프로젝트와 다르면 거부 (모든 노드에서 확인)
//! 2. `allow`/`authenticated`는 성공, `deny`는 항상 실패
//! 3. 내부 호출자(`id == "internal-sc-user"`)는 나머지 규칙을 모두 통과
//! 4. 그 외 규칙은 종류별로 평가
//!
//! 성공하면 결과 문서에 적용할 [`DeferredActions`]를 반환합니다.

use std::future::Future;
use std::sync::Arc;

use async_recursion::async_recursion;
use serde_json::Value;
use tokio::time::Instant;

use super::actions::{ActionKind, DeferredAction, DeferredActions};
use super::compare::compare;
use super::context::EvalContext;
use super::module::ModuleConfig;
use super::post_process::{load_string, require_key};
use super::resolve::{adjust_map, delete_value, resolve, root_of, store_value, ROOT_ARGS, ROOT_RES};
use super::rule::{ForceRule, MatchRule, QueryRule, RemoveRule, Rule};
use crate::crypto;
use crate::error::{Error, Result};
use crate::external::Collaborators;

/// 규칙 평가기
///
/// 설정 스냅샷 하나로 요청 하나를 평가합니다. 평가 도중 설정이 바뀌어도 영향을 받지 않습니다.
pub struct RuleEvaluator {
    config: Arc<ModuleConfig>,
    services: Collaborators,
}

impl RuleEvaluator {
    /// 새 평가기 생성
    pub fn new(config: Arc<ModuleConfig>, services: Collaborators) -> Self {
        Self { config, services }
    }

    /// 규칙 평가
    #[async_recursion]
    pub async fn evaluate(
        &self,
        project: &str,
        rule: &Rule,
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        if project != self.config.project {
            return Err(Error::TenantMismatch {
                expected: self.config.project.clone(),
                actual: project.to_string(),
            });
        }

        match rule {
            Rule::Allow | Rule::Authenticated => Ok(DeferredActions::new()),
            Rule::Deny => Err(Error::OperationDenied),
            _ if ctx.is_internal() => {
                tracing::debug!(rule = rule.name(), "internal caller bypasses rule");
                Ok(DeferredActions::new())
            }
            Rule::Match(rule) => self.match_rule(rule, ctx),
            Rule::And { clauses } => self.match_and(project, clauses, ctx).await,
            Rule::Or { clauses } => self.match_or(project, clauses, ctx).await,
            Rule::Force(rule) => self.match_force(project, rule, ctx).await,
            Rule::Remove(rule) => self.match_remove(project, rule, ctx).await,
            Rule::Encrypt { fields } => self.transform_fields(ActionKind::Encrypt, fields, ctx),
            Rule::Decrypt { fields } => self.transform_fields(ActionKind::Decrypt, fields, ctx),
            Rule::Hash { fields } => self.transform_fields(ActionKind::Hash, fields, ctx),
            Rule::Webhook { url } => self.match_webhook(url, ctx).await,
            Rule::Query(rule) => self.match_query(rule, ctx).await,
            Rule::Unsupported => Err(Error::IncorrectRule),
        }
    }

    fn match_rule(&self, rule: &MatchRule, ctx: &EvalContext) -> Result<DeferredActions> {
        compare(rule.compare_type, rule.operator, &rule.left, &rule.right, ctx.state())
            .map(|_| DeferredActions::new())
            .map_err(|err| match &rule.error_message {
                Some(message) => Error::CustomMatch {
                    message: message.clone(),
                    source: Box::new(err),
                },
                None => err,
            })
    }

    async fn match_and(
        &self,
        project: &str,
        clauses: &[Rule],
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        let mut actions = DeferredActions::new();
        for clause in clauses {
            actions.extend(self.evaluate(project, clause, ctx).await?);
        }
        Ok(actions)
    }

    /// 첫 번째로 성공한 clause의 결과만 사용
    ///
    /// 실패한 clause가 `args`에 남긴 변경은 되돌립니다.
    async fn match_or(
        &self,
        project: &str,
        clauses: &[Rule],
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        for clause in clauses {
            let snapshot = ctx.snapshot();
            match self.evaluate(project, clause, ctx).await {
                Ok(actions) => return Ok(actions),
                Err(err @ Error::Cancelled { .. }) => return Err(err),
                Err(err) => {
                    tracing::debug!(rule = clause.name(), error = %err, "or clause not satisfied");
                    ctx.restore(snapshot);
                }
            }
        }
        Err(Error::NoClauseMatched)
    }

    /// guard가 없거나 성공하면 true. guard의 액션과 `args` 변경은 버립니다.
    async fn guard_passes(
        &self,
        project: &str,
        guard: Option<&Rule>,
        ctx: &mut EvalContext,
    ) -> Result<bool> {
        let Some(guard) = guard else {
            return Ok(true);
        };

        let snapshot = ctx.snapshot();
        let outcome = self.evaluate(project, guard, ctx).await;
        ctx.restore(snapshot);

        match outcome {
            Ok(_) => Ok(true),
            Err(err @ Error::Cancelled { .. }) => Err(err),
            Err(err) => {
                tracing::debug!(error = %err, "guard clause not satisfied");
                Ok(false)
            }
        }
    }

    async fn match_force(
        &self,
        project: &str,
        rule: &ForceRule,
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        if !self.guard_passes(project, rule.guard.as_deref(), ctx).await? {
            return Ok(DeferredActions::new());
        }

        let path = rule.target_path.as_str();
        let reference = rule.value.as_value();
        let resolved = resolve(reference, ctx.state());

        match root_of(path) {
            ROOT_RES => {
                let action = match resolved {
                    Ok(value) => DeferredAction::force(path, value),
                    // res.* 참조는 결과 문서가 나온 뒤에만 해석 가능
                    Err(_) => DeferredAction::force_deferred(path, reference.clone()),
                };
                Ok(DeferredActions::from(vec![action]))
            }
            ROOT_ARGS => {
                let value = resolved.unwrap_or_else(|_| reference.clone());
                store_value(path, value, ctx.state_mut())?;
                Ok(DeferredActions::new())
            }
            _ => Err(Error::field_type(path)),
        }
    }

    async fn match_remove(
        &self,
        project: &str,
        rule: &RemoveRule,
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        if !self.guard_passes(project, rule.guard.as_deref(), ctx).await? {
            return Ok(DeferredActions::new());
        }

        let mut actions = DeferredActions::new();
        for path in &rule.target_paths {
            match root_of(path) {
                ROOT_RES => actions.push(DeferredAction::remove(path.as_str())),
                ROOT_ARGS => delete_value(path, ctx.state_mut())?,
                _ => return Err(Error::field_type(path.as_str())),
            }
        }
        Ok(actions)
    }

    /// Encrypt/Decrypt/Hash: `res.*`는 후처리로 미루고 `args.*`는 즉시 변환
    fn transform_fields(
        &self,
        kind: ActionKind,
        fields: &[String],
        ctx: &mut EvalContext,
    ) -> Result<DeferredActions> {
        let mut actions = DeferredActions::new();
        for path in fields {
            match root_of(path) {
                ROOT_RES => actions.push(DeferredAction::new(kind, path.as_str())),
                ROOT_ARGS => {
                    let current = load_string(path, ctx.state())?;
                    let transformed = match kind {
                        ActionKind::Encrypt => {
                            crypto::encrypt_string(require_key(self.aes_key())?, &current)?
                        }
                        ActionKind::Decrypt => {
                            crypto::decrypt_string(require_key(self.aes_key())?, &current)?
                        }
                        _ => crypto::hash_string(&current),
                    };
                    store_value(path, Value::String(transformed), ctx.state_mut())?;
                }
                _ => return Err(Error::field_type(path.as_str())),
            }
        }
        Ok(actions)
    }

    async fn match_webhook(&self, url: &str, ctx: &EvalContext) -> Result<DeferredActions> {
        let invoker = self.services.invoker.as_ref().ok_or_else(|| Error::NotConfigured {
            component: "http invoker".to_string(),
        })?;
        let issuer = self.services.issuer.as_ref().ok_or_else(|| Error::NotConfigured {
            component: "service token issuer".to_string(),
        })?;

        // 호출자 토큰은 payload에 넣지 않고 Authorization 헤더로만 전달
        let mut payload = ctx.args().clone();
        let caller_token = match payload.remove("token") {
            Some(Value::String(token)) => token,
            _ => String::new(),
        };
        let service_token = issuer.service_token()?;

        let payload = Value::Object(payload);
        let call = invoker.invoke("POST", url, &caller_token, &service_token, &payload);
        match with_deadline(ctx.deadline(), call).await {
            Ok(_) => Ok(DeferredActions::new()),
            Err(err) => {
                tracing::warn!(url, error = %err, "webhook rule rejected the request");
                Err(err)
            }
        }
    }

    async fn match_query(&self, rule: &QueryRule, ctx: &EvalContext) -> Result<DeferredActions> {
        let store = self.services.store.as_ref().ok_or_else(|| Error::NotConfigured {
            component: "data store".to_string(),
        })?;

        let find = adjust_map(&rule.find, ctx.state());
        let call = store.find_one(&rule.store, &rule.collection, &find);
        match with_deadline(ctx.deadline(), call).await? {
            Some(_) => Ok(DeferredActions::new()),
            None => Err(Error::IncorrectMatch),
        }
    }

    fn aes_key(&self) -> Option<&[u8]> {
        self.config.aes_key.as_deref()
    }
}

/// 마감 시각이 지나면 외부 호출을 취소
async fn with_deadline<T>(
    deadline: Option<Instant>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, call)
            .await
            .map_err(|_| Error::Cancelled {
                reason: "deadline exceeded".to_string(),
            })?,
        None => call.await,
    }
}
