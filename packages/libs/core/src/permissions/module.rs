//! 정책 모듈
//!
//! 설정(프로젝트, 보안 정책, AES 키)과 협력자를 묶어 요청 평가와 결과 후처리를 제공합니다.
//! 설정은 `set_config`로 통째로 교체되며, 진행 중인 평가는 시작 시점의 설정을 계속 사용합니다.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;

use super::actions::DeferredActions;
use super::context::EvalContext;
use super::evaluator::RuleEvaluator;
use super::policy::SecurityPolicy;
use super::post_process;
use super::rule::Rule;
use crate::auth::Claims;
use crate::crypto;
use crate::error::{Error, Result};
use crate::external::Collaborators;

/// 엔진 설정
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// 이 엔진이 담당하는 프로젝트
    pub project: String,

    pub policy: SecurityPolicy,

    /// Encrypt/Decrypt 규칙에 사용하는 AES 키 (16/24/32 바이트)
    pub aes_key: Option<Vec<u8>>,

    /// Webhook/Query 호출의 기본 제한 시간
    pub call_timeout: Option<Duration>,
}

impl ModuleConfig {
    pub fn new(project: impl Into<String>, policy: SecurityPolicy) -> Self {
        Self {
            project: project.into(),
            policy,
            aes_key: None,
            call_timeout: None,
        }
    }

    pub fn with_aes_key(mut self, key: Vec<u8>) -> Self {
        self.aes_key = Some(key);
        self
    }

    /// base64로 인코딩된 AES 키 설정
    pub fn with_encoded_aes_key(self, encoded: &str) -> Result<Self> {
        Ok(self.with_aes_key(crypto::parse_aes_key(encoded)?))
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// 정책 모듈
pub struct PolicyModule {
    config: RwLock<Arc<ModuleConfig>>,
    services: Collaborators,
}

impl PolicyModule {
    pub fn new(config: ModuleConfig, services: Collaborators) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            services,
        }
    }

    /// 설정 교체
    pub fn set_config(&self, config: ModuleConfig) {
        let mut current = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(config);
        tracing::info!(project = %current.project, "security policy updated");
    }

    /// 현재 설정 스냅샷
    pub fn config(&self) -> Arc<ModuleConfig> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 규칙 하나를 평가
    ///
    /// 외부 호출 제한 시간은 설정의 `call_timeout`을 따릅니다.
    pub async fn evaluate(
        &self,
        rule: &Rule,
        project: &str,
        token: &str,
        args: Map<String, Value>,
    ) -> Result<DeferredActions> {
        let config = self.config();
        let deadline = default_deadline(&config);
        let (actions, _) = self.run(config, rule, project, token, args, deadline).await?;
        Ok(actions)
    }

    /// 호출자가 지정한 마감 시각으로 규칙 평가
    pub async fn evaluate_with_deadline(
        &self,
        rule: &Rule,
        project: &str,
        token: &str,
        args: Map<String, Value>,
        deadline: Option<Instant>,
    ) -> Result<DeferredActions> {
        let (actions, _) = self
            .run(self.config(), rule, project, token, args, deadline)
            .await?;
        Ok(actions)
    }

    /// 평가 후 `args` 변경이 반영된 컨텍스트까지 반환
    pub(crate) async fn run(
        &self,
        config: Arc<ModuleConfig>,
        rule: &Rule,
        project: &str,
        token: &str,
        args: Map<String, Value>,
        deadline: Option<Instant>,
    ) -> Result<(DeferredActions, EvalContext)> {
        let claims = self.authenticate(rule, token)?;
        let mut ctx = EvalContext::new(args)
            .with_token(token)
            .with_claims(claims)
            .with_deadline(deadline);

        let evaluator = RuleEvaluator::new(config, self.services.clone());
        match evaluator.evaluate(project, rule, &mut ctx).await {
            Ok(actions) => {
                tracing::debug!(project, rule = rule.name(), actions = actions.len(), "request authorised");
                Ok((actions, ctx))
            }
            Err(err) => {
                tracing::debug!(project, rule = rule.name(), error = %err, "request denied");
                Err(err)
            }
        }
    }

    /// 결과 문서에 후처리 액션 적용
    pub fn post_process(&self, actions: &DeferredActions, result: &mut Value) -> Result<()> {
        let config = self.config();
        post_process::apply(actions, result, config.aes_key.as_deref())
    }

    /// `allow` 규칙은 토큰을 검증하지 않음
    pub(crate) fn authenticate(&self, rule: &Rule, token: &str) -> Result<Option<Claims>> {
        if matches!(rule, Rule::Allow) {
            return Ok(None);
        }

        match self.services.verifier.parse_token(token) {
            Ok(claims) => Ok(Some(claims)),
            Err(err) => {
                tracing::warn!(error = %err, "failed to verify caller token");
                Err(match err {
                    err @ Error::TokenVerificationFailed { .. } => err,
                    other => Error::TokenVerificationFailed {
                        reason: other.to_string(),
                    },
                })
            }
        }
    }
}

pub(crate) fn default_deadline(config: &ModuleConfig) -> Option<Instant> {
    config.call_timeout.map(|timeout| Instant::now() + timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenValidator;
    use crate::external::MockClaimsVerifier;
    use crate::permissions::actions::DeferredAction;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PROJECT: &str = "todo-app";

    fn module() -> PolicyModule {
        let verifier = Arc::new(TokenValidator::new(vec![]));
        PolicyModule::new(
            ModuleConfig::new(PROJECT, SecurityPolicy::default()),
            Collaborators::new(verifier),
        )
    }

    fn rule(yaml: &str) -> Rule {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_allow_skips_token_verification() {
        let mut verifier = MockClaimsVerifier::new();
        verifier.expect_parse_token().never();
        let module = PolicyModule::new(
            ModuleConfig::new(PROJECT, SecurityPolicy::default()),
            Collaborators::new(Arc::new(verifier)),
        );

        let actions = module.evaluate(&Rule::Allow, PROJECT, "", Map::new()).await.unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_bad_token_is_verification_failure() {
        let err = module()
            .evaluate(&Rule::Authenticated, PROJECT, "garbage", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenVerificationFailed { .. }));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_verifier_errors_become_token_failures() {
        let mut verifier = MockClaimsVerifier::new();
        verifier.expect_parse_token().returning(|_| {
            Err(Error::NotConfigured {
                component: "keys".to_string(),
            })
        });
        let module = PolicyModule::new(
            ModuleConfig::new(PROJECT, SecurityPolicy::default()),
            Collaborators::new(Arc::new(verifier)),
        );

        let err = module
            .evaluate(&Rule::Authenticated, PROJECT, "t", Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenVerificationFailed { .. }));
    }

    #[tokio::test]
    async fn test_number_match_from_claims() {
        let module = module();
        let r = rule("{rule: match, type: number, eval: '>=', f1: auth.age, f2: 18}");

        let adult = r#"json:{"id":"u1","age":30}"#;
        assert!(module.evaluate(&r, PROJECT, adult, Map::new()).await.is_ok());

        let minor = r#"json:{"id":"u2","age":12}"#;
        let err = module.evaluate(&r, PROJECT, minor, Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::IncorrectMatch));
    }

    #[tokio::test]
    async fn test_string_in_failure() {
        let module = module();
        let r = rule("{rule: match, type: string, eval: in, f1: args.auth.role, f2: [admin, editor]}");
        let token = r#"json:{"id":"u1","role":"viewer"}"#;

        let err = module.evaluate(&r, PROJECT, token, Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::IncorrectMatch));
    }

    #[tokio::test]
    async fn test_force_on_result_then_post_process() {
        let module = module();
        let r = rule(
            r#"
rule: and
clauses:
  - rule: authenticated
  - rule: force
    field: res.owner
    value: args.auth.id
  - rule: remove
    fields: [res.password]
"#,
        );
        let token = r#"json:{"id":"u1"}"#;

        let actions = module.evaluate(&r, PROJECT, token, Map::new()).await.unwrap();
        assert_eq!(
            actions,
            DeferredActions::from(vec![
                DeferredAction::force("res.owner", json!("u1")),
                DeferredAction::remove("res.password"),
            ])
        );

        let mut result = json!([
            {"title": "a", "password": "x"},
            {"title": "b", "password": "y"}
        ]);
        module.post_process(&actions, &mut result).unwrap();
        assert_eq!(
            result,
            json!([{"title": "a", "owner": "u1"}, {"title": "b", "owner": "u1"}])
        );
    }

    #[tokio::test]
    async fn test_forced_caller_value_is_not_reread_from_result() {
        let module = module();
        let r = rule("{rule: force, field: res.displayName, value: args.find.name}");
        let token = r#"json:{"id":"u1"}"#;

        // 호출자가 보낸 값이 res 경로처럼 보여도 결정 시점의 값 그대로 기록
        let actions = module
            .evaluate(&r, PROJECT, token, args(json!({"find": {"name": "res.password"}})))
            .await
            .unwrap();
        assert_eq!(
            actions,
            DeferredActions::from(vec![DeferredAction::force("res.displayName", json!("res.password"))])
        );

        let mut result = json!({"password": "hunter2", "displayName": "bob"});
        module.post_process(&actions, &mut result).unwrap();
        assert_eq!(result, json!({"password": "hunter2", "displayName": "res.password"}));
    }

    #[tokio::test]
    async fn test_tenant_mismatch() {
        let err = module()
            .evaluate(&Rule::Allow, "someone-else", "", args(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TenantMismatch { .. }));
    }

    #[tokio::test]
    async fn test_set_config_swaps_snapshot() {
        let module = module();
        let before = module.config();

        module.set_config(ModuleConfig::new("next-app", SecurityPolicy::default()));

        assert_eq!(before.project, PROJECT);
        assert_eq!(module.config().project, "next-app");
        assert!(module.evaluate(&Rule::Allow, "next-app", "", Map::new()).await.is_ok());
        assert!(module.evaluate(&Rule::Allow, PROJECT, "", Map::new()).await.is_err());
    }

    #[test]
    fn test_encoded_aes_key() {
        let config = ModuleConfig::new(PROJECT, SecurityPolicy::default())
            .with_encoded_aes_key("Olw6AhA/GzSxfhwKLxO7JJsUL6VUwwGEFTgxzoZPy9g=")
            .unwrap();
        assert_eq!(config.aes_key.map(|k| k.len()), Some(32));

        assert!(ModuleConfig::new(PROJECT, SecurityPolicy::default())
            .with_encoded_aes_key("not base64!")
            .is_err());
    }
}
