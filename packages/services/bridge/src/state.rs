//! Bridge 앱 상태

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use stk_core::auth::{PasetoServiceIssuer, TokenValidator};
use stk_core::external::Collaborators;
use stk_core::permissions::{ModuleConfig, PolicyModule, SecurityPolicy};

use crate::clients::{HttpDataStore, ReqwestInvoker};
use crate::config::Config;

/// 앱 상태
///
/// 모든 핸들러에서 공유하는 상태입니다.
pub struct AppState {
    /// 설정
    pub config: Config,

    /// 보안 규칙 엔진
    pub policy: PolicyModule,
}

impl AppState {
    /// 새 상태 생성
    ///
    /// 보안 정책 파일을 읽고 협력자(토큰 검증기, HTTP 호출기, 데이터 서비스)를 구성합니다.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(&config.policy_path)
            .await
            .with_context(|| format!("failed to read security policy at {}", config.policy_path))?;
        let policy = SecurityPolicy::from_yaml(&raw)?;

        let timeout = Duration::from_secs(config.call_timeout_secs);
        let mut module_config =
            ModuleConfig::new(config.project.clone(), policy).with_call_timeout(timeout);
        if let Some(key) = &config.aes_key {
            module_config = module_config.with_encoded_aes_key(key)?;
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let verifier = Arc::new(TokenValidator::new(config.paseto_keys.clone()));
        let mut services =
            Collaborators::new(verifier).with_invoker(Arc::new(ReqwestInvoker::new(http.clone())));

        match &config.service_key {
            Some(key) => {
                let issuer = PasetoServiceIssuer::new(key, config.node_id.clone())?;
                services = services.with_issuer(Arc::new(issuer));
            }
            None => tracing::warn!("STK_SERVICE_KEY not set, webhook rules will be rejected"),
        }
        if let Some(url) = &config.data_url {
            services = services.with_store(Arc::new(HttpDataStore::new(http, url.clone())));
        }

        Ok(Self::from_parts(
            config.clone(),
            PolicyModule::new(module_config, services),
        ))
    }

    pub fn from_parts(config: Config, policy: PolicyModule) -> Self {
        Self { config, policy }
    }
}
