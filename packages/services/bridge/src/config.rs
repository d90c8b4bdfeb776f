//! Bridge 설정

use std::env;
use std::fmt;

/// Bridge 설정
#[derive(Clone)]
pub struct Config {
    /// 서버 포트
    pub port: u16,

    /// 이 Bridge가 담당하는 프로젝트
    pub project: String,

    /// 보안 정책 YAML 경로 (시작 시 한 번 로드)
    pub policy_path: String,

    /// Encrypt/Decrypt 규칙용 AES 키 (base64)
    pub aes_key: Option<String>,

    /// PASETO keys (현재 + 이전 키들)
    pub paseto_keys: Vec<String>,

    /// 서비스 토큰 발급 키. 없으면 webhook 규칙은 실패
    pub service_key: Option<String>,

    /// 서비스 토큰에 들어가는 노드 ID
    pub node_id: String,

    /// Query 규칙이 사용하는 데이터 서비스 URL
    pub data_url: Option<String>,

    /// Webhook/Query 호출 제한 시간 (초)
    pub call_timeout_secs: u64,
}

impl Config {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            port: env::var("STK_BRIDGE_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,

            project: env::var("STK_PROJECT").unwrap_or_else(|_| "default".to_string()),

            policy_path: env::var("STK_POLICY_PATH")
                .unwrap_or_else(|_| "config/security.yaml".to_string()),

            aes_key: non_empty("STK_AES_KEY"),

            paseto_keys: env::var("STK_PASETO_KEYS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default(),

            service_key: non_empty("STK_SERVICE_KEY"),

            node_id: env::var("STK_NODE_ID").unwrap_or_else(|_| "bridge".to_string()),

            data_url: non_empty("STK_DATA_URL"),

            call_timeout_secs: env::var("STK_CALL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
        })
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// 키 재료는 로그에 남기지 않음
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("project", &self.project)
            .field("policy_path", &self.policy_path)
            .field("aes_key", &self.aes_key.as_ref().map(|_| "<redacted>"))
            .field("paseto_keys", &self.paseto_keys.len())
            .field("service_key", &self.service_key.as_ref().map(|_| "<redacted>"))
            .field("node_id", &self.node_id)
            .field("data_url", &self.data_url)
            .field("call_timeout_secs", &self.call_timeout_secs)
            .finish()
    }
}
