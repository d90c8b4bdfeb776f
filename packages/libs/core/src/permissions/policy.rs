//! 보안 정책 정의
//!
//! `config/security.yaml`의 구조를 정의합니다. 리소스 종류별로 규칙을 찾는 방법이 다릅니다.
//!
//! - `crud`: db → collection → operation. collection이 없으면 `default` collection 사용
//! - `services`: service → endpoint. endpoint가 없으면 `default` endpoint 사용
//! - `files`: 경로 prefix 목록. `:name`/`{name}` 세그먼트는 변수로 바인딩, 가장 긴 prefix 우선
//! - `eventing`: 이벤트 타입. 없으면 `default` 사용

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rule::Rule;
use crate::error::{Error, Result};

/// 없는 collection/endpoint/이벤트 타입 대신 사용하는 키
pub const DEFAULT_KEY: &str = "default";

/// 전체 보안 정책
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityPolicy {
    /// db별 collection 규칙
    #[serde(default)]
    pub crud: HashMap<String, DatabaseRules>,

    /// 원격 서비스별 endpoint 규칙
    #[serde(default)]
    pub services: HashMap<String, ServiceRules>,

    /// 파일 저장소 prefix 규칙
    #[serde(default)]
    pub files: Vec<FileRule>,

    /// 이벤트 타입별 규칙
    #[serde(default)]
    pub eventing: HashMap<String, Rule>,
}

/// db 하나의 collection 규칙
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseRules {
    #[serde(default)]
    pub collections: HashMap<String, CollectionRules>,
}

/// collection 하나의 operation 규칙
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionRules {
    #[serde(default)]
    pub rules: HashMap<Operation, Rule>,
}

/// 원격 서비스의 endpoint 규칙
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceRules {
    #[serde(default)]
    pub endpoints: HashMap<String, Rule>,
}

/// 파일 경로 prefix 규칙
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRule {
    pub prefix: String,

    #[serde(default)]
    pub rule: HashMap<FileOperation, Rule>,
}

/// CRUD 작업 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    #[serde(rename = "aggr")]
    Aggregate,
}

impl Operation {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Read => "read",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Aggregate => "aggr",
        }
    }
}

/// 파일 작업 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOperation {
    Create,
    Read,
    Delete,
}

impl FileOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOperation::Create => "create",
            FileOperation::Read => "read",
            FileOperation::Delete => "delete",
        }
    }
}

impl SecurityPolicy {
    /// YAML 문자열에서 파싱
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// CRUD 규칙 조회
    pub fn crud_rule(&self, db: &str, collection: &str, op: Operation) -> Result<&Rule> {
        let not_found = || Error::RuleNotFound {
            resource: format!("{db}.{collection}.{}", op.as_str()),
        };

        let collections = &self.crud.get(db).ok_or_else(not_found)?.collections;
        // collection에 해당 작업 규칙이 없으면 default collection에서 찾음
        collections
            .get(collection)
            .and_then(|rules| rules.rules.get(&op))
            .or_else(|| {
                collections
                    .get(DEFAULT_KEY)
                    .and_then(|rules| rules.rules.get(&op))
            })
            .ok_or_else(not_found)
    }

    /// 원격 서비스 endpoint 규칙 조회
    pub fn function_rule(&self, service: &str, endpoint: &str) -> Result<&Rule> {
        let not_found = || Error::RuleNotFound {
            resource: format!("{service}.{endpoint}"),
        };

        let endpoints = &self.services.get(service).ok_or_else(not_found)?.endpoints;
        endpoints
            .get(endpoint)
            .or_else(|| endpoints.get(DEFAULT_KEY))
            .ok_or_else(not_found)
    }

    /// 이벤트 규칙 조회
    pub fn eventing_rule(&self, event_type: &str) -> Result<&Rule> {
        self.eventing
            .get(event_type)
            .or_else(|| self.eventing.get(DEFAULT_KEY))
            .ok_or_else(|| Error::RuleNotFound {
                resource: format!("eventing.{event_type}"),
            })
    }

    /// 파일 경로 규칙 조회
    ///
    /// 경로는 `/`로 시작해야 하고 `..` 세그먼트를 포함할 수 없습니다.
    /// 반환되는 map에는 prefix의 변수 세그먼트에 바인딩된 값이 들어 있습니다.
    pub fn file_rule(&self, path: &str, op: FileOperation) -> Result<(&Rule, Map<String, Value>)> {
        let not_found = || Error::RuleNotFound {
            resource: format!("file {path} ({})", op.as_str()),
        };

        if !path.starts_with('/') || path.split('/').any(|segment| segment == "..") {
            return Err(not_found());
        }

        let mut best: Option<(&FileRule, Map<String, Value>, usize)> = None;
        for rule in &self.files {
            if let Some((params, score)) = match_prefix(&rule.prefix, path) {
                if best.as_ref().map(|b| score > b.2).unwrap_or(true) {
                    best = Some((rule, params, score));
                }
            }
        }

        let (rule, params, _) = best.ok_or_else(not_found)?;
        let rule = rule.rule.get(&op).ok_or_else(not_found)?;
        Ok((rule, params))
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// prefix가 경로의 앞부분과 일치하면 (변수 바인딩, 일치한 세그먼트 수)를 반환
fn match_prefix(prefix: &str, path: &str) -> Option<(Map<String, Value>, usize)> {
    let p_parts = segments(prefix);
    let k_parts = segments(path);
    if p_parts.len() > k_parts.len() {
        return None;
    }

    let mut params = Map::new();
    for (p, k) in p_parts.iter().zip(&k_parts) {
        let var = p
            .strip_prefix(':')
            .or_else(|| p.strip_prefix('{').and_then(|v| v.strip_suffix('}')));
        if let Some(var) = var {
            params.insert(var.to_string(), Value::String(k.to_string()));
            continue;
        }

        if *p != "*" && p != k {
            return None;
        }
    }

    Some((params, p_parts.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = r#"
crud:
  mongo:
    collections:
      todos:
        rules:
          read:
            rule: authenticated
          create:
            rule: deny
      default:
        rules:
          read:
            rule: allow
          update:
            rule: deny
          aggr:
            rule: deny
services:
  payments:
    endpoints:
      charge:
        rule: authenticated
      default:
        rule: deny
files:
  - prefix: /
    rule:
      read:
        rule: authenticated
  - prefix: /users/:userId
    rule:
      read:
        rule: allow
      create:
        rule: match
        type: string
        eval: "=="
        f1: args.params.userId
        f2: auth.id
eventing:
  order-created:
    rule: authenticated
  default:
    rule: deny
"#;

    fn policy() -> SecurityPolicy {
        SecurityPolicy::from_yaml(POLICY).unwrap()
    }

    #[test]
    fn test_crud_rule_lookup_with_default_collection() {
        let policy = policy();

        assert_eq!(policy.crud_rule("mongo", "todos", Operation::Read).unwrap(), &Rule::Authenticated);
        assert_eq!(policy.crud_rule("mongo", "notes", Operation::Read).unwrap(), &Rule::Allow);
        assert_eq!(policy.crud_rule("mongo", "notes", Operation::Aggregate).unwrap(), &Rule::Deny);

        // collection은 있지만 해당 작업 규칙이 없으면 default 사용
        assert_eq!(policy.crud_rule("mongo", "todos", Operation::Update).unwrap(), &Rule::Deny);

        let err = policy.crud_rule("mongo", "todos", Operation::Delete).unwrap_err();
        assert!(matches!(err, Error::RuleNotFound { .. }));

        assert!(policy.crud_rule("postgres", "todos", Operation::Read).is_err());
    }

    #[test]
    fn test_function_rule_lookup() {
        let policy = policy();
        assert_eq!(policy.function_rule("payments", "charge").unwrap(), &Rule::Authenticated);
        assert_eq!(policy.function_rule("payments", "refund").unwrap(), &Rule::Deny);
        assert!(policy.function_rule("mail", "send").is_err());
    }

    #[test]
    fn test_eventing_rule_lookup() {
        let policy = policy();
        assert_eq!(policy.eventing_rule("order-created").unwrap(), &Rule::Authenticated);
        assert_eq!(policy.eventing_rule("anything").unwrap(), &Rule::Deny);
    }

    #[test]
    fn test_file_rule_longest_prefix_wins() {
        let policy = policy();

        let (rule, params) = policy.file_rule("/users/u1/avatar.png", FileOperation::Read).unwrap();
        assert_eq!(rule, &Rule::Allow);
        assert_eq!(params["userId"], "u1");

        let (rule, params) = policy.file_rule("/public/logo.png", FileOperation::Read).unwrap();
        assert_eq!(rule, &Rule::Authenticated);
        assert!(params.is_empty());

        // 가장 긴 prefix에 해당 작업 규칙이 없으면 실패
        assert!(policy.file_rule("/users/u1/a.png", FileOperation::Delete).is_err());
    }

    #[test]
    fn test_file_rule_rejects_unsafe_paths() {
        let policy = policy();
        assert!(policy.file_rule("users/u1", FileOperation::Read).is_err());
        assert!(policy.file_rule("/users/../etc", FileOperation::Read).is_err());
    }

    #[test]
    fn test_match_prefix() {
        assert_eq!(match_prefix("/", "/a/b").map(|m| m.1), Some(0));
        assert_eq!(match_prefix("/a/*", "/a/b/c").map(|m| m.1), Some(2));
        assert!(match_prefix("/folder/suyash", "/folder/file").is_none());
        assert!(match_prefix("/a/b/c", "/a/b").is_none());

        let (params, _) = match_prefix("/{org}/files", "/acme/files/x").unwrap();
        assert_eq!(params["org"], "acme");
    }
}
