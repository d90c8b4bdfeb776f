//! 보안 규칙 모델
//!
//! 규칙은 `rule` 필드로 종류를 구분하는 JSON/YAML 객체입니다.
//!
//! ```yaml
//! rule: and
//! clauses:
//!   - rule: match
//!     type: string
//!     eval: "=="
//!     f1: args.auth.id
//!     f2: args.find.userId
//!   - rule: remove
//!     fields: [res.password]
//! ```
//!
//! 알 수 없는 `rule` 값은 파싱 단계에서 실패하지 않고 [`Rule::Unsupported`]가 되며,
//! 평가 시점에 거부됩니다.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 값 참조
///
/// 문자열이면 경로(`args.x.y`), 헬퍼 함수 호출(`utils.now()`), 또는 리터럴일 수 있고,
/// 문자열이 아니면 항상 리터럴입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(pub Value);

impl Reference {
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for Reference {
    fn from(value: Value) -> Self {
        Reference(value)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Reference(Value::String(value.to_string()))
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Reference(Value::String(value))
    }
}

impl From<i64> for Reference {
    fn from(value: i64) -> Self {
        Reference(Value::from(value))
    }
}

impl From<f64> for Reference {
    fn from(value: f64) -> Self {
        Reference(Value::from(value))
    }
}

impl From<bool> for Reference {
    fn from(value: bool) -> Self {
        Reference(Value::Bool(value))
    }
}

/// 보안 규칙 트리
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
pub enum Rule {
    /// 무조건 허용
    Allow,

    /// 토큰 검증에 성공한 호출자 허용
    Authenticated,

    /// 무조건 거부 (내부 호출자 포함)
    Deny,

    /// 두 값을 타입별로 비교
    Match(MatchRule),

    /// 모든 하위 규칙이 성공해야 함 (순서대로, 첫 실패에서 중단)
    And { clauses: Vec<Rule> },

    /// 하나의 하위 규칙만 성공하면 됨
    Or { clauses: Vec<Rule> },

    /// 필드 값을 강제로 설정
    Force(ForceRule),

    /// 필드 제거
    Remove(RemoveRule),

    /// 필드 값 암호화
    Encrypt { fields: Vec<String> },

    /// 필드 값 복호화
    Decrypt { fields: Vec<String> },

    /// 필드 값을 SHA-256 해시로 치환
    Hash { fields: Vec<String> },

    /// 외부 webhook 호출이 성공하면 허용
    Webhook { url: String },

    /// 데이터 저장소에 조건을 만족하는 레코드가 있으면 허용
    Query(QueryRule),

    /// 이 버전에서 지원하지 않는 규칙 종류
    #[serde(other)]
    Unsupported,
}

impl Rule {
    pub fn and(clauses: Vec<Rule>) -> Self {
        Rule::And { clauses }
    }

    pub fn or(clauses: Vec<Rule>) -> Self {
        Rule::Or { clauses }
    }

    /// 로그용 규칙 이름
    pub fn name(&self) -> &'static str {
        match self {
            Rule::Allow => "allow",
            Rule::Authenticated => "authenticated",
            Rule::Deny => "deny",
            Rule::Match(_) => "match",
            Rule::And { .. } => "and",
            Rule::Or { .. } => "or",
            Rule::Force(_) => "force",
            Rule::Remove(_) => "remove",
            Rule::Encrypt { .. } => "encrypt",
            Rule::Decrypt { .. } => "decrypt",
            Rule::Hash { .. } => "hash",
            Rule::Webhook { .. } => "webhook",
            Rule::Query(_) => "query",
            Rule::Unsupported => "unsupported",
        }
    }
}

/// Match 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(rename = "type")]
    pub compare_type: CompareType,

    #[serde(rename = "eval")]
    pub operator: Operator,

    #[serde(rename = "f1")]
    pub left: Reference,

    #[serde(rename = "f2")]
    pub right: Reference,

    /// 매칭 실패 시 호출자에게 보여줄 메시지
    #[serde(rename = "error", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl MatchRule {
    pub fn new(
        compare_type: CompareType,
        operator: Operator,
        left: impl Into<Reference>,
        right: impl Into<Reference>,
    ) -> Self {
        Self {
            compare_type,
            operator,
            left: left.into(),
            right: right.into(),
            error_message: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Force 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForceRule {
    /// 이 규칙이 실패하면 Force를 건너뜀 (에러 아님)
    #[serde(rename = "clause", default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Box<Rule>>,

    #[serde(rename = "field")]
    pub target_path: String,

    #[serde(default)]
    pub value: Reference,
}

/// Remove 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveRule {
    #[serde(rename = "clause", default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Box<Rule>>,

    #[serde(rename = "fields")]
    pub target_paths: Vec<String>,
}

/// Query 규칙
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRule {
    #[serde(rename = "db")]
    pub store: String,

    #[serde(rename = "col")]
    pub collection: String,

    /// 조회 조건. 문자열 값은 평가 시점에 참조로 해석됩니다.
    #[serde(default)]
    pub find: Map<String, Value>,
}

/// 비교 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareType {
    String,
    Number,
    Bool,
    Date,
}

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "notin", alias = "notIn")]
    NotIn,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::In => "in",
            Operator::NotIn => "notin",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_nested_rule_yaml() {
        let yaml = r#"
rule: and
clauses:
  - rule: match
    type: number
    eval: ">="
    f1: args.auth.age
    f2: 18
    error: adults only
  - rule: force
    clause:
      rule: authenticated
    field: res.role
    value: user
  - rule: remove
    fields: [res.password, args.find.secret]
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        let Rule::And { clauses } = rule else {
            panic!("expected and rule");
        };
        assert_eq!(clauses.len(), 3);

        assert_eq!(
            clauses[0],
            Rule::Match(
                MatchRule::new(CompareType::Number, Operator::Gte, "args.auth.age", 18i64)
                    .with_error("adults only")
            )
        );

        let Rule::Force(force) = &clauses[1] else {
            panic!("expected force rule");
        };
        assert_eq!(force.guard.as_deref(), Some(&Rule::Authenticated));
        assert_eq!(force.target_path, "res.role");
        assert_eq!(force.value, Reference::from("user"));

        let Rule::Remove(remove) = &clauses[2] else {
            panic!("expected remove rule");
        };
        assert!(remove.guard.is_none());
        assert_eq!(remove.target_paths, vec!["res.password", "args.find.secret"]);
    }

    #[test]
    fn test_parse_json_wire_format() {
        let rule: Rule = serde_json::from_value(json!({
            "rule": "query",
            "db": "mongo",
            "col": "members",
            "find": {"userId": "args.auth.id"}
        }))
        .unwrap();

        match rule {
            Rule::Query(query) => {
                assert_eq!(query.store, "mongo");
                assert_eq!(query.collection, "members");
                assert_eq!(query.find["userId"], "args.auth.id");
            }
            other => panic!("unexpected rule: {:?}", other),
        }

        let rule: Rule =
            serde_json::from_value(json!({"rule": "webhook", "url": "http://hook"})).unwrap();
        assert_eq!(rule.name(), "webhook");
    }

    #[test]
    fn test_parse_notin_match_yaml() {
        let yaml = r#"
rule: match
type: string
eval: notin
f1: auth.role
f2: [banned, suspended]
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        match rule {
            Rule::Match(m) => {
                assert_eq!(m.operator, Operator::NotIn);
                assert_eq!(m.compare_type, CompareType::String);
            }
            other => panic!("unexpected rule: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_rule_kind_is_unsupported() {
        let rule: Rule = serde_json::from_value(json!({"rule": "graphql", "x": 1})).unwrap();
        assert_eq!(rule, Rule::Unsupported);
    }

    #[test]
    fn test_operator_wire_names() {
        let op: Operator = serde_json::from_value(json!("notin")).unwrap();
        assert_eq!(op, Operator::NotIn);
        let op: Operator = serde_json::from_value(json!("notIn")).unwrap();
        assert_eq!(op, Operator::NotIn);
        assert_eq!(serde_json::to_value(Operator::NotIn).unwrap(), json!("notin"));
        assert_eq!(serde_json::to_value(Operator::Lte).unwrap(), json!("<="));
        assert!(serde_json::from_value::<Operator>(json!("~=")).is_err());
    }
}
