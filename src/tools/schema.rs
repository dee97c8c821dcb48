//! 工具参数 Schema
//!
//! 每个工具声明一组带类型的参数；执行前按 Schema 校验：缺少必填参数、出现未声明参数、
//! 类型不符或枚举值越界都会被拒绝。to_json 生成 JSON Schema，写入 Planner 的能力描述。

use serde_json::{json, Map, Value};
use thiserror::Error;

/// 工具参数（JSON 对象）
pub type Args = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("missing required argument '{0}'")]
    MissingField(String),

    #[error("unknown argument '{0}'")]
    UnknownField(String),

    #[error("argument '{field}' must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("argument '{field}' must be one of [{allowed}], got '{value}'")]
    NotAllowed {
        field: String,
        value: String,
        allowed: String,
    },
}

/// 参数类型
#[derive(Clone, Debug, PartialEq)]
pub enum ArgKind {
    String,
    Integer,
    Boolean,
    StringList,
    OneOf(Vec<String>),
}

impl ArgKind {
    pub fn one_of(values: &[&str]) -> Self {
        ArgKind::OneOf(values.iter().map(|v| v.to_string()).collect())
    }

    fn expected(&self) -> &'static str {
        match self {
            ArgKind::String | ArgKind::OneOf(_) => "a string",
            ArgKind::Integer => "an integer",
            ArgKind::Boolean => "a boolean",
            ArgKind::StringList => "a list of strings",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgKind::String | ArgKind::OneOf(_) => value.is_string(),
            ArgKind::Integer => value.is_i64() || value.is_u64(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::StringList => value
                .as_array()
                .map(|items| items.iter().all(Value::is_string))
                .unwrap_or(false),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            ArgKind::String => json!({ "type": "string" }),
            ArgKind::Integer => json!({ "type": "integer" }),
            ArgKind::Boolean => json!({ "type": "boolean" }),
            ArgKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            ArgKind::OneOf(values) => json!({ "type": "string", "enum": values }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub required: bool,
    pub description: String,
}

/// 工具参数 Schema（构建器风格）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolSchema {
    args: Vec<ArgSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.with_arg(name, kind, true, description)
    }

    pub fn optional(self, name: &str, kind: ArgKind, description: &str) -> Self {
        self.with_arg(name, kind, false, description)
    }

    fn with_arg(mut self, name: &str, kind: ArgKind, required: bool, description: &str) -> Self {
        self.args.push(ArgSpec {
            name: name.to_string(),
            kind,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    fn spec(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|a| a.name == name)
    }

    /// 校验参数；null 视为未提供
    pub fn validate(&self, args: &Args) -> Result<(), ValidationError> {
        for (name, value) in args {
            let spec = self
                .spec(name)
                .ok_or_else(|| ValidationError::UnknownField(name.clone()))?;
            if value.is_null() {
                continue;
            }
            if !spec.kind.accepts(value) {
                return Err(ValidationError::WrongType {
                    field: name.clone(),
                    expected: spec.kind.expected(),
                });
            }
            if let (ArgKind::OneOf(allowed), Some(v)) = (&spec.kind, value.as_str()) {
                if !allowed.iter().any(|a| a == v) {
                    return Err(ValidationError::NotAllowed {
                        field: name.clone(),
                        value: v.to_string(),
                        allowed: allowed.join(", "),
                    });
                }
            }
        }

        for spec in self.args.iter().filter(|a| a.required) {
            match args.get(&spec.name) {
                None | Some(Value::Null) => {
                    return Err(ValidationError::MissingField(spec.name.clone()))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.args {
            let mut prop = spec.kind.to_json();
            if let Some(obj) = prop.as_object_mut() {
                obj.insert("description".into(), Value::String(spec.description.clone()));
            }
            properties.insert(spec.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .args
            .iter()
            .filter(|a| a.required)
            .map(|a| a.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

/// 读取字符串参数（去掉首尾空白，空串视为缺失）
pub fn arg_str<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn arg_usize(args: &Args, key: &str) -> Option<usize> {
    args.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_schema() -> ToolSchema {
        ToolSchema::new()
            .required("query", ArgKind::String, "search terms")
            .optional("max_results", ArgKind::Integer, "result cap")
            .optional("mode", ArgKind::one_of(&["fast", "deep"]), "search mode")
            .optional("sites", ArgKind::StringList, "restrict to sites")
    }

    fn args(value: Value) -> Args {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_valid_args_pass() {
        let schema = search_schema();
        assert!(schema
            .validate(&args(json!({"query": "rust", "max_results": 3, "mode": "fast", "sites": ["a.com"]})))
            .is_ok());
    }

    #[test]
    fn test_missing_required() {
        let err = search_schema().validate(&args(json!({"max_results": 3}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("query".into()));

        let err = search_schema().validate(&args(json!({"query": null}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("query".into()));
    }

    #[test]
    fn test_unknown_argument_rejected() {
        let err = search_schema()
            .validate(&args(json!({"query": "rust", "page": 2})))
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownField("page".into()));
    }

    #[test]
    fn test_wrong_type_and_enum() {
        let err = search_schema()
            .validate(&args(json!({"query": "rust", "max_results": "five"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { ref field, .. } if field == "max_results"));

        let err = search_schema()
            .validate(&args(json!({"query": "rust", "mode": "slow"})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { ref value, .. } if value == "slow"));

        let err = search_schema()
            .validate(&args(json!({"query": "rust", "sites": ["a.com", 1]})))
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { .. }));
    }

    #[test]
    fn test_to_json_lists_required() {
        let schema = search_schema().to_json();
        assert_eq!(schema["required"], json!(["query"]));
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["fast", "deep"]));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_arg_helpers() {
        let a = args(json!({"q": "  hi  ", "empty": "   ", "n": 4}));
        assert_eq!(arg_str(&a, "q"), Some("hi"));
        assert_eq!(arg_str(&a, "empty"), None);
        assert_eq!(arg_usize(&a, "n"), Some(4));
        assert_eq!(arg_usize(&a, "q"), None);
    }
}
