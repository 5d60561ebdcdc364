/// 字段值与源码文本之间的序列化工具
///
/// 生成器与补丁器共用这里的序列化函数，保证两者写出的文本完全一致，
/// 这是往返律和补丁幂等性的前提。
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::pattern::FieldShape;
use crate::utils::SyncError;

/// 二维坐标（画布位置）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 单个字段的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Numbers(Vec<f64>),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
    /// 有序的 (参数名, 参数类型) 列表
    Params(Vec<(String, String)>),
    Body(String),
}

fn mismatch(field: &str, expected: &str) -> SyncError {
    SyncError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
    }
}

impl FieldValue {
    pub fn into_str(self, field: &str) -> Result<String, SyncError> {
        match self {
            FieldValue::Str(s) => Ok(s),
            _ => Err(mismatch(field, "string")),
        }
    }

    pub fn into_int(self, field: &str) -> Result<i64, SyncError> {
        match self {
            FieldValue::Int(n) => Ok(n),
            _ => Err(mismatch(field, "integer")),
        }
    }

    pub fn into_float(self, field: &str) -> Result<f64, SyncError> {
        match self {
            FieldValue::Float(f) => Ok(f),
            FieldValue::Int(n) => Ok(n as f64),
            _ => Err(mismatch(field, "float")),
        }
    }

    pub fn into_bool(self, field: &str) -> Result<bool, SyncError> {
        match self {
            FieldValue::Bool(b) => Ok(b),
            _ => Err(mismatch(field, "boolean")),
        }
    }

    /// 转换为坐标，要求恰好两个数
    pub fn into_vec2(self, field: &str) -> Result<Vec2, SyncError> {
        match self {
            FieldValue::Numbers(ns) if ns.len() == 2 => Ok(Vec2::new(ns[0], ns[1])),
            _ => Err(mismatch(field, "two numbers")),
        }
    }

    pub fn into_list(self, field: &str) -> Result<Vec<String>, SyncError> {
        match self {
            FieldValue::List(items) => Ok(items),
            _ => Err(mismatch(field, "string list")),
        }
    }

    pub fn into_map(self, field: &str) -> Result<BTreeMap<String, String>, SyncError> {
        match self {
            FieldValue::Map(map) => Ok(map),
            _ => Err(mismatch(field, "string map")),
        }
    }

    pub fn into_params(self, field: &str) -> Result<Vec<(String, String)>, SyncError> {
        match self {
            FieldValue::Params(params) => Ok(params),
            _ => Err(mismatch(field, "parameter list")),
        }
    }

    pub fn into_body(self, field: &str) -> Result<String, SyncError> {
        match self {
            FieldValue::Body(body) => Ok(body),
            _ => Err(mismatch(field, "function body")),
        }
    }

    /// 字符串字段的空值表示"无引用"
    pub fn from_reference(reference: Option<&str>) -> Self {
        FieldValue::Str(reference.unwrap_or_default().to_string())
    }
}

/// 将函数体规范化：非空函数体总以换行结尾
pub fn normalize_body(body: &str) -> String {
    if body.is_empty() || body.ends_with('\n') {
        body.to_string()
    } else {
        format!("{}\n", body)
    }
}

/// 数字的规范文本（`-45.0` 写作 `-45`）
pub fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// 转义为双引号字符串内容
pub fn escape_lua_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

/// `escape_lua_string` 的逆操作；未知转义保留被转义的字符
pub fn unescape_lua_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// 函数签名：`---@param` 注解行 + `function <id>:<func>(<args>)`
pub fn render_signature(id: &str, func: &str, params: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, ty) in params {
        if ty.is_empty() {
            out.push_str(&format!("---@param {}\n", name));
        } else {
            out.push_str(&format!("---@param {} {}\n", name, ty));
        }
    }
    let names: Vec<&str> = params.iter().map(|(name, _)| name.as_str()).collect();
    out.push_str(&format!("function {}:{}({})", id, func, names.join(", ")));
    out
}

/// 序列化字段值为 `value` 捕获组中的文本
///
/// 字符串不含引号、表不含花括号；`Params` 返回完整签名。
pub fn serialize_value(id: &str, shape: FieldShape, value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => escape_lua_string(s),
        FieldValue::Int(n) => n.to_string(),
        FieldValue::Float(f) => format_number(*f),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Numbers(ns) => ns
            .iter()
            .map(|n| format_number(*n))
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::List(items) => items
            .iter()
            .map(|item| format!("\"{}\"", escape_lua_string(item)))
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Map(map) => map
            .iter()
            .map(|(k, v)| {
                format!(
                    "[\"{}\"] = \"{}\"",
                    escape_lua_string(k),
                    escape_lua_string(v)
                )
            })
            .collect::<Vec<_>>()
            .join(", "),
        FieldValue::Params(params) => {
            let func = match shape {
                FieldShape::Signature { func } | FieldShape::Function { func } => func,
                _ => "",
            };
            render_signature(id, func, params)
        }
        FieldValue::Body(body) => normalize_body(body),
    }
}
