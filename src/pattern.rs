/// 字段模式库
///
/// 根据实体 ID、类标签和字段名构造定位并捕获字段值的正则表达式。
/// 本模块无状态：所有函数都是 (id, 类标签, 字段, 形状) 到 `Regex` 的纯函数。
///
/// # 约定
/// - 所有字段模式都以行首锚定（允许缩进），并把 ID 嵌入模式本身，
///   因此可以对整个文件文本匹配而不会串到其他实体
/// - 除 `Signature` 外，每个模式都有名为 `value` 的捕获组，
///   补丁器只替换该捕获组对应的字节区间
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::{END_MARKER, FSM_CLASS_TAG, STATE_CLASS_TAG, TRIGGER_CLASS_TAG};

/// 字段在源码中的形状
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldShape {
    /// `<id>.<field> = "<value>"`
    Str,
    /// `<id>.<field> = <integer>`
    Int,
    /// `<id>.<field> = <float>`
    Float,
    /// `<id>.<field> = <true|false>`
    Bool,
    /// `<id>.<field> = {<f1>, <f2>, ...}`（编辑器坐标）
    NumberTable,
    /// `<id>.<field> = {"a", "b"}`
    StrList,
    /// `<id>.<field> = {["k"] = "v"}`
    StrMap,
    /// `---@param` 注解块加函数签名，整段匹配即为替换区间
    Signature { func: &'static str },
    /// `function <id>:<func>(...)` 到结束标记之间的函数体
    Function { func: &'static str },
}

impl FieldShape {
    /// 是否为函数体字段
    pub fn is_function(&self) -> bool {
        matches!(self, FieldShape::Function { .. })
    }

    /// 形状名称（用于错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            FieldShape::Str => "string",
            FieldShape::Int => "integer",
            FieldShape::Float => "float",
            FieldShape::Bool => "boolean",
            FieldShape::NumberTable => "number table",
            FieldShape::StrList => "string list",
            FieldShape::StrMap => "string map",
            FieldShape::Signature { .. } => "signature",
            FieldShape::Function { .. } => "function body",
        }
    }
}

/// 字段描述：字段名 + 形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// 源码中的字段名（如 `editorPos`、`onEnter`）
    pub name: &'static str,
    /// 字段形状
    pub shape: FieldShape,
    /// 派生字段：值由模型计算，只生成不导入
    pub derived: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, shape: FieldShape) -> Self {
        Self {
            name,
            shape,
            derived: false,
        }
    }

    pub const fn derived(name: &'static str, shape: FieldShape) -> Self {
        Self {
            name,
            shape,
            derived: true,
        }
    }
}

/// 编译内部模板。所有外部输入都经过 `regex::escape`，模板本身总是合法的。
fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("field pattern template")
}

/// 实体头部注解：`---@<ClassTag> <id>`
pub fn header_regex(class_tag: &str, id: &str) -> Regex {
    compile(&format!(
        r"(?m)^---@{}[ \t]+{}[ \t]*\r?$",
        regex::escape(class_tag),
        regex::escape(id)
    ))
}

/// 捕获某个类标签下所有实体 ID 的头部模式
pub fn any_header_regex(class_tag: &str) -> Regex {
    compile(&format!(
        r"(?m)^---@{}[ \t]+(?P<id>[A-Za-z0-9_\-]+)[ \t]*\r?$",
        regex::escape(class_tag)
    ))
}

/// 任意实体头部（用于确定区域结尾），不会匹配 `---@param` 等普通注解
pub fn region_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(&format!(
            r"(?m)^---@(?:{}|{}|{})[ \t]+[A-Za-z0-9_\-]+[ \t]*\r?$",
            FSM_CLASS_TAG, STATE_CLASS_TAG, TRIGGER_CLASS_TAG
        ))
    })
}

/// 表声明：`<id> = {}`
pub fn declaration_regex(id: &str) -> Regex {
    compile(&format!(
        r"(?m)^[ \t]*{}[ \t]*=[ \t]*\{{[ \t]*\}}",
        regex::escape(id)
    ))
}

/// 尾部注册调用：`Register<Kind>(<id>)`
pub fn registration_regex(register_fn: &str, id: &str) -> Regex {
    compile(&format!(
        r"(?m)^[ \t]*{}[ \t]*\([ \t]*{}[ \t]*\)",
        regex::escape(register_fn),
        regex::escape(id)
    ))
}

/// 函数签名行（不含函数体），用于重命名时替换 ID
pub fn function_signature_regex(id: &str, func: &str) -> Regex {
    compile(&format!(
        r"(?m)^[ \t]*function[ \t]+{}:{}[ \t]*\([^)]*\)",
        regex::escape(id),
        regex::escape(func)
    ))
}

/// 为指定实体字段构造匹配模式
///
/// # 参数
/// * `id` - 实体 ID
/// * `field` - 字段名
/// * `shape` - 字段形状
///
/// # 返回
/// 返回编译好的正则；除 `Signature` 外都包含 `value` 捕获组
pub fn field_regex(id: &str, field: &str, shape: FieldShape) -> Regex {
    let id = regex::escape(id);
    let assign = format!(r"(?m)^[ \t]*{}\.{}[ \t]*=[ \t]*", id, regex::escape(field));

    let pattern = match shape {
        FieldShape::Str => format!(r#"{}"(?P<value>(?:[^"\\\r\n]|\\.)*)""#, assign),
        FieldShape::Int | FieldShape::Float | FieldShape::Bool => {
            // 宽松捕获，解析失败报告为 MalformedValue 而不是 PatternNotFound
            format!(r"{}(?P<value>[^\s,;}}]+)", assign)
        }
        FieldShape::NumberTable | FieldShape::StrList | FieldShape::StrMap => format!(
            r#"{}\{{(?P<value>(?:[^{{}}"]|"(?:[^"\\]|\\.)*")*)\}}"#,
            assign
        ),
        FieldShape::Signature { func } => format!(
            r"(?m)(?P<params>(?:^[ \t]*---@param[ \t]+[^\s]+[^\r\n]*\r?\n)*)^[ \t]*function[ \t]+{}:{}[ \t]*\((?P<args>[^)]*)\)",
            id,
            regex::escape(func)
        ),
        FieldShape::Function { func } => format!(
            // 函数体紧跟 `)`：签名行尾的换行（可带注释）不计入函数体，单行函数体可以为空
            r"(?ms)^[ \t]*function[ \t]+{}:{}[ \t]*\((?P<args>[^)]*)\)(?:[ \t]*(?:--[^\n]*)?\r?\n|[ \t]*)(?P<value>.*?)[ \t]*end{}",
            id,
            regex::escape(func),
            regex::escape(END_MARKER)
        ),
    };

    compile(&pattern)
}

/// 同一实体任意函数的签名行开头
fn entity_function_regex(id: &str) -> Regex {
    compile(&format!(r"(?m)^[ \t]*function[ \t]+{}:", regex::escape(id)))
}

/// 在文本中定位字段
///
/// 函数体不能跨过同一实体的另一个函数签名：自身的结束标记缺失时，
/// 懒惰匹配会延伸到下一个函数的标记，这种情况视为未找到。
pub fn find_field<'t>(
    text: &'t str,
    id: &str,
    field: &str,
    shape: FieldShape,
) -> Option<Captures<'t>> {
    let caps = field_regex(id, field, shape).captures(text)?;
    if shape.is_function() {
        let body = caps.name("value")?.as_str();
        if entity_function_regex(id).is_match(body) {
            tracing::warn!("{}.{} 缺少结束标记 {}", id, field, END_MARKER);
            return None;
        }
    }
    Some(caps)
}

/// 表内有符号浮点数元素，按从左到右顺序提取
pub fn table_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"-?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?"))
}

/// 表内带转义的双引号字符串元素
pub fn quoted_string_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r#""(?P<text>(?:[^"\\]|\\.)*)""#))
}

/// 表内的 `["key"] = "value"` 条目
pub fn map_entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r#"\[\s*"(?P<key>(?:[^"\\]|\\.)*)"\s*\]\s*=\s*"(?P<val>(?:[^"\\]|\\.)*)""#)
    })
}

/// `---@param <name> <type>` 注解行
pub fn param_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(r"(?m)^[ \t]*---@param[ \t]+(?P<name>[^\s]+)(?:[ \t]+(?P<ty>[^\r\n]*?))?[ \t]*\r?$")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_matches_exact_id() {
        let text = "---@Trigger ToRun\n---@Trigger ToRunFast\n";
        let re = header_regex("Trigger", "ToRun");

        let found: Vec<_> = re.find_iter(text).map(|m| m.as_str()).collect();
        assert_eq!(found, vec!["---@Trigger ToRun"]);
    }

    #[test]
    fn test_any_header_collects_ids() {
        let text = "---@State Idle\nIdle = {}\n---@State Run-2\n---@param dt number\n";
        let ids: Vec<_> = any_header_regex("State")
            .captures_iter(text)
            .map(|c| c["id"].to_string())
            .collect();
        assert_eq!(ids, vec!["Idle", "Run-2"]);
    }

    #[test]
    fn test_region_header_ignores_param_annotations() {
        assert!(!region_header_regex().is_match("---@param dt number"));
        assert!(region_header_regex().is_match("---@FSM Main"));
    }

    #[test]
    fn test_string_field_is_scoped_by_id() {
        let text = "OtherIdle.name = \"wrong\"\nIdle.name = \"right\"\n";
        let caps = field_regex("Idle", "name", FieldShape::Str)
            .captures(text)
            .unwrap();
        assert_eq!(&caps["value"], "right");
    }

    #[test]
    fn test_string_field_with_escapes() {
        let text = r#"Idle.description = "say \"hi\"""#;
        let caps = field_regex("Idle", "description", FieldShape::Str)
            .captures(text)
            .unwrap();
        assert_eq!(&caps["value"], r#"say \"hi\""#);
    }

    #[test]
    fn test_scalar_fields() {
        let text = "T.priority = 12\nT.enabled = false\nMain.editorZoom = -1.25\n";
        let int = field_regex("T", "priority", FieldShape::Int).captures(text).unwrap();
        assert_eq!(&int["value"], "12");

        let boolean = field_regex("T", "enabled", FieldShape::Bool).captures(text).unwrap();
        assert_eq!(&boolean["value"], "false");

        let float = field_regex("Main", "editorZoom", FieldShape::Float).captures(text).unwrap();
        assert_eq!(&float["value"], "-1.25");
    }

    #[test]
    fn test_table_tolerates_newlines() {
        let text = "AID.editorPos = {\n  120.5,\n  -45\n}";
        let caps = field_regex("AID", "editorPos", FieldShape::NumberTable)
            .captures(text)
            .unwrap();
        let numbers: Vec<_> = table_number_regex()
            .find_iter(&caps["value"])
            .map(|m| m.as_str())
            .collect();
        assert_eq!(numbers, vec!["120.5", "-45"]);
    }

    #[test]
    fn test_string_table_allows_braces_in_strings() {
        let text = r#"Idle.data = {["k"] = "}", ["n"] = "2"}"#;
        let caps = field_regex("Idle", "data", FieldShape::StrMap)
            .captures(text)
            .unwrap();
        let entries: Vec<_> = map_entry_regex()
            .captures_iter(&caps["value"])
            .map(|c| (c["key"].to_string(), c["val"].to_string()))
            .collect();
        assert_eq!(
            entries,
            vec![("k".to_string(), "}".to_string()), ("n".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_function_body_survives_nested_end() {
        let text = "function A:condition()\nif x then\n  y()\nend\nreturn true\nend--@end\n";
        let caps = field_regex("A", "condition", FieldShape::Function { func: "condition" })
            .captures(text)
            .unwrap();
        assert_eq!(&caps["value"], "if x then\n  y()\nend\nreturn true\n");
    }

    #[test]
    fn test_empty_function_body() {
        let text = "function Idle:onExit()\nend--@end\n";
        let caps = field_regex("Idle", "onExit", FieldShape::Function { func: "onExit" })
            .captures(text)
            .unwrap();
        assert_eq!(&caps["value"], "");
    }

    #[test]
    fn test_one_line_body_next_to_multi_line() {
        let text = "function Idle:onEnter() end--@end\nfunction Idle:onExit()\n  stop()\nend--@end\n";
        let shape = FieldShape::Function { func: "onEnter" };
        let caps = find_field(text, "Idle", "onEnter", shape).unwrap();
        assert_eq!(&caps["value"], "");
        assert_eq!(caps.get(0).unwrap().end(), text.find('\n').unwrap());

        let exit = find_field(text, "Idle", "onExit", FieldShape::Function { func: "onExit" })
            .unwrap();
        assert_eq!(&exit["value"], "  stop()\n");

        let inline = "function T:action() fire() end--@end\n";
        let caps = find_field(inline, "T", "action", FieldShape::Function { func: "action" })
            .unwrap();
        assert_eq!(&caps["value"], "fire()");
    }

    #[test]
    fn test_body_without_marker_is_not_found() {
        let text = "function Idle:onEnter()\n  go()\nfunction Idle:onExit()\nend--@end\n";
        let shape = FieldShape::Function { func: "onEnter" };
        assert!(field_regex("Idle", "onEnter", shape).is_match(text));
        assert!(find_field(text, "Idle", "onEnter", shape).is_none());
        assert!(find_field(text, "Idle", "onExit", FieldShape::Function { func: "onExit" })
            .is_some());
    }

    #[test]
    fn test_signature_includes_param_block() {
        let text = "---@param dt number\n---@param owner table\nfunction Idle:onUpdate(dt, owner)\nend--@end\n";
        let caps = field_regex("Idle", "updateArgs", FieldShape::Signature { func: "onUpdate" })
            .captures(text)
            .unwrap();
        assert_eq!(caps.get(0).unwrap().start(), 0);
        assert_eq!(&caps["args"], "dt, owner");

        let params: Vec<_> = param_line_regex()
            .captures_iter(&caps["params"])
            .map(|c| (c["name"].to_string(), c.name("ty").map(|t| t.as_str().to_string())))
            .collect();
        assert_eq!(params[1], ("owner".to_string(), Some("table".to_string())));
    }

    #[test]
    fn test_declaration_and_registration() {
        let text = "Idle = {}\nRegisterState(Idle)\n";
        assert!(declaration_regex("Idle").is_match(text));
        assert!(!declaration_regex("Idl").is_match(text));
        assert!(registration_regex("RegisterState", "Idle").is_match(text));
    }
}
