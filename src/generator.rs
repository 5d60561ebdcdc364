/// 规范源码生成器
///
/// 只根据模型状态生成文本，完全忽略已链接文件的内容。
/// 输出按字段表的固定顺序排列，与导入器互为逆操作。
use crate::model::field::{render_signature, serialize_value};
use crate::model::{Entity, FieldValue, Fsm, State, Trigger};
use crate::pattern::{FieldShape, FieldSpec};
use crate::END_MARKER;

/// 渲染单个字段的完整语句
///
/// `Signature` 字段嵌在对应函数的签名中，单独渲染时返回 None。
pub fn render_field(
    id: &str,
    spec: &FieldSpec,
    value: &FieldValue,
    params: &[(String, String)],
) -> Option<String> {
    let text = serialize_value(id, spec.shape, value);
    let statement = match spec.shape {
        FieldShape::Str => format!("{}.{} = \"{}\"", id, spec.name, text),
        FieldShape::Int | FieldShape::Float | FieldShape::Bool => {
            format!("{}.{} = {}", id, spec.name, text)
        }
        FieldShape::NumberTable | FieldShape::StrList | FieldShape::StrMap => {
            format!("{}.{} = {{{}}}", id, spec.name, text)
        }
        FieldShape::Signature { .. } => return None,
        FieldShape::Function { func } => format!(
            "{}\n{}end{}",
            render_signature(id, func, params),
            text,
            END_MARKER
        ),
    };
    Some(statement)
}

/// 渲染实体的某个字段（使用实体当前 ID）
pub fn render_entity_field<E: Entity>(entity: &E, spec: &FieldSpec) -> Option<String> {
    let value = entity.get_field(spec.name)?;
    let params = match spec.shape {
        FieldShape::Function { func } => entity.signature_params(func),
        _ => Vec::new(),
    };
    render_field(entity.id(), spec, &value, &params)
}

/// 生成单个实体的完整区域
///
/// 顺序：头部注解、表声明、每个字段、注册调用。
pub fn generate_entity<E: Entity>(entity: &E) -> String {
    let id = entity.id();
    let mut out = String::new();

    out.push_str(&format!("---@{} {}\n", E::CLASS_TAG, id));
    out.push_str(&format!("{} = {{}}\n", id));

    for spec in E::FIELDS {
        if let Some(statement) = render_entity_field(entity, spec) {
            out.push_str(&statement);
            out.push('\n');
        }
    }

    out.push_str(&format!("{}({})\n", E::REGISTER_FN, id));
    out
}

/// 生成状态区域
pub fn generate_state(state: &State) -> String {
    generate_entity(state)
}

/// 生成触发器区域
pub fn generate_trigger(trigger: &Trigger) -> String {
    generate_entity(trigger)
}

/// 生成状态机自身的区域（含派生的 activate 函数）
pub fn generate_fsm(fsm: &Fsm) -> String {
    generate_entity(fsm)
}

/// 生成整个文档：状态机区域、各状态区域、各触发器区域，区域之间空一行
pub fn generate_document(fsm: &Fsm) -> String {
    let mut regions = vec![generate_fsm(fsm)];
    regions.extend(fsm.states().map(generate_state));
    regions.extend(fsm.triggers().map(generate_trigger));
    regions.join("\n")
}
