/// 源码补丁器
///
/// 在已有文件文本中只替换某个字段匹配到的字节区间，其余字节保持不变，
/// 以保留模型不表示的手写代码。所有补丁都直接作用于传入的缓冲区，
/// 连续补丁自然地基于上一次的输出。
use std::ops::Range;

use regex::Regex;

use crate::generator::render_entity_field;
use crate::model::field::serialize_value;
use crate::model::{unknown_field, Entity};
use crate::pattern::{
    declaration_regex, field_regex, find_field, function_signature_regex, header_regex,
    region_header_regex, registration_regex, FieldShape,
};
use crate::utils::SyncError;

/// 单个字段的补丁结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchStatus {
    /// 已替换，值为新文本中被替换后的区间
    Replaced(Range<usize>),
    /// 文本中的值已与模型一致
    Unchanged,
    /// 文本中没有该字段，文档未修改
    NotPresent,
}

impl PatchStatus {
    pub fn is_present(&self) -> bool {
        !matches!(self, PatchStatus::NotPresent)
    }
}

/// 用模型中的当前值补丁单个字段
///
/// # 参数
/// * `text` - 文件文本，原地修改
/// * `entity` - 提供字段值的实体
/// * `field` - 字段名
///
/// # 返回
/// 字段未声明返回 `UnknownField`；字段在文本中不存在时返回 `Ok(NotPresent)`
pub fn patch_field<E: Entity>(
    text: &mut String,
    entity: &E,
    field: &str,
) -> Result<PatchStatus, SyncError> {
    let id = entity.id();
    let spec = E::field_spec(field).ok_or_else(|| unknown_field(id, field))?;
    let value = entity
        .get_field(field)
        .ok_or_else(|| unknown_field(id, field))?;

    let span = match find_field(text, id, spec.name, spec.shape) {
        Some(caps) => {
            let matched = match spec.shape {
                FieldShape::Signature { .. } => caps.get(0),
                _ => caps.name("value"),
            };
            match matched {
                Some(m) => m.range(),
                None => return Ok(PatchStatus::NotPresent),
            }
        }
        None => {
            tracing::warn!("补丁跳过: 文本中没有 {}.{}", id, field);
            return Ok(PatchStatus::NotPresent);
        }
    };

    let mut replacement = serialize_value(id, spec.shape, &value);
    if text[span.clone()] == replacement {
        return Ok(PatchStatus::Unchanged);
    }
    // 单行函数写入多行函数体时，函数体从签名的下一行开始
    if spec.shape.is_function() && !replacement.is_empty() && !text[..span.start].ends_with('\n')
    {
        replacement.insert(0, '\n');
    }

    text.replace_range(span.clone(), &replacement);
    tracing::debug!("已补丁 {}.{} @ {}..{}", id, field, span.start, span.end);
    Ok(PatchStatus::Replaced(span.start..span.start + replacement.len()))
}

/// 依次补丁实体的所有字段（含派生字段）
///
/// 每个补丁都基于上一个补丁的输出计算。
pub fn patch_all<E: Entity>(text: &mut String, entity: &E) -> Vec<(&'static str, PatchStatus)> {
    E::FIELDS
        .iter()
        .filter_map(|spec| match patch_field(text, entity, spec.name) {
            Ok(status) => Some((spec.name, status)),
            Err(err) => {
                tracing::warn!("补丁失败: {}", err);
                None
            }
        })
        .collect()
}

/// 替换第一个匹配，保留匹配开头的缩进
fn replace_first(text: &mut String, re: &Regex, render: impl FnOnce(&str) -> String) -> bool {
    let Some(m) = re.find(text) else {
        return false;
    };
    let range = m.range();
    let matched = m.as_str();
    let indent_len = matched.len() - matched.trim_start_matches([' ', '\t']).len();
    let replacement = format!("{}{}", &matched[..indent_len], render(&matched[indent_len..]));
    text.replace_range(range, &replacement);
    true
}

/// 将实体区域中的旧 ID 改写为实体的当前 ID
///
/// 改写头部、表声明、注册调用和每个字段语句。函数只改写签名，
/// 保留函数体中的手写内容。
///
/// # 返回
/// 返回改写的语句数
pub fn rekey_entity<E: Entity>(text: &mut String, old_id: &str, entity: &E) -> usize {
    let new_id = entity.id();
    let mut rewritten = 0;

    if replace_first(text, &header_regex(E::CLASS_TAG, old_id), |_| {
        format!("---@{} {}", E::CLASS_TAG, new_id)
    }) {
        rewritten += 1;
    }
    if replace_first(text, &declaration_regex(old_id), |_| format!("{} = {{}}", new_id)) {
        rewritten += 1;
    }
    if replace_first(text, &registration_regex(E::REGISTER_FN, old_id), |_| {
        format!("{}({})", E::REGISTER_FN, new_id)
    }) {
        rewritten += 1;
    }

    for spec in E::FIELDS {
        let done = match spec.shape {
            FieldShape::Function { func } => {
                let re = function_signature_regex(old_id, func);
                replace_first(text, &re, |matched| {
                    let args = matched
                        .find('(')
                        .map(|open| &matched[open..])
                        .unwrap_or("()");
                    format!("function {}:{}{}", new_id, func, args)
                })
            }
            FieldShape::Signature { .. } => {
                let value = entity.get_field(spec.name);
                let re = field_regex(old_id, spec.name, spec.shape);
                match value {
                    Some(value) => {
                        replace_first(text, &re, |_| serialize_value(new_id, spec.shape, &value))
                    }
                    None => false,
                }
            }
            _ => match render_entity_field(entity, spec) {
                Some(statement) => {
                    let re = field_regex(old_id, spec.name, spec.shape);
                    replace_first(text, &re, |_| statement)
                }
                None => false,
            },
        };
        if done {
            rewritten += 1;
        }
    }

    tracing::debug!("改写 {} -> {}: {} 处", old_id, new_id, rewritten);
    rewritten
}

/// 删除实体区域：从头部行到注册调用所在行的末尾
///
/// 没有注册调用时退回到下一个实体头部（或文件末尾）。
/// 注册调用之后的手写代码不属于该区域，保持不变。
///
/// # 返回
/// 未找到头部时返回 false，文本不变
pub fn remove_region<E: Entity>(text: &mut String, id: &str) -> bool {
    let Some(header) = header_regex(E::CLASS_TAG, id).find(text) else {
        return false;
    };
    let start = header.start();
    let next_header = region_header_regex()
        .find_at(text, header.end())
        .map(|next| next.start())
        .unwrap_or(text.len());

    let end = match registration_regex(E::REGISTER_FN, id).find_at(text, header.end()) {
        Some(reg) if reg.end() <= next_header => text[reg.end()..]
            .find('\n')
            .map(|newline| reg.end() + newline + 1)
            .unwrap_or(text.len()),
        _ => next_header,
    };

    // 去掉区域前的分隔空行，避免留下连续空行
    let blank_after = end == text.len() || text[end..].starts_with('\n');
    let start = if blank_after && text[..start].ends_with("\n\n") {
        start - 1
    } else {
        start
    };

    text.replace_range(start..end, "");
    true
}

/// 在文本末尾追加一个新生成的区域，区域之间空一行
pub fn append_region(text: &mut String, region: &str) {
    if !text.is_empty() {
        if !text.ends_with('\n') {
            text.push('\n');
        }
        text.push('\n');
    }
    text.push_str(region);
}
