/// 源码导入器
///
/// 从带注解的 Lua 文本中读取实体字段并写入模型。
///
/// # 失败语义
/// - 导入按字段独立进行，不是全有或全无
/// - 字段模式未匹配：保留模型当前值，记录 `PatternNotFound`
/// - 捕获文本无法解析：仅该字段失败，记录 `MalformedValue`
/// - 以上都只是报告中的值并输出 warn 日志，不会中断其余字段
use std::collections::HashMap;

use rayon::prelude::*;
use regex::Captures;

use crate::model::field::unescape_lua_string;
use crate::model::{Entity, FieldValue, Fsm, State, Trigger};
use crate::pattern::{
    any_header_regex, find_field, header_regex, map_entry_regex, param_line_regex,
    quoted_string_regex, table_number_regex, FieldShape, FieldSpec,
};
use crate::utils::SyncError;
use crate::{FSM_CLASS_TAG, STATE_CLASS_TAG, TRIGGER_CLASS_TAG};

/// 导入报告
#[derive(Debug, Default)]
pub struct ImportReport {
    /// 成功导入的字段数
    pub imported: usize,
    /// 字段级问题（PatternNotFound / MalformedValue / DanglingReference 等）
    pub issues: Vec<SyncError>,
    /// 文件中存在但模型中没有的实体（"<类标签> <id>"）
    pub unknown_entities: Vec<String>,
}

impl ImportReport {
    /// 没有任何问题
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// 所有未找到的 (实体, 字段)
    pub fn missing_fields(&self) -> Vec<(&str, &str)> {
        self.issues
            .iter()
            .filter_map(|issue| match issue {
                SyncError::PatternNotFound { entity, field } => {
                    Some((entity.as_str(), field.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    /// 合并另一份报告
    pub fn merge(&mut self, other: ImportReport) {
        self.imported += other.imported;
        self.issues.extend(other.issues);
        self.unknown_entities.extend(other.unknown_entities);
    }

    /// 生成摘要
    pub fn summary(&self) -> String {
        format!(
            "imported {} fields, {} issues, {} unknown entities",
            self.imported,
            self.issues.len(),
            self.unknown_entities.len()
        )
    }
}

fn malformed(entity: &str, field: &str, text: &str) -> SyncError {
    SyncError::MalformedValue {
        entity: entity.to_string(),
        field: field.to_string(),
        text: text.to_string(),
    }
}

/// 将捕获结果解析为字段值
///
/// # 返回
/// 解析失败时返回 Err(捕获到的原始文本)
fn parse_captures(shape: FieldShape, caps: &Captures) -> Result<FieldValue, String> {
    let value = caps.name("value").map(|m| m.as_str()).unwrap_or_default();

    match shape {
        FieldShape::Str => Ok(FieldValue::Str(unescape_lua_string(value))),
        FieldShape::Int => value
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| value.to_string()),
        FieldShape::Float => value
            .parse::<f64>()
            .map(FieldValue::Float)
            .map_err(|_| value.to_string()),
        FieldShape::Bool => match value {
            "true" => Ok(FieldValue::Bool(true)),
            "false" => Ok(FieldValue::Bool(false)),
            _ => Err(value.to_string()),
        },
        FieldShape::NumberTable => {
            let numbers = table_number_regex()
                .find_iter(value)
                .map(|m| m.as_str().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| value.to_string())?;
            Ok(FieldValue::Numbers(numbers))
        }
        FieldShape::StrList => Ok(FieldValue::List(
            quoted_string_regex()
                .captures_iter(value)
                .map(|c| unescape_lua_string(&c["text"]))
                .collect(),
        )),
        FieldShape::StrMap => Ok(FieldValue::Map(
            map_entry_regex()
                .captures_iter(value)
                .map(|c| (unescape_lua_string(&c["key"]), unescape_lua_string(&c["val"])))
                .collect(),
        )),
        FieldShape::Signature { .. } => {
            let params_text = caps.name("params").map(|m| m.as_str()).unwrap_or_default();
            let types: HashMap<String, String> = param_line_regex()
                .captures_iter(params_text)
                .map(|c| {
                    let ty = c.name("ty").map(|t| t.as_str()).unwrap_or_default();
                    (c["name"].to_string(), ty.to_string())
                })
                .collect();

            let args = caps.name("args").map(|m| m.as_str()).unwrap_or_default();
            let params = args
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| {
                    let ty = types.get(name).cloned().unwrap_or_default();
                    (name.to_string(), ty)
                })
                .collect();
            Ok(FieldValue::Params(params))
        }
        FieldShape::Function { .. } => Ok(FieldValue::Body(value.to_string())),
    }
}

/// 导入单个字段
pub fn import_field<E: Entity>(
    text: &str,
    entity: &mut E,
    spec: &FieldSpec,
) -> Result<(), SyncError> {
    let id = entity.id().to_string();

    let caps = find_field(text, &id, spec.name, spec.shape)
        .ok_or_else(|| SyncError::PatternNotFound {
            entity: id.clone(),
            field: spec.name.to_string(),
        })?;

    let value = parse_captures(spec.shape, &caps).map_err(|raw| malformed(&id, spec.name, &raw))?;

    match entity.set_field(spec.name, value) {
        Ok(()) => Ok(()),
        Err(SyncError::TypeMismatch { .. }) => {
            let raw = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            Err(malformed(&id, spec.name, raw))
        }
        Err(err) => Err(err),
    }
}

/// 导入单个实体的全部（非派生）字段
///
/// # 参数
/// * `text` - 完整文件文本（字段模式嵌入了 ID，无需截取区域）
/// * `entity` - 目标实体
///
/// # 返回
/// 返回导入报告；头部缺失也只记录为 `PatternNotFound`
pub fn import_entity<E: Entity>(text: &str, entity: &mut E) -> ImportReport {
    let mut report = ImportReport::default();
    let id = entity.id().to_string();

    if !header_regex(E::CLASS_TAG, &id).is_match(text) {
        tracing::warn!("未找到 {} {} 的头部注解", E::CLASS_TAG, id);
        report.issues.push(SyncError::PatternNotFound {
            entity: id.clone(),
            field: "header".to_string(),
        });
    }

    for spec in E::FIELDS.iter().filter(|spec| !spec.derived) {
        match import_field(text, entity, spec) {
            Ok(()) => report.imported += 1,
            Err(err) => {
                tracing::warn!("字段导入失败: {}", err);
                report.issues.push(err);
            }
        }
    }

    tracing::debug!("导入 {} {}: {}", E::CLASS_TAG, id, report.summary());
    report
}

/// 导入状态
pub fn import_state(text: &str, state: &mut State) -> ImportReport {
    import_entity(text, state)
}

/// 导入触发器
///
/// 状态侧的触发器集合由 `current_state_id` 派生，导入后自动重新关联。
pub fn import_trigger(text: &str, trigger: &mut Trigger) -> ImportReport {
    import_entity(text, trigger)
}

/// 导入状态机自身字段（不含状态和触发器）
pub fn import_fsm(text: &str, fsm: &mut Fsm) -> ImportReport {
    import_entity(text, fsm)
}

/// 完整重新导入
///
/// 以文件为准覆盖所有已存在实体的匹配字段，然后导入状态机自身字段。
/// 不删除任何一侧独有的实体；文件中多出的实体记录在 `unknown_entities`。
pub fn update_from_file(fsm: &mut Fsm, text: &str) -> ImportReport {
    let mut report = ImportReport::default();

    // 各实体只读共享文本，可以并行导入
    let state_reports: Vec<ImportReport> = fsm
        .states
        .par_iter_mut()
        .map(|(_, state)| import_state(text, state))
        .collect();
    let trigger_reports: Vec<ImportReport> = fsm
        .triggers
        .par_iter_mut()
        .map(|(_, trigger)| import_trigger(text, trigger))
        .collect();

    for part in state_reports.into_iter().chain(trigger_reports) {
        report.merge(part);
    }

    // 状态已就绪后再导入 initialState
    report.merge(import_fsm(text, fsm));

    for id in discover_ids(text, STATE_CLASS_TAG) {
        if fsm.state(&id).is_none() {
            report.unknown_entities.push(format!("{} {}", STATE_CLASS_TAG, id));
        }
    }
    for id in discover_ids(text, TRIGGER_CLASS_TAG) {
        if fsm.trigger(&id).is_none() {
            report.unknown_entities.push(format!("{} {}", TRIGGER_CLASS_TAG, id));
        }
    }

    tracing::debug!("完整重新导入: {}", report.summary());
    report
}

/// 按出现顺序列出某类标签下的所有实体 ID
pub fn discover_ids(text: &str, class_tag: &str) -> Vec<String> {
    any_header_regex(class_tag)
        .captures_iter(text)
        .map(|c| c["id"].to_string())
        .collect()
}

/// 打开文件：发现所有实体并导入
///
/// 以第一个 `---@FSM` 头部为状态机，为每个 `---@State` / `---@Trigger`
/// 头部创建实体，然后执行完整重新导入。
///
/// # 返回
/// 没有状态机头部时返回 `EntityNotFound`；重复或非法的实体头部记录在报告中
pub fn load(text: &str) -> Result<(Fsm, ImportReport), SyncError> {
    let fsm_id = discover_ids(text, FSM_CLASS_TAG)
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::EntityNotFound(format!("---@{} header", FSM_CLASS_TAG)))?;

    let mut fsm = Fsm::new(&fsm_id)?;
    let mut report = ImportReport::default();

    for id in discover_ids(text, STATE_CLASS_TAG) {
        if let Err(err) = fsm.create_state(&id) {
            tracing::warn!("跳过状态头部 {}: {}", id, err);
            report.issues.push(err);
        }
    }
    for id in discover_ids(text, TRIGGER_CLASS_TAG) {
        if let Err(err) = fsm.create_trigger(&id) {
            tracing::warn!("跳过触发器头部 {}: {}", id, err);
            report.issues.push(err);
        }
    }

    report.merge(update_from_file(&mut fsm, text));
    Ok((fsm, report))
}
