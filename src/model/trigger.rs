use serde::{Deserialize, Serialize};

use super::field::{normalize_body, FieldValue, Vec2};
use super::{unknown_field, Entity};
use crate::pattern::{FieldShape, FieldSpec};
use crate::utils::SyncError;
use crate::TRIGGER_CLASS_TAG;

/// 触发器（带守卫条件的转移）
///
/// `current_state_id` / `next_state_id` 是对状态的弱引用，
/// 只保存 ID，解析交给 `Fsm`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub(crate) id: String,
    /// 显示名称
    pub name: String,
    /// 描述
    pub description: String,
    condition: String,
    action: String,
    /// 优先级
    pub priority: i64,
    /// 是否启用
    pub enabled: bool,
    pub(crate) current_state_id: Option<String>,
    pub(crate) next_state_id: Option<String>,
    /// 画布位置
    pub position: Vec2,
}

impl Trigger {
    /// 字段表（同时决定生成顺序）
    pub const FIELD_TABLE: &'static [FieldSpec] = &[
        FieldSpec::new("name", FieldShape::Str),
        FieldSpec::new("description", FieldShape::Str),
        FieldSpec::new("priority", FieldShape::Int),
        FieldSpec::new("enabled", FieldShape::Bool),
        FieldSpec::new("currentState", FieldShape::Str),
        FieldSpec::new("nextState", FieldShape::Str),
        FieldSpec::new("editorPos", FieldShape::NumberTable),
        FieldSpec::new("condition", FieldShape::Function { func: "condition" }),
        FieldSpec::new("action", FieldShape::Function { func: "action" }),
    ];

    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            condition: String::new(),
            action: String::new(),
            priority: 0,
            enabled: true,
            current_state_id: None,
            next_state_id: None,
            position: Vec2::default(),
        }
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn set_condition(&mut self, body: &str) {
        self.condition = normalize_body(body);
    }

    pub fn set_action(&mut self, body: &str) {
        self.action = normalize_body(body);
    }

    /// 当前状态 ID（未校验是否存在，解析请用 `Fsm::current_state_of`）
    pub fn current_state_id(&self) -> Option<&str> {
        self.current_state_id.as_deref()
    }

    /// 目标状态 ID（未校验是否存在，解析请用 `Fsm::next_state_of`）
    pub fn next_state_id(&self) -> Option<&str> {
        self.next_state_id.as_deref()
    }

    /// 直接设置当前状态 ID，空字符串视为无引用
    ///
    /// 状态侧的触发器集合由该字段派生，无需同步另一侧。
    pub fn set_current_state_id(&mut self, state_id: Option<&str>) {
        self.current_state_id = state_id.filter(|s| !s.is_empty()).map(str::to_string);
    }

    /// 直接设置目标状态 ID，空字符串视为无引用
    pub fn set_next_state_id(&mut self, state_id: Option<&str>) {
        self.next_state_id = state_id.filter(|s| !s.is_empty()).map(str::to_string);
    }
}

impl Entity for Trigger {
    const CLASS_TAG: &'static str = TRIGGER_CLASS_TAG;
    const REGISTER_FN: &'static str = "RegisterTrigger";
    const FIELDS: &'static [FieldSpec] = Trigger::FIELD_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        let value = match field {
            "name" => FieldValue::Str(self.name.clone()),
            "description" => FieldValue::Str(self.description.clone()),
            "priority" => FieldValue::Int(self.priority),
            "enabled" => FieldValue::Bool(self.enabled),
            "currentState" => FieldValue::from_reference(self.current_state_id()),
            "nextState" => FieldValue::from_reference(self.next_state_id()),
            "editorPos" => FieldValue::Numbers(vec![self.position.x, self.position.y]),
            "condition" => FieldValue::Body(self.condition.clone()),
            "action" => FieldValue::Body(self.action.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), SyncError> {
        match field {
            "name" => self.name = value.into_str(field)?,
            "description" => self.description = value.into_str(field)?,
            "priority" => self.priority = value.into_int(field)?,
            "enabled" => self.enabled = value.into_bool(field)?,
            "currentState" => {
                let id = value.into_str(field)?;
                self.set_current_state_id(Some(&id));
            }
            "nextState" => {
                let id = value.into_str(field)?;
                self.set_next_state_id(Some(&id));
            }
            "editorPos" => self.position = value.into_vec2(field)?,
            "condition" => self.set_condition(&value.into_body(field)?),
            "action" => self.set_action(&value.into_body(field)?),
            _ => return Err(unknown_field(&self.id, field)),
        }
        Ok(())
    }
}
