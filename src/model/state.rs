use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::field::{normalize_body, FieldValue, Vec2};
use super::{unknown_field, Entity};
use crate::pattern::{FieldShape, FieldSpec};
use crate::utils::SyncError;
use crate::STATE_CLASS_TAG;

/// 状态
///
/// 状态本身不保存触发器集合：某状态的触发器由
/// `Fsm::triggers_of` 根据触发器的 `current_state_id` 实时计算。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub(crate) id: String,
    /// 显示名称
    pub name: String,
    /// 描述
    pub description: String,
    on_init: String,
    on_enter: String,
    on_update: String,
    on_exit: String,
    /// onUpdate 的有序参数 (名称, 类型)
    pub update_args: Vec<(String, String)>,
    /// 自由键值数据
    pub data: BTreeMap<String, String>,
    /// 事件标签
    pub events: Vec<String>,
    /// 画布位置
    pub position: Vec2,
}

impl State {
    /// 字段表（同时决定生成顺序）
    pub const FIELD_TABLE: &'static [FieldSpec] = &[
        FieldSpec::new("name", FieldShape::Str),
        FieldSpec::new("description", FieldShape::Str),
        FieldSpec::new("editorPos", FieldShape::NumberTable),
        FieldSpec::new("events", FieldShape::StrList),
        FieldSpec::new("data", FieldShape::StrMap),
        FieldSpec::new("updateArgs", FieldShape::Signature { func: "onUpdate" }),
        FieldSpec::new("onInit", FieldShape::Function { func: "onInit" }),
        FieldSpec::new("onEnter", FieldShape::Function { func: "onEnter" }),
        FieldSpec::new("onUpdate", FieldShape::Function { func: "onUpdate" }),
        FieldSpec::new("onExit", FieldShape::Function { func: "onExit" }),
    ];

    /// 创建新状态（ID 校验由 `Fsm::create_state` 负责）
    pub(crate) fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            on_init: String::new(),
            on_enter: String::new(),
            on_update: String::new(),
            on_exit: String::new(),
            update_args: Vec::new(),
            data: BTreeMap::new(),
            events: Vec::new(),
            position: Vec2::default(),
        }
    }

    pub fn on_init(&self) -> &str {
        &self.on_init
    }

    pub fn on_enter(&self) -> &str {
        &self.on_enter
    }

    pub fn on_update(&self) -> &str {
        &self.on_update
    }

    pub fn on_exit(&self) -> &str {
        &self.on_exit
    }

    pub fn set_on_init(&mut self, body: &str) {
        self.on_init = normalize_body(body);
    }

    pub fn set_on_enter(&mut self, body: &str) {
        self.on_enter = normalize_body(body);
    }

    pub fn set_on_update(&mut self, body: &str) {
        self.on_update = normalize_body(body);
    }

    pub fn set_on_exit(&mut self, body: &str) {
        self.on_exit = normalize_body(body);
    }
}

impl Entity for State {
    const CLASS_TAG: &'static str = STATE_CLASS_TAG;
    const REGISTER_FN: &'static str = "RegisterState";
    const FIELDS: &'static [FieldSpec] = State::FIELD_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        let value = match field {
            "name" => FieldValue::Str(self.name.clone()),
            "description" => FieldValue::Str(self.description.clone()),
            "editorPos" => FieldValue::Numbers(vec![self.position.x, self.position.y]),
            "events" => FieldValue::List(self.events.clone()),
            "data" => FieldValue::Map(self.data.clone()),
            "updateArgs" => FieldValue::Params(self.update_args.clone()),
            "onInit" => FieldValue::Body(self.on_init.clone()),
            "onEnter" => FieldValue::Body(self.on_enter.clone()),
            "onUpdate" => FieldValue::Body(self.on_update.clone()),
            "onExit" => FieldValue::Body(self.on_exit.clone()),
            _ => return None,
        };
        Some(value)
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), SyncError> {
        match field {
            "name" => self.name = value.into_str(field)?,
            "description" => self.description = value.into_str(field)?,
            "editorPos" => self.position = value.into_vec2(field)?,
            "events" => self.events = value.into_list(field)?,
            "data" => self.data = value.into_map(field)?,
            "updateArgs" => self.update_args = value.into_params(field)?,
            "onInit" => self.set_on_init(&value.into_body(field)?),
            "onEnter" => self.set_on_enter(&value.into_body(field)?),
            "onUpdate" => self.set_on_update(&value.into_body(field)?),
            "onExit" => self.set_on_exit(&value.into_body(field)?),
            _ => return Err(unknown_field(&self.id, field)),
        }
        Ok(())
    }

    fn signature_params(&self, func: &str) -> Vec<(String, String)> {
        if func == "onUpdate" {
            self.update_args.clone()
        } else {
            Vec::new()
        }
    }
}
