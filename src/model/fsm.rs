use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::field::FieldValue;
use super::{unknown_field, Entity, State, Trigger};
use crate::pattern::{FieldShape, FieldSpec};
use crate::utils::{validate_id, SyncError};
use crate::FSM_CLASS_TAG;

/// 状态机
///
/// # 所有权与关系
/// - `Fsm` 独占所有状态和触发器，按 ID 存入有序映射
/// - 初始状态与触发器的状态引用都是弱引用，只保存 ID
/// - 状态 → 触发器的集合不单独存储，由 `triggers_of` 实时派生
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fsm {
    id: String,
    /// 显示名称
    pub name: String,
    /// 描述
    pub description: String,
    pub(crate) initial_state_id: Option<String>,
    /// 编辑器画布缩放
    pub editor_zoom: f64,
    pub(crate) states: BTreeMap<String, State>,
    pub(crate) triggers: BTreeMap<String, Trigger>,
    linked_file: Option<PathBuf>,
}

impl Fsm {
    /// 字段表（同时决定生成顺序）
    pub const FIELD_TABLE: &'static [FieldSpec] = &[
        FieldSpec::new("name", FieldShape::Str),
        FieldSpec::new("description", FieldShape::Str),
        FieldSpec::new("initialState", FieldShape::Str),
        FieldSpec::new("editorZoom", FieldShape::Float),
        FieldSpec::derived("activate", FieldShape::Function { func: "activate" }),
    ];

    /// 创建空状态机
    pub fn new(id: &str) -> Result<Self, SyncError> {
        validate_id(id)?;
        Ok(Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            initial_state_id: None,
            editor_zoom: 1.0,
            states: BTreeMap::new(),
            triggers: BTreeMap::new(),
            linked_file: None,
        })
    }

    // === 实体访问 ===

    pub fn state(&self, id: &str) -> Option<&State> {
        self.states.get(id)
    }

    pub fn state_mut(&mut self, id: &str) -> Option<&mut State> {
        self.states.get_mut(id)
    }

    pub fn trigger(&self, id: &str) -> Option<&Trigger> {
        self.triggers.get(id)
    }

    pub fn trigger_mut(&mut self, id: &str) -> Option<&mut Trigger> {
        self.triggers.get_mut(id)
    }

    /// 按 ID 顺序遍历所有状态
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    /// 按 ID 顺序遍历所有触发器
    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.triggers.values()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.len()
    }

    /// ID 是否已被任何状态或触发器占用
    pub fn is_id_in_use(&self, id: &str) -> bool {
        self.states.contains_key(id) || self.triggers.contains_key(id)
    }

    /// 新 ID 校验：合法且不与任何状态/触发器冲突
    pub(crate) fn check_new_id(&self, id: &str) -> Result<(), SyncError> {
        validate_id(id)?;
        if self.is_id_in_use(id) || id == self.id {
            return Err(SyncError::IdCollision(id.to_string()));
        }
        Ok(())
    }

    // === 创建与删除 ===

    /// 创建状态
    ///
    /// # 返回
    /// ID 非法返回 `InvalidId`，与任何状态或触发器重名返回 `IdCollision`
    pub fn create_state(&mut self, id: &str) -> Result<&mut State, SyncError> {
        self.check_new_id(id)?;
        Ok(self
            .states
            .entry(id.to_string())
            .or_insert_with(|| State::new(id)))
    }

    /// 创建触发器
    pub fn create_trigger(&mut self, id: &str) -> Result<&mut Trigger, SyncError> {
        self.check_new_id(id)?;
        Ok(self
            .triggers
            .entry(id.to_string())
            .or_insert_with(|| Trigger::new(id)))
    }

    /// 删除状态
    ///
    /// 不级联删除：指向该状态的触发器引用被清空，初始状态随之清空。
    pub fn remove_state(&mut self, id: &str) -> Option<State> {
        let state = self.states.remove(id)?;

        for trigger in self.triggers.values_mut() {
            if trigger.current_state_id.as_deref() == Some(id) {
                trigger.current_state_id = None;
            }
            if trigger.next_state_id.as_deref() == Some(id) {
                trigger.next_state_id = None;
            }
        }
        if self.initial_state_id.as_deref() == Some(id) {
            self.initial_state_id = None;
        }

        Some(state)
    }

    /// 删除触发器（状态侧的集合是派生的，自动失效）
    pub fn remove_trigger(&mut self, id: &str) -> Option<Trigger> {
        self.triggers.remove(id)
    }

    // === 关系 ===

    pub fn initial_state_id(&self) -> Option<&str> {
        self.initial_state_id.as_deref()
    }

    /// 初始状态（引用失效时返回 None）
    pub fn initial_state(&self) -> Option<&State> {
        self.initial_state_id
            .as_deref()
            .and_then(|id| self.states.get(id))
    }

    /// 设置初始状态，必须指向已有状态
    pub fn set_initial_state(&mut self, state_id: Option<&str>) -> Result<(), SyncError> {
        match state_id.filter(|id| !id.is_empty()) {
            None => self.initial_state_id = None,
            Some(id) => {
                if !self.states.contains_key(id) {
                    return Err(SyncError::DanglingReference {
                        entity: self.id.clone(),
                        field: "initialState".to_string(),
                        target: id.to_string(),
                    });
                }
                self.initial_state_id = Some(id.to_string());
            }
        }
        Ok(())
    }

    /// 连接触发器的当前状态和目标状态
    ///
    /// 两个状态都必须存在；任一校验失败则不做任何修改。
    pub fn link_trigger(
        &mut self,
        trigger_id: &str,
        current: Option<&str>,
        next: Option<&str>,
    ) -> Result<(), SyncError> {
        for (field, target) in [("currentState", current), ("nextState", next)] {
            if let Some(target) = target.filter(|t| !t.is_empty()) {
                if !self.states.contains_key(target) {
                    return Err(SyncError::DanglingReference {
                        entity: trigger_id.to_string(),
                        field: field.to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }

        let trigger = self
            .triggers
            .get_mut(trigger_id)
            .ok_or_else(|| SyncError::EntityNotFound(format!("trigger '{}'", trigger_id)))?;
        trigger.set_current_state_id(current);
        trigger.set_next_state_id(next);
        Ok(())
    }

    /// 某状态的触发器集合（派生视图，按 ID 排序）
    pub fn triggers_of<'a>(&'a self, state_id: &'a str) -> impl Iterator<Item = &'a Trigger> + 'a {
        self.triggers
            .values()
            .filter(move |t| t.current_state_id.as_deref() == Some(state_id))
    }

    /// 解析触发器的当前状态，失效引用返回 None
    pub fn current_state_of(&self, trigger_id: &str) -> Option<&State> {
        let trigger = self.triggers.get(trigger_id)?;
        self.states.get(trigger.current_state_id.as_deref()?)
    }

    /// 解析触发器的目标状态，失效引用返回 None
    pub fn next_state_of(&self, trigger_id: &str) -> Option<&State> {
        let trigger = self.triggers.get(trigger_id)?;
        self.states.get(trigger.next_state_id.as_deref()?)
    }

    /// 列出所有失效引用
    pub fn dangling_references(&self) -> Vec<SyncError> {
        let mut issues = Vec::new();
        for trigger in self.triggers.values() {
            for (field, target) in [
                ("currentState", trigger.current_state_id()),
                ("nextState", trigger.next_state_id()),
            ] {
                if let Some(target) = target {
                    if !self.states.contains_key(target) {
                        issues.push(SyncError::DanglingReference {
                            entity: trigger.id.clone(),
                            field: field.to_string(),
                            target: target.to_string(),
                        });
                    }
                }
            }
        }
        issues
    }

    // === 文件链接 ===

    pub fn linked_file(&self) -> Option<&Path> {
        self.linked_file.as_deref()
    }

    pub fn set_linked_file(&mut self, path: Option<PathBuf>) {
        self.linked_file = path;
    }

    /// 是否链接到脚本文件
    pub fn is_file_backed(&self) -> bool {
        self.linked_file.is_some()
    }

    /// 派生的 activate 函数体：注册每个状态及其触发器
    pub fn activate_body(&self) -> String {
        let mut body = String::new();
        for state in self.states.values() {
            body.push_str(&format!("    self:addState({})\n", state.id));
            for trigger in self.triggers_of(&state.id) {
                body.push_str(&format!("    {}:addTrigger({})\n", state.id, trigger.id));
            }
        }
        body
    }
}

impl Entity for Fsm {
    const CLASS_TAG: &'static str = FSM_CLASS_TAG;
    const REGISTER_FN: &'static str = "RegisterFsm";
    const FIELDS: &'static [FieldSpec] = Fsm::FIELD_TABLE;

    fn id(&self) -> &str {
        &self.id
    }

    fn get_field(&self, field: &str) -> Option<FieldValue> {
        let value = match field {
            "name" => FieldValue::Str(self.name.clone()),
            "description" => FieldValue::Str(self.description.clone()),
            "initialState" => FieldValue::from_reference(self.initial_state_id()),
            "editorZoom" => FieldValue::Float(self.editor_zoom),
            "activate" => FieldValue::Body(self.activate_body()),
            _ => return None,
        };
        Some(value)
    }

    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), SyncError> {
        match field {
            "name" => self.name = value.into_str(field)?,
            "description" => self.description = value.into_str(field)?,
            "initialState" => {
                let id = value.into_str(field)?;
                self.set_initial_state(Some(&id))?;
            }
            "editorZoom" => self.editor_zoom = value.into_float(field)?,
            "activate" => {
                return Err(SyncError::ReadOnlyField {
                    entity: self.id.clone(),
                    field: field.to_string(),
                })
            }
            _ => return Err(unknown_field(&self.id, field)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fsm() -> Fsm {
        let mut fsm = Fsm::new("Main").unwrap();
        fsm.create_state("Idle").unwrap();
        fsm.create_state("Run").unwrap();
        fsm.create_trigger("ToRun").unwrap();
        fsm.create_trigger("ToIdle").unwrap();
        fsm.link_trigger("ToRun", Some("Idle"), Some("Run")).unwrap();
        fsm.link_trigger("ToIdle", Some("Run"), Some("Idle")).unwrap();
        fsm.set_initial_state(Some("Idle")).unwrap();
        fsm
    }

    #[test]
    fn test_create_rejects_collisions() {
        let mut fsm = sample_fsm();
        assert!(matches!(fsm.create_state("Idle"), Err(SyncError::IdCollision(_))));
        // 跨类型冲突同样拒绝
        assert!(matches!(fsm.create_state("ToRun"), Err(SyncError::IdCollision(_))));
        assert!(matches!(fsm.create_trigger("Run"), Err(SyncError::IdCollision(_))));
        assert!(matches!(fsm.create_state("bad id"), Err(SyncError::InvalidId(_))));
        assert_eq!(fsm.state_count(), 2);
    }

    #[test]
    fn test_derived_trigger_collection() {
        let fsm = sample_fsm();
        let ids: Vec<_> = fsm.triggers_of("Idle").map(|t| t.id()).collect();
        assert_eq!(ids, vec!["ToRun"]);
        assert_eq!(fsm.current_state_of("ToRun").unwrap().id(), "Idle");
        assert_eq!(fsm.next_state_of("ToRun").unwrap().id(), "Run");
    }

    #[test]
    fn test_remove_state_unlinks_without_cascade() {
        let mut fsm = sample_fsm();
        fsm.remove_state("Idle").unwrap();

        assert_eq!(fsm.trigger_count(), 2);
        assert_eq!(fsm.trigger("ToRun").unwrap().current_state_id(), None);
        assert_eq!(fsm.trigger("ToIdle").unwrap().next_state_id(), None);
        assert_eq!(fsm.initial_state_id(), None);
    }

    #[test]
    fn test_remove_trigger_updates_derived_view() {
        let mut fsm = sample_fsm();
        fsm.remove_trigger("ToRun").unwrap();
        assert_eq!(fsm.triggers_of("Idle").count(), 0);
    }

    #[test]
    fn test_initial_state_must_exist() {
        let mut fsm = sample_fsm();
        assert!(matches!(
            fsm.set_initial_state(Some("Nowhere")),
            Err(SyncError::DanglingReference { .. })
        ));
        assert_eq!(fsm.initial_state_id(), Some("Idle"));

        fsm.set_initial_state(None).unwrap();
        assert!(fsm.initial_state().is_none());
    }

    #[test]
    fn test_link_trigger_is_atomic() {
        let mut fsm = sample_fsm();
        let result = fsm.link_trigger("ToRun", Some("Run"), Some("Nowhere"));
        assert!(result.is_err());
        assert_eq!(fsm.trigger("ToRun").unwrap().current_state_id(), Some("Idle"));
    }

    #[test]
    fn test_dangling_reference_resolves_to_none() {
        let mut fsm = sample_fsm();
        fsm.trigger_mut("ToRun")
            .unwrap()
            .set_next_state_id(Some("Ghost"));

        assert!(fsm.next_state_of("ToRun").is_none());
        let issues = fsm.dangling_references();
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0],
            SyncError::DanglingReference { target, .. } if target == "Ghost"
        ));
    }

    #[test]
    fn test_activate_body_is_derived() {
        let fsm = sample_fsm();
        assert_eq!(
            fsm.activate_body(),
            "    self:addState(Idle)\n    Idle:addTrigger(ToRun)\n    self:addState(Run)\n    Run:addTrigger(ToIdle)\n"
        );
    }

    #[test]
    fn test_activate_is_read_only() {
        let mut fsm = sample_fsm();
        let result = fsm.set_field("activate", FieldValue::Body(String::new()));
        assert!(matches!(result, Err(SyncError::ReadOnlyField { .. })));
    }
}
