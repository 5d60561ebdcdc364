/// 状态机编辑器模块
///
/// 提供有状态的编辑接口：模型修改与链接脚本的补丁同步进行，
/// 写盘需要显式调用 `save`。

use std::path::{Path, PathBuf};

use crate::generator::{generate_document, generate_state, generate_trigger};
use crate::importer::{self, load, ImportReport};
use crate::io::{RawScript, ScriptReader, ScriptWriter};
use crate::model::{Entity, EntityRef, FieldValue, Fsm, State, Trigger, Vec2};
use crate::patcher::{append_region, patch_field, remove_region, PatchStatus};
use crate::pattern::header_regex;
use crate::refactor::{rename_state, rename_state_in_text, rename_trigger, rename_trigger_in_text};
use crate::utils::{create_backup, SyncError};
use crate::{STATE_CLASS_TAG, TRIGGER_CLASS_TAG};
use super::delta::{ChangeLog, FieldChange};

/// 状态机编辑器 - 管理模型与链接脚本的同步
///
/// # 核心特性
/// - **同步补丁**: 链接脚本后，每次字段修改立即补丁到脚本缓冲区
/// - **可追踪**: 记录所有字段变更，支持撤销/重做
/// - **修改-保存分离**: 缓冲区只在 `save` 时写盘
///
/// # 使用示例
///
/// ```rust,ignore
/// use lua_fsm_sync::{EntityRef, FieldValue, FsmEditor};
/// use lua_fsm_sync::io::{DefaultScriptReader, DefaultScriptWriter};
///
/// let (mut editor, report) = FsmEditor::open(Path::new("enemy_ai.lua"), &DefaultScriptReader)?;
/// editor.set_field(&EntityRef::State("Idle".into()), "name", FieldValue::Str("Rest".into()))?;
/// editor.save(&DefaultScriptWriter, true)?;
/// ```
#[derive(Debug, Clone)]
pub struct FsmEditor {
    /// 底层状态机
    fsm: Fsm,
    /// 链接脚本的当前文本，未链接时为 None
    script: Option<String>,
    /// 变更追踪器
    modifications: ChangeLog,
    /// 自上次保存/加载以来是否有未写盘的修改
    dirty: bool,
}

impl FsmEditor {
    /// 创建未链接脚本的编辑器
    pub fn new(fsm: Fsm) -> Self {
        Self {
            fsm,
            script: None,
            modifications: ChangeLog::new(),
            dirty: false,
        }
    }

    /// 打开脚本文件：加载模型并链接
    ///
    /// # 参数
    /// * `path` - 脚本路径
    /// * `reader` - 脚本读取器
    ///
    /// # 返回
    /// 返回编辑器和导入报告；读取失败返回 `Io`，缺少状态机头部返回 `EntityNotFound`
    pub fn open(path: &Path, reader: &dyn ScriptReader) -> Result<(Self, ImportReport), SyncError> {
        let raw = reader.read(path)?;
        let (mut fsm, report) = load(&raw.text)?;
        fsm.set_linked_file(Some(path.to_path_buf()));

        tracing::info!(
            "已打开 {}: {} 个状态, {} 个触发器",
            path.display(),
            fsm.state_count(),
            fsm.trigger_count()
        );

        let editor = Self {
            fsm,
            script: Some(raw.text),
            modifications: ChangeLog::new(),
            dirty: false,
        };
        Ok((editor, report))
    }

    /// 将编辑器链接到脚本
    ///
    /// 文本为空时用模型生成完整文档；否则按字段以文件为准更新已有实体。
    pub fn link(&mut self, path: PathBuf, text: String) -> ImportReport {
        let report = if text.trim().is_empty() {
            self.script = Some(generate_document(&self.fsm));
            self.dirty = true;
            ImportReport::default()
        } else {
            let report = importer::update_from_file(&mut self.fsm, &text);
            self.script = Some(text);
            report
        };
        tracing::info!("已链接 {}", path.display());
        self.fsm.set_linked_file(Some(path));
        report
    }

    /// 解除脚本链接，模型保持不变
    pub fn unlink(&mut self) {
        self.script = None;
        self.fsm.set_linked_file(None);
    }

    /// 获取底层状态机
    pub fn fsm(&self) -> &Fsm {
        &self.fsm
    }

    /// 链接脚本的当前文本
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn is_linked(&self) -> bool {
        self.script.is_some()
    }

    // === 结构修改 ===

    /// 创建状态；已链接时追加区域并补丁 activate
    ///
    /// 脚本中已有同名区域（模型中的未知实体）时采用该区域，从中导入字段而不追加。
    pub fn create_state(&mut self, id: &str) -> Result<(), SyncError> {
        let state = self.fsm.create_state(id)?;
        if let Some(script) = self.script.as_mut() {
            if header_regex(STATE_CLASS_TAG, id).is_match(script) {
                let report = importer::import_state(script, state);
                tracing::info!("采用脚本中已有的状态区域 {}: {}", id, report.summary());
            } else {
                append_region(script, &generate_state(state));
            }
            patch_field(script, &self.fsm, "activate")?;
        }
        self.dirty = true;
        Ok(())
    }

    /// 创建触发器；已链接时追加区域，已有同名区域时采用该区域
    pub fn create_trigger(&mut self, id: &str) -> Result<(), SyncError> {
        let trigger = self.fsm.create_trigger(id)?;
        if let Some(script) = self.script.as_mut() {
            if header_regex(TRIGGER_CLASS_TAG, id).is_match(script) {
                let report = importer::import_trigger(script, trigger);
                tracing::info!("采用脚本中已有的触发器区域 {}: {}", id, report.summary());
            } else {
                append_region(script, &generate_trigger(trigger));
            }
            patch_field(script, &self.fsm, "activate")?;
        }
        self.dirty = true;
        Ok(())
    }

    /// 删除状态
    ///
    /// 指向它的触发器引用被清空并补丁，区域从脚本中删除，相关历史被丢弃。
    pub fn remove_state(&mut self, id: &str) -> Result<State, SyncError> {
        let affected: Vec<String> = self
            .fsm
            .triggers()
            .filter(|t| t.current_state_id() == Some(id) || t.next_state_id() == Some(id))
            .map(|t| t.id().to_string())
            .collect();

        let state = self
            .fsm
            .remove_state(id)
            .ok_or_else(|| SyncError::EntityNotFound(format!("state '{}'", id)))?;

        if let Some(script) = self.script.as_mut() {
            remove_region::<State>(script, id);
            for trigger_id in &affected {
                if let Some(trigger) = self.fsm.trigger(trigger_id) {
                    patch_field(script, trigger, "currentState")?;
                    patch_field(script, trigger, "nextState")?;
                }
            }
            patch_field(script, &self.fsm, "initialState")?;
            patch_field(script, &self.fsm, "activate")?;
        }

        self.modifications.forget(&EntityRef::State(id.to_string()));
        self.dirty = true;
        Ok(state)
    }

    /// 删除触发器
    pub fn remove_trigger(&mut self, id: &str) -> Result<Trigger, SyncError> {
        let trigger = self
            .fsm
            .remove_trigger(id)
            .ok_or_else(|| SyncError::EntityNotFound(format!("trigger '{}'", id)))?;

        if let Some(script) = self.script.as_mut() {
            remove_region::<Trigger>(script, id);
            patch_field(script, &self.fsm, "activate")?;
        }

        self.modifications.forget(&EntityRef::Trigger(id.to_string()));
        self.dirty = true;
        Ok(trigger)
    }

    // === 字段修改 ===

    /// 修改字段（记录变更，已链接时补丁脚本）
    ///
    /// # 参数
    /// * `entity` - 目标实体
    /// * `field` - 字段名
    /// * `value` - 新值
    ///
    /// # 返回
    /// 实体不存在返回 `EntityNotFound`，字段未知返回 `UnknownField`，
    /// 触发器引用未知状态返回 `DanglingReference`；失败时模型和脚本都不变
    pub fn set_field(
        &mut self,
        entity: &EntityRef,
        field: &str,
        value: FieldValue,
    ) -> Result<(), SyncError> {
        let old_value = read_field(&self.fsm, entity, field)?;
        self.apply(entity, field, value)?;
        let new_value = read_field(&self.fsm, entity, field)?;

        if old_value != new_value {
            self.modifications
                .add_change(FieldChange::new(entity.clone(), field, old_value, new_value));
            self.dirty = true;
        }
        Ok(())
    }

    /// 修改实体在画布上的位置
    pub fn set_position(&mut self, entity: &EntityRef, position: Vec2) -> Result<(), SyncError> {
        self.set_field(
            entity,
            "editorPos",
            FieldValue::Numbers(vec![position.x, position.y]),
        )
    }

    /// 设置初始状态，None 表示清空
    pub fn set_initial_state(&mut self, state_id: Option<&str>) -> Result<(), SyncError> {
        self.set_field(&EntityRef::Fsm, "initialState", FieldValue::from_reference(state_id))
    }

    /// 连接触发器的当前状态和目标状态（两个字段各记录一条变更）
    pub fn link_trigger(
        &mut self,
        trigger_id: &str,
        current: Option<&str>,
        next: Option<&str>,
    ) -> Result<(), SyncError> {
        let entity = EntityRef::Trigger(trigger_id.to_string());
        for (field, target) in [("currentState", current), ("nextState", next)] {
            if let Some(target) = target {
                self.check_state_reference(trigger_id, field, target)?;
            }
        }
        self.set_field(&entity, "currentState", FieldValue::from_reference(current))?;
        self.set_field(&entity, "nextState", FieldValue::from_reference(next))
    }

    /// 重命名实体（模型重命名 + 脚本级联 + 历史改写）
    ///
    /// 状态机自身的 ID 不可修改，返回 `ReadOnlyField`。
    pub fn rename(&mut self, entity: &EntityRef, new_id: &str) -> Result<(), SyncError> {
        let renamed = match entity {
            EntityRef::Fsm => {
                return Err(SyncError::ReadOnlyField {
                    entity: self.fsm.id().to_string(),
                    field: "id".to_string(),
                })
            }
            EntityRef::State(old_id) => {
                rename_state(&mut self.fsm, old_id, new_id)?;
                if let Some(script) = self.script.as_mut() {
                    rename_state_in_text(script, &self.fsm, old_id, new_id)?;
                }
                EntityRef::State(new_id.to_string())
            }
            EntityRef::Trigger(old_id) => {
                rename_trigger(&mut self.fsm, old_id, new_id)?;
                if let Some(script) = self.script.as_mut() {
                    rename_trigger_in_text(script, &self.fsm, old_id, new_id)?;
                }
                EntityRef::Trigger(new_id.to_string())
            }
        };

        if &renamed != entity {
            self.modifications.rekey(entity, &renamed);
            self.dirty = true;
        }
        Ok(())
    }

    // === 撤销/重做 ===

    /// 撤销最后一次字段修改
    ///
    /// # 返回
    /// 没有可撤销的操作时返回 Ok(false)；旧值已无法应用时返回错误，历史保持不变
    pub fn undo(&mut self) -> Result<bool, SyncError> {
        let Some(change) = self.modifications.undo().cloned() else {
            return Ok(false);
        };
        if let Err(err) = self.apply(&change.entity, &change.field, change.old_value) {
            self.modifications.redo();
            return Err(err);
        }
        self.dirty = true;
        Ok(true)
    }

    /// 重做上一次撤销的修改
    pub fn redo(&mut self) -> Result<bool, SyncError> {
        let Some(change) = self.modifications.redo().cloned() else {
            return Ok(false);
        };
        if let Err(err) = self.apply(&change.entity, &change.field, change.new_value) {
            self.modifications.undo();
            return Err(err);
        }
        self.dirty = true;
        Ok(true)
    }

    // === 脚本同步 ===

    /// 用模型重新生成整个脚本，丢弃手写内容
    pub fn regenerate(&mut self) -> &str {
        self.dirty = true;
        self.script.insert(generate_document(&self.fsm))
    }

    /// 重新读取链接文件，按字段以文件为准更新模型
    ///
    /// 缓冲区被文件内容替换，变更历史被清空。
    pub fn update_from_file(&mut self, reader: &dyn ScriptReader) -> Result<ImportReport, SyncError> {
        let path = self.linked_path()?;
        let raw = reader.read(&path)?;
        let report = importer::update_from_file(&mut self.fsm, &raw.text);

        tracing::info!("已从 {} 更新: {}", path.display(), report.summary());

        self.script = Some(raw.text);
        self.modifications.clear();
        self.dirty = false;
        Ok(report)
    }

    /// 保存脚本到链接路径（需要显式调用）
    ///
    /// # 参数
    /// * `writer` - 脚本写入器
    /// * `backup` - 写入前是否为已有文件创建时间戳备份
    ///
    /// # 返回
    /// 返回备份路径（如果创建了备份）；未链接文件返回 `NotLinked`
    pub fn save(&mut self, writer: &dyn ScriptWriter, backup: bool) -> Result<Option<PathBuf>, SyncError> {
        let path = self.linked_path()?;
        let text = match &self.script {
            Some(text) => text.clone(),
            None => generate_document(&self.fsm),
        };

        let backup_path = if backup && path.exists() {
            Some(create_backup(&path)?)
        } else {
            None
        };

        writer.write(&RawScript { text: text.clone() }, &path)?;
        tracing::info!("已保存 {} ({} 字节)", path.display(), text.len());

        self.script = Some(text);
        self.dirty = false;
        Ok(backup_path)
    }

    // === 状态查询 ===

    /// 自上次加载/保存以来是否有修改
    pub fn is_modified(&self) -> bool {
        self.dirty
    }

    /// 获取有效的字段修改数量
    pub fn modified_count(&self) -> usize {
        self.modifications.len()
    }

    /// 获取变更追踪器的引用
    pub fn changes(&self) -> &ChangeLog {
        &self.modifications
    }

    /// 生成编辑摘要
    pub fn summary(&self) -> String {
        format!(
            "状态机: {}, 链接: {}, 修改状态: {}, {}",
            self.fsm.id(),
            self.fsm
                .linked_file()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "无".to_string()),
            if self.is_modified() { "已修改" } else { "未修改" },
            self.modifications.summary()
        )
    }

    // === 内部 ===

    fn linked_path(&self) -> Result<PathBuf, SyncError> {
        self.fsm
            .linked_file()
            .map(Path::to_path_buf)
            .ok_or(SyncError::NotLinked)
    }

    fn check_state_reference(&self, entity: &str, field: &str, target: &str) -> Result<(), SyncError> {
        if target.is_empty() || self.fsm.state(target).is_some() {
            Ok(())
        } else {
            Err(SyncError::DanglingReference {
                entity: entity.to_string(),
                field: field.to_string(),
                target: target.to_string(),
            })
        }
    }

    /// 写入模型并补丁脚本，不记录变更
    fn apply(&mut self, entity: &EntityRef, field: &str, value: FieldValue) -> Result<(), SyncError> {
        match entity {
            EntityRef::Fsm => self.fsm.set_field(field, value)?,
            EntityRef::State(id) => self
                .fsm
                .state_mut(id)
                .ok_or_else(|| SyncError::EntityNotFound(format!("state '{}'", id)))?
                .set_field(field, value)?,
            EntityRef::Trigger(id) => {
                if matches!(field, "currentState" | "nextState") {
                    if let FieldValue::Str(target) = &value {
                        self.check_state_reference(id, field, target)?;
                    }
                }
                self.fsm
                    .trigger_mut(id)
                    .ok_or_else(|| SyncError::EntityNotFound(format!("trigger '{}'", id)))?
                    .set_field(field, value)?
            }
        }

        if let Some(script) = self.script.as_mut() {
            mirror_field(script, &self.fsm, entity, field)?;
            if matches!(entity, EntityRef::Trigger(_)) && field == "currentState" {
                patch_field(script, &self.fsm, "activate")?;
            }
        }
        Ok(())
    }
}

/// 读取实体字段的当前值
fn read_field(fsm: &Fsm, entity: &EntityRef, field: &str) -> Result<FieldValue, SyncError> {
    let value = match entity {
        EntityRef::Fsm => fsm.get_field(field),
        EntityRef::State(id) => fsm
            .state(id)
            .ok_or_else(|| SyncError::EntityNotFound(format!("state '{}'", id)))?
            .get_field(field),
        EntityRef::Trigger(id) => fsm
            .trigger(id)
            .ok_or_else(|| SyncError::EntityNotFound(format!("trigger '{}'", id)))?
            .get_field(field),
    };
    value.ok_or_else(|| SyncError::UnknownField {
        entity: entity.to_string(),
        field: field.to_string(),
    })
}

/// 将模型中的字段值补丁到脚本
fn mirror_field(
    script: &mut String,
    fsm: &Fsm,
    entity: &EntityRef,
    field: &str,
) -> Result<PatchStatus, SyncError> {
    match entity {
        EntityRef::Fsm => patch_field(script, fsm, field),
        EntityRef::State(id) => match fsm.state(id) {
            Some(state) => patch_field(script, state, field),
            None => Ok(PatchStatus::NotPresent),
        },
        EntityRef::Trigger(id) => match fsm.trigger(id) {
            Some(trigger) => patch_field(script, trigger, field),
            None => Ok(PatchStatus::NotPresent),
        },
    }
}
