/// 字段变更追踪模块
///
/// 该模块实现变更追踪系统，支持撤销/重做功能。
/// 记录编辑器对模型字段进行的每次修改，便于审计和回滚。

use std::time::Instant;

use crate::model::{EntityRef, FieldValue};

/// 保存状态 ID 的引用字段，重命名状态时需要同步改写其中的值
const REFERENCE_FIELDS: &[&str] = &["currentState", "nextState", "initialState"];

/// 字段变更追踪器
///
/// # 功能
/// - 记录所有字段修改操作
/// - 支持撤销/重做
/// - 随实体重命名/删除同步更新历史
///
/// # 实现细节
/// - 使用两个栈实现撤销/重做：undo_stack 和 redo_stack
/// - 所有变更按时间顺序存储在 changes 向量中
/// - 栈中存储的是索引而非实际数据，避免数据拷贝
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    /// 所有变更的完整记录
    changes: Vec<FieldChange>,
    /// 撤销栈（存储 changes 中的索引）
    undo_stack: Vec<usize>,
    /// 重做栈（存储 changes 中的索引）
    redo_stack: Vec<usize>,
}

/// 单个字段的变更
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// 被修改的实体
    pub entity: EntityRef,
    /// 字段名（如 "name", "editorPos" 等）
    pub field: String,
    /// 修改前的值
    pub old_value: FieldValue,
    /// 修改后的值
    pub new_value: FieldValue,
    /// 应用时间戳
    pub applied_at: Instant,
}

impl FieldChange {
    pub fn new(entity: EntityRef, field: &str, old_value: FieldValue, new_value: FieldValue) -> Self {
        Self {
            entity,
            field: field.to_string(),
            old_value,
            new_value,
            applied_at: Instant::now(),
        }
    }
}

impl ChangeLog {
    /// 创建新的变更追踪器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个变更
    ///
    /// # 行为
    /// - 将变更添加到 changes 列表
    /// - 将索引压入 undo_stack
    /// - 清空 redo_stack（因为新操作会使重做栈失效）
    pub fn add_change(&mut self, change: FieldChange) {
        let index = self.changes.len();
        self.changes.push(change);
        self.undo_stack.push(index);
        self.redo_stack.clear();
    }

    /// 撤销最后一次操作
    ///
    /// # 返回
    /// 返回被撤销的变更，没有可撤销的操作时返回 None
    pub fn undo(&mut self) -> Option<&FieldChange> {
        let index = self.undo_stack.pop()?;
        self.redo_stack.push(index);
        Some(&self.changes[index])
    }

    /// 重做最后一次撤销的操作
    pub fn redo(&mut self) -> Option<&FieldChange> {
        let index = self.redo_stack.pop()?;
        self.undo_stack.push(index);
        Some(&self.changes[index])
    }

    /// 获取当前有效变更的数量
    ///
    /// 注意：这是撤销栈的大小，不是总变更数
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// 按应用顺序返回当前有效的变更
    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.undo_stack.iter().map(|&idx| &self.changes[idx])
    }

    /// 获取所有变更（包括已撤销的）
    pub fn all_changes(&self) -> &[FieldChange] {
        &self.changes
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// 清空所有变更
    pub fn clear(&mut self) {
        self.changes.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// 获取特定实体的所有有效变更
    pub fn changes_for(&self, entity: &EntityRef) -> Vec<&FieldChange> {
        self.iter().filter(|change| &change.entity == entity).collect()
    }

    /// 实体重命名后改写历史
    ///
    /// 重命名状态时，引用字段中保存的旧 ID 也一并改写。
    pub fn rekey(&mut self, old: &EntityRef, new: &EntityRef) {
        let renamed_state = match (old, new) {
            (EntityRef::State(old_id), EntityRef::State(new_id)) => Some((old_id, new_id)),
            _ => None,
        };

        for change in &mut self.changes {
            if &change.entity == old {
                change.entity = new.clone();
            }
            let Some((old_id, new_id)) = renamed_state else {
                continue;
            };
            if !REFERENCE_FIELDS.contains(&change.field.as_str()) {
                continue;
            }
            for value in [&mut change.old_value, &mut change.new_value] {
                if matches!(value, FieldValue::Str(id) if id.as_str() == old_id.as_str()) {
                    *value = FieldValue::Str(new_id.clone());
                }
            }
        }
    }

    /// 丢弃某个实体的全部历史（实体被删除时调用）
    pub fn forget(&mut self, entity: &EntityRef) {
        let mut remap = vec![None; self.changes.len()];
        let mut kept = Vec::with_capacity(self.changes.len());
        for (index, change) in self.changes.drain(..).enumerate() {
            if &change.entity != entity {
                remap[index] = Some(kept.len());
                kept.push(change);
            }
        }
        self.changes = kept;

        let retain = |stack: &mut Vec<usize>| {
            *stack = stack.iter().filter_map(|&idx| remap[idx]).collect();
        };
        retain(&mut self.undo_stack);
        retain(&mut self.redo_stack);
    }

    /// 生成变更摘要
    pub fn summary(&self) -> String {
        format!(
            "变更总数: {}, 有效变更: {}, 可撤销: {}, 可重做: {}",
            self.changes.len(),
            self.undo_stack.len(),
            self.can_undo(),
            self.can_redo()
        )
    }
}

/// 截断过长的值，按字符边界
fn abbreviate(value: &FieldValue) -> String {
    let text = format!("{:?}", value);
    if text.chars().count() > 30 {
        format!("{}...", text.chars().take(30).collect::<String>())
    } else {
        text
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: {} -> {}",
            self.entity,
            self.field,
            abbreviate(&self.old_value),
            abbreviate(&self.new_value)
        )
    }
}
