/// 标识符重命名
///
/// 模型侧的重命名是原子的：所有校验都在任何修改之前完成。
/// 文本侧的级联在模型重命名之后执行，依次补丁所有受影响的字段。
use crate::model::Fsm;
use crate::patcher::{patch_field, rekey_entity};
use crate::utils::SyncError;

/// 重命名状态
///
/// 改写映射键、所有触发器的 `currentState` / `nextState` 引用以及初始状态。
///
/// # 返回
/// 旧 ID 不存在返回 `EntityNotFound`；新 ID 非法或与任何状态/触发器冲突时
/// 返回错误且模型完全不变
pub fn rename_state(fsm: &mut Fsm, old_id: &str, new_id: &str) -> Result<(), SyncError> {
    if !fsm.states.contains_key(old_id) {
        return Err(SyncError::EntityNotFound(format!("state '{}'", old_id)));
    }
    if old_id == new_id {
        return Ok(());
    }
    fsm.check_new_id(new_id)?;

    let Some(mut state) = fsm.states.remove(old_id) else {
        return Err(SyncError::EntityNotFound(format!("state '{}'", old_id)));
    };
    state.id = new_id.to_string();
    fsm.states.insert(new_id.to_string(), state);

    for trigger in fsm.triggers.values_mut() {
        if trigger.current_state_id.as_deref() == Some(old_id) {
            trigger.current_state_id = Some(new_id.to_string());
        }
        if trigger.next_state_id.as_deref() == Some(old_id) {
            trigger.next_state_id = Some(new_id.to_string());
        }
    }
    if fsm.initial_state_id.as_deref() == Some(old_id) {
        fsm.initial_state_id = Some(new_id.to_string());
    }

    tracing::debug!("状态重命名: {} -> {}", old_id, new_id);
    Ok(())
}

/// 重命名触发器
///
/// 状态只通过派生集合引用触发器，无需反向扫描。
pub fn rename_trigger(fsm: &mut Fsm, old_id: &str, new_id: &str) -> Result<(), SyncError> {
    if !fsm.triggers.contains_key(old_id) {
        return Err(SyncError::EntityNotFound(format!("trigger '{}'", old_id)));
    }
    if old_id == new_id {
        return Ok(());
    }
    fsm.check_new_id(new_id)?;

    let Some(mut trigger) = fsm.triggers.remove(old_id) else {
        return Err(SyncError::EntityNotFound(format!("trigger '{}'", old_id)));
    };
    trigger.id = new_id.to_string();
    fsm.triggers.insert(new_id.to_string(), trigger);

    tracing::debug!("触发器重命名: {} -> {}", old_id, new_id);
    Ok(())
}

/// 将状态重命名级联到文件文本（模型必须已完成重命名）
///
/// # 返回
/// 返回改写/补丁的位置数
pub fn rename_state_in_text(
    text: &mut String,
    fsm: &Fsm,
    old_id: &str,
    new_id: &str,
) -> Result<usize, SyncError> {
    let state = fsm
        .state(new_id)
        .ok_or_else(|| SyncError::EntityNotFound(format!("state '{}'", new_id)))?;
    let mut count = rekey_entity(text, old_id, state);

    for trigger in fsm.triggers() {
        if trigger.current_state_id() == Some(new_id)
            && patch_field(text, trigger, "currentState")?.is_present()
        {
            count += 1;
        }
        if trigger.next_state_id() == Some(new_id)
            && patch_field(text, trigger, "nextState")?.is_present()
        {
            count += 1;
        }
    }

    count += patch_fsm_references(text, fsm)?;
    Ok(count)
}

/// 将触发器重命名级联到文件文本（模型必须已完成重命名）
pub fn rename_trigger_in_text(
    text: &mut String,
    fsm: &Fsm,
    old_id: &str,
    new_id: &str,
) -> Result<usize, SyncError> {
    let trigger = fsm
        .trigger(new_id)
        .ok_or_else(|| SyncError::EntityNotFound(format!("trigger '{}'", new_id)))?;
    let mut count = rekey_entity(text, old_id, trigger);
    count += patch_fsm_references(text, fsm)?;
    Ok(count)
}

/// 补丁状态机中引用实体 ID 的字段
fn patch_fsm_references(text: &mut String, fsm: &Fsm) -> Result<usize, SyncError> {
    let mut count = 0;
    for field in ["initialState", "activate"] {
        if patch_field(text, fsm, field)?.is_present() {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::generate_document;
    use crate::importer::load;
    use crate::model::Entity;

    fn sample() -> Fsm {
        let mut fsm = Fsm::new("Main").unwrap();
        fsm.create_state("A").unwrap();
        fsm.create_state("Other").unwrap();
        fsm.create_trigger("T").unwrap();
        fsm.link_trigger("T", Some("Other"), Some("A")).unwrap();
        fsm.set_initial_state(Some("A")).unwrap();
        fsm
    }

    #[test]
    fn test_rename_state_cascades() {
        let mut fsm = sample();
        let before = fsm.state("A").unwrap().clone();

        rename_state(&mut fsm, "A", "B").unwrap();

        assert!(fsm.state("A").is_none());
        let renamed = fsm.state("B").unwrap();
        assert_eq!(renamed.id(), "B");
        assert_eq!(renamed.name, before.name);
        assert_eq!(fsm.trigger("T").unwrap().next_state_id(), Some("B"));
        assert_eq!(fsm.initial_state_id(), Some("B"));
    }

    #[test]
    fn test_rename_collision_is_atomic() {
        let mut fsm = sample();
        let before = fsm.clone();

        assert!(matches!(
            rename_state(&mut fsm, "A", "Other"),
            Err(SyncError::IdCollision(_))
        ));
        assert!(matches!(
            rename_state(&mut fsm, "A", "T"),
            Err(SyncError::IdCollision(_))
        ));
        assert!(matches!(
            rename_trigger(&mut fsm, "T", "A"),
            Err(SyncError::IdCollision(_))
        ));
        assert!(matches!(
            rename_state(&mut fsm, "A", "has space"),
            Err(SyncError::InvalidId(_))
        ));
        assert_eq!(fsm, before);
    }

    #[test]
    fn test_rename_unknown_entity() {
        let mut fsm = sample();
        assert!(matches!(
            rename_state(&mut fsm, "Nope", "B"),
            Err(SyncError::EntityNotFound(_))
        ));
    }

    #[test]
    fn test_rename_trigger_keeps_derived_view() {
        let mut fsm = sample();
        rename_trigger(&mut fsm, "T", "T2").unwrap();

        let ids: Vec<_> = fsm.triggers_of("Other").map(|t| t.id()).collect();
        assert_eq!(ids, vec!["T2"]);
        assert!(fsm.trigger("T").is_none());
    }

    #[test]
    fn test_rename_state_in_text() {
        let mut fsm = sample();
        let mut text = generate_document(&fsm);

        rename_state(&mut fsm, "A", "B").unwrap();
        let count = rename_state_in_text(&mut text, &fsm, "A", "B").unwrap();
        assert!(count > 0);

        assert!(text.contains("---@State B\nB = {}\n"));
        assert!(text.contains("T.nextState = \"B\"\n"));
        assert!(text.contains("Main.initialState = \"B\"\n"));
        assert!(text.contains("self:addState(B)\n"));
        assert!(!text.contains("---@State A"));

        // 改写后的文本重新加载得到相同的关系
        let (reloaded, report) = load(&text).unwrap();
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(reloaded.next_state_of("T").unwrap().id(), "B");
        assert_eq!(reloaded.initial_state_id(), Some("B"));
    }

    #[test]
    fn test_rename_trigger_in_text() {
        let mut fsm = sample();
        let mut text = generate_document(&fsm);

        rename_trigger(&mut fsm, "T", "Go").unwrap();
        rename_trigger_in_text(&mut text, &fsm, "T", "Go").unwrap();

        assert!(text.contains("---@Trigger Go\nGo = {}\n"));
        assert!(text.contains("function Go:condition()\n"));
        assert!(text.contains("Other:addTrigger(Go)\n"));
        assert!(text.contains("RegisterTrigger(Go)\n"));
        assert!(!text.contains("T."));
    }
}
