//! 文件链接编辑流程集成测试
//!
//! 打开 → 编辑 → 保存 → 重新加载，以及会话导出/导入。

use std::path::Path;

use lua_fsm_sync::io::{
    DefaultScriptReader, DefaultScriptWriter, JsonSessionReader, JsonSessionWriter,
    SessionReader, SessionWriter,
};
use lua_fsm_sync::{
    generate_document, load, EntityRef, FieldValue, Fsm, FsmEditor, SyncError, Vec2,
};
use tempfile::TempDir;

const HAND_WRITTEN: &str = "\
-- 手写的工具函数，模型中没有对应字段
local function clamp(v, lo, hi)
    if v < lo then return lo end
    if v > hi then return hi end
    return v
end
";

fn write_fixture(dir: &Path) -> std::path::PathBuf {
    let mut fsm = Fsm::new("Guard").unwrap();
    let idle = fsm.create_state("Idle").unwrap();
    idle.set_on_update("    clamp(self.alert, 0, 1)\n");
    fsm.create_state("Alert").unwrap();
    fsm.create_trigger("Noise").unwrap();
    fsm.link_trigger("Noise", Some("Idle"), Some("Alert")).unwrap();
    fsm.set_initial_state(Some("Idle")).unwrap();

    let path = dir.join("scripts").join("guard.lua");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, format!("{}\n{}", HAND_WRITTEN, generate_document(&fsm))).unwrap();
    path
}

#[test]
fn test_open_edit_save_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_fixture(temp_dir.path());

    let (mut editor, report) = FsmEditor::open(&path, &DefaultScriptReader).unwrap();
    assert!(report.is_clean(), "{:?}", report.issues);
    assert_eq!(editor.fsm().state_count(), 2);

    let idle = EntityRef::State("Idle".to_string());
    editor.set_position(&idle, Vec2::new(64.0, 32.5)).unwrap();
    editor
        .set_field(&idle, "events", FieldValue::List(vec!["noise".to_string()]))
        .unwrap();
    editor.create_trigger("Calm").unwrap();
    editor.link_trigger("Calm", Some("Alert"), Some("Idle")).unwrap();
    editor.rename(&EntityRef::State("Alert".to_string()), "Search").unwrap();

    assert!(editor.is_modified());
    editor.save(&DefaultScriptWriter, false).unwrap();
    assert!(!editor.is_modified());

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.starts_with(HAND_WRITTEN));
    assert!(saved.contains("Idle.editorPos = {64, 32.5}"));
    assert!(saved.contains("Noise.nextState = \"Search\""));
    assert!(saved.contains("    Search:addTrigger(Calm)\n"));
    assert!(saved.contains("---@State Search\n"));
    assert!(!saved.contains("---@State Alert"));
    assert!(!saved.contains("Alert:"));

    let (reloaded, report) = load(&saved).unwrap();
    assert!(report.is_clean(), "{:?}", report.issues);
    assert_eq!(reloaded.state("Idle").unwrap().position, Vec2::new(64.0, 32.5));
    assert_eq!(reloaded.trigger("Calm").unwrap().current_state_id(), Some("Search"));

    let mut expected = editor.fsm().clone();
    expected.set_linked_file(None);
    assert_eq!(reloaded, expected);
}

#[test]
fn test_external_edit_then_update_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_fixture(temp_dir.path());
    let (mut editor, _) = FsmEditor::open(&path, &DefaultScriptReader).unwrap();

    // 外部编辑器修改了函数体并新增了一个状态区域
    let text = std::fs::read_to_string(&path).unwrap().replace(
        "    clamp(self.alert, 0, 1)\n",
        "    clamp(self.alert, 0, 2)\n    log(\"tick\")\n",
    );
    let text = format!("{}\n---@State Sleep\nSleep = {{}}\nRegisterState(Sleep)\n", text);
    std::fs::write(&path, text).unwrap();

    let report = editor.update_from_file(&DefaultScriptReader).unwrap();

    assert_eq!(
        editor.fsm().state("Idle").unwrap().on_update(),
        "    clamp(self.alert, 0, 2)\n    log(\"tick\")\n"
    );
    assert_eq!(report.unknown_entities, vec!["State Sleep".to_string()]);
    assert!(editor.fsm().state("Sleep").is_none());
}

#[test]
fn test_save_with_backup() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_fixture(temp_dir.path());
    let original = std::fs::read_to_string(&path).unwrap();

    let (mut editor, _) = FsmEditor::open(&path, &DefaultScriptReader).unwrap();
    editor.set_initial_state(Some("Alert")).unwrap();
    let backup = editor.save(&DefaultScriptWriter, true).unwrap().unwrap();

    assert_eq!(std::fs::read_to_string(&backup).unwrap(), original);
    assert!(std::fs::read_to_string(&path)
        .unwrap()
        .contains("Guard.initialState = \"Alert\""));
}

#[test]
fn test_open_missing_file() {
    let result = FsmEditor::open(Path::new("no/such/guard.lua"), &DefaultScriptReader);
    assert!(matches!(result, Err(SyncError::Io(_))));
}

#[test]
fn test_session_export_and_relink() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_fixture(temp_dir.path());
    let session_path = temp_dir.path().join("guard.session.json");

    let (mut editor, _) = FsmEditor::open(&path, &DefaultScriptReader).unwrap();
    editor
        .set_position(&EntityRef::Trigger("Noise".to_string()), Vec2::new(10.0, 20.0))
        .unwrap();
    editor.save(&DefaultScriptWriter, false).unwrap();
    JsonSessionWriter.write_session(editor.fsm(), &session_path).unwrap();

    let fsm = JsonSessionReader.read_session(&session_path).unwrap();
    assert_eq!(&fsm, editor.fsm());
    assert_eq!(fsm.linked_file(), Some(path.as_path()));

    // 会话恢复后重新链接脚本，手写内容保持不变
    let mut restored = FsmEditor::new(fsm);
    let text = std::fs::read_to_string(&path).unwrap();
    let report = restored.link(path.clone(), text.clone());
    assert!(report.is_clean(), "{:?}", report.issues);
    assert_eq!(restored.script(), Some(text.as_str()));
    assert!(!restored.is_modified());
}
