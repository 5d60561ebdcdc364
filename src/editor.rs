/// 编辑器层模块
///
/// 该模块提供有状态的编辑接口，支持变更追踪、撤销/重做等高级功能。
/// 遵循"修改-保存分离"原则：模型和链接脚本的缓冲区同步修改，写盘需要显式调用保存。
///
/// # 架构设计
///
/// - **fsm_editor**: 状态机编辑器，管理模型与脚本缓冲区的同步
/// - **delta**: 变更追踪系统，支持撤销/重做
///
/// # 使用示例
///
/// ```rust,ignore
/// use lua_fsm_sync::{EntityRef, FsmEditor, Vec2};
/// use lua_fsm_sync::io::{DefaultScriptReader, DefaultScriptWriter};
///
/// // 加载 + 编辑 + 保存工作流
/// let (mut editor, report) = FsmEditor::open(Path::new("enemy_ai.lua"), &DefaultScriptReader)?;
///
/// editor.set_position(&EntityRef::State("Idle".into()), Vec2::new(120.0, 80.0))?;
/// println!("修改了 {} 处", editor.modified_count());
///
/// editor.save(&DefaultScriptWriter, true)?;
/// ```
pub mod delta;
pub mod fsm_editor;

// === 导出公共接口 ===
pub use delta::{ChangeLog, FieldChange};
pub use fsm_editor::FsmEditor;
