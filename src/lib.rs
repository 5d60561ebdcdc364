pub mod pattern;
pub mod model;
pub mod generator;
pub mod importer;
pub mod patcher;
pub mod refactor;
pub mod editor;
pub mod io;
pub mod utils;

// 重新导出主要结构
pub use model::{Entity, EntityRef, FieldValue, Fsm, State, Trigger, Vec2};
pub use pattern::{FieldShape, FieldSpec};
pub use generator::{generate_document, generate_fsm, generate_state, generate_trigger};
pub use importer::{load, update_from_file, ImportReport};
pub use patcher::{patch_all, patch_field, PatchStatus};
pub use refactor::{rename_state, rename_trigger};
pub use editor::{ChangeLog, FieldChange, FsmEditor};
pub use utils::{is_valid_id, SyncError};

// 常量定义
pub const SUPPORTED_EXTENSIONS: &[&str] = &["lua"];

/// 函数体结束标记，紧跟在生成的 `end` 之后
pub const END_MARKER: &str = "--@end";

/// 整个状态机的头部类标签
pub const FSM_CLASS_TAG: &str = "FSM";
/// 状态的头部类标签
pub const STATE_CLASS_TAG: &str = "State";
/// 触发器的头部类标签
pub const TRIGGER_CLASS_TAG: &str = "Trigger";

/// 会话 JSON 的格式版本
pub const SESSION_FORMAT_VERSION: u32 = 1;
