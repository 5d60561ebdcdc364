/// IO 抽象层模块
///
/// 该模块提供了文件读写的抽象接口，遵循依赖倒置原则。
/// 支持依赖注入、测试 mock 和替换 IO 实现（如内存 IO）。
///
/// # 架构设计
///
/// - **traits**: 定义 Reader/Writer trait 接口
/// - **script_io**: Lua 脚本的默认实现
/// - **session_io**: 编辑器会话（JSON）的默认实现
///
/// # 使用示例
///
/// ```rust,ignore
/// use lua_fsm_sync::io::{DefaultScriptReader, ScriptReader};
///
/// let reader = DefaultScriptReader;
/// let script = reader.read(Path::new("enemy_ai.lua"))?;
/// ```
pub mod traits;
pub mod script_io;
pub mod session_io;

// === 导出 trait 定义 ===
pub use traits::{RawScript, ScriptReader, ScriptWriter, SessionReader, SessionWriter};

// === 导出默认实现 ===
pub use script_io::{DefaultScriptReader, DefaultScriptWriter};
pub use session_io::{JsonSessionReader, JsonSessionWriter, SessionFile};
