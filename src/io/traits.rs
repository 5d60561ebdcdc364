/// IO 抽象层 - trait 定义
///
/// 该模块定义了文件读写的抽象接口，支持依赖注入和测试 mock。
/// 遵循依赖倒置原则（DIP），面向接口编程。

use std::path::Path;
use crate::model::Fsm;
use crate::utils::SyncError;

/// Lua 脚本原始文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawScript {
    /// 文件的完整 UTF-8 文本
    pub text: String,
}

/// Lua 脚本读取 trait
///
/// # 职责
/// - 从文件系统整体读取脚本文本
/// - 不负责解析，仅负责 IO
pub trait ScriptReader {
    /// 读取脚本
    ///
    /// # 参数
    /// * `path` - 文件路径
    ///
    /// # 返回
    /// 返回包含完整文本的 RawScript
    fn read(&self, path: &Path) -> Result<RawScript, SyncError>;
}

/// Lua 脚本写入 trait
///
/// # 职责
/// - 将完整文本整体写入文件系统
pub trait ScriptWriter {
    /// 写入脚本
    ///
    /// # 参数
    /// * `script` - 要写入的文本
    /// * `path` - 目标文件路径
    fn write(&self, script: &RawScript, path: &Path) -> Result<(), SyncError>;
}

/// 编辑器会话读取 trait
///
/// 会话是模型的结构化持久化形式，与 Lua 链接无关。
pub trait SessionReader {
    /// 读取会话并还原状态机
    fn read_session(&self, path: &Path) -> Result<Fsm, SyncError>;
}

/// 编辑器会话写入 trait
pub trait SessionWriter {
    /// 保存状态机到会话文件
    fn write_session(&self, fsm: &Fsm, path: &Path) -> Result<(), SyncError>;
}
