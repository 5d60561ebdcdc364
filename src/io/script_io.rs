/// Lua 脚本 IO 实现
///
/// 提供基于文件系统的默认脚本读写实现
use std::path::Path;
use super::traits::{RawScript, ScriptReader, ScriptWriter};
use crate::utils::SyncError;

/// 默认的脚本读取器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultScriptReader;

impl ScriptReader for DefaultScriptReader {
    fn read(&self, path: &Path) -> Result<RawScript, SyncError> {
        let text = std::fs::read_to_string(path)?;
        Ok(RawScript { text })
    }
}

/// 默认的脚本写入器（基于 std::fs）
#[derive(Debug, Clone, Default)]
pub struct DefaultScriptWriter;

impl ScriptWriter for DefaultScriptWriter {
    fn write(&self, script: &RawScript, path: &Path) -> Result<(), SyncError> {
        // 确保父目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, &script.text)?;
        Ok(())
    }
}
