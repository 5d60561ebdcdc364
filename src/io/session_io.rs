/// 会话 IO 实现
///
/// 会话以 JSON 保存整个状态机（含链接文件路径），用于编辑器会话的保存/加载。
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::traits::{SessionReader, SessionWriter};
use crate::model::Fsm;
use crate::utils::SyncError;
use crate::SESSION_FORMAT_VERSION;

/// 会话文件结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFile {
    /// 格式版本
    pub format_version: u32,
    /// 状态机
    pub fsm: Fsm,
}

impl SessionFile {
    pub fn new(fsm: Fsm) -> Self {
        Self {
            format_version: SESSION_FORMAT_VERSION,
            fsm,
        }
    }

    /// 从 JSON 文本解析，并检查格式版本
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        let session: SessionFile = serde_json::from_str(json)?;
        if session.format_version != SESSION_FORMAT_VERSION {
            return Err(SyncError::UnsupportedSession(session.format_version));
        }
        Ok(session)
    }

    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 默认的 JSON 会话读取器
#[derive(Debug, Clone, Default)]
pub struct JsonSessionReader;

impl SessionReader for JsonSessionReader {
    fn read_session(&self, path: &Path) -> Result<Fsm, SyncError> {
        let json = std::fs::read_to_string(path)?;
        Ok(SessionFile::from_json(&json)?.fsm)
    }
}

/// 默认的 JSON 会话写入器
#[derive(Debug, Clone, Default)]
pub struct JsonSessionWriter;

impl SessionWriter for JsonSessionWriter {
    fn write_session(&self, fsm: &Fsm, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = SessionFile::new(fsm.clone()).to_json()?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
