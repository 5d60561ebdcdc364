use thiserror::Error;
use std::path::Path;

/// 自定义错误类型
///
/// 字段级错误（`PatternNotFound`、`MalformedValue`、`DanglingReference`）
/// 通常作为报告中的值出现，不会中断整个导入/补丁过程。
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Id collision: '{0}' is already used by a state or trigger")]
    IdCollision(String),

    #[error("Invalid id: '{0}'")]
    InvalidId(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unknown field '{field}' on {entity}")]
    UnknownField { entity: String, field: String },

    #[error("Field '{field}' on {entity} is derived and cannot be set")]
    ReadOnlyField { entity: String, field: String },

    #[error("Pattern not found: {entity}.{field}")]
    PatternNotFound { entity: String, field: String },

    #[error("Malformed value for {entity}.{field}: '{text}'")]
    MalformedValue {
        entity: String,
        field: String,
        text: String,
    },

    #[error("Type mismatch for field '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("Dangling reference: {entity}.{field} -> '{target}'")]
    DanglingReference {
        entity: String,
        field: String,
        target: String,
    },

    #[error("No script file is linked")]
    NotLinked,

    #[error("Unsupported session format version: {0}")]
    UnsupportedSession(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// 是否为字段级（非致命）错误
    pub fn is_field_level(&self) -> bool {
        matches!(
            self,
            SyncError::PatternNotFound { .. }
                | SyncError::MalformedValue { .. }
                | SyncError::DanglingReference { .. }
        )
    }
}

/// 检查 ID 是否可以作为源码标识符使用
///
/// ID 会成为 Lua 源码中的裸标识符，也会作为 UI 控件的键，
/// 因此只允许 ASCII 字母、数字、下划线和连字符。
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 校验 ID，不合法时返回 `InvalidId`
pub fn validate_id(id: &str) -> Result<(), SyncError> {
    if is_valid_id(id) {
        Ok(())
    } else {
        Err(SyncError::InvalidId(id.to_string()))
    }
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<std::path::PathBuf, SyncError> {
    if !file_path.exists() {
        return Err(SyncError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "原文件不存在"
        )));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let backup_path = file_path.with_extension(format!("{}.bak", timestamp));

    std::fs::copy(file_path, &backup_path)?;

    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_validation() {
        // 合法 ID
        assert!(is_valid_id("Idle"));
        assert!(is_valid_id("idle_2"));
        assert!(is_valid_id("run-fast"));

        // 非法 ID
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("two words"));
        assert!(!is_valid_id("a.b"));
        assert!(!is_valid_id("a:b"));
        assert!(!is_valid_id("tab\there"));
        assert!(!is_valid_id("状态"));
    }

    #[test]
    fn test_validate_id_error() {
        let err = validate_id("bad id").unwrap_err();
        assert!(matches!(err, SyncError::InvalidId(ref id) if id == "bad id"));
    }

    #[test]
    fn test_field_level_classification() {
        let missing = SyncError::PatternNotFound {
            entity: "Idle".to_string(),
            field: "description".to_string(),
        };
        assert!(missing.is_field_level());
        assert!(!SyncError::IdCollision("Idle".to_string()).is_field_level());
    }

    #[test]
    fn test_backup_missing_file() {
        let result = create_backup(Path::new("definitely/not/here.lua"));
        assert!(matches!(result, Err(SyncError::Io(_))));
    }

    #[test]
    fn test_backup_copies_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("fsm.lua");
        std::fs::write(&path, "---@FSM Main\n").unwrap();

        let backup = create_backup(&path).unwrap();
        assert!(backup.exists());
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "---@FSM Main\n");
    }
}
