/// 内存中的状态机模型
///
/// 该模块定义实体图：`Fsm` 独占所有 `State` 和 `Trigger`，
/// 触发器对状态的引用是 "ID + 查找" 关系，每次访问都重新对照当前映射校验。
///
/// # 架构设计
///
/// - **field**: 字段值类型与源码序列化工具
/// - **state**: 状态实体
/// - **trigger**: 触发器（带守卫的转移）实体
/// - **fsm**: 状态机本身，负责关系维护
pub mod field;
pub mod fsm;
pub mod state;
pub mod trigger;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::pattern::FieldSpec;
use crate::utils::SyncError;

// === 导出公共接口 ===
pub use field::{FieldValue, Vec2};
pub use fsm::Fsm;
pub use state::State;
pub use trigger::Trigger;

/// 与源码同步的实体
///
/// 每种实体声明自己的类标签、注册函数和字段表，
/// 生成器、导入器和补丁器都只通过这个 trait 访问实体。
pub trait Entity {
    /// 头部注解中的类标签
    const CLASS_TAG: &'static str;
    /// 区域末尾的注册函数名
    const REGISTER_FN: &'static str;
    /// 按生成顺序排列的字段表
    const FIELDS: &'static [FieldSpec];

    /// 实体 ID
    fn id(&self) -> &str;

    /// 读取字段的当前值，未知字段返回 None
    fn get_field(&self, field: &str) -> Option<FieldValue>;

    /// 写入字段
    ///
    /// # 返回
    /// 未知字段返回 `UnknownField`，派生字段返回 `ReadOnlyField`，
    /// 类型不符返回 `TypeMismatch`
    fn set_field(&mut self, field: &str, value: FieldValue) -> Result<(), SyncError>;

    /// 函数签名上的 (参数名, 类型) 列表
    fn signature_params(&self, _func: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// 查找字段描述
    fn field_spec(field: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.name == field)
    }
}

pub(crate) fn unknown_field(entity: &str, field: &str) -> SyncError {
    SyncError::UnknownField {
        entity: entity.to_string(),
        field: field.to_string(),
    }
}

/// 对实体的引用，用于编辑器和变更记录
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityRef {
    Fsm,
    State(String),
    Trigger(String),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Fsm => write!(f, "fsm"),
            EntityRef::State(id) => write!(f, "state '{}'", id),
            EntityRef::Trigger(id) => write!(f, "trigger '{}'", id),
        }
    }
}
