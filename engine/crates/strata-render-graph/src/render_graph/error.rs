use thiserror::Error;

use super::resource::RgResourceKind;
use super::resource_handle::{PhysicalResourceId, RgResourceHandle};
use super::resource_state::DeviceResourceState;

/// RenderGraph 编译错误
///
/// 编译失败时上一次成功编译的结果保持不变。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RgError {
    #[error("cycle detected between passes \"{producer}\" -> \"{consumer}\"")]
    CycleDetected { producer: String, consumer: String },

    #[error("invalid descriptor for resource \"{resource}\": {reason}")]
    InvalidResourceDescriptor { resource: String, reason: String },

    #[error("pass \"{pass}\" references unknown resource {handle:?}")]
    UnknownResourceHandle { pass: String, handle: RgResourceHandle },

    #[error("pass \"{pass}\" uses {kind} \"{resource}\" in incompatible state {state:?}")]
    IncompatibleState {
        pass: String,
        resource: String,
        kind: RgResourceKind,
        state: DeviceResourceState,
    },

    /// 两个导入资源绑定了同一个物理资源，它们的状态无法分别跟踪
    #[error("imported resources \"{first}\" and \"{second}\" are both bound to {physical}")]
    DuplicateImport {
        first: String,
        second: String,
        physical: PhysicalResourceId,
    },

    #[error("unknown pass")]
    UnknownPass,
}
