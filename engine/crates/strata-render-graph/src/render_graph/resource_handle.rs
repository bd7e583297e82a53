//! RenderGraph 资源句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用，与物理资源分离。
//! 物理资源在编译阶段才确定，transient 资源可能和别的资源共享同一份物理内存。

use std::fmt;

slotmap::new_key_type! {
    /// Graph 内部的资源句柄（texture / buffer 通用）
    pub struct RgResourceHandle;
}

slotmap::new_key_type! {
    /// Graph 内部的 Pass 句柄
    pub struct RgPassHandle;
}

/// 物理资源标识
///
/// 由外部导入，或者由 [`RgPhysicalAllocator`](super::RgPhysicalAllocator) 分配。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PhysicalResourceId(pub u64);

impl fmt::Debug for PhysicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Phys({})", self.0)
    }
}

impl fmt::Display for PhysicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
