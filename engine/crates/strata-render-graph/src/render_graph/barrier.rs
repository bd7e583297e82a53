//! Barrier 描述
//!
//! 只描述资源从哪个状态转换到哪个状态，不包含任何后端对象。
//! 后端通过 [`DeviceResourceState`] 的 Vulkan 映射把它翻译成真正的同步指令。

use ash::vk;

use super::queue::RgQueue;
use super::resource::RgResourceKind;
use super::resource_handle::{PhysicalResourceId, RgResourceHandle};
use super::resource_state::DeviceResourceState;

/// 单个物理资源的状态转换
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBarrier {
    pub resource: PhysicalResourceId,
    pub src: DeviceResourceState,
    pub dst: DeviceResourceState,
}

impl RgBarrier {
    /// 是否需要 image layout 转换
    #[inline]
    pub fn is_layout_transition(&self) -> bool {
        self.src.vk_image_layout() != self.dst.vk_image_layout()
    }

    /// 源 stage 和 access；只读状态不需要让任何写入可见
    pub fn src_mask(&self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        let access = if self.src.is_write() { self.src.vk_access() } else { vk::AccessFlags2::NONE };
        (self.src.vk_stage(), access)
    }

    pub fn dst_mask(&self) -> (vk::PipelineStageFlags2, vk::AccessFlags2) {
        (self.dst.vk_stage(), self.dst.vk_access())
    }
}

/// Barrier 加上它在 graph 中对应的虚拟资源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgResourceBarrier {
    pub handle: RgResourceHandle,
    pub kind: RgResourceKind,
    pub barrier: RgBarrier,
}

/// 一层 Pass 执行前需要在某个队列上提交的 barrier
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgBarrierBatch {
    queue: RgQueue,
    barriers: Vec<RgResourceBarrier>,
}

impl RgBarrierBatch {
    pub fn new(queue: RgQueue) -> Self {
        Self {
            queue,
            barriers: Vec::new(),
        }
    }

    /// 这批 barrier 需要录制到哪个队列的命令流
    #[inline]
    pub fn queue(&self) -> RgQueue {
        self.queue
    }

    #[inline]
    pub fn push(&mut self, barrier: RgResourceBarrier) {
        self.barriers.push(barrier);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.barriers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.barriers.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RgResourceBarrier> {
        self.barriers.iter()
    }

    pub fn texture_count(&self) -> usize {
        self.barriers.iter().filter(|b| b.kind == RgResourceKind::Texture).count()
    }

    pub fn buffer_count(&self) -> usize {
        self.barriers.iter().filter(|b| b.kind == RgResourceKind::Buffer).count()
    }

    /// 外部资源重新绑定物理资源之后，修正已经编译好的 barrier
    pub(crate) fn rebind(&mut self, handle: RgResourceHandle, physical: PhysicalResourceId) {
        for b in self.barriers.iter_mut().filter(|b| b.handle == handle) {
            b.barrier.resource = physical;
        }
    }
}

impl<'b> IntoIterator for &'b RgBarrierBatch {
    type Item = &'b RgResourceBarrier;
    type IntoIter = std::slice::Iter<'b, RgResourceBarrier>;

    fn into_iter(self) -> Self::IntoIter {
        self.barriers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_only_source_has_no_src_access() {
        let b = RgBarrier {
            resource: PhysicalResourceId(1),
            src: DeviceResourceState::SHADER_SAMPLED,
            dst: DeviceResourceState::COLOR_TARGET,
        };
        assert_eq!(b.src_mask().1, vk::AccessFlags2::NONE);
        assert!(b.dst_mask().1.contains(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
        assert!(b.is_layout_transition());
    }

    #[test]
    fn test_buffer_barrier_keeps_layout() {
        let b = RgBarrier {
            resource: PhysicalResourceId(2),
            src: DeviceResourceState::STORAGE_BUFFER_WRITE,
            dst: DeviceResourceState::STORAGE_BUFFER_READ,
        };
        assert!(!b.is_layout_transition());
        assert_eq!(b.src_mask().1, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    }
}
