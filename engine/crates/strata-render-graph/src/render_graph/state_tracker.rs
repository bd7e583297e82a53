//! 设备资源状态跟踪
//!
//! 记录每个物理资源当前所处的状态，把状态变化转成最少的 barrier。
//! 只在单线程的编译阶段使用。

use std::collections::HashMap;

use super::barrier::RgBarrier;
use super::resource_handle::PhysicalResourceId;
use super::resource_state::DeviceResourceState;

#[derive(Clone, Debug, Default)]
pub struct DeviceStateTracker {
    states: HashMap<PhysicalResourceId, DeviceResourceState>,
}

impl DeviceStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未跟踪的资源视为 `UNDEFINED`
    #[inline]
    pub fn state(&self, resource: PhysicalResourceId) -> DeviceResourceState {
        self.states.get(&resource).copied().unwrap_or(DeviceResourceState::UNDEFINED)
    }

    /// 设置初始状态，不产生 barrier（用于外部导入的资源）
    pub fn set_state(&mut self, resource: PhysicalResourceId, state: DeviceResourceState) {
        self.states.insert(resource, state);
    }

    /// 丢弃资源内容，下一次转换一定会产生 barrier
    ///
    /// 同一份物理内存交给下一个别名资源时调用。
    pub fn discard(&mut self, resource: PhysicalResourceId) {
        self.states.remove(&resource);
    }

    /// 转换到目标状态
    ///
    /// 当前状态和目标相同时返回 `None`，否则返回 barrier 并更新当前状态。
    pub fn transition(&mut self, resource: PhysicalResourceId, target: DeviceResourceState) -> Option<RgBarrier> {
        let current = self.state(resource);
        if current == target {
            return None;
        }

        self.states.insert(resource, target);
        log::trace!("{resource}: {current:?} -> {target:?}");
        Some(RgBarrier {
            resource,
            src: current,
            dst: target,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
