//! Transient 资源分配
//!
//! 编译时根据 transient 资源的生命周期规划别名，再通过 [`RgPhysicalAllocator`]
//! 为每个别名槽位申请一份物理资源。

use std::collections::HashMap;

use itertools::Itertools;

use super::queue::RgQueue;
use super::resource::RgTransientDesc;
use super::resource_handle::{PhysicalResourceId, RgResourceHandle};

/// 资源的生命周期：第一次和最后一次被使用的层（闭区间）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgLifetime {
    pub first_layer: usize,
    pub last_layer: usize,
}

impl RgLifetime {
    #[inline]
    pub fn new(first_layer: usize, last_layer: usize) -> Self {
        Self { first_layer, last_layer }
    }

    /// 两个区间共享任意一层即视为重叠
    #[inline]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.first_layer <= other.last_layer && other.first_layer <= self.last_layer
    }

    #[inline]
    pub fn extend(&mut self, layer: usize) {
        self.first_layer = self.first_layer.min(layer);
        self.last_layer = self.last_layer.max(layer);
    }
}

/// 物理资源分配器
///
/// 由后端实现；RenderGraph 只关心返回的标识。
pub trait RgPhysicalAllocator {
    /// 为 transient 资源申请物理资源
    ///
    /// `lifetime` 是这份物理资源上所有别名资源的合并生命周期。
    fn allocate(&mut self, name: &str, desc: &RgTransientDesc, lifetime: RgLifetime) -> PhysicalResourceId;

    /// 归还不再使用的物理资源
    fn release(&mut self, resource: PhysicalResourceId);
}

/// 只做记账的分配器，按顺序发放标识
#[derive(Debug)]
pub struct RgSequentialAllocator {
    next_id: u64,
    live: HashMap<PhysicalResourceId, (String, RgTransientDesc)>,
    total_allocations: usize,
}

impl Default for RgSequentialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl RgSequentialAllocator {
    /// 发放的标识从 `1 << 32` 开始，避免和外部导入资源的标识冲突
    pub const FIRST_ID: u64 = 1 << 32;

    pub fn new() -> Self {
        Self {
            next_id: Self::FIRST_ID,
            live: HashMap::new(),
            total_allocations: 0,
        }
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }

    #[inline]
    pub fn desc(&self, resource: PhysicalResourceId) -> Option<&RgTransientDesc> {
        self.live.get(&resource).map(|(_, desc)| desc)
    }
}

impl RgPhysicalAllocator for RgSequentialAllocator {
    fn allocate(&mut self, name: &str, desc: &RgTransientDesc, lifetime: RgLifetime) -> PhysicalResourceId {
        let id = PhysicalResourceId(self.next_id);
        self.next_id += 1;
        self.total_allocations += 1;
        self.live.insert(id, (name.to_string(), *desc));
        log::debug!(
            "allocate {id} \"{name}\" ({}) for layers {}..={}",
            desc.kind(),
            lifetime.first_layer,
            lifetime.last_layer
        );
        id
    }

    fn release(&mut self, resource: PhysicalResourceId) {
        if let Some((name, _)) = self.live.remove(&resource) {
            log::debug!("release {resource} \"{name}\"");
        } else {
            log::warn!("release of unknown physical resource {resource}");
        }
    }
}

/// 参与别名规划的 transient 资源
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgAliasCandidate {
    pub handle: RgResourceHandle,
    pub desc: RgTransientDesc,
    pub lifetime: RgLifetime,
    /// 所有使用者都在同一个队列上时为该队列，否则为 `None`
    pub queue: Option<RgQueue>,
}

/// 一个别名槽位：共享同一份物理资源的 transient 资源
#[derive(Clone, Debug)]
pub(crate) struct RgAliasSlot {
    pub desc: RgTransientDesc,
    pub lifetime: RgLifetime,
    /// 最后一个成员的使用者所在的队列
    pub queue: Option<RgQueue>,
    /// 按第一次使用的顺序排列
    pub members: Vec<RgResourceHandle>,
}

impl RgAliasSlot {
    /// 层与层之间只有同一个队列上的提交顺序是有保证的，
    /// 跨队列的前后两个成员之间没有同步点，不能共享内存。
    fn accepts(&self, candidate: &RgAliasCandidate) -> bool {
        self.desc == candidate.desc
            && self.lifetime.last_layer < candidate.lifetime.first_layer
            && self.queue.is_some()
            && self.queue == candidate.queue
    }
}

/// 为 transient 资源规划别名
///
/// 只有描述完全相同、都只在同一个队列上使用、并且前一个的最后一层严格早于后一个的第一层时才共享。
/// `candidates` 按声明顺序给出；返回的槽位顺序是确定的。
pub(crate) fn plan_aliasing(candidates: &[RgAliasCandidate], enable_aliasing: bool) -> Vec<RgAliasSlot> {
    let mut slots: Vec<RgAliasSlot> = Vec::new();

    // 稳定排序，同一层开始的资源保持声明顺序
    let ordered = candidates.iter().sorted_by_key(|c| c.lifetime.first_layer);
    for candidate in ordered {
        let reusable = enable_aliasing.then(|| slots.iter().position(|slot| slot.accepts(candidate))).flatten();

        match reusable {
            Some(idx) => {
                let slot = &mut slots[idx];
                slot.lifetime.last_layer = candidate.lifetime.last_layer;
                slot.queue = candidate.queue;
                slot.members.push(candidate.handle);
            }
            None => slots.push(RgAliasSlot {
                desc: candidate.desc,
                lifetime: candidate.lifetime,
                queue: candidate.queue,
                members: vec![candidate.handle],
            }),
        }
    }

    slots
}
