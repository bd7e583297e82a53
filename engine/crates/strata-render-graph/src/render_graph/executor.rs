//! RenderGraph 构建、编译和执行
//!
//! 声明一次，编译成分层的执行计划，之后每帧重放。
//! 拓扑发生变化（增删 Pass / 资源或者 [`RenderGraph::invalidate`]）之后，
//! 下一次执行前会自动重新编译。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use itertools::Itertools;
use slotmap::{SecondaryMap, SlotMap};
use strata_dag::{DagError, HazardKind};

use super::allocator::{RgAliasCandidate, RgLifetime, RgPhysicalAllocator, plan_aliasing};
use super::barrier::{RgBarrierBatch, RgResourceBarrier};
use super::command::RgCommandRecorder;
use super::config::RgConfig;
use super::error::RgError;
use super::graph::{build_dependency_graph, find_live_passes};
use super::pass::{RgFnPass, RgPass, RgPassBuilder, RgPassContext, RgPassNode};
use super::queue::{RgJobType, RgQueue, RgQueueSync};
use super::resource::{
    RgBufferDesc, RgResource, RgResourceKind, RgResourceSource, RgTextureDependency, RgTextureDesc, RgTransientDesc,
};
use super::resource_handle::{PhysicalResourceId, RgPassHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::DeviceResourceState;
use super::state_tracker::DeviceStateTracker;

/// 编译统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgCompileStats {
    pub declared_passes: usize,
    pub culled_passes: usize,
    pub layers: usize,
    pub edges: usize,
    pub barriers: usize,
    pub transient_resources: usize,
    pub physical_allocations: usize,
    pub queue_syncs: usize,
}

/// 单帧执行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgFrameStats {
    pub layers_executed: usize,
    pub passes_executed: usize,
    pub barrier_batches: usize,
    pub barriers: usize,
    pub cancelled: bool,
}

/// 编译后的一层
#[derive(Clone, Debug, Default)]
pub struct RgCompiledLayer {
    /// 同一层内的 Pass 互相没有依赖，按声明顺序排列
    pub passes: Vec<RgPassHandle>,
    /// 本层执行之前提交，每个队列一批，按 [`RgQueue`] 排序，不包含空批次
    pub barriers: Vec<RgBarrierBatch>,
    /// 本层执行之前需要等待的其他队列
    pub queue_waits: Vec<RgQueueSync>,
}

impl RgCompiledLayer {
    /// 所有队列上的 barrier
    pub fn all_barriers(&self) -> impl Iterator<Item = &RgResourceBarrier> {
        self.barriers.iter().flat_map(|batch| batch.iter())
    }

    pub fn barrier_count(&self) -> usize {
        self.barriers.iter().map(RgBarrierBatch::len).sum()
    }

    #[inline]
    pub fn barriers_on(&self, queue: RgQueue) -> Option<&RgBarrierBatch> {
        self.barriers.iter().find(|batch| batch.queue() == queue)
    }
}

/// 编译后的执行计划
///
/// 只保存句柄，不借用任何 Pass，可以多次重放。
#[derive(Debug)]
pub struct CompiledGraph {
    layers: Vec<RgCompiledLayer>,
    culled: Vec<RgPassHandle>,
    edges: Vec<(RgPassHandle, RgPassHandle, HazardKind)>,
    queues: SecondaryMap<RgPassHandle, RgQueue>,
    physical: SecondaryMap<RgResourceHandle, PhysicalResourceId>,
    lifetimes: IndexMap<RgResourceHandle, RgLifetime>,
    /// 由 allocator 分配、需要归还的物理资源
    allocations: Vec<PhysicalResourceId>,
    final_barriers: RgBarrierBatch,
    stats: RgCompileStats,
}

// getters
impl CompiledGraph {
    #[inline]
    pub fn layers(&self) -> &[RgCompiledLayer] {
        &self.layers
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// 展开后的执行顺序
    pub fn execution_order(&self) -> Vec<RgPassHandle> {
        self.layers.iter().flat_map(|l| l.passes.iter().copied()).collect()
    }

    /// Pass 所在的层，被剔除的 Pass 返回 `None`
    pub fn layer_of(&self, pass: RgPassHandle) -> Option<usize> {
        self.layers.iter().position(|l| l.passes.contains(&pass))
    }

    #[inline]
    pub fn culled_passes(&self) -> &[RgPassHandle] {
        &self.culled
    }

    #[inline]
    pub fn edges(&self) -> &[(RgPassHandle, RgPassHandle, HazardKind)] {
        &self.edges
    }

    #[inline]
    pub fn queue(&self, pass: RgPassHandle) -> Option<RgQueue> {
        self.queues.get(pass).copied()
    }

    #[inline]
    pub fn physical(&self, resource: RgResourceHandle) -> Option<PhysicalResourceId> {
        self.physical.get(resource).copied()
    }

    #[inline]
    pub fn lifetime(&self, resource: RgResourceHandle) -> Option<RgLifetime> {
        self.lifetimes.get(&resource).copied()
    }

    /// 两个资源是否共享同一份物理资源
    pub fn shares_physical(&self, a: RgResourceHandle, b: RgResourceHandle) -> bool {
        matches!((self.physical(a), self.physical(b)), (Some(x), Some(y)) if x == y)
    }

    #[inline]
    pub fn final_barriers(&self) -> &RgBarrierBatch {
        &self.final_barriers
    }

    #[inline]
    pub fn stats(&self) -> RgCompileStats {
        self.stats
    }

    fn rebind(&mut self, handle: RgResourceHandle, physical: PhysicalResourceId) {
        if let Some(slot) = self.physical.get_mut(handle) {
            *slot = physical;
        }
        for batch in self.layers.iter_mut().flat_map(|l| l.barriers.iter_mut()) {
            batch.rebind(handle, physical);
        }
        self.final_barriers.rebind(handle, physical);
    }
}

/// 渲染图
///
/// # 使用流程
///
/// 1. 导入外部资源: `graph.import_resource(...)`
/// 2. 添加 Pass: `graph.add_pass("name", RgJobType::Graphics, pass)`
/// 3. 编译: `graph.compile(&mut allocator)`（可选，`execute` 会按需编译）
/// 4. 每帧执行: `graph.execute(&mut allocator, &mut recorder)`
///
/// # 生命周期
///
/// `'a` 是 Pass 可以借用的外部资源的生命周期，
/// Pass 可以直接引用外部的 pipeline、geometry 等资源，不需要 Rc/Arc。
pub struct RenderGraph<'a> {
    config: RgConfig,
    resources: RgResourceRegistry,
    passes: SlotMap<RgPassHandle, RgPassNode<'a>>,
    /// 声明顺序
    pass_order: Vec<RgPassHandle>,
    compiled: Option<CompiledGraph>,
    dirty: bool,
}

impl Default for RenderGraph<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new() -> Self {
        Self::with_config(RgConfig::default())
    }

    pub fn with_config(config: RgConfig) -> Self {
        Self {
            config,
            resources: RgResourceRegistry::new(),
            passes: SlotMap::with_key(),
            pass_order: Vec::new(),
            compiled: None,
            dirty: true,
        }
    }
}

// 资源声明
impl<'a> RenderGraph<'a> {
    /// 导入外部资源
    ///
    /// 同一个物理资源只能导入一次，多个导入资源共用一个 `physical` 时编译会报
    /// [`RgError::DuplicateImport`]。
    ///
    /// # 参数
    /// - `initial_state`: 每帧进入 graph 时资源所处的状态
    /// - `final_state`: 所有 Pass 执行完之后需要转换到的状态，`UNDEFINED` 表示不关心
    pub fn import_resource(
        &mut self,
        name: impl Into<String>,
        kind: RgResourceKind,
        physical: PhysicalResourceId,
        initial_state: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> RgResourceHandle {
        self.dirty = true;
        self.resources.register(RgResource::imported(name, kind, physical, initial_state, final_state))
    }

    /// 导入外部纹理，同时记录它的描述
    ///
    /// [`Self::add_dependent_texture`] 声明的 transient 纹理从这里读取尺寸、格式等字段。
    pub fn import_texture(
        &mut self,
        name: impl Into<String>,
        physical: PhysicalResourceId,
        desc: RgTextureDesc,
        initial_state: DeviceResourceState,
        final_state: DeviceResourceState,
    ) -> RgResourceHandle {
        self.dirty = true;
        self.resources.register(RgResource::imported_texture(name, physical, desc, initial_state, final_state))
    }

    /// 替换外部资源的物理资源，不需要重新编译
    ///
    /// 典型用法是每帧切换 swapchain image。句柄不是导入资源时返回 false。
    /// 新的物理资源已经被另一个导入资源占用时标记为 dirty，下一次编译会报错。
    pub fn reimport(&mut self, handle: RgResourceHandle, physical: PhysicalResourceId) -> bool {
        let taken_by = self
            .resources
            .iter()
            .find(|&(other, r)| other != handle && r.imported_physical() == Some(physical))
            .map(|(other, _)| other);

        let Some(RgResourceSource::Imported { physical: current, .. }) =
            self.resources.get_mut(handle).map(|r| &mut r.source)
        else {
            log::warn!("reimport: {handle:?} is not an imported resource");
            return false;
        };

        *current = physical;
        if let Some(other) = taken_by {
            log::warn!(
                "reimport: {physical} is already imported as \"{}\", graph must be recompiled",
                self.resources.name(other)
            );
            self.dirty = true;
        }
        if let Some(compiled) = self.compiled.as_mut() {
            compiled.rebind(handle, physical);
        }
        true
    }

    /// 替换外部纹理，同时更新它的描述
    ///
    /// 依赖它的 transient 纹理解析出的描述发生变化时标记为 dirty，
    /// 下一次执行会重新编译并重新分配这些纹理；否则和 [`Self::reimport`] 一样只重新绑定。
    /// 句柄不是导入的纹理时返回 false。
    pub fn reimport_texture(
        &mut self,
        handle: RgResourceHandle,
        physical: PhysicalResourceId,
        desc: RgTextureDesc,
    ) -> bool {
        let before = self.resolve_dependents_of(handle);
        let Some(RgResourceSource::Imported {
            kind: RgResourceKind::Texture,
            texture,
            ..
        }) = self.resources.get_mut(handle).map(|r| &mut r.source)
        else {
            log::warn!("reimport_texture: {handle:?} is not an imported texture");
            return false;
        };
        *texture = Some(desc);

        self.reimport(handle, physical);
        if self.resolve_dependents_of(handle) != before {
            log::info!(
                "\"{}\" changed to {}x{} {:?}, dependent textures will be reallocated",
                self.resources.name(handle),
                desc.extent.width,
                desc.extent.height,
                desc.format
            );
            self.dirty = true;
        }
        true
    }

    pub fn add_transient_texture(&mut self, name: impl Into<String>, desc: RgTextureDesc) -> RgResourceHandle {
        self.dirty = true;
        self.resources.register(RgResource::transient(name, desc))
    }

    /// 添加部分字段跟随导入纹理的 transient 纹理
    ///
    /// `desc` 提供没有依赖的字段；依赖的纹理必须通过 [`Self::import_texture`] 导入。
    pub fn add_dependent_texture(
        &mut self,
        name: impl Into<String>,
        desc: RgTextureDesc,
        dependency: RgTextureDependency,
    ) -> RgResourceHandle {
        self.dirty = true;
        self.resources.register(RgResource::dependent_texture(name, desc, dependency))
    }

    /// 修改 transient 纹理的采样数（比如切换 MSAA），采样数不再跟随依赖的纹理
    ///
    /// 值发生变化时标记为 dirty。句柄不是 transient 纹理时返回 false。
    pub fn update_transient_samples(&mut self, handle: RgResourceHandle, samples: u32) -> bool {
        let Some(RgResourceSource::Transient {
            desc: RgTransientDesc::Texture(desc),
            dependency,
        }) = self.resources.get_mut(handle).map(|r| &mut r.source)
        else {
            log::warn!("update_transient_samples: {handle:?} is not a transient texture");
            return false;
        };

        if desc.samples != samples || dependency.samples.is_some() {
            desc.samples = samples;
            dependency.samples = None;
            self.dirty = true;
        }
        true
    }

    /// 修改 transient buffer 的大小，值发生变化时标记为 dirty
    pub fn update_transient_buffer_size(&mut self, handle: RgResourceHandle, size: u64) -> bool {
        let Some(RgResourceSource::Transient {
            desc: RgTransientDesc::Buffer(desc),
            ..
        }) = self.resources.get_mut(handle).map(|r| &mut r.source)
        else {
            log::warn!("update_transient_buffer_size: {handle:?} is not a transient buffer");
            return false;
        };

        if desc.size != size {
            desc.size = size;
            self.dirty = true;
        }
        true
    }

    pub fn add_transient_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgResourceHandle {
        self.dirty = true;
        self.resources.register(RgResource::transient(name, desc))
    }

    /// 显式声明为外部输出，写入它的 Pass 不会被剔除
    pub fn mark_output(&mut self, handle: RgResourceHandle) -> bool {
        match self.resources.get_mut(handle) {
            Some(resource) => {
                if !resource.is_output {
                    resource.is_output = true;
                    self.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// 移除资源，仍然引用它的 Pass 会在下次编译时报错
    pub fn remove_resource(&mut self, handle: RgResourceHandle) -> bool {
        let removed = self.resources.remove(handle).is_some();
        self.dirty |= removed;
        removed
    }
}

// Pass 声明
impl<'a> RenderGraph<'a> {
    /// 添加 Pass
    ///
    /// 立即调用 `pass.setup()` 收集资源访问声明。
    pub fn add_pass<P: RgPass + 'a>(&mut self, name: impl Into<String>, job: RgJobType, mut pass: P) -> RgPassHandle {
        let mut builder = RgPassBuilder::new(name.into(), &mut self.resources);
        pass.setup(&mut builder);

        let RgPassBuilder {
            name,
            accesses,
            side_effect,
            is_async,
            after,
            ..
        } = builder;

        let node = RgPassNode {
            name,
            job,
            is_async,
            side_effect,
            accesses,
            after,
            pass: Box::new(pass),
        };

        let handle = self.passes.insert(node);
        self.pass_order.push(handle);
        self.dirty = true;
        handle
    }

    /// 使用闭包添加 Pass
    pub fn add_pass_fn<S, E>(&mut self, name: impl Into<String>, job: RgJobType, setup: S, execute: E) -> RgPassHandle
    where
        S: FnOnce(&mut RgPassBuilder<'_>) + 'a,
        E: Fn(&mut RgPassContext<'_>) + 'a,
    {
        self.add_pass(name, job, RgFnPass::new(setup, execute))
    }

    pub fn remove_pass(&mut self, handle: RgPassHandle) -> bool {
        if self.passes.remove(handle).is_none() {
            return false;
        }
        self.pass_order.retain(|&h| h != handle);
        self.dirty = true;
        true
    }

    /// 在 Pass 添加之后补充顺序约束：`before` 必须先于 `after` 执行
    pub fn add_ordering(&mut self, before: RgPassHandle, after: RgPassHandle) -> bool {
        if !self.passes.contains_key(before) {
            return false;
        }
        let Some(node) = self.passes.get_mut(after) else {
            return false;
        };
        if !node.after.contains(&before) {
            node.after.push(before);
            self.dirty = true;
        }
        true
    }

    /// 强制下一次执行前重新编译
    #[inline]
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }
}

// getters
impl<'a> RenderGraph<'a> {
    #[inline]
    pub fn config(&self) -> &RgConfig {
        &self.config
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn pass_name(&self, handle: RgPassHandle) -> Option<&str> {
        self.passes.get(handle).map(|p| p.name.as_str())
    }

    #[inline]
    pub fn resource_name(&self, handle: RgResourceHandle) -> Option<&str> {
        self.resources.get(handle).map(|r| r.name.as_str())
    }

    #[inline]
    pub(crate) fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    #[inline]
    pub(crate) fn pass_node(&self, handle: RgPassHandle) -> Option<&RgPassNode<'a>> {
        self.passes.get(handle)
    }

    #[inline]
    pub(crate) fn pass_order(&self) -> &[RgPassHandle] {
        &self.pass_order
    }
}

// 编译
impl<'a> RenderGraph<'a> {
    /// 编译渲染图
    ///
    /// 执行剔除、依赖分析、分层、transient 资源分配和 barrier 计算。
    /// 失败时上一次的编译结果保持不变，仍然可以通过 [`Self::replay`] 使用。
    pub fn compile(&mut self, allocator: &mut dyn RgPhysicalAllocator) -> Result<RgCompileStats, RgError> {
        let compiled = match self.build_compiled(allocator) {
            Ok(compiled) => compiled,
            Err(e) => {
                log::error!("RenderGraph compile failed: {e}");
                return Err(e);
            }
        };

        let stats = compiled.stats;
        if let Some(old) = self.compiled.replace(compiled) {
            for id in old.allocations {
                allocator.release(id);
            }
        }
        self.dirty = false;

        log::info!(
            "RenderGraph compiled: {} passes ({} culled), {} layers, {} edges, {} barriers, {} transients in {} allocations, {} queue syncs",
            stats.declared_passes,
            stats.culled_passes,
            stats.layers,
            stats.edges,
            stats.barriers,
            stats.transient_resources,
            stats.physical_allocations,
            stats.queue_syncs
        );
        if self.config.log_execution_plan {
            self.print_execution_plan();
        }
        Ok(stats)
    }

    /// 归还所有 transient 物理资源，之后的执行会重新编译
    pub fn release(&mut self, allocator: &mut dyn RgPhysicalAllocator) {
        if let Some(old) = self.compiled.take() {
            for id in old.allocations {
                allocator.release(id);
            }
        }
        self.dirty = true;
    }

    fn validate_accesses(&self) -> Result<(), RgError> {
        for &handle in &self.pass_order {
            let Some(pass) = self.passes.get(handle) else {
                continue;
            };
            for access in &pass.accesses {
                let resource = self.resources.get(access.handle).ok_or_else(|| RgError::UnknownResourceHandle {
                    pass: pass.name.clone(),
                    handle: access.handle,
                })?;
                let kind = resource.kind();
                if !kind.accepts(access.state) {
                    return Err(RgError::IncompatibleState {
                        pass: pass.name.clone(),
                        resource: resource.name.clone(),
                        kind,
                        state: access.state,
                    });
                }
            }
        }
        Ok(())
    }

    /// 解析 transient 资源最终使用的描述，导入资源返回 `Ok(None)`
    fn resolve_transient_desc(&self, resource: &RgResource) -> Result<Option<RgTransientDesc>, String> {
        let RgResourceSource::Transient { desc, dependency } = &resource.source else {
            return Ok(None);
        };
        match desc {
            RgTransientDesc::Texture(base) if !dependency.is_empty() => dependency
                .resolve(*base, |h| self.resources.get(h).and_then(RgResource::imported_texture_desc))
                .map(|resolved| Some(resolved.into()))
                .map_err(|missing| {
                    format!(
                        "depends on \"{}\" which is not an imported texture with a description",
                        self.resources.name(missing)
                    )
                }),
            _ => Ok(Some(*desc)),
        }
    }

    /// 依赖 `source` 的 transient 纹理当前解析出的描述
    fn resolve_dependents_of(&self, source: RgResourceHandle) -> Vec<(RgResourceHandle, Option<RgTransientDesc>)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.texture_dependency().is_some_and(|d| d.depends_on(source)))
            .map(|(handle, r)| (handle, self.resolve_transient_desc(r).ok().flatten()))
            .collect()
    }

    fn build_compiled(&self, allocator: &mut dyn RgPhysicalAllocator) -> Result<CompiledGraph, RgError> {
        // 1. 句柄检查
        self.validate_accesses()?;

        // 2. 剔除
        let (live, culled): (Vec<_>, Vec<_>) = if self.config.cull_passes {
            let live_set = find_live_passes(&self.pass_order, &self.passes, &self.resources);
            self.pass_order.iter().copied().partition(|h| live_set.contains(h))
        } else {
            (self.pass_order.clone(), Vec::new())
        };
        for &handle in &culled {
            log::warn!(
                "pass \"{}\" culled: no side effects and its results are never read",
                self.passes[handle].name
            );
        }

        // 3. 依赖分析
        let dep_graph = build_dependency_graph(&live, &self.passes)?;

        // 4. 分层
        let dag_layers = dep_graph.dag.compile().map_err(|e| match e {
            DagError::CycleDetected { from, to } => {
                let name = |id| {
                    dep_graph.dag.node(id).map(|&h| self.passes[h].name.clone()).unwrap_or_else(|| format!("{id}"))
                };
                RgError::CycleDetected {
                    producer: name(from),
                    consumer: name(to),
                }
            }
            DagError::UnknownNode(_) => RgError::UnknownPass,
        })?;
        let layer_passes: Vec<Vec<RgPassHandle>> =
            dag_layers.layers().iter().map(|layer| layer.iter().map(|&id| live[id.index()]).collect()).collect();

        // 5. 队列
        let mut queues: SecondaryMap<RgPassHandle, RgQueue> = SecondaryMap::new();
        for &handle in &live {
            let pass = &self.passes[handle];
            queues.insert(handle, pass.job.queue(pass.is_async, self.config.async_queues));
        }

        // 6. 生命周期、描述检查、别名和分配
        let mut lifetimes: IndexMap<RgResourceHandle, RgLifetime> = IndexMap::new();
        // 所有使用者都在同一个队列上时为该队列
        let mut user_queues: HashMap<RgResourceHandle, Option<RgQueue>> = HashMap::new();
        for (layer_idx, layer) in layer_passes.iter().enumerate() {
            for &pass in layer {
                let queue = queues[pass];
                for access in &self.passes[pass].accesses {
                    lifetimes
                        .entry(access.handle)
                        .and_modify(|l| l.extend(layer_idx))
                        .or_insert_with(|| RgLifetime::new(layer_idx, layer_idx));
                    user_queues
                        .entry(access.handle)
                        .and_modify(|q| {
                            if *q != Some(queue) {
                                *q = None;
                            }
                        })
                        .or_insert(Some(queue));
                }
            }
        }

        let mut imported: HashMap<PhysicalResourceId, RgResourceHandle> = HashMap::new();
        let mut transients = Vec::new();
        for (&handle, &lifetime) in &lifetimes {
            let Some(resource) = self.resources.get(handle) else {
                continue;
            };
            if let Some(id) = resource.imported_physical() {
                if let Some(&first) = imported.get(&id) {
                    return Err(RgError::DuplicateImport {
                        first: self.resources.name(first).to_string(),
                        second: resource.name.clone(),
                        physical: id,
                    });
                }
                imported.insert(id, handle);
                continue;
            }

            let invalid = |reason| RgError::InvalidResourceDescriptor {
                resource: resource.name.clone(),
                reason,
            };
            let Some(desc) = self.resolve_transient_desc(resource).map_err(invalid)? else {
                continue;
            };
            desc.validate().map_err(invalid)?;
            transients.push(RgAliasCandidate {
                handle,
                desc,
                lifetime,
                queue: user_queues.get(&handle).copied().flatten(),
            });
        }

        let slots = plan_aliasing(&transients, self.config.alias_transients);

        // 以下步骤不会失败
        let mut physical: SecondaryMap<RgResourceHandle, PhysicalResourceId> = SecondaryMap::new();
        for (handle, resource) in self.resources.iter() {
            if let Some(id) = resource.imported_physical() {
                physical.insert(handle, id);
            }
        }
        let mut allocations = Vec::with_capacity(slots.len());
        for slot in &slots {
            let name = slot.members.iter().map(|&h| self.resources.name(h)).join("|");
            let id = allocator.allocate(&name, &slot.desc, slot.lifetime);
            allocations.push(id);
            for &member in &slot.members {
                physical.insert(member, id);
            }
        }

        // 7. barrier 和最终状态
        // 只跟踪被使用的导入资源，上面已经保证它们的物理资源互不相同
        let mut tracker = DeviceStateTracker::new();
        for (&id, &handle) in &imported {
            if let Some(RgResourceSource::Imported { initial_state, .. }) = self.resources.get(handle).map(|r| &r.source) {
                tracker.set_state(id, *initial_state);
            }
        }

        let mut layers = Vec::with_capacity(layer_passes.len());
        let mut barrier_count = 0;
        for (layer_idx, passes) in layer_passes.into_iter().enumerate() {
            // barrier 录制到本层第一个访问该资源的 Pass 所在的队列
            let mut required: IndexMap<RgResourceHandle, (DeviceResourceState, RgQueue)> = IndexMap::new();
            for &pass in &passes {
                let queue = queues[pass];
                for access in &self.passes[pass].accesses {
                    let (state, owner) = required.entry(access.handle).or_insert((DeviceResourceState::default(), queue));
                    *state |= access.state;
                    if *owner != queue {
                        log::warn!(
                            "layer {layer_idx}: \"{}\" is used on {} and {}, its barrier is recorded on {}",
                            self.resources.name(access.handle),
                            owner,
                            queue,
                            owner
                        );
                    }
                }
            }

            let mut batches: BTreeMap<RgQueue, RgBarrierBatch> = BTreeMap::new();
            for (handle, (state, queue)) in required {
                let (Some(resource), Some(&id)) = (self.resources.get(handle), physical.get(handle)) else {
                    continue;
                };
                let first_use = lifetimes.get(&handle).is_some_and(|l| l.first_layer == layer_idx);
                if first_use && !resource.is_imported() {
                    // 接手别名资源时之前的内容无效
                    tracker.discard(id);
                }
                if let Some(barrier) = tracker.transition(id, state) {
                    batches.entry(queue).or_insert_with(|| RgBarrierBatch::new(queue)).push(RgResourceBarrier {
                        handle,
                        kind: resource.kind(),
                        barrier,
                    });
                }
            }
            let barriers: Vec<RgBarrierBatch> = batches.into_values().collect();
            let layer_barriers: usize = barriers.iter().map(RgBarrierBatch::len).sum();
            barrier_count += layer_barriers;

            log::debug!(
                "layer {layer_idx}: [{}], {} barriers in {} batches",
                passes.iter().map(|&h| self.passes[h].name.as_str()).join(", "),
                layer_barriers,
                barriers.len()
            );
            layers.push(RgCompiledLayer {
                passes,
                barriers,
                queue_waits: Vec::new(),
            });
        }

        let mut queue_syncs = 0;
        for &(producer, consumer, _) in &dep_graph.edges {
            let (signal_queue, wait_queue) = (queues[producer], queues[consumer]);
            if signal_queue == wait_queue {
                continue;
            }
            let Some(layer_idx) = layers.iter().position(|l: &RgCompiledLayer| l.passes.contains(&consumer)) else {
                continue;
            };
            layers[layer_idx].queue_waits.push(RgQueueSync {
                producer,
                consumer,
                signal_queue,
                wait_queue,
            });
            queue_syncs += 1;
        }

        let mut final_barriers = RgBarrierBatch::new(RgQueue::Main);
        for (handle, resource) in self.resources.iter() {
            if let RgResourceSource::Imported {
                physical: id,
                final_state,
                kind,
                ..
            } = resource.source
                && !final_state.is_undefined()
                && lifetimes.contains_key(&handle)
                && let Some(barrier) = tracker.transition(id, final_state)
            {
                final_barriers.push(RgResourceBarrier { handle, kind, barrier });
            }
        }
        barrier_count += final_barriers.len();

        let stats = RgCompileStats {
            declared_passes: self.pass_order.len(),
            culled_passes: culled.len(),
            layers: layers.len(),
            edges: dep_graph.edges.len(),
            barriers: barrier_count,
            transient_resources: transients.len(),
            physical_allocations: allocations.len(),
            queue_syncs,
        };

        Ok(CompiledGraph {
            layers,
            culled,
            edges: dep_graph.edges,
            queues,
            physical,
            lifetimes,
            allocations,
            final_barriers,
            stats,
        })
    }
}

// 执行
impl<'a> RenderGraph<'a> {
    /// 执行一帧，需要时先重新编译
    pub fn execute(
        &mut self,
        allocator: &mut dyn RgPhysicalAllocator,
        recorder: &mut dyn RgCommandRecorder,
    ) -> Result<RgFrameStats, RgError> {
        self.execute_with_cancel(allocator, recorder, &AtomicBool::new(false))
    }

    /// 执行一帧，每层开始之前检查 `cancel`
    ///
    /// 取消后剩余的层和最终状态转换都不会录制。
    pub fn execute_with_cancel(
        &mut self,
        allocator: &mut dyn RgPhysicalAllocator,
        recorder: &mut dyn RgCommandRecorder,
        cancel: &AtomicBool,
    ) -> Result<RgFrameStats, RgError> {
        if self.dirty || self.compiled.is_none() {
            self.compile(allocator)?;
        }
        Ok(self.replay(recorder, cancel))
    }

    /// 重放当前的执行计划，不检查是否需要重新编译
    ///
    /// 还没有成功编译过时什么都不做。
    pub fn replay(&self, recorder: &mut dyn RgCommandRecorder, cancel: &AtomicBool) -> RgFrameStats {
        let mut stats = RgFrameStats::default();
        let Some(compiled) = self.compiled.as_ref() else {
            return stats;
        };

        for (layer_idx, layer) in compiled.layers.iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                log::debug!("RenderGraph execution cancelled before layer {layer_idx}");
                stats.cancelled = true;
                return stats;
            }

            for sync in &layer.queue_waits {
                recorder.queue_wait(sync);
            }
            for batch in &layer.barriers {
                recorder.barrier_batch(Some(layer_idx), batch);
                stats.barrier_batches += 1;
                stats.barriers += batch.len();
            }

            for &handle in &layer.passes {
                // 编译之后被移除的 Pass
                let Some(pass) = self.passes.get(handle) else {
                    continue;
                };
                let queue = compiled.queues.get(handle).copied().unwrap_or(RgQueue::Main);

                recorder.begin_pass(&pass.name, queue);
                let mut ctx = RgPassContext {
                    recorder: &mut *recorder,
                    physical: &compiled.physical,
                    pass_name: &pass.name,
                    queue,
                    layer: layer_idx,
                };
                pass.pass.execute(&mut ctx);
                recorder.end_pass();
                stats.passes_executed += 1;
            }
            stats.layers_executed += 1;
        }

        if !compiled.final_barriers.is_empty() {
            recorder.barrier_batch(None, &compiled.final_barriers);
            stats.barrier_batches += 1;
            stats.barriers += compiled.final_barriers.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::allocator::RgSequentialAllocator;
    use crate::render_graph::command::{RgCommand, RgRecordingCommands};
    use ash::vk;
    use std::cell::Cell;

    fn color_desc() -> RgTextureDesc {
        RgTextureDesc::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM, DeviceResourceState::COLOR_TARGET)
    }

    fn backbuffer(graph: &mut RenderGraph<'_>) -> RgResourceHandle {
        graph.import_resource(
            "backbuffer",
            RgResourceKind::Texture,
            PhysicalResourceId(1),
            DeviceResourceState::UNDEFINED,
            DeviceResourceState::PRESENT_TEXTURE,
        )
    }

    #[test]
    fn test_execute_compiles_on_demand() {
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(bb, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        let mut rec = RgRecordingCommands::new();
        assert!(graph.is_dirty());
        let stats = graph.execute(&mut alloc, &mut rec).unwrap();
        assert!(!graph.is_dirty());
        assert_eq!(stats.passes_executed, 1);
        assert_eq!(rec.pass_names(), vec!["draw"]);

        // 两次 barrier：进入 COLOR_TARGET，最终转到 PRESENT
        let batches: Vec<_> = rec.barrier_batches().collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, Some(0));
        assert_eq!(batches[1].0, None);
        let last = batches[1].1.iter().next().unwrap();
        assert_eq!(last.barrier.dst, DeviceResourceState::PRESENT_TEXTURE);
    }

    #[test]
    fn test_replay_does_not_recompile() {
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(bb, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        let mut rec = RgRecordingCommands::new();
        graph.execute(&mut alloc, &mut rec).unwrap();
        graph.execute(&mut alloc, &mut rec).unwrap();
        assert_eq!(rec.pass_names(), vec!["draw", "draw"]);
        assert_eq!(alloc.total_allocations(), 0);
    }

    #[test]
    fn test_pass_context_resolves_physical() {
        let seen = Cell::new(None);
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        graph.add_pass_fn(
            "draw",
            RgJobType::Graphics,
            move |b| {
                b.write(bb, DeviceResourceState::COLOR_TARGET);
            },
            {
                let seen = &seen;
                move |ctx| {
                    seen.set(ctx.physical(bb));
                    ctx.recorder().marker("draw-call");
                }
            },
        );

        let mut alloc = RgSequentialAllocator::new();
        let mut rec = RgRecordingCommands::new();
        graph.execute(&mut alloc, &mut rec).unwrap();
        assert_eq!(seen.get(), Some(PhysicalResourceId(1)));
        assert!(rec.commands.contains(&RgCommand::Marker("draw-call".to_string())));
    }

    #[test]
    fn test_reimport_rebinds_barriers() {
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(bb, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        graph.compile(&mut alloc).unwrap();
        assert!(graph.reimport(bb, PhysicalResourceId(2)));
        assert!(!graph.is_dirty());

        let compiled = graph.compiled().unwrap();
        assert_eq!(compiled.physical(bb), Some(PhysicalResourceId(2)));
        let first = compiled.layers()[0].all_barriers().next().unwrap();
        assert_eq!(first.barrier.resource, PhysicalResourceId(2));
        assert_eq!(compiled.final_barriers().iter().next().unwrap().barrier.resource, PhysicalResourceId(2));
    }

    #[test]
    fn test_reimport_onto_taken_physical_forces_recompile() {
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        let other = graph.import_resource(
            "other",
            RgResourceKind::Texture,
            PhysicalResourceId(2),
            DeviceResourceState::UNDEFINED,
            DeviceResourceState::UNDEFINED,
        );
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(bb, DeviceResourceState::COLOR_TARGET);
            b.write(other, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        graph.compile(&mut alloc).unwrap();
        assert!(graph.reimport(bb, PhysicalResourceId(2)));
        assert!(graph.is_dirty());
        assert!(matches!(
            graph.compile(&mut alloc),
            Err(RgError::DuplicateImport { physical: PhysicalResourceId(2), .. })
        ));
    }

    #[test]
    fn test_update_transient_samples_marks_dirty() {
        let mut graph = RenderGraph::new();
        let t = graph.add_transient_texture("t", color_desc());
        let buf = graph.add_transient_buffer("buf", RgBufferDesc::new(64, DeviceResourceState::STORAGE_BUFFER_WRITE));
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(t, DeviceResourceState::COLOR_TARGET);
            b.write(buf, DeviceResourceState::STORAGE_BUFFER_WRITE);
            b.side_effect();
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        graph.compile(&mut alloc).unwrap();

        // 值不变时不需要重新编译
        assert!(graph.update_transient_samples(t, 1));
        assert!(graph.update_transient_buffer_size(buf, 64));
        assert!(!graph.is_dirty());

        assert!(graph.update_transient_samples(t, 4));
        assert!(graph.is_dirty());
        graph.compile(&mut alloc).unwrap();
        let id = graph.compiled().unwrap().physical(t).unwrap();
        assert!(matches!(alloc.desc(id), Some(RgTransientDesc::Texture(d)) if d.samples == 4));

        assert!(graph.update_transient_buffer_size(buf, 128));
        assert!(graph.is_dirty());
        assert!(!graph.update_transient_samples(buf, 4));
        assert!(!graph.update_transient_buffer_size(t, 4));
    }

    #[test]
    fn test_reimport_rejects_transient() {
        let mut graph = RenderGraph::new();
        let t = graph.add_transient_texture("t", color_desc());
        assert!(!graph.reimport(t, PhysicalResourceId(5)));
    }

    #[test]
    fn test_unknown_handle_after_remove() {
        let mut graph = RenderGraph::new();
        let t = graph.add_transient_texture("t", color_desc());
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(t, DeviceResourceState::COLOR_TARGET);
            b.side_effect();
        }, |_| {});
        assert!(graph.remove_resource(t));

        let mut alloc = RgSequentialAllocator::new();
        let err = graph.compile(&mut alloc).unwrap_err();
        assert!(matches!(err, RgError::UnknownResourceHandle { ref pass, handle } if pass == "draw" && handle == t));
    }

    #[test]
    fn test_incompatible_state() {
        let mut graph = RenderGraph::new();
        let buf = graph.add_transient_buffer("buf", RgBufferDesc::new(64, DeviceResourceState::STORAGE_BUFFER_WRITE));
        graph.add_pass_fn("bad", RgJobType::Compute, move |b| {
            b.write(buf, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        assert!(matches!(graph.compile(&mut alloc), Err(RgError::IncompatibleState { .. })));
    }

    #[test]
    fn test_release_returns_allocations() {
        let mut graph = RenderGraph::new();
        let t = graph.add_transient_texture("t", color_desc());
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(t, DeviceResourceState::COLOR_TARGET);
            b.side_effect();
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        graph.compile(&mut alloc).unwrap();
        assert_eq!(alloc.live_count(), 1);

        // 重新编译会归还上一次的分配
        graph.invalidate();
        graph.compile(&mut alloc).unwrap();
        assert_eq!(alloc.live_count(), 1);
        assert_eq!(alloc.total_allocations(), 2);

        graph.release(&mut alloc);
        assert_eq!(alloc.live_count(), 0);
        assert!(graph.is_dirty());
    }

    #[test]
    fn test_cancel_before_first_layer() {
        let mut graph = RenderGraph::new();
        let bb = backbuffer(&mut graph);
        graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
            b.write(bb, DeviceResourceState::COLOR_TARGET);
        }, |_| {});

        let mut alloc = RgSequentialAllocator::new();
        let mut rec = RgRecordingCommands::new();
        let stats = graph.execute_with_cancel(&mut alloc, &mut rec, &AtomicBool::new(true)).unwrap();
        assert!(stats.cancelled);
        assert_eq!(stats.passes_executed, 0);
        assert!(rec.commands.is_empty());
    }
}
