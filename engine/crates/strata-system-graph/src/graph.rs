//! System 依赖图
//!
//! 与渲染图使用同一套推导规则：按声明顺序把每个 system 的组件访问交给
//! [`ResourceVersionRegistry`]，得到 RAW / WAW / WAR 依赖，再分层。

use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use slotmap::SlotMap;
use strata_dag::{Dag, DagError, HazardKind, NodeId, ResourceVersionRegistry};

use crate::error::SystemGraphError;
use crate::system::{ComponentId, JobType, System, SystemAccess, SystemAccessBuilder};

slotmap::new_key_type! {
    pub struct SystemId;
}

pub(crate) struct SystemEntry<W> {
    pub system: Arc<dyn System<W>>,
    pub name: String,
    pub job_type: JobType,
    pub access: SystemAccess,
}

/// 分层中的一层，各列表内保持声明顺序
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemLayer {
    pub main_thread: Vec<SystemId>,
    pub parallel: Vec<SystemId>,
    pub render_thread: Vec<SystemId>,
}

impl SystemLayer {
    #[inline]
    pub fn len(&self) -> usize {
        self.main_thread.len() + self.parallel.len() + self.render_thread.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.main_thread.contains(&id) || self.parallel.contains(&id) || self.render_thread.contains(&id)
    }
}

/// 编译后的调度
#[derive(Clone, Debug, Default)]
pub struct SystemSchedule {
    layers: Vec<SystemLayer>,
    edges: Vec<(SystemId, SystemId, HazardKind)>,
}

impl SystemSchedule {
    #[inline]
    pub fn layers(&self) -> &[SystemLayer] {
        &self.layers
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn edges(&self) -> &[(SystemId, SystemId, HazardKind)] {
        &self.edges
    }

    pub fn layer_of(&self, id: SystemId) -> Option<usize> {
        self.layers.iter().position(|l| l.contains(id))
    }

    /// 每层内部依次是 main thread、parallel、render thread
    pub fn execution_order(&self) -> Vec<SystemId> {
        self.layers
            .iter()
            .flat_map(|l| l.main_thread.iter().chain(&l.parallel).chain(&l.render_thread).copied())
            .collect()
    }
}

/// System 依赖图
pub struct SystemGraph<W> {
    systems: SlotMap<SystemId, SystemEntry<W>>,
    /// 声明顺序
    order: Vec<SystemId>,
    schedule: Option<SystemSchedule>,
    dirty: bool,
}

impl<W> Default for SystemGraph<W> {
    fn default() -> Self {
        Self::new()
    }
}

// new & 增删
impl<W> SystemGraph<W> {
    pub fn new() -> Self {
        Self {
            systems: SlotMap::with_key(),
            order: Vec::new(),
            schedule: None,
            dirty: true,
        }
    }

    /// 添加 system，立即调用 `setup` 收集访问声明
    pub fn add(&mut self, system: impl System<W> + 'static) -> SystemId {
        self.add_shared(Arc::new(system))
    }

    pub fn add_shared(&mut self, system: Arc<dyn System<W>>) -> SystemId {
        let mut builder = SystemAccessBuilder::new();
        system.setup(&mut builder);

        let name = system.name().to_string();
        if self.find(&name).is_some() {
            log::warn!("system \"{name}\" registered twice, ordering hints resolve to the first one");
        }

        let entry = SystemEntry {
            name,
            job_type: system.job_type(),
            access: builder.build(),
            system,
        };
        let id = self.systems.insert(entry);
        self.order.push(id);
        self.dirty = true;
        id
    }

    pub fn remove(&mut self, id: SystemId) -> bool {
        if self.systems.remove(id).is_none() {
            return false;
        }
        self.order.retain(|&s| s != id);
        self.dirty = true;
        true
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }
}

// getters
impl<W> SystemGraph<W> {
    #[inline]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn schedule(&self) -> Option<&SystemSchedule> {
        self.schedule.as_ref()
    }

    #[inline]
    pub fn name(&self, id: SystemId) -> Option<&str> {
        self.systems.get(id).map(|e| e.name.as_str())
    }

    #[inline]
    pub fn job_type(&self, id: SystemId) -> Option<JobType> {
        self.systems.get(id).map(|e| e.job_type)
    }

    /// 按名称查找，重名时返回最先添加的
    pub fn find(&self, name: &str) -> Option<SystemId> {
        self.order.iter().copied().find(|&id| self.systems.get(id).is_some_and(|e| e.name == name))
    }

    #[inline]
    pub(crate) fn system(&self, id: SystemId) -> Option<&dyn System<W>> {
        self.systems.get(id).map(|e| e.system.as_ref())
    }
}

// 编译
impl<W> SystemGraph<W> {
    /// 推导依赖并分层
    ///
    /// 失败时上一次的调度保持不变。
    pub fn compile(&mut self) -> Result<&SystemSchedule, SystemGraphError> {
        let schedule = self.build_schedule().inspect_err(|e| log::error!("SystemGraph compile failed: {e}"))?;

        log::info!(
            "SystemGraph compiled: {} systems, {} layers, {} edges",
            self.order.len(),
            schedule.layers.len(),
            schedule.edges.len()
        );
        for (idx, layer) in schedule.layers.iter().enumerate() {
            log::debug!(
                "layer {idx}: main [{}], parallel [{}], render [{}]",
                self.names(&layer.main_thread),
                self.names(&layer.parallel),
                self.names(&layer.render_thread)
            );
        }

        self.dirty = false;
        Ok(&*self.schedule.insert(schedule))
    }

    /// 需要时重新编译
    pub fn ensure_compiled(&mut self) -> Result<&SystemSchedule, SystemGraphError> {
        if self.dirty || self.schedule.is_none() {
            return self.compile();
        }
        Ok(&*self.schedule.get_or_insert_with(SystemSchedule::default))
    }

    fn names(&self, ids: &[SystemId]) -> String {
        ids.iter().filter_map(|&id| self.name(id)).join(", ")
    }

    fn build_schedule(&self) -> Result<SystemSchedule, SystemGraphError> {
        let mut dag = Dag::with_capacity(self.order.len(), self.order.len() * 2);
        let mut node_of: HashMap<SystemId, NodeId> = HashMap::with_capacity(self.order.len());
        for &id in &self.order {
            node_of.insert(id, dag.add_node(id));
        }

        let mut registry: ResourceVersionRegistry<ComponentId> = ResourceVersionRegistry::new();
        let mut candidates = Vec::new();
        for &id in &self.order {
            let entry = &self.systems[id];
            let node = node_of[&id];

            for name in &entry.access.after {
                let prev = self.find(name).ok_or_else(|| SystemGraphError::UnknownSystem(name.clone()))?;
                candidates.push((node_of[&prev], node, HazardKind::Explicit));
            }
            for &(component, mode) in &entry.access.components {
                let outcome = registry.record_access(component, node, mode);
                candidates.extend(outcome.edges.iter().map(|e| (e.producer, e.consumer, e.kind)));
            }
        }

        let mut edges = Vec::with_capacity(candidates.len());
        for (producer, consumer, kind) in candidates {
            // 节点都是上面刚加入的
            let inserted = dag
                .add_edge(producer, consumer)
                .map_err(|e: DagError| SystemGraphError::UnknownSystem(e.to_string()))?;
            if inserted {
                edges.push((self.order[producer.index()], self.order[consumer.index()], kind));
            }
        }

        let layers = dag.compile().map_err(|e| match e {
            DagError::CycleDetected { from, to } => SystemGraphError::CycleDetected {
                from: self.systems[self.order[from.index()]].name.clone(),
                to: self.systems[self.order[to.index()]].name.clone(),
            },
            DagError::UnknownNode(node) => SystemGraphError::UnknownSystem(node.to_string()),
        })?;

        for &(producer, consumer, _) in &edges {
            let (p, c) = (&self.systems[producer], &self.systems[consumer]);
            if p.job_type == JobType::RenderThread && c.job_type != JobType::RenderThread {
                log::warn!(
                    "system \"{}\" depends on render-thread system \"{}\" and observes the previous frame's data",
                    c.name,
                    p.name
                );
            }
        }

        let layers = layers
            .layers()
            .iter()
            .map(|nodes| {
                let mut layer = SystemLayer::default();
                for node in nodes {
                    let id = self.order[node.index()];
                    match self.systems[id].job_type {
                        JobType::MainThreadOnly => layer.main_thread.push(id),
                        JobType::Parallel => layer.parallel.push(id),
                        JobType::RenderThread => layer.render_thread.push(id),
                    }
                }
                layer
            })
            .collect();

        Ok(SystemSchedule { layers, edges })
    }
}
