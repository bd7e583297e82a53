//! 依赖分析
//!
//! 先剔除结果无人使用的 Pass，再把剩余 Pass 的资源访问按声明顺序交给
//! [`ResourceVersionRegistry`]，由它推导出 RAW / WAW / WAR 依赖边。

use std::collections::{HashMap, HashSet, VecDeque};

use slotmap::SlotMap;
use strata_dag::{Dag, DagError, HazardKind, NodeId, ResourceVersionRegistry};

use super::error::RgError;
use super::pass::RgPassNode;
use super::resource_handle::{RgPassHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;

/// Pass 之间的依赖图
pub(crate) struct RgDependencyGraph {
    /// 节点负载是 Pass 句柄，节点编号即存活 Pass 的声明顺序
    pub dag: Dag<RgPassHandle>,
    /// 去重后的依赖边，保留第一次产生该边的原因
    pub edges: Vec<(RgPassHandle, RgPassHandle, HazardKind)>,
}

/// 找出需要保留的 Pass
///
/// 根节点是有副作用的 Pass，以及写入外部资源（导入或者标记为输出）的 Pass；
/// 一个 Pass 被保留，当且仅当它是根节点，或者某个被保留的 Pass 读取了它写入的内容。
pub(crate) fn find_live_passes(
    order: &[RgPassHandle],
    passes: &SlotMap<RgPassHandle, RgPassNode<'_>>,
    resources: &RgResourceRegistry,
) -> HashSet<RgPassHandle> {
    let mut registry = ResourceVersionRegistry::new();
    // consumer -> producers
    let mut raw_producers: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
    let mut live = vec![false; order.len()];
    let mut queue = VecDeque::new();

    for (idx, &handle) in order.iter().enumerate() {
        let Some(pass) = passes.get(handle) else {
            continue;
        };

        let mut is_root = pass.side_effect;
        for access in &pass.accesses {
            let outcome = registry.record_access(access.handle, NodeId::new(idx), access.mode);
            raw_producers[idx].extend(
                outcome.edges.iter().filter(|e| e.kind == HazardKind::ReadAfterWrite).map(|e| e.producer.index()),
            );

            let writes_external =
                access.mode.writes() && resources.get(access.handle).is_some_and(|r| r.is_external());
            is_root |= writes_external;
        }

        if is_root {
            live[idx] = true;
            queue.push_back(idx);
        }
    }

    while let Some(consumer) = queue.pop_front() {
        for &producer in &raw_producers[consumer] {
            if !live[producer] {
                live[producer] = true;
                queue.push_back(producer);
            }
        }
    }

    order.iter().zip(live).filter_map(|(&handle, is_live)| is_live.then_some(handle)).collect()
}

/// 为存活的 Pass 构建依赖图
///
/// `live` 必须按声明顺序排列。
pub(crate) fn build_dependency_graph(
    live: &[RgPassHandle],
    passes: &SlotMap<RgPassHandle, RgPassNode<'_>>,
) -> Result<RgDependencyGraph, RgError> {
    let mut dag = Dag::with_capacity(live.len(), live.len() * 2);
    let mut node_of: HashMap<RgPassHandle, NodeId> = HashMap::with_capacity(live.len());
    for &handle in live {
        node_of.insert(handle, dag.add_node(handle));
    }

    let mut registry: ResourceVersionRegistry<RgResourceHandle> = ResourceVersionRegistry::new();
    let mut candidates = Vec::new();

    for &handle in live {
        let Some(pass) = passes.get(handle) else {
            continue;
        };
        let node = node_of[&handle];

        for &prev in &pass.after {
            match node_of.get(&prev) {
                Some(&producer) => candidates.push((producer, node, HazardKind::Explicit)),
                None if passes.contains_key(prev) => {
                    log::debug!("pass \"{}\": ordering hint on a culled pass ignored", pass.name);
                }
                None => log::warn!("pass \"{}\": ordering hint on a removed pass ignored", pass.name),
            }
        }

        for access in &pass.accesses {
            let outcome = registry.record_access(access.handle, node, access.mode);
            candidates.extend(outcome.edges.iter().map(|e| (e.producer, e.consumer, e.kind)));
        }
    }

    let mut edges = Vec::with_capacity(candidates.len());
    for (producer, consumer, kind) in candidates {
        // 两端都是刚加入的节点，不会失败
        let inserted = dag.add_edge(producer, consumer).map_err(|_: DagError| RgError::UnknownPass)?;
        if inserted {
            edges.push((live[producer.index()], live[consumer.index()], kind));
        }
    }

    Ok(RgDependencyGraph { dag, edges })
}
