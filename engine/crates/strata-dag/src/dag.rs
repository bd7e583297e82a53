//! 有向无环图和分层拓扑排序
//!
//! `Dag<N>` 存储任意节点负载，边只表示 "producer 先于 consumer 执行"。
//! 环检测延迟到 [`Dag::compile`]，因此插入边是 O(1) 的。
//!
//! 编译结果按层组织：同一层内的节点之间没有依赖，可以并行执行；
//! 层与层之间严格有序。

use std::fmt;

use itertools::Itertools;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::DagError;

/// 图内节点的稳定标识
///
/// 数值即声明顺序，同一层内按它排序。
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// # Panics
    /// `index` 超出 `u32` 范围时 panic，和 petgraph 的 `NodeIndex<u32>` 上限一致。
    #[inline]
    pub fn new(index: usize) -> Self {
        Self::try_new(index).expect("NodeId index exceeds u32::MAX")
    }

    /// 超出 `u32` 范围时返回 `None`
    #[inline]
    pub fn try_new(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<NodeIndex> for NodeId {
    #[inline]
    fn from(value: NodeIndex) -> Self {
        Self::new(value.index())
    }
}

impl From<NodeId> for NodeIndex {
    #[inline]
    fn from(value: NodeId) -> Self {
        NodeIndex::new(value.index())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// 有向无环图
///
/// 内部使用 petgraph 的 `DiGraph`，节点只增不删，因此 `NodeId` 在图的整个生命周期内有效。
/// 不需要负载时使用 `Dag<()>`，配合 [`Dag::declare_node`]。
pub struct Dag<N = ()> {
    graph: DiGraph<N, ()>,
}

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<N> Dag<N> {
    pub fn new() -> Self {
        Self { graph: DiGraph::new() }
    }

    pub fn with_capacity(nodes: usize, edges: usize) -> Self {
        Self {
            graph: DiGraph::with_capacity(nodes, edges),
        }
    }
}

// 构建
impl<N> Dag<N> {
    /// 添加节点，返回的 id 按声明顺序递增
    pub fn add_node(&mut self, payload: N) -> NodeId {
        self.graph.add_node(payload).into()
    }

    /// 添加依赖边 `from -> to`
    ///
    /// 重复的边会被合并。这里不做环检测，环在 `compile` 时报告。
    ///
    /// # 返回
    /// - `Ok(true)`: 插入了新边
    /// - `Ok(false)`: 边已存在
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<bool, DagError> {
        self.check_node(from)?;
        self.check_node(to)?;

        let (from, to) = (NodeIndex::from(from), NodeIndex::from(to));
        if self.graph.find_edge(from, to).is_some() {
            return Ok(false);
        }
        self.graph.add_edge(from, to, ());
        Ok(true)
    }

    fn check_node(&self, node: NodeId) -> Result<(), DagError> {
        if node.index() < self.graph.node_count() { Ok(()) } else { Err(DagError::UnknownNode(node)) }
    }
}

impl Dag<()> {
    /// 无负载图的节点声明
    #[inline]
    pub fn declare_node(&mut self) -> NodeId {
        self.add_node(())
    }
}

// getters
impl<N> Dag<N> {
    #[inline]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.graph.node_weight(id.into())
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.graph.node_weight_mut(id.into())
    }

    pub fn contains_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.check_node(from).is_ok()
            && self.check_node(to).is_ok()
            && self.graph.find_edge(from.into(), to.into()).is_some()
    }

    /// 直接后继，按声明顺序
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// 直接前驱，按声明顺序
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: NodeId, dir: Direction) -> Vec<NodeId> {
        if self.check_node(id).is_err() {
            return Vec::new();
        }
        self.graph.neighbors_directed(id.into(), dir).map(NodeId::from).sorted().dedup().collect()
    }

    /// 所有边 `(from, to)`
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.graph.edge_references().map(|e| (e.source().into(), e.target().into()))
    }

    /// 按声明顺序迭代所有节点
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.graph.node_indices().map(|n| (n.into(), &self.graph[n]))
    }
}

// 编译
impl<N> Dag<N> {
    /// Kahn 分层拓扑排序
    ///
    /// 每一轮把所有入度为 0 的节点放入同一层，然后删除它们，直到没有节点剩余。
    /// 同一层内按声明顺序排列，相同输入总是得到相同输出。
    ///
    /// # 返回
    /// - `Ok(layers)`: 分层结果
    /// - `Err(CycleDetected)`: 存在环，报告环上的一条边
    pub fn compile(&self) -> Result<DagLayers, DagError> {
        let node_count = self.graph.node_count();

        let mut in_degrees: Vec<usize> = self
            .graph
            .node_indices()
            .map(|n| self.graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut depths = vec![DagLayers::UNVISITED; node_count];
        let mut layers: Vec<Vec<NodeId>> = Vec::new();

        let mut current: Vec<NodeIndex> =
            in_degrees.iter().positions(|&d| d == 0).map(NodeIndex::new).collect();

        while !current.is_empty() {
            let depth = layers.len() as u32;
            let mut next = Vec::new();

            for &node in &current {
                depths[node.index()] = depth;
                for succ in self.graph.neighbors_directed(node, Direction::Outgoing) {
                    in_degrees[succ.index()] -= 1;
                    if in_degrees[succ.index()] == 0 {
                        next.push(succ);
                    }
                }
            }

            layers.push(current.iter().map(|&n| NodeId::from(n)).collect());
            next.sort_unstable();
            current = next;
        }

        if let Some(start) = depths.iter().position(|&d| d == DagLayers::UNVISITED) {
            let (from, to) = self.find_cycle_edge(start, &depths);
            let remaining = depths.iter().filter(|&&d| d == DagLayers::UNVISITED).count();
            log::debug!("dag compile failed: {remaining} nodes left unsorted, cycle through {from} -> {to}");
            return Err(DagError::CycleDetected { from, to });
        }

        Ok(DagLayers { layers, depths })
    }

    /// 在未被排序的节点中找到环上的一条边
    ///
    /// 剩余节点都至少有一个剩余的前驱，沿前驱回溯必然回到路径上的某个节点。
    fn find_cycle_edge(&self, start: usize, depths: &[u32]) -> (NodeId, NodeId) {
        let remaining = |n: &NodeIndex| depths[n.index()] == DagLayers::UNVISITED;

        let mut on_path = vec![false; depths.len()];
        let mut current = NodeIndex::new(start);
        loop {
            on_path[current.index()] = true;
            let Some(pred) = self.graph.neighbors_directed(current, Direction::Incoming).filter(remaining).min()
            else {
                return (current.into(), current.into());
            };
            if on_path[pred.index()] {
                return (pred.into(), current.into());
            }
            current = pred;
        }
    }
}

/// 分层编译结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DagLayers {
    /// 每层的节点，层内按声明顺序
    layers: Vec<Vec<NodeId>>,
    /// 节点 -> 所在层号
    depths: Vec<u32>,
}

impl DagLayers {
    const UNVISITED: u32 = u32::MAX;

    #[inline]
    pub fn layers(&self) -> &[Vec<NodeId>] {
        &self.layers
    }

    #[inline]
    pub fn layer(&self, index: usize) -> &[NodeId] {
        &self.layers[index]
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// 展平后的拓扑序
    pub fn sorted(&self) -> Vec<NodeId> {
        self.layers.iter().flatten().copied().collect()
    }

    /// 节点所在的层（依赖深度）
    #[inline]
    pub fn depth(&self, node: NodeId) -> Option<u32> {
        self.depths.get(node.index()).copied()
    }

    /// 最大依赖深度，空图为 `None`
    #[inline]
    pub fn max_depth(&self) -> Option<u32> {
        self.layers.len().checked_sub(1).map(|d| d as u32)
    }
}
