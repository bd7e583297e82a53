use thiserror::Error;

use crate::dag::NodeId;

/// DAG 构建和编译中的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    /// 图中存在环，`from -> to` 是环上的一条边
    #[error("cycle detected through edge {from} -> {to}")]
    CycleDetected { from: NodeId, to: NodeId },

    /// 节点不属于这个图
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}
