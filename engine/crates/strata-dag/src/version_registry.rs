//! 资源版本注册表
//!
//! 按声明顺序记录每个共享资源的访问，推导出保证正确性所需的依赖边：
//!
//! - 写后读（RAW）：reader 依赖最后一个 writer
//! - 读后写（WAR）：writer 依赖上一次写入之后的所有 reader
//! - 写后写（WAW）：后一个 writer 依赖前一个 writer
//!
//! 资源 key 是泛型的：render graph 用资源句柄，system graph 用组件类型。

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::dag::NodeId;

/// 访问方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    #[inline]
    pub fn reads(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    #[inline]
    pub fn writes(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }

    /// 合并同一个节点对同一资源的多次声明
    #[inline]
    pub fn merge(self, other: Self) -> Self {
        if self == other { self } else { Self::ReadWrite }
    }
}

/// 依赖的来源
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HazardKind {
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
    /// 调用方显式指定的顺序
    Explicit,
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReadAfterWrite => "RAW",
            Self::WriteAfterWrite => "WAW",
            Self::WriteAfterRead => "WAR",
            Self::Explicit => "explicit",
        };
        f.write_str(s)
    }
}

/// 依赖边：producer 必须先于 consumer 执行
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub producer: NodeId,
    pub consumer: NodeId,
    pub kind: HazardKind,
}

/// 单个资源的版本记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionRecord {
    /// 当前版本，首次出现时为 1，每次写入加 1
    pub version: u32,
    /// 最后一个写入者
    pub last_writer: Option<NodeId>,
    /// 最后一次访问的方式
    pub last_mode: Option<AccessMode>,
    /// 上一次写入之后的读取者（按声明顺序，无重复）
    pub readers_since_write: Vec<NodeId>,
}

impl VersionRecord {
    pub const INITIAL_VERSION: u32 = 1;

    fn new() -> Self {
        Self {
            version: Self::INITIAL_VERSION,
            last_writer: None,
            last_mode: None,
            readers_since_write: Vec::new(),
        }
    }
}

/// 一次访问的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessOutcome {
    /// 需要加入图中的依赖边
    pub edges: Vec<DependencyEdge>,
    /// 这次访问看到的版本（写入之前的版本）
    pub observed_version: u32,
    /// 写入产生的新版本
    pub produced_version: Option<u32>,
}

/// 资源版本注册表
///
/// 只在单线程的编译阶段使用，不需要加锁。
#[derive(Clone, Debug)]
pub struct ResourceVersionRegistry<K> {
    records: HashMap<K, VersionRecord>,
}

impl<K> Default for ResourceVersionRegistry<K> {
    fn default() -> Self {
        Self { records: HashMap::new() }
    }
}

// new & init
impl<K: Copy + Eq + Hash + fmt::Debug> ResourceVersionRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 显式注册资源，已注册时不做任何事
    pub fn register(&mut self, key: K) -> u32 {
        self.records.entry(key).or_insert_with(VersionRecord::new).version
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

// 访问记录
impl<K: Copy + Eq + Hash + fmt::Debug> ResourceVersionRegistry<K> {
    /// 记录 `node` 对 `key` 的一次访问，返回需要的依赖边
    ///
    /// 未注册的 key 视为首次使用：没有依赖，版本从 1 开始。
    pub fn record_access(&mut self, key: K, node: NodeId, mode: AccessMode) -> AccessOutcome {
        let record = self.records.entry(key).or_insert_with(VersionRecord::new);
        let mut outcome = AccessOutcome {
            edges: Vec::new(),
            observed_version: record.version,
            produced_version: None,
        };

        if mode.reads() {
            if let Some(writer) = record.last_writer
                && writer != node
            {
                outcome.edges.push(DependencyEdge {
                    producer: writer,
                    consumer: node,
                    kind: HazardKind::ReadAfterWrite,
                });
            }
            if !record.readers_since_write.contains(&node) {
                record.readers_since_write.push(node);
            }
        }

        if mode.writes() {
            for &reader in &record.readers_since_write {
                if reader != node {
                    outcome.edges.push(DependencyEdge {
                        producer: reader,
                        consumer: node,
                        kind: HazardKind::WriteAfterRead,
                    });
                }
            }

            // ReadWrite 的读取部分已经产生了同一对节点的 RAW 边
            if let Some(prev_writer) = record.last_writer
                && prev_writer != node
                && !mode.reads()
            {
                outcome.edges.push(DependencyEdge {
                    producer: prev_writer,
                    consumer: node,
                    kind: HazardKind::WriteAfterWrite,
                });
            }

            record.last_writer = Some(node);
            record.version += 1;
            record.readers_since_write.clear();
            outcome.produced_version = Some(record.version);
        }

        record.last_mode = Some(mode);
        log::trace!("{key:?}: {node} {mode:?} -> v{} ({} edges)", record.version, outcome.edges.len());
        outcome
    }
}

// getters
impl<K: Copy + Eq + Hash> ResourceVersionRegistry<K> {
    #[inline]
    pub fn record(&self, key: K) -> Option<&VersionRecord> {
        self.records.get(&key)
    }

    #[inline]
    pub fn version(&self, key: K) -> Option<u32> {
        self.records.get(&key).map(|r| r.version)
    }

    #[inline]
    pub fn last_writer(&self, key: K) -> Option<NodeId> {
        self.records.get(&key).and_then(|r| r.last_writer)
    }

    #[inline]
    pub fn readers(&self, key: K) -> &[NodeId] {
        self.records.get(&key).map(|r| r.readers_since_write.as_slice()).unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
