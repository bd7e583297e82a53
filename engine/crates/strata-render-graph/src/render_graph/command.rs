//! 命令录制接口
//!
//! RenderGraph 不直接接触后端，所有 barrier、队列同步和 Pass 边界都通过
//! [`RgCommandRecorder`] 交给调用方。

use super::barrier::RgBarrierBatch;
use super::queue::{RgQueue, RgQueueSync};

/// 命令录制器
///
/// 执行时按层的顺序串行调用，同一个录制器接收整个 graph 的命令。
pub trait RgCommandRecorder {
    /// 提交一批 barrier
    ///
    /// 录制到 `batch.queue()` 的命令流上。同一层里不同队列的 barrier 分成不同的批次，
    /// 按 [`RgQueue`] 的顺序提交。
    /// `layer` 为 `None` 表示所有层执行完之后外部资源的最终转换，总是在主队列上。
    fn barrier_batch(&mut self, layer: Option<usize>, batch: &RgBarrierBatch);

    /// 等待另一个队列上的 Pass 完成
    fn queue_wait(&mut self, sync: &RgQueueSync) {
        let _ = sync;
    }

    fn begin_pass(&mut self, name: &str, queue: RgQueue);

    fn end_pass(&mut self);

    /// Pass 内部的调试标记
    fn marker(&mut self, label: &str) {
        let _ = label;
    }
}

/// 录制下来的一条命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RgCommand {
    Barriers { layer: Option<usize>, batch: RgBarrierBatch },
    QueueWait(RgQueueSync),
    BeginPass { name: String, queue: RgQueue },
    EndPass,
    Marker(String),
}

/// 把命令记录到列表里，用于测试和调试输出
#[derive(Clone, Debug, Default)]
pub struct RgRecordingCommands {
    pub commands: Vec<RgCommand>,
}

impl RgRecordingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// 按执行顺序返回 Pass 名称
    pub fn pass_names(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RgCommand::BeginPass { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn barrier_batches(&self) -> impl Iterator<Item = (Option<usize>, &RgBarrierBatch)> {
        self.commands.iter().filter_map(|c| match c {
            RgCommand::Barriers { layer, batch } => Some((*layer, batch)),
            _ => None,
        })
    }

    /// 某一层提交到 `queue` 上的 barrier 批次
    pub fn barrier_batch_on(&self, layer: usize, queue: RgQueue) -> Option<&RgBarrierBatch> {
        self.barrier_batches().find(|(l, batch)| *l == Some(layer) && batch.queue() == queue).map(|(_, batch)| batch)
    }

    pub fn queue_waits(&self) -> impl Iterator<Item = &RgQueueSync> {
        self.commands.iter().filter_map(|c| match c {
            RgCommand::QueueWait(sync) => Some(sync),
            _ => None,
        })
    }
}

impl RgCommandRecorder for RgRecordingCommands {
    fn barrier_batch(&mut self, layer: Option<usize>, batch: &RgBarrierBatch) {
        self.commands.push(RgCommand::Barriers {
            layer,
            batch: batch.clone(),
        });
    }

    fn queue_wait(&mut self, sync: &RgQueueSync) {
        self.commands.push(RgCommand::QueueWait(*sync));
    }

    fn begin_pass(&mut self, name: &str, queue: RgQueue) {
        self.commands.push(RgCommand::BeginPass {
            name: name.to_string(),
            queue,
        });
    }

    fn end_pass(&mut self) {
        self.commands.push(RgCommand::EndPass);
    }

    fn marker(&mut self, label: &str) {
        self.commands.push(RgCommand::Marker(label.to_string()));
    }
}
