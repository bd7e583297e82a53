use std::fmt;

use super::resource_handle::RgPassHandle;

/// Pass 的工作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum RgJobType {
    #[default]
    Graphics,
    Compute,
    Transfer,
}

/// Pass 最终提交到的队列
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RgQueue {
    Main,
    AsyncCompute,
    AsyncTransfer,
}

impl RgJobType {
    /// 只有标记为 async 的 compute / transfer Pass 才会离开主队列
    ///
    /// `async_queues` 为 false 时（设备没有独立队列）所有 Pass 都在主队列上。
    #[inline]
    pub fn queue(self, is_async: bool, async_queues: bool) -> RgQueue {
        match self {
            Self::Compute if is_async && async_queues => RgQueue::AsyncCompute,
            Self::Transfer if is_async && async_queues => RgQueue::AsyncTransfer,
            _ => RgQueue::Main,
        }
    }
}

impl fmt::Display for RgQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Main => "main",
            Self::AsyncCompute => "async-compute",
            Self::AsyncTransfer => "async-transfer",
        };
        f.write_str(s)
    }
}

/// 跨队列同步点
///
/// `producer` 在 `signal_queue` 上完成后发出信号，`consumer` 所在的 `wait_queue` 等待该信号。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgQueueSync {
    pub producer: RgPassHandle,
    pub consumer: RgPassHandle,
    pub signal_queue: RgQueue,
    pub wait_queue: RgQueue,
}
