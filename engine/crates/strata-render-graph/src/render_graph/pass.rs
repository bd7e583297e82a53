//! Pass 定义和构建器
//!
//! `RgPass` 在 setup 阶段通过 `RgPassBuilder` 声明资源访问，
//! 在 execute 阶段通过 `RgPassContext` 录制命令。

use slotmap::SecondaryMap;
use strata_dag::AccessMode;

use super::command::RgCommandRecorder;
use super::queue::{RgJobType, RgQueue};
use super::resource::{RgBufferDesc, RgResource, RgTextureDesc};
use super::resource_handle::{PhysicalResourceId, RgPassHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::DeviceResourceState;

/// 一次资源访问声明
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgResourceAccess {
    pub handle: RgResourceHandle,
    pub mode: AccessMode,
    /// 访问时资源需要处于的状态
    pub state: DeviceResourceState,
}

/// Pass 执行时的上下文
pub struct RgPassContext<'c> {
    pub(crate) recorder: &'c mut dyn RgCommandRecorder,
    pub(crate) physical: &'c SecondaryMap<RgResourceHandle, PhysicalResourceId>,
    pub(crate) pass_name: &'c str,
    pub(crate) queue: RgQueue,
    pub(crate) layer: usize,
}

impl RgPassContext<'_> {
    #[inline]
    pub fn recorder(&mut self) -> &mut dyn RgCommandRecorder {
        &mut *self.recorder
    }

    /// 获取资源的物理句柄，被剔除或者未使用的资源返回 `None`
    #[inline]
    pub fn physical(&self, handle: RgResourceHandle) -> Option<PhysicalResourceId> {
        self.physical.get(handle).copied()
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    #[inline]
    pub fn queue(&self) -> RgQueue {
        self.queue
    }

    #[inline]
    pub fn layer(&self) -> usize {
        self.layer
    }
}

/// Pass 构建器
///
/// 在 `RgPass::setup()` 中使用，声明 Pass 的资源依赖。
/// 同一个资源声明多次时，访问方式和状态会合并。
pub struct RgPassBuilder<'b> {
    pub(crate) name: String,
    pub(crate) accesses: Vec<RgResourceAccess>,
    pub(crate) side_effect: bool,
    pub(crate) is_async: bool,
    pub(crate) after: Vec<RgPassHandle>,

    /// 资源注册表引用（用于创建临时资源）
    pub(crate) resources: &'b mut RgResourceRegistry,
}

impl<'b> RgPassBuilder<'b> {
    pub(crate) fn new(name: String, resources: &'b mut RgResourceRegistry) -> Self {
        Self {
            name,
            accesses: Vec::new(),
            side_effect: false,
            is_async: false,
            after: Vec::new(),
            resources,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn access(&mut self, handle: RgResourceHandle, mode: AccessMode, state: DeviceResourceState) -> RgResourceHandle {
        match self.accesses.iter_mut().find(|a| a.handle == handle) {
            Some(existing) => {
                existing.mode = existing.mode.merge(mode);
                existing.state |= state;
            }
            None => self.accesses.push(RgResourceAccess { handle, mode, state }),
        }
        handle
    }

    /// 声明读取资源
    ///
    /// # 参数
    /// - `handle`: 要读取的资源句柄
    /// - `state`: 读取时资源需要处于的状态（用于自动生成 barrier）
    #[inline]
    pub fn read(&mut self, handle: RgResourceHandle, state: DeviceResourceState) -> RgResourceHandle {
        self.access(handle, AccessMode::Read, state)
    }

    /// 声明写入资源，之前的内容被视为丢弃
    #[inline]
    pub fn write(&mut self, handle: RgResourceHandle, state: DeviceResourceState) -> RgResourceHandle {
        self.access(handle, AccessMode::Write, state)
    }

    /// 声明读写资源（如累积、混合）
    #[inline]
    pub fn read_write(&mut self, handle: RgResourceHandle, state: DeviceResourceState) -> RgResourceHandle {
        self.access(handle, AccessMode::ReadWrite, state)
    }

    /// 创建临时纹理
    ///
    /// 只创建声明，读写需要另外通过 `read` / `write` 声明。
    pub fn create_texture(&mut self, name: impl Into<String>, desc: RgTextureDesc) -> RgResourceHandle {
        self.resources.register(RgResource::transient(name, desc))
    }

    /// 创建临时缓冲区
    pub fn create_buffer(&mut self, name: impl Into<String>, desc: RgBufferDesc) -> RgResourceHandle {
        self.resources.register(RgResource::transient(name, desc))
    }

    /// 标记 Pass 有外部可见的副作用，永远不会被剔除
    #[inline]
    pub fn side_effect(&mut self) -> &mut Self {
        self.side_effect = true;
        self
    }

    /// 提交到 async 队列（只对 compute / transfer Pass 生效）
    #[inline]
    pub fn async_queue(&mut self) -> &mut Self {
        self.is_async = true;
        self
    }

    /// 显式指定必须在 `pass` 之后执行
    #[inline]
    pub fn after(&mut self, pass: RgPassHandle) -> &mut Self {
        if !self.after.contains(&pass) {
            self.after.push(pass);
        }
        self
    }
}

/// RgPass trait
///
/// 定义渲染图中的一个 Pass。
///
/// # 示例
///
/// ```ignore
/// struct BlurPass {
///     input: RgResourceHandle,
///     output: RgResourceHandle,
/// }
///
/// impl RgPass for BlurPass {
///     fn setup(&mut self, builder: &mut RgPassBuilder) {
///         builder.read(self.input, DeviceResourceState::SHADER_SAMPLED);
///         builder.write(self.output, DeviceResourceState::STORAGE_TEXTURE_WRITE);
///     }
///
///     fn execute(&self, ctx: &mut RgPassContext) {
///         let output = ctx.physical(self.output);
///         // 绑定 pipeline, dispatch...
///     }
/// }
/// ```
///
/// Pass 不需要是 Send + Sync，录制在单线程中进行。
/// Pass 可以借用外部资源，生命周期由 `RenderGraph<'a>` 的生命周期参数约束。
pub trait RgPass {
    fn setup(&mut self, builder: &mut RgPassBuilder<'_>);

    fn execute(&self, ctx: &mut RgPassContext<'_>);
}

/// 由两个闭包组成的 Pass
pub struct RgFnPass<S, E> {
    setup: Option<S>,
    execute: E,
}

impl<S, E> RgFnPass<S, E>
where
    S: FnOnce(&mut RgPassBuilder<'_>),
    E: Fn(&mut RgPassContext<'_>),
{
    pub fn new(setup: S, execute: E) -> Self {
        Self {
            setup: Some(setup),
            execute,
        }
    }
}

impl<S, E> RgPass for RgFnPass<S, E>
where
    S: FnOnce(&mut RgPassBuilder<'_>),
    E: Fn(&mut RgPassContext<'_>),
{
    fn setup(&mut self, builder: &mut RgPassBuilder<'_>) {
        if let Some(setup) = self.setup.take() {
            setup(builder);
        }
    }

    fn execute(&self, ctx: &mut RgPassContext<'_>) {
        (self.execute)(ctx);
    }
}

/// Pass 节点数据
pub(crate) struct RgPassNode<'a> {
    pub name: String,
    pub job: RgJobType,
    pub is_async: bool,
    pub side_effect: bool,
    pub accesses: Vec<RgResourceAccess>,
    /// 显式顺序约束
    pub after: Vec<RgPassHandle>,

    pub(crate) pass: Box<dyn RgPass + 'a>,
}
