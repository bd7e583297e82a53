//! System 定义
//!
//! System 通过 [`SystemAccessBuilder`] 声明它读写哪些组件，
//! 调度器据此推导依赖，并把互不冲突的 system 放到同一层并行执行。

use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;

use strata_dag::AccessMode;

/// 组件类型标识
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentId {
    #[inline]
    pub fn of<C: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// System 的执行方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum JobType {
    /// 必须在调用线程上执行（窗口、输入等线程亲和的 API）
    MainThreadOnly,
    /// 可以在工作线程上执行
    #[default]
    Parallel,
    /// 推迟到渲染线程，通过 `SystemExecutor::run_render_thread` 执行
    RenderThread,
}

/// System 的访问声明
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemAccess {
    pub components: Vec<(ComponentId, AccessMode)>,
    /// 必须在这些 system 之后执行（按名称）
    pub after: Vec<String>,
}

/// 在 `System::setup` 中声明组件访问
#[derive(Default)]
pub struct SystemAccessBuilder {
    pub(crate) access: SystemAccess,
}

impl SystemAccessBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一个组件声明多次时访问方式合并
    pub fn access(&mut self, component: ComponentId, mode: AccessMode) -> &mut Self {
        match self.access.components.iter_mut().find(|(c, _)| *c == component) {
            Some((_, existing)) => *existing = existing.merge(mode),
            None => self.access.components.push((component, mode)),
        }
        self
    }

    #[inline]
    pub fn read<C: 'static>(&mut self) -> &mut Self {
        self.access(ComponentId::of::<C>(), AccessMode::Read)
    }

    #[inline]
    pub fn write<C: 'static>(&mut self) -> &mut Self {
        self.access(ComponentId::of::<C>(), AccessMode::Write)
    }

    #[inline]
    pub fn read_write<C: 'static>(&mut self) -> &mut Self {
        self.access(ComponentId::of::<C>(), AccessMode::ReadWrite)
    }

    pub fn after(&mut self, system: impl Into<String>) -> &mut Self {
        let system = system.into();
        if !self.access.after.contains(&system) {
            self.access.after.push(system);
        }
        self
    }

    #[inline]
    pub fn build(self) -> SystemAccess {
        self.access
    }
}

/// ECS system
///
/// `W` 是 world 类型。同一层内的 system 可能并发执行，因此只能通过 `&W` 访问 world，
/// 组件的可变访问由 world 自己的内部可变性保证，调度器只保证声明的读写不会冲突。
pub trait System<W>: Send + Sync {
    fn name(&self) -> &str;

    fn job_type(&self) -> JobType {
        JobType::Parallel
    }

    fn setup(&self, access: &mut SystemAccessBuilder);

    fn run(&self, world: &W) -> anyhow::Result<()>;
}

/// 用闭包实现的 system
pub struct FnSystem<W, F> {
    name: String,
    job_type: JobType,
    access: SystemAccessBuilder,
    run: F,
    _world: PhantomData<fn(&W)>,
}

impl<W, F> FnSystem<W, F>
where
    F: Fn(&W) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, job_type: JobType, run: F) -> Self {
        Self {
            name: name.into(),
            job_type,
            access: SystemAccessBuilder::new(),
            run,
            _world: PhantomData,
        }
    }

    pub fn read<C: 'static>(mut self) -> Self {
        self.access.read::<C>();
        self
    }

    pub fn write<C: 'static>(mut self) -> Self {
        self.access.write::<C>();
        self
    }

    pub fn read_write<C: 'static>(mut self) -> Self {
        self.access.read_write::<C>();
        self
    }

    pub fn after(mut self, system: impl Into<String>) -> Self {
        self.access.after(system);
        self
    }
}

impl<W, F> System<W> for FnSystem<W, F>
where
    F: Fn(&W) -> anyhow::Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn setup(&self, access: &mut SystemAccessBuilder) {
        for &(component, mode) in &self.access.access.components {
            access.access(component, mode);
        }
        for name in &self.access.access.after {
            access.after(name.clone());
        }
    }

    fn run(&self, world: &W) -> anyhow::Result<()> {
        (self.run)(world)
    }
}
