//! 声明式渲染图
//!
//! 提供自动依赖分析、Pass 剔除、transient 资源别名和 barrier 生成的渲染图抽象。
//!
//! # 核心概念
//!
//! - **RgResourceHandle**: 虚拟资源句柄，与物理资源分离
//! - **DeviceResourceState**: 资源访问状态，可以映射到 Vulkan 的 stage / access / layout
//! - **RgPass**: Pass trait，声明资源访问和执行逻辑
//! - **RenderGraph**: 注册资源和 Pass，编译并逐帧执行
//! - **CompiledGraph**: 编译结果，按层组织的执行计划和预计算的 barrier
//!
//! # 使用示例
//!
//! ```ignore
//! use strata_render_graph::render_graph::*;
//!
//! let mut graph = RenderGraph::new();
//! let backbuffer = graph.import_resource(
//!     "backbuffer",
//!     RgResourceKind::Texture,
//!     swapchain_image,
//!     DeviceResourceState::UNDEFINED,
//!     DeviceResourceState::PRESENT_TEXTURE,
//! );
//! let hdr = graph.add_transient_texture("hdr", RgTextureDesc::new_2d(w, h, vk::Format::R16G16B16A16_SFLOAT, usage));
//!
//! graph.add_pass_fn("lighting", RgJobType::Graphics, |b| {
//!     b.write(hdr, DeviceResourceState::COLOR_TARGET);
//! }, |ctx| { /* draw */ });
//! graph.add_pass_fn("tonemap", RgJobType::Compute, |b| {
//!     b.read(hdr, DeviceResourceState::SHADER_SAMPLED);
//!     b.write(backbuffer, DeviceResourceState::STORAGE_TEXTURE_WRITE);
//! }, |ctx| { /* dispatch */ });
//!
//! // 每帧
//! graph.reimport(backbuffer, next_swapchain_image);
//! graph.execute(&mut allocator, &mut recorder)?;
//! ```
//!
//! # 模块结构
//!
//! - `resource_handle`: 虚拟资源 / Pass 句柄
//! - `resource_state`: 资源状态及其 Vulkan 映射
//! - `state_tracker`: 物理资源状态跟踪
//! - `resource`: 资源描述和来源
//! - `pass`: Pass trait 和 builder
//! - `graph`: 剔除和依赖分析
//! - `allocator`: 生命周期、别名规划和物理资源分配接口
//! - `command`: 命令录制接口
//! - `executor`: 编译和执行
//! - `debug`: 执行计划日志和 Graphviz 导出

mod allocator;
mod barrier;
mod command;
mod config;
mod debug;
mod error;
mod executor;
mod graph;
mod pass;
mod queue;
mod resource;
mod resource_handle;
mod resource_registry;
mod resource_state;
mod state_tracker;

pub use allocator::{RgLifetime, RgPhysicalAllocator, RgSequentialAllocator};
pub use barrier::{RgBarrier, RgBarrierBatch, RgResourceBarrier};
pub use command::{RgCommand, RgCommandRecorder, RgRecordingCommands};
pub use config::RgConfig;
pub use error::RgError;
pub use executor::{CompiledGraph, RenderGraph, RgCompileStats, RgCompiledLayer, RgFrameStats};
pub use pass::{RgFnPass, RgPass, RgPassBuilder, RgPassContext, RgResourceAccess};
pub use queue::{RgJobType, RgQueue, RgQueueSync};
pub use resource::{
    RgBufferDesc, RgExtent, RgResource, RgResourceKind, RgResourceSource, RgTextureDependency, RgTextureDesc,
    RgTransientDesc,
};
pub use resource_handle::{PhysicalResourceId, RgPassHandle, RgResourceHandle};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::DeviceResourceState;
pub use state_tracker::DeviceStateTracker;

pub use strata_dag::{AccessMode, HazardKind};
