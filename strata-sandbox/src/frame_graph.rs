//! sandbox 的帧渲染图：延迟渲染的简化版本
//!
//! ```text
//! gbuffer ──> ssao (async compute) ──> lighting ──> tonemap ──> swapchain
//!    └──────────────────────────────────┘
//! ```

use ash::vk;
use strata_render_graph::render_graph::*;

use crate::config::SandboxConfig;

pub struct FrameGraph {
    pub graph: RenderGraph<'static>,
    pub swapchain: RgResourceHandle,
    pub swapchain_desc: RgTextureDesc,
    pub swapchain_images: u32,
}

impl FrameGraph {
    /// 第 `frame` 帧使用的 swapchain image
    pub fn swapchain_image(&self, frame: u64) -> PhysicalResourceId {
        PhysicalResourceId(frame % self.swapchain_images.max(1) as u64 + 1)
    }
}

fn marker(ctx: &mut RgPassContext<'_>, outputs: &[(&str, RgResourceHandle)]) {
    for &(label, handle) in outputs {
        let text = match ctx.physical(handle) {
            Some(id) => format!("{} -> {label} {id}", ctx.pass_name()),
            None => format!("{} -> {label} (unbound)", ctx.pass_name()),
        };
        ctx.recorder().marker(&text);
    }
}

pub fn build_frame_graph(config: &SandboxConfig) -> FrameGraph {
    let mut graph = RenderGraph::with_config(config.render_graph.clone());
    let (w, h) = (config.width, config.height);

    let swapchain_desc = RgTextureDesc::new_2d(w, h, vk::Format::B8G8R8A8_SRGB, DeviceResourceState::COLOR_TARGET);
    let swapchain = graph.import_texture(
        "swapchain",
        PhysicalResourceId(1),
        swapchain_desc,
        DeviceResourceState::UNDEFINED,
        DeviceResourceState::PRESENT_TEXTURE,
    );
    // 屏幕大小的中间纹理跟随 swapchain 的尺寸
    let screen_sized = RgTextureDependency::extent_of(swapchain);
    let scene_vertices = graph.import_resource(
        "scene-vertices",
        RgResourceKind::Buffer,
        PhysicalResourceId(100),
        DeviceResourceState::VERTEX_BUFFER,
        DeviceResourceState::UNDEFINED,
    );

    let sampled_target = DeviceResourceState::COLOR_TARGET | DeviceResourceState::SHADER_SAMPLED;
    let albedo = graph.add_dependent_texture(
        "gbuffer-albedo",
        RgTextureDesc::new_2d(w, h, vk::Format::R8G8B8A8_UNORM, sampled_target),
        screen_sized,
    );
    let normal = graph.add_dependent_texture(
        "gbuffer-normal",
        RgTextureDesc::new_2d(w, h, vk::Format::R16G16B16A16_SFLOAT, sampled_target),
        screen_sized,
    );
    let depth = graph.add_dependent_texture(
        "depth",
        RgTextureDesc::new_2d(
            w,
            h,
            vk::Format::D32_SFLOAT,
            DeviceResourceState::DEPTH_STENCIL_TARGET | DeviceResourceState::SHADER_SAMPLED,
        ),
        screen_sized,
    );
    let storage = DeviceResourceState::STORAGE_TEXTURE_WRITE | DeviceResourceState::SHADER_SAMPLED;
    let ao = graph.add_dependent_texture(
        "ssao",
        RgTextureDesc::new_2d(w, h, vk::Format::R8_UNORM, storage),
        screen_sized,
    );
    let hdr = graph.add_dependent_texture(
        "hdr-color",
        RgTextureDesc::new_2d(w, h, vk::Format::R16G16B16A16_SFLOAT, storage),
        screen_sized,
    );

    graph.add_pass_fn(
        "gbuffer",
        RgJobType::Graphics,
        move |b| {
            b.read(scene_vertices, DeviceResourceState::VERTEX_BUFFER);
            b.write(albedo, DeviceResourceState::COLOR_TARGET);
            b.write(normal, DeviceResourceState::COLOR_TARGET);
            b.write(depth, DeviceResourceState::DEPTH_STENCIL_TARGET);
        },
        move |ctx| marker(ctx, &[("albedo", albedo), ("normal", normal), ("depth", depth)]),
    );

    graph.add_pass_fn(
        "ssao",
        RgJobType::Compute,
        move |b| {
            b.async_queue();
            b.read(depth, DeviceResourceState::SHADER_SAMPLED);
            b.read(normal, DeviceResourceState::SHADER_SAMPLED);
            b.write(ao, DeviceResourceState::STORAGE_TEXTURE_WRITE);
        },
        move |ctx| marker(ctx, &[("ao", ao)]),
    );

    graph.add_pass_fn(
        "lighting",
        RgJobType::Compute,
        move |b| {
            b.read(albedo, DeviceResourceState::SHADER_SAMPLED);
            b.read(normal, DeviceResourceState::SHADER_SAMPLED);
            b.read(ao, DeviceResourceState::SHADER_SAMPLED);
            b.write(hdr, DeviceResourceState::STORAGE_TEXTURE_WRITE);
        },
        move |ctx| marker(ctx, &[("hdr", hdr)]),
    );

    graph.add_pass_fn(
        "tonemap",
        RgJobType::Graphics,
        move |b| {
            b.read(hdr, DeviceResourceState::SHADER_SAMPLED);
            b.write(swapchain, DeviceResourceState::COLOR_TARGET);
        },
        move |ctx| marker(ctx, &[("swapchain", swapchain)]),
    );

    // 输出没有被任何 Pass 使用，编译时会被剔除
    graph.add_pass_fn(
        "debug-overlay",
        RgJobType::Graphics,
        move |b| {
            let overlay = b.create_texture(
                "debug-overlay",
                RgTextureDesc::new_2d(w, h, vk::Format::R8G8B8A8_UNORM, DeviceResourceState::COLOR_TARGET),
            );
            b.write(overlay, DeviceResourceState::COLOR_TARGET);
        },
        |_| {},
    );

    FrameGraph {
        graph,
        swapchain,
        swapchain_desc,
        swapchain_images: config.swapchain_images,
    }
}
