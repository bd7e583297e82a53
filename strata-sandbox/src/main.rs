//! Strata sandbox
//!
//! 每帧先在 system graph 上执行游戏逻辑，再在 render graph 上录制命令。
//! 用法：`strata-sandbox [config.toml]`，不指定时读取 `config/sandbox.toml`。

mod config;
mod frame_graph;
mod world;

use std::path::PathBuf;

use anyhow::Context;
use strata_crate_tools::config::load_toml_config_or_default;
use strata_crate_tools::init_log::{init_log, parse_level};
use strata_crate_tools::path::StrataPath;
use strata_render_graph::render_graph::{RgCommand, RgRecordingCommands, RgSequentialAllocator};
use strata_system_graph::{SystemExecutor, SystemGraph};

use crate::config::SandboxConfig;
use crate::frame_graph::build_frame_graph;
use crate::world::{SandboxWorld, register_systems};

const ENTITY_COUNT: usize = 64;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| StrataPath::config_path("sandbox.toml"));
    let config: SandboxConfig = load_toml_config_or_default(&config_path)?;
    init_log(parse_level(&config.log_level));
    log::info!("sandbox config: {:?}", config);

    let mut systems = SystemGraph::new();
    register_systems(&mut systems);
    let executor = SystemExecutor::new(&config.system_graph).context("创建 system 线程池失败")?;
    let world = SandboxWorld::new(ENTITY_COUNT);

    let mut frame_graph = build_frame_graph(&config);
    let mut allocator = RgSequentialAllocator::new();
    let mut recorder = RgRecordingCommands::new();

    for _ in 0..config.frames {
        let frame = world.next_frame();

        let system_stats = executor.run(&mut systems, &world).context("system graph 执行失败")?;
        executor.run_render_thread(&systems, &world).context("render thread system 执行失败")?;

        let image = frame_graph.swapchain_image(frame);
        frame_graph.graph.reimport_texture(frame_graph.swapchain, image, frame_graph.swapchain_desc);

        recorder.clear();
        let render_stats = frame_graph
            .graph
            .execute(&mut allocator, &mut recorder)
            .context("render graph 执行失败")?;

        let markers = recorder.commands.iter().filter(|c| matches!(c, RgCommand::Marker(_))).count();
        log::info!(
            "frame {frame}: {} systems in {} layers, {} passes, {} barriers, {} markers, swapchain {image}",
            system_stats.systems_run + system_stats.deferred_render_thread,
            system_stats.layers_executed,
            render_stats.passes_executed,
            render_stats.barriers,
            markers
        );
        if let Ok(snapshot) = world.snapshot.read() {
            log::debug!("frame {frame}: {} visible entities, camera {:?}", snapshot.visible, snapshot.camera.position);
        }
    }

    frame_graph.graph.print_execution_plan();

    if let Some(path) = &config.dump_graphviz {
        let path = if path.is_relative() { StrataPath::output_path(&path.to_string_lossy()) } else { path.clone() };
        if let Some(dot) = frame_graph.graph.dump_graphviz() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| format!("创建目录失败: {:?}", parent))?;
            }
            std::fs::write(&path, dot).with_context(|| format!("写入 DOT 文件失败: {:?}", path))?;
            log::info!("render graph written to {:?}", path);
        }
    }

    frame_graph.graph.release(&mut allocator);
    log::info!(
        "sandbox finished: {} physical allocations, {} still live",
        allocator.total_allocations(),
        allocator.live_count()
    );
    Ok(())
}
