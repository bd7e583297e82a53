//! 调试输出：执行计划日志和 Graphviz 导出

use std::fmt::Write;

use ash::vk;
use itertools::Itertools;

use super::barrier::RgResourceBarrier;
use super::executor::RenderGraph;
use super::queue::RgJobType;
use super::resource_handle::RgPassHandle;

// 调试方法
impl RenderGraph<'_> {
    /// 打印执行计划
    ///
    /// 包括每一层的 Pass、资源访问、barrier 和跨队列同步。还没有编译时只打印一行提示。
    pub fn print_execution_plan(&self) {
        let Some(compiled) = self.compiled() else {
            log::info!("RenderGraph: not compiled");
            return;
        };
        let stats = compiled.stats();

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Passes: {} declared, {} culled  |  Layers: {}  |  Allocations: {}",
            stats.declared_passes,
            stats.culled_passes,
            stats.layers,
            stats.physical_allocations
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (layer_idx, layer) in compiled.layers().iter().enumerate() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ Layer {}/{}", layer_idx + 1, compiled.layer_count());
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for sync in &layer.queue_waits {
                log::info!(
                    "│ ⏳ wait {} (\"{}\") on {}",
                    sync.signal_queue,
                    self.pass_label(sync.producer),
                    sync.wait_queue
                );
            }

            if layer.barriers.is_empty() {
                log::info!("│ No barriers required");
            }
            for batch in &layer.barriers {
                log::info!(
                    "│ Barriers on {}: {} texture, {} buffer",
                    batch.queue(),
                    batch.texture_count(),
                    batch.buffer_count()
                );
                for barrier in batch {
                    self.log_barrier(barrier);
                }
            }

            for &handle in &layer.passes {
                let Some(pass) = self.pass_node(handle) else {
                    continue;
                };
                let queue = compiled.queue(handle).map(|q| q.to_string()).unwrap_or_default();
                log::info!("│ Pass \"{}\" ({:?} on {})", pass.name, pass.job, queue);
                for access in &pass.accesses {
                    let icon = if access.mode.writes() { "✏️ " } else { "📖" };
                    log::info!(
                        "│   {} \"{}\" {:?} @ {:?}",
                        icon,
                        self.resources().name(access.handle),
                        access.mode,
                        access.state
                    );
                }
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        if !compiled.final_barriers().is_empty() {
            log::info!("");
            log::info!("Final transitions:");
            for barrier in compiled.final_barriers() {
                self.log_barrier(barrier);
            }
        }

        if !compiled.culled_passes().is_empty() {
            log::info!(
                "Culled: [{}]",
                compiled.culled_passes().iter().map(|&h| self.pass_label(h)).join(", ")
            );
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    fn log_barrier(&self, barrier: &RgResourceBarrier) {
        let b = &barrier.barrier;
        let layout = if b.is_layout_transition() {
            format!("{:?} → {:?}", b.src.vk_image_layout(), b.dst.vk_image_layout())
        } else {
            "(no layout change)".to_string()
        };
        log::info!(
            "│   🔒 {} \"{}\" {}: {:?} → {:?} {}",
            barrier.kind,
            self.resources().name(barrier.handle),
            b.resource,
            b.src,
            b.dst,
            layout
        );
        let ((src_stage, src_access), (dst_stage, dst_access)) = (b.src_mask(), b.dst_mask());
        log::debug!(
            "│       Stage:  {} → {}",
            format_pipeline_stage(src_stage),
            format_pipeline_stage(dst_stage)
        );
        log::debug!("│       Access: {src_access:?} → {dst_access:?}");
    }

    fn pass_label(&self, handle: RgPassHandle) -> &str {
        self.pass_name(handle).unwrap_or("<removed>")
    }

    /// 导出 Graphviz DOT 格式的依赖图
    ///
    /// 同一层的 Pass 放在同一个 rank 中，被剔除的 Pass 用虚线框表示。
    /// 还没有编译时返回 `None`。
    pub fn dump_graphviz(&self) -> Option<String> {
        let compiled = self.compiled()?;
        let order = self.pass_order();
        let node_id = |h: RgPassHandle| order.iter().position(|&p| p == h).unwrap_or(usize::MAX);

        let mut dot = String::new();
        // 写入 String 不会失败
        let _ = writeln!(dot, "digraph render_graph {{");
        let _ = writeln!(dot, "  rankdir=LR;");
        let _ = writeln!(dot, "  node [shape=record, style=filled, fontname=\"helvetica\"];");

        for (layer_idx, layer) in compiled.layers().iter().enumerate() {
            let _ = writeln!(dot, "  {{ rank=same;");
            for &handle in &layer.passes {
                let Some(pass) = self.pass_node(handle) else {
                    continue;
                };
                let queue = compiled.queue(handle).map(|q| q.to_string()).unwrap_or_default();
                let _ = writeln!(
                    dot,
                    "    P{} [label=\"{{{}|layer {}|{}}}\", fillcolor=\"{}\"];",
                    node_id(handle),
                    escape(&pass.name),
                    layer_idx,
                    queue,
                    job_color(pass.job)
                );
            }
            let _ = writeln!(dot, "  }}");
        }

        for &handle in compiled.culled_passes() {
            let Some(pass) = self.pass_node(handle) else {
                continue;
            };
            let _ = writeln!(
                dot,
                "  P{} [label=\"{{{}|culled}}\", style=dashed, fillcolor=\"gray90\"];",
                node_id(handle),
                escape(&pass.name)
            );
        }

        for &(producer, consumer, kind) in compiled.edges() {
            let _ = writeln!(dot, "  P{} -> P{} [label=\"{}\"];", node_id(producer), node_id(consumer), kind);
        }

        for layer in compiled.layers() {
            for sync in &layer.queue_waits {
                let _ = writeln!(
                    dot,
                    "  P{} -> P{} [style=bold, color=\"red\", label=\"{} → {}\"];",
                    node_id(sync.producer),
                    node_id(sync.consumer),
                    sync.signal_queue,
                    sync.wait_queue
                );
            }
        }

        let _ = writeln!(dot, "}}");
        Some(dot)
    }
}

fn job_color(job: RgJobType) -> &'static str {
    match job {
        RgJobType::Graphics => "goldenrod1",
        RgJobType::Compute => "chartreuse3",
        RgJobType::Transfer => "darkturquoise",
    }
}

/// record shape 的 label 里这些字符有特殊含义
fn escape(name: &str) -> String {
    name.chars()
        .flat_map(|c| match c {
            '"' | '{' | '}' | '|' | '<' | '>' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}

/// 格式化 PipelineStageFlags2 为可读字符串
fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    const NAMES: [(vk::PipelineStageFlags2, &str); 11] = [
        (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
        (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
        (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
        (vk::PipelineStageFlags2::VERTEX_INPUT, "VERTEX_INPUT"),
        (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
        (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
        (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
        (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
        (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
        (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    ];

    let stages = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
}
