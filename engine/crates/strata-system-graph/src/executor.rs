use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::SystemGraphConfig;
use crate::error::{SystemFailure, SystemGraphError};
use crate::graph::{SystemGraph, SystemId, SystemLayer};
use crate::system::System;

/// 一帧的执行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemRunStats {
    pub layers_executed: usize,
    pub systems_run: usize,
    /// 推迟到渲染线程的 system 数量
    pub deferred_render_thread: usize,
    pub cancelled: bool,
}

/// System 执行器
///
/// 持有一个独立的 rayon 线程池：
/// - Parallel system 在线程池上执行
/// - MainThreadOnly system 在调用 `run` 的线程上依次执行
/// - RenderThread system 不在 `run` 中执行，由渲染线程调用 `run_render_thread`
///
/// 同一层内的 system 并发执行，一层全部完成后才开始下一层。
pub struct SystemExecutor {
    pool: rayon::ThreadPool,
}

// new & init
impl SystemExecutor {
    pub fn new(config: &SystemGraphConfig) -> Result<Self, SystemGraphError> {
        let prefix = config.thread_name_prefix.clone();
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(move |index| format!("{}-{}", prefix, index));
        if config.worker_threads > 0 {
            builder = builder.num_threads(config.worker_threads);
        }
        let pool = builder.build()?;

        log::info!("SystemExecutor: {} worker threads", pool.current_num_threads());
        Ok(Self { pool })
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }
}

// 执行
impl SystemExecutor {
    /// 执行一帧，图有改动时先重新编译
    pub fn run<W: Sync>(&self, graph: &mut SystemGraph<W>, world: &W) -> Result<SystemRunStats, SystemGraphError> {
        self.run_with_cancel(graph, world, &AtomicBool::new(false))
    }

    /// 每一层开始前检查 `cancel`，已经开始的层总是完整执行
    ///
    /// 某个 system 失败时同一层的其他 system 照常完成，随后停止执行并返回
    /// [`SystemGraphError::SystemFailed`]。
    pub fn run_with_cancel<W: Sync>(
        &self,
        graph: &mut SystemGraph<W>,
        world: &W,
        cancel: &AtomicBool,
    ) -> Result<SystemRunStats, SystemGraphError> {
        graph.ensure_compiled()?;
        let graph = &*graph;
        let mut stats = SystemRunStats::default();
        let Some(schedule) = graph.schedule() else {
            return Ok(stats);
        };

        for (layer_idx, layer) in schedule.layers().iter().enumerate() {
            if cancel.load(Ordering::Acquire) {
                log::info!("SystemExecutor: cancelled before layer {}/{}", layer_idx, schedule.layer_count());
                stats.cancelled = true;
                break;
            }

            let failures = self.run_layer(graph, layer, world);
            stats.layers_executed += 1;
            stats.systems_run += layer.main_thread.len() + layer.parallel.len();
            stats.deferred_render_thread += layer.render_thread.len();

            if !failures.is_empty() {
                for failure in &failures {
                    log::error!("system {failure}");
                }
                return Err(SystemGraphError::SystemFailed {
                    layer: layer_idx,
                    failures,
                });
            }
        }

        Ok(stats)
    }

    /// 按层顺序执行所有 RenderThread system
    ///
    /// 在渲染线程上调用，使用的是最近一次编译的调度。
    pub fn run_render_thread<W>(&self, graph: &SystemGraph<W>, world: &W) -> Result<usize, SystemGraphError> {
        let Some(schedule) = graph.schedule() else {
            return Ok(0);
        };

        let mut count = 0;
        for (layer_idx, layer) in schedule.layers().iter().enumerate() {
            let failures = layer
                .render_thread
                .iter()
                .filter_map(|&id| run_system(graph, id, world).err())
                .collect::<Vec<_>>();
            count += layer.render_thread.len();

            if !failures.is_empty() {
                return Err(SystemGraphError::SystemFailed {
                    layer: layer_idx,
                    failures,
                });
            }
        }
        Ok(count)
    }

    fn run_layer<W: Sync>(&self, graph: &SystemGraph<W>, layer: &SystemLayer, world: &W) -> Vec<SystemFailure> {
        let (failure_tx, failure_rx) = crossbeam_channel::unbounded::<SystemFailure>();

        // in_place_scope 的闭包在当前线程执行，main thread system 因此留在调用线程上
        self.pool.in_place_scope(|scope| {
            for &id in &layer.parallel {
                let failure_tx = failure_tx.clone();
                scope.spawn(move |_| {
                    if let Err(failure) = run_system(graph, id, world) {
                        let _ = failure_tx.send(failure);
                    }
                });
            }

            for &id in &layer.main_thread {
                if let Err(failure) = run_system(graph, id, world) {
                    let _ = failure_tx.send(failure);
                }
            }
        });

        // scope 返回时所有 sender 都已经释放
        drop(failure_tx);
        failure_rx.try_iter().collect()
    }
}

fn run_system<W>(graph: &SystemGraph<W>, id: SystemId, world: &W) -> Result<(), SystemFailure> {
    let Some(system) = graph.system(id) else {
        return Ok(());
    };
    log::trace!("run system \"{}\"", system.name());
    system.run(world).map_err(|error| SystemFailure {
        system: system.name().to_string(),
        error,
    })
}
