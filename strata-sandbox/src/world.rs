//! sandbox 使用的 world 和 system
//!
//! 组件存放在各自的 `RwLock` 里，system 之间的读写冲突由调度保证不会同时发生，
//! 锁只是为了让 `&World` 可以在线程间共享。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use strata_system_graph::{FnSystem, JobType, SystemGraph};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputState {
    pub forward: f32,
    pub yaw: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Camera {
    pub position: [f32; 3],
    pub yaw: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transform {
    pub position: [f32; 3],
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity {
    pub linear: [f32; 3],
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleSet {
    pub indices: Vec<usize>,
}

/// 渲染线程看到的一帧快照
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSnapshot {
    pub frame: u64,
    pub camera: Camera,
    pub visible: usize,
}

pub struct SandboxWorld {
    pub frame: AtomicU64,
    pub input: RwLock<InputState>,
    pub camera: RwLock<Camera>,
    pub transforms: RwLock<Vec<Transform>>,
    pub velocities: RwLock<Vec<Velocity>>,
    pub visible: RwLock<VisibleSet>,
    pub snapshot: RwLock<RenderSnapshot>,
}

impl SandboxWorld {
    pub fn new(entity_count: usize) -> Self {
        let transforms = (0..entity_count)
            .map(|i| Transform {
                position: [i as f32 * 2.0, 0.0, 0.0],
            })
            .collect();
        let velocities = (0..entity_count)
            .map(|i| Velocity {
                linear: [0.0, 0.0, if i % 2 == 0 { 1.0 } else { -1.0 }],
            })
            .collect();

        Self {
            frame: AtomicU64::new(0),
            input: RwLock::default(),
            camera: RwLock::default(),
            transforms: RwLock::new(transforms),
            velocities: RwLock::new(velocities),
            visible: RwLock::default(),
            snapshot: RwLock::default(),
        }
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    pub fn next_frame(&self) -> u64 {
        self.frame.fetch_add(1, Ordering::AcqRel) + 1
    }
}

fn read<T>(lock: &RwLock<T>) -> anyhow::Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow::anyhow!("component lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> anyhow::Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow::anyhow!("component lock poisoned"))
}

const DELTA_TIME: f32 = 1.0 / 60.0;
const VIEW_DISTANCE: f32 = 12.0;

/// 注册 sandbox 的所有 system
pub fn register_systems(graph: &mut SystemGraph<SandboxWorld>) {
    graph.add(
        FnSystem::new("input", JobType::MainThreadOnly, |world: &SandboxWorld| {
            // 模拟一段固定的输入
            let frame = world.frame() as f32;
            let mut input = write(&world.input)?;
            input.forward = 1.0;
            input.yaw = (frame * 0.1).sin() * 0.05;
            Ok(())
        })
        .write::<InputState>(),
    );

    graph.add(
        FnSystem::new("camera", JobType::Parallel, |world: &SandboxWorld| {
            let input = *read(&world.input)?;
            let mut camera = write(&world.camera)?;
            camera.yaw += input.yaw;
            camera.position[0] += camera.yaw.sin() * input.forward * DELTA_TIME;
            camera.position[2] += camera.yaw.cos() * input.forward * DELTA_TIME;
            Ok(())
        })
        .read::<InputState>()
        .write::<Camera>(),
    );

    graph.add(
        FnSystem::new("physics", JobType::Parallel, |world: &SandboxWorld| {
            let velocities = read(&world.velocities)?;
            let mut transforms = write(&world.transforms)?;
            for (transform, velocity) in transforms.iter_mut().zip(velocities.iter()) {
                for axis in 0..3 {
                    transform.position[axis] += velocity.linear[axis] * DELTA_TIME;
                }
            }
            Ok(())
        })
        .read::<Velocity>()
        .read_write::<Transform>(),
    );

    graph.add(
        FnSystem::new("culling", JobType::Parallel, |world: &SandboxWorld| {
            let camera = *read(&world.camera)?;
            let transforms = read(&world.transforms)?;
            let indices = transforms
                .iter()
                .enumerate()
                .filter(|(_, t)| {
                    let d = (0..3).map(|a| (t.position[a] - camera.position[a]).powi(2)).sum::<f32>();
                    d.sqrt() <= VIEW_DISTANCE
                })
                .map(|(i, _)| i)
                .collect();
            write(&world.visible)?.indices = indices;
            Ok(())
        })
        .read::<Camera>()
        .read::<Transform>()
        .write::<VisibleSet>(),
    );

    graph.add(
        FnSystem::new("extract", JobType::RenderThread, |world: &SandboxWorld| {
            let snapshot = RenderSnapshot {
                frame: world.frame(),
                camera: *read(&world.camera)?,
                visible: read(&world.visible)?.indices.len(),
            };
            *write(&world.snapshot)? = snapshot;
            Ok(())
        })
        .read::<Camera>()
        .read::<VisibleSet>()
        .write::<RenderSnapshot>(),
    );
}
