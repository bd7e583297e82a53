use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use strata_render_graph::render_graph::*;

fn tex_desc(w: u32, h: u32) -> RgTextureDesc {
    RgTextureDesc::new_2d(
        w,
        h,
        vk::Format::R16G16B16A16_SFLOAT,
        DeviceResourceState::COLOR_TARGET | DeviceResourceState::SHADER_SAMPLED,
    )
}

fn import_target(graph: &mut RenderGraph<'_>, name: &str, id: u64) -> RgResourceHandle {
    graph.import_resource(
        name,
        RgResourceKind::Texture,
        PhysicalResourceId(id),
        DeviceResourceState::UNDEFINED,
        DeviceResourceState::UNDEFINED,
    )
}

fn layer_names(graph: &RenderGraph<'_>) -> Vec<Vec<String>> {
    graph
        .compiled()
        .unwrap()
        .layers()
        .iter()
        .map(|l| l.passes.iter().map(|&p| graph.pass_name(p).unwrap().to_string()).collect())
        .collect()
}

#[test]
fn test_fan_out_readers_share_a_layer() {
    let mut graph = RenderGraph::new();
    let r = graph.add_transient_texture("r", tex_desc(64, 64));
    let out2 = import_target(&mut graph, "out2", 1);
    let out3 = import_target(&mut graph, "out3", 2);

    graph.add_pass_fn(
        "P1",
        RgJobType::Graphics,
        move |b| {
            b.write(r, DeviceResourceState::COLOR_TARGET);
        },
        |_| {},
    );
    graph.add_pass_fn(
        "P2",
        RgJobType::Graphics,
        move |b| {
            b.read(r, DeviceResourceState::SHADER_SAMPLED);
            b.write(out2, DeviceResourceState::COLOR_TARGET);
        },
        |_| {},
    );
    graph.add_pass_fn(
        "P3",
        RgJobType::Graphics,
        move |b| {
            b.read(r, DeviceResourceState::SHADER_SAMPLED);
            b.write(out3, DeviceResourceState::COLOR_TARGET);
        },
        |_| {},
    );

    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    assert_eq!(layer_names(&graph), vec![vec!["P1"], vec!["P2", "P3"]]);
}

#[test]
fn test_write_after_write_is_ordered() {
    let mut graph = RenderGraph::new();
    let r = import_target(&mut graph, "r", 1);
    let p1 = graph.add_pass_fn(
        "P1",
        RgJobType::Graphics,
        move |b| {
            b.write(r, DeviceResourceState::COLOR_TARGET);
        },
        |_| {},
    );
    let p2 = graph.add_pass_fn(
        "P2",
        RgJobType::Compute,
        move |b| {
            b.write(r, DeviceResourceState::STORAGE_TEXTURE_WRITE);
        },
        |_| {},
    );

    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    let compiled = graph.compiled().unwrap();
    assert!(compiled.layer_of(p1).unwrap() < compiled.layer_of(p2).unwrap());
    assert!(compiled.edges().contains(&(p1, p2, HazardKind::WriteAfterWrite)));
}

#[test]
fn test_every_edge_points_to_a_later_layer() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let a = graph.add_transient_texture("a", tex_desc(32, 32));
    let b = graph.add_transient_texture("b", tex_desc(32, 32));

    graph.add_pass_fn("write-a", RgJobType::Graphics, move |x| {
        x.write(a, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("write-b", RgJobType::Graphics, move |x| {
        x.write(b, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("read-a", RgJobType::Graphics, move |x| {
        x.read(a, DeviceResourceState::SHADER_SAMPLED);
        x.read_write(b, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("combine", RgJobType::Graphics, move |x| {
        x.read(a, DeviceResourceState::SHADER_SAMPLED);
        x.read(b, DeviceResourceState::SHADER_SAMPLED);
        x.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("overwrite-a", RgJobType::Graphics, move |x| {
        x.write(a, DeviceResourceState::COLOR_TARGET);
        x.side_effect();
    }, |_| {});

    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    let compiled = graph.compiled().unwrap();
    assert!(!compiled.edges().is_empty());
    for &(producer, consumer, kind) in compiled.edges() {
        let (p, c) = (compiled.layer_of(producer).unwrap(), compiled.layer_of(consumer).unwrap());
        assert!(p < c, "{kind} edge does not cross layers forward");
    }
    // overwrite-a 必须等到两个读取者之后
    assert_eq!(
        layer_names(&graph),
        vec![vec!["write-a", "write-b"], vec!["read-a"], vec!["combine"], vec!["overwrite-a"]]
    );
}

#[test]
fn test_cycle_is_reported_and_isolated() {
    let mut graph = RenderGraph::new();
    let a = graph.add_pass_fn("A", RgJobType::Graphics, |b| {
        b.side_effect();
    }, |_| {});
    let b = graph.add_pass_fn("B", RgJobType::Graphics, |b| {
        b.side_effect();
    }, |_| {});
    assert!(graph.add_ordering(a, b));
    assert!(graph.add_ordering(b, a));

    let err = graph.compile(&mut RgSequentialAllocator::new()).unwrap_err();
    match err {
        RgError::CycleDetected { producer, consumer } => {
            let mut names = [producer, consumer];
            names.sort();
            assert_eq!(names, ["A".to_string(), "B".to_string()]);
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(graph.compiled().is_none());

    // 其他 graph 不受影响
    let mut other = RenderGraph::new();
    other.add_pass_fn("solo", RgJobType::Graphics, |b| {
        b.side_effect();
    }, |_| {});
    assert!(other.compile(&mut RgSequentialAllocator::new()).is_ok());
}

#[test]
fn test_invalid_descriptor_then_retry() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let good = graph.add_transient_texture("good", tex_desc(16, 16));
    let bad = graph.add_transient_texture("bad", tex_desc(0, 16));

    graph.add_pass_fn("producer", RgJobType::Graphics, move |b| {
        b.write(good, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    let bad_pass = graph.add_pass_fn("broken", RgJobType::Graphics, move |b| {
        b.write(bad, DeviceResourceState::COLOR_TARGET);
        b.side_effect();
    }, |_| {});
    graph.add_pass_fn("consumer", RgJobType::Graphics, move |b| {
        b.read(good, DeviceResourceState::SHADER_SAMPLED);
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let err = graph.compile(&mut alloc).unwrap_err();
    assert!(matches!(err, RgError::InvalidResourceDescriptor { ref resource, .. } if resource == "bad"));
    assert_eq!(alloc.total_allocations(), 0);

    assert!(graph.remove_pass(bad_pass));
    graph.compile(&mut alloc).unwrap();
    assert_eq!(layer_names(&graph), vec![vec!["producer"], vec!["consumer"]]);
}

#[test]
fn test_failed_recompile_keeps_previous_schedule() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    graph.compile(&mut alloc).unwrap();

    let bad = graph.add_transient_buffer("bad", RgBufferDesc::new(0, DeviceResourceState::STORAGE_BUFFER_WRITE));
    graph.add_pass_fn("broken", RgJobType::Compute, move |b| {
        b.write(bad, DeviceResourceState::STORAGE_BUFFER_WRITE);
        b.side_effect();
    }, |_| {});

    let mut rec = RgRecordingCommands::new();
    assert!(graph.execute(&mut alloc, &mut rec).is_err());
    assert!(graph.is_dirty());

    let stats = graph.replay(&mut rec, &AtomicBool::new(false));
    assert_eq!(stats.passes_executed, 1);
    assert_eq!(rec.pass_names(), vec!["draw"]);
}

#[test]
fn test_dead_passes_are_culled() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let used = graph.add_transient_texture("used", tex_desc(8, 8));
    let unused = graph.add_transient_texture("unused", tex_desc(8, 8));

    graph.add_pass_fn("feeds-output", RgJobType::Graphics, move |b| {
        b.write(used, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    let dead = graph.add_pass_fn("dead", RgJobType::Graphics, move |b| {
        b.read(used, DeviceResourceState::SHADER_SAMPLED);
        b.write(unused, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("output", RgJobType::Graphics, move |b| {
        b.read(used, DeviceResourceState::SHADER_SAMPLED);
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let stats = graph.compile(&mut alloc).unwrap();
    assert_eq!(stats.culled_passes, 1);
    let compiled = graph.compiled().unwrap();
    assert_eq!(compiled.culled_passes(), &[dead]);
    assert!(compiled.physical(unused).is_none());
    assert_eq!(alloc.live_count(), 1);

    // 标记为输出之后不再剔除
    assert!(graph.mark_output(unused));
    let stats = graph.compile(&mut alloc).unwrap();
    assert_eq!(stats.culled_passes, 0);
    assert!(graph.compiled().unwrap().physical(unused).is_some());
}

#[test]
fn test_culling_can_be_disabled() {
    let mut graph = RenderGraph::with_config(RgConfig {
        cull_passes: false,
        ..Default::default()
    });
    graph.add_pass_fn("orphan", RgJobType::Graphics, |_| {}, |_| {});
    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    assert_eq!(layer_names(&graph), vec![vec!["orphan"]]);
}

#[test]
fn test_repeated_state_emits_one_barrier() {
    let mut graph = RenderGraph::new();
    let src = graph.import_resource(
        "src",
        RgResourceKind::Texture,
        PhysicalResourceId(10),
        DeviceResourceState::TRANSFER_DST,
        DeviceResourceState::UNDEFINED,
    );
    let mid = import_target(&mut graph, "mid", 11);
    let dst = import_target(&mut graph, "dst", 12);

    graph.add_pass_fn("first", RgJobType::Graphics, move |b| {
        b.read(src, DeviceResourceState::SHADER_SAMPLED);
        b.write(mid, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("second", RgJobType::Graphics, move |b| {
        b.read(src, DeviceResourceState::SHADER_SAMPLED);
        b.read(mid, DeviceResourceState::SHADER_SAMPLED);
        b.write(dst, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    let compiled = graph.compiled().unwrap();
    let src_barriers: Vec<_> = compiled
        .layers()
        .iter()
        .flat_map(|l| l.all_barriers())
        .filter(|b| b.handle == src)
        .collect();
    assert_eq!(src_barriers.len(), 1);
    assert_eq!(src_barriers[0].barrier.src, DeviceResourceState::TRANSFER_DST);
    assert_eq!(src_barriers[0].barrier.dst, DeviceResourceState::SHADER_SAMPLED);
}

#[test]
fn test_readers_in_one_layer_merge_states() {
    let mut graph = RenderGraph::new();
    let depth = graph.add_transient_texture(
        "depth",
        RgTextureDesc::new_2d(
            16,
            16,
            vk::Format::D32_SFLOAT,
            DeviceResourceState::DEPTH_STENCIL_TARGET | DeviceResourceState::SHADER_SAMPLED,
        ),
    );
    let a = import_target(&mut graph, "a", 1);
    let b = import_target(&mut graph, "b", 2);

    graph.add_pass_fn("prepass", RgJobType::Graphics, move |x| {
        x.write(depth, DeviceResourceState::DEPTH_STENCIL_TARGET);
    }, |_| {});
    graph.add_pass_fn("ssao", RgJobType::Graphics, move |x| {
        x.read(depth, DeviceResourceState::SHADER_SAMPLED);
        x.write(a, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("forward", RgJobType::Graphics, move |x| {
        x.read(depth, DeviceResourceState::DEPTH_STENCIL_READ);
        x.write(b, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    let compiled = graph.compiled().unwrap();
    let layer1 = &compiled.layers()[1];
    let depth_barrier = layer1.all_barriers().find(|b| b.handle == depth).unwrap();
    assert_eq!(
        depth_barrier.barrier.dst,
        DeviceResourceState::SHADER_SAMPLED | DeviceResourceState::DEPTH_STENCIL_READ
    );
    assert_eq!(depth_barrier.barrier.dst.vk_image_layout(), vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
}

#[test]
fn test_transients_alias_when_lifetimes_are_disjoint() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let t0 = graph.add_transient_texture("t0", tex_desc(128, 128));
    let t1 = graph.add_transient_texture("t1", tex_desc(128, 128));
    let t2 = graph.add_transient_texture("t2", tex_desc(128, 128));

    // t0: 层 0..=1，t1: 层 1..=2，t2: 层 2..=3
    graph.add_pass_fn("p0", RgJobType::Graphics, move |b| {
        b.write(t0, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("p1", RgJobType::Graphics, move |b| {
        b.read(t0, DeviceResourceState::SHADER_SAMPLED);
        b.write(t1, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("p2", RgJobType::Graphics, move |b| {
        b.read(t1, DeviceResourceState::SHADER_SAMPLED);
        b.write(t2, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("p3", RgJobType::Graphics, move |b| {
        b.read(t2, DeviceResourceState::SHADER_SAMPLED);
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let stats = graph.compile(&mut alloc).unwrap();
    assert_eq!(stats.transient_resources, 3);
    assert_eq!(stats.physical_allocations, 2);

    let compiled = graph.compiled().unwrap();
    assert!(compiled.shares_physical(t0, t2));
    assert!(!compiled.shares_physical(t0, t1));
    assert!(!compiled.shares_physical(t1, t2));

    // t2 接手 t0 的物理资源时，从 UNDEFINED 开始
    let handover = compiled.layers()[2].all_barriers().find(|b| b.handle == t2).unwrap();
    assert_eq!(handover.barrier.src, DeviceResourceState::UNDEFINED);
    assert_eq!(handover.barrier.dst, DeviceResourceState::COLOR_TARGET);
}

#[test]
fn test_transients_on_different_queues_do_not_alias() {
    let build = |async_queues: bool| {
        let mut graph = RenderGraph::with_config(RgConfig {
            async_queues,
            ..Default::default()
        });
        let x = import_target(&mut graph, "x", 1);
        let usage = DeviceResourceState::STORAGE_TEXTURE_WRITE | DeviceResourceState::SHADER_SAMPLED;
        let desc = RgTextureDesc::new_2d(64, 64, vk::Format::R16G16B16A16_SFLOAT, usage);
        let t1 = graph.add_transient_texture("t1", desc);
        let t2 = graph.add_transient_texture("t2", desc);

        graph.add_pass_fn("gfx0", RgJobType::Graphics, move |b| {
            b.write(x, DeviceResourceState::COLOR_TARGET);
        }, |_| {});
        let culling = graph.add_pass_fn("culling", RgJobType::Compute, move |b| {
            b.async_queue();
            b.write(t1, DeviceResourceState::STORAGE_TEXTURE_WRITE);
            b.side_effect();
        }, |_| {});
        let gfx1 = graph.add_pass_fn("gfx1", RgJobType::Graphics, move |b| {
            b.read(x, DeviceResourceState::SHADER_SAMPLED);
            b.write(t2, DeviceResourceState::STORAGE_TEXTURE_WRITE);
            b.side_effect();
        }, |_| {});
        (graph, t1, t2, culling, gfx1)
    };

    // t1 只在异步队列的第 0 层使用，t2 在主队列的第 1 层，两者之间没有任何同步
    let (mut graph, t1, t2, culling, gfx1) = build(true);
    let stats = graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    let compiled = graph.compiled().unwrap();
    assert_eq!(compiled.layer_of(culling), Some(0));
    assert_eq!(compiled.layer_of(gfx1), Some(1));
    assert_eq!(compiled.queue(culling), Some(RgQueue::AsyncCompute));
    assert_eq!(stats.queue_syncs, 0);
    assert!(!compiled.shares_physical(t1, t2));
    assert_eq!(stats.physical_allocations, 2);

    // 全部在主队列上时按层的顺序执行，可以共享
    let (mut graph, t1, t2, ..) = build(false);
    let stats = graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    assert!(graph.compiled().unwrap().shares_physical(t1, t2));
    assert_eq!(stats.physical_allocations, 1);
}

#[test]
fn test_aliasing_can_be_disabled() {
    let mut graph = RenderGraph::with_config(RgConfig {
        alias_transients: false,
        ..Default::default()
    });
    let t0 = graph.add_transient_texture("t0", tex_desc(4, 4));
    let t1 = graph.add_transient_texture("t1", tex_desc(4, 4));
    let p0 = graph.add_pass_fn("p0", RgJobType::Graphics, move |b| {
        b.write(t0, DeviceResourceState::COLOR_TARGET);
        b.side_effect();
    }, |_| {});
    let p1 = graph.add_pass_fn("p1", RgJobType::Graphics, move |b| {
        b.write(t1, DeviceResourceState::COLOR_TARGET);
        b.side_effect();
    }, |_| {});
    graph.add_ordering(p0, p1);

    let stats = graph.compile(&mut RgSequentialAllocator::new()).unwrap();
    assert_eq!(stats.physical_allocations, 2);
}

#[test]
fn test_async_compute_gets_queue_sync() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let buf = graph.add_transient_buffer(
        "particles",
        RgBufferDesc::new(4096, DeviceResourceState::STORAGE_BUFFER_WRITE | DeviceResourceState::VERTEX_BUFFER),
    );

    let clear = import_target(&mut graph, "clear", 2);

    let sim = graph.add_pass_fn("simulate", RgJobType::Compute, move |b| {
        b.write(buf, DeviceResourceState::STORAGE_BUFFER_WRITE);
        b.async_queue();
    }, |_| {});
    graph.add_pass_fn("clear", RgJobType::Graphics, move |b| {
        b.write(clear, DeviceResourceState::TRANSFER_DST);
        b.side_effect();
    }, |_| {});
    let draw = graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
        b.read(buf, DeviceResourceState::VERTEX_BUFFER);
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let mut rec = RgRecordingCommands::new();
    graph.execute(&mut alloc, &mut rec).unwrap();

    let compiled = graph.compiled().unwrap();
    assert_eq!(compiled.queue(sim), Some(RgQueue::AsyncCompute));
    assert_eq!(compiled.queue(draw), Some(RgQueue::Main));

    let waits: Vec<_> = rec.queue_waits().copied().collect();
    assert_eq!(
        waits,
        vec![RgQueueSync {
            producer: sim,
            consumer: draw,
            signal_queue: RgQueue::AsyncCompute,
            wait_queue: RgQueue::Main,
        }]
    );
    assert!(rec.commands.contains(&RgCommand::BeginPass {
        name: "simulate".to_string(),
        queue: RgQueue::AsyncCompute,
    }));

    // 第 0 层同时有主队列和异步队列的 Pass，barrier 按队列分批
    let layer0: Vec<_> = rec.barrier_batches().filter(|(l, _)| *l == Some(0)).map(|(_, b)| b.queue()).collect();
    assert_eq!(layer0, vec![RgQueue::Main, RgQueue::AsyncCompute]);
    let async_batch = rec.barrier_batch_on(0, RgQueue::AsyncCompute).unwrap();
    assert_eq!(async_batch.iter().map(|b| b.handle).collect::<Vec<_>>(), vec![buf]);
    let main_batch = rec.barrier_batch_on(0, RgQueue::Main).unwrap();
    assert_eq!(main_batch.iter().map(|b| b.handle).collect::<Vec<_>>(), vec![clear]);

    let layer1 = &compiled.layers()[1];
    assert_eq!(layer1.barriers.len(), 1);
    assert_eq!(layer1.barriers_on(RgQueue::Main).map(|b| b.len()), Some(2));
    assert!(layer1.barriers_on(RgQueue::AsyncCompute).is_none());
}

#[test]
fn test_dependent_texture_follows_reimport() {
    let mut graph = RenderGraph::new();
    let swapchain_desc = RgTextureDesc::new_2d(1280, 720, vk::Format::B8G8R8A8_UNORM, DeviceResourceState::COLOR_TARGET);
    let swapchain = graph.import_texture(
        "swapchain",
        PhysicalResourceId(1),
        swapchain_desc,
        DeviceResourceState::UNDEFINED,
        DeviceResourceState::PRESENT_TEXTURE,
    );
    let scene = graph.add_dependent_texture("scene", tex_desc(1, 1), RgTextureDependency::extent_of(swapchain));

    graph.add_pass_fn("scene", RgJobType::Graphics, move |b| {
        b.write(scene, DeviceResourceState::COLOR_TARGET);
    }, |_| {});
    graph.add_pass_fn("blit", RgJobType::Graphics, move |b| {
        b.read(scene, DeviceResourceState::SHADER_SAMPLED);
        b.write(swapchain, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let mut rec = RgRecordingCommands::new();
    graph.execute(&mut alloc, &mut rec).unwrap();
    let scene_extent = |graph: &RenderGraph<'_>, alloc: &RgSequentialAllocator| {
        let id = graph.compiled().unwrap().physical(scene).unwrap();
        match alloc.desc(id) {
            Some(RgTransientDesc::Texture(desc)) => (desc.extent.width, desc.extent.height, desc.format),
            other => panic!("unexpected allocation {other:?}"),
        }
    };
    assert_eq!(scene_extent(&graph, &alloc), (1280, 720, vk::Format::R16G16B16A16_SFLOAT));

    // 下一个 swapchain image 尺寸相同：只重新绑定
    assert!(graph.reimport_texture(swapchain, PhysicalResourceId(2), swapchain_desc));
    assert!(!graph.is_dirty());

    // 窗口大小变化：依赖的纹理重新分配
    let resized = RgTextureDesc {
        extent: RgExtent::new_2d(1920, 1080),
        ..swapchain_desc
    };
    assert!(graph.reimport_texture(swapchain, PhysicalResourceId(3), resized));
    assert!(graph.is_dirty());
    graph.execute(&mut alloc, &mut rec).unwrap();
    assert_eq!(scene_extent(&graph, &alloc), (1920, 1080, vk::Format::R16G16B16A16_SFLOAT));
    assert_eq!(alloc.live_count(), 1);
    assert_eq!(alloc.total_allocations(), 2);
    assert_eq!(graph.compiled().unwrap().physical(swapchain), Some(PhysicalResourceId(3)));

    assert!(!graph.reimport_texture(scene, PhysicalResourceId(4), resized));
}

#[test]
fn test_dependency_on_texture_without_description_is_rejected() {
    let mut graph = RenderGraph::new();
    let plain = import_target(&mut graph, "plain", 1);
    let t = graph.add_dependent_texture("t", tex_desc(8, 8), RgTextureDependency::extent_and_format_of(plain));
    graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
        b.write(t, DeviceResourceState::COLOR_TARGET);
        b.side_effect();
    }, |_| {});

    let err = graph.compile(&mut RgSequentialAllocator::new()).unwrap_err();
    match err {
        RgError::InvalidResourceDescriptor { resource, reason } => {
            assert_eq!(resource, "t");
            assert!(reason.contains("\"plain\""));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn test_imports_sharing_a_physical_resource_are_rejected() {
    let mut graph = RenderGraph::new();
    // 真实的 image 要等第一次 reimport 才知道，先用同一个占位标识
    let color = import_target(&mut graph, "color", 0);
    let depth = graph.import_resource(
        "depth",
        RgResourceKind::Texture,
        PhysicalResourceId(0),
        DeviceResourceState::DEPTH_STENCIL_TARGET,
        DeviceResourceState::UNDEFINED,
    );
    graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
        b.write(color, DeviceResourceState::COLOR_TARGET);
        b.write(depth, DeviceResourceState::DEPTH_STENCIL_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    match graph.compile(&mut alloc).unwrap_err() {
        RgError::DuplicateImport { first, second, physical } => {
            assert_eq!((first.as_str(), second.as_str()), ("color", "depth"));
            assert_eq!(physical, PhysicalResourceId(0));
        }
        other => panic!("unexpected error {other}"),
    }

    // 绑定真实资源之后各自跟踪状态：depth 已经在目标状态，不需要 barrier
    assert!(graph.reimport(color, PhysicalResourceId(10)));
    assert!(graph.reimport(depth, PhysicalResourceId(11)));
    graph.compile(&mut alloc).unwrap();
    let barriers: Vec<_> = graph.compiled().unwrap().layers()[0].all_barriers().map(|b| b.handle).collect();
    assert_eq!(barriers, vec![color]);
}

#[test]
fn test_cancel_stops_between_layers() {
    let cancel = AtomicBool::new(false);
    let executed = RefCell::new(Vec::new());

    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let t = graph.add_transient_texture("t", tex_desc(8, 8));
    graph.add_pass_fn(
        "first",
        RgJobType::Graphics,
        move |b| {
            b.write(t, DeviceResourceState::COLOR_TARGET);
        },
        |ctx| {
            executed.borrow_mut().push(ctx.pass_name().to_string());
            cancel.store(true, Ordering::Release);
        },
    );
    graph.add_pass_fn(
        "second",
        RgJobType::Graphics,
        move |b| {
            b.read(t, DeviceResourceState::SHADER_SAMPLED);
            b.write(out, DeviceResourceState::COLOR_TARGET);
        },
        |ctx| executed.borrow_mut().push(ctx.pass_name().to_string()),
    );

    let mut alloc = RgSequentialAllocator::new();
    let mut rec = RgRecordingCommands::new();
    let stats = graph.execute_with_cancel(&mut alloc, &mut rec, &cancel).unwrap();
    assert!(stats.cancelled);
    assert_eq!(stats.layers_executed, 1);
    assert_eq!(*executed.borrow(), vec!["first".to_string()]);
}

#[test]
fn test_removed_pass_triggers_recompile() {
    let mut graph = RenderGraph::new();
    let out = import_target(&mut graph, "out", 1);
    let extra = graph.add_pass_fn("extra", RgJobType::Graphics, |b| {
        b.side_effect();
    }, |_| {});
    graph.add_pass_fn("draw", RgJobType::Graphics, move |b| {
        b.write(out, DeviceResourceState::COLOR_TARGET);
    }, |_| {});

    let mut alloc = RgSequentialAllocator::new();
    let mut rec = RgRecordingCommands::new();
    graph.execute(&mut alloc, &mut rec).unwrap();
    assert_eq!(rec.pass_names(), vec!["extra", "draw"]);

    assert!(graph.remove_pass(extra));
    assert!(graph.is_dirty());
    rec.clear();
    graph.execute(&mut alloc, &mut rec).unwrap();
    assert_eq!(rec.pass_names(), vec!["draw"]);
}
