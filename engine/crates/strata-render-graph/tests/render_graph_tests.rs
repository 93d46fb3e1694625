use std::cell::Cell;

use ash::vk;

use strata_crate_tools::init_log::init_test_log;
use strata_gfx::headless::{GfxHeadlessDevice, GfxObjectKind, GfxRecordedCommand, GfxRecordingCommandBuffer};
use strata_gfx::resources::buffer::GfxBufferDesc;
use strata_gfx::resources::image::GfxImageDesc;
use strata_render_graph::{
    RenderGraph, RgBufferDesc, RgError, RgHazard, RgImageDesc, RgPass, RgPassContext, RgPassType, RgRenderPass,
    RgResourceIndex, RgResourceState, RgSettings,
};
use strata_render_interface::gfx_resource_manager::GfxResourceManager;
use strata_render_interface::handles::GfxImageHandle;

const FIF: usize = 2;

struct Harness {
    device: GfxHeadlessDevice,
    manager: GfxResourceManager,
    cmd: GfxRecordingCommandBuffer,
}

impl Harness {
    fn new() -> Self {
        init_test_log();
        Self {
            device: GfxHeadlessDevice::new(FIF),
            manager: GfxResourceManager::new(FIF),
            cmd: GfxRecordingCommandBuffer::new("frame"),
        }
    }

    fn finish(mut self, graph: &mut RenderGraph<'_>) {
        graph.destroy(&mut self.device);
        self.manager.destroy_all(&mut self.device);
        assert_eq!(self.device.total_live_count(), 0, "device objects leaked");
        assert_eq!(self.device.invalid_destroy_count(), 0);
    }
}

fn no_timers() -> RgSettings {
    RgSettings {
        gpu_timers: false,
        ..Default::default()
    }
}

#[test]
fn single_pass_transitions_colour_target_from_undefined() {
    let mut h = Harness::new();
    let camera = h
        .manager
        .create_buffer(&mut h.device, &GfxBufferDesc::new(64, vk::BufferUsageFlags::UNIFORM_BUFFER), "camera")
        .expect("camera buffer");

    let calls = Cell::new(0);
    let mut graph = RenderGraph::new(no_timers());
    graph.add_image_resource("color", RgImageDesc::new_2d(512, 512, vk::Format::R8G8B8A8_UNORM), None);
    graph.add_buffer_resource(
        "camera",
        RgBufferDesc::new(64, vk::BufferUsageFlags::UNIFORM_BUFFER),
        Some(camera.clone()),
    );
    graph
        .add_pass("draw", RgPassType::Graphics)
        .add_colour_write("color")
        .add_uniform_buffer_read("camera", vk::PipelineStageFlags2::FRAGMENT_SHADER)
        .set_execute_function(|ctx| {
            calls.set(calls.get() + 1);
            assert_eq!(ctx.extent(), vk::Extent2D { width: 512, height: 512 });
            assert!(ctx.image_view("color").is_some());
            assert!(ctx.vk_buffer("camera").is_some());
            ctx.cmd.draw(3, 1, 0, 0);
        });

    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    let barriers = graph.barriers("draw").expect("draw is compiled");
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].resource, graph.resource_index("color").expect("color"));
    assert_eq!(barriers[0].src.layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barriers[0].dst, RgResourceState::COLOR_ATTACHMENT_WRITE);

    graph.execute(&mut h.cmd).expect("execute");
    assert_eq!(calls.get(), 1);
    assert_eq!(h.cmd.labels(), vec!["draw"]);
    assert_eq!(h.cmd.render_pass_count(), 1);

    let recorded = h.cmd.barrier_commands();
    assert_eq!(recorded.len(), 1);
    let (image_barriers, buffer_barriers) = recorded[0];
    assert_eq!(image_barriers.len(), 1);
    assert!(buffer_barriers.is_empty());
    assert_eq!(image_barriers[0].inner().old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(image_barriers[0].inner().new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    drop(camera);
    h.finish(&mut graph);
}

#[test]
fn sampled_read_after_colour_write_gets_one_barrier() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    graph.add_image_resource("normal", RgImageDesc::new_2d(256, 256, vk::Format::R16G16B16A16_SFLOAT), None);
    graph.add_pass("gbuffer", RgPassType::Graphics).add_colour_write("normal");
    graph
        .add_pass("lighting", RgPassType::Graphics)
        .add_sampled_image_read("normal", vk::PipelineStageFlags2::FRAGMENT_SHADER);

    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    let barriers = graph.barriers("lighting").expect("lighting is compiled");
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src, RgResourceState::COLOR_ATTACHMENT_WRITE);
    assert_eq!(barriers[0].dst, RgResourceState::sampled_read(vk::PipelineStageFlags2::FRAGMENT_SHADER));
    assert!(barriers[0].is_layout_transition());

    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

#[test]
fn second_reader_with_same_layout_needs_no_barrier() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    graph.add_image_resource("normal", RgImageDesc::new_2d(256, 256, vk::Format::R16G16B16A16_SFLOAT), None);
    graph.add_pass("gbuffer", RgPassType::Graphics).add_colour_write("normal");
    graph
        .add_pass("lighting", RgPassType::Graphics)
        .add_sampled_image_read("normal", vk::PipelineStageFlags2::FRAGMENT_SHADER);
    graph
        .add_pass("ssao", RgPassType::Graphics)
        .add_sampled_image_read("normal", vk::PipelineStageFlags2::FRAGMENT_SHADER);
    // 新的 stage 需要把可见性扩展过去，但不需要 layout 变化
    graph
        .add_pass("denoise", RgPassType::Compute)
        .add_sampled_image_read("normal", vk::PipelineStageFlags2::COMPUTE_SHADER);

    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    assert!(graph.barriers("ssao").expect("ssao").is_empty());

    let widen = graph.barriers("denoise").expect("denoise");
    assert_eq!(widen.len(), 1);
    assert!(!widen[0].is_layout_transition());
    assert_eq!(widen[0].src.access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);

    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

#[test]
fn unregistered_label_fails_compile_and_skips_execute() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(RgSettings::default());
    graph.add_image_resource("color", RgImageDesc::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM), None);
    graph
        .add_pass("post", RgPassType::Graphics)
        .add_sampled_image_read("bloom", vk::PipelineStageFlags2::FRAGMENT_SHADER)
        .add_colour_write("color");

    let err = graph.compile(&mut h.device, &mut h.manager).expect_err("bloom was never registered");
    match err {
        RgError::UnresolvedResource { pass, label } => {
            assert_eq!(pass, "post");
            assert_eq!(label, "bloom");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(graph.execute(&mut h.cmd), Err(RgError::NotCompiled)));
    assert!(h.cmd.commands().is_empty());
    h.finish(&mut graph);
}

#[test]
fn buffer_access_on_image_is_rejected() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    graph.add_image_resource("color", RgImageDesc::new_2d(64, 64, vk::Format::R8G8B8A8_UNORM), None);
    graph
        .add_pass("cull", RgPassType::Compute)
        .add_storage_buffer_write("color", vk::PipelineStageFlags2::COMPUTE_SHADER);

    let err = graph.compile(&mut h.device, &mut h.manager).expect_err("kind mismatch");
    assert!(matches!(err, RgError::ResourceKindMismatch { expected: "buffer", .. }));
    h.finish(&mut graph);
}

#[test]
fn cyclic_alias_chain_fails_compile() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    assert_eq!(graph.add_alias("a", "b"), None);
    assert_eq!(graph.add_alias("b", "a"), None);
    graph
        .add_pass("loop", RgPassType::Compute)
        .add_storage_image_read("a", vk::PipelineStageFlags2::COMPUTE_SHADER);

    let err = graph.compile(&mut h.device, &mut h.manager).expect_err("cycle");
    assert!(matches!(err, RgError::CyclicAlias { .. }));
    h.finish(&mut graph);
}

#[test]
fn alias_resolves_to_the_same_physical_image() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    let hdr = graph.add_image_resource("hdr", RgImageDesc::new_2d(128, 128, vk::Format::R16G16B16A16_SFLOAT), None);
    assert_eq!(graph.add_alias("hdr", "hdr_tonemapped"), Some(hdr));
    // 别名可以指向别名，也可以在目标声明之前声明
    assert_eq!(graph.add_alias("hdr_tonemapped", "final"), Some(hdr));
    assert_eq!(graph.add_alias("late", "late_alias"), None);
    graph.add_buffer_resource("late", RgBufferDesc::new(16, vk::BufferUsageFlags::STORAGE_BUFFER), None);

    graph
        .add_pass("lighting", RgPassType::Compute)
        .add_storage_image_write("hdr", vk::PipelineStageFlags2::COMPUTE_SHADER)
        .add_storage_buffer_write("late_alias", vk::PipelineStageFlags2::COMPUTE_SHADER);
    graph
        .add_pass("tonemap", RgPassType::Compute)
        .add_storage_image_write("hdr_tonemapped", vk::PipelineStageFlags2::COMPUTE_SHADER);
    graph
        .add_pass("present", RgPassType::Transfer)
        .add_blit_read("final");

    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    let original = graph.get_image("hdr").expect("hdr is bound");
    assert_eq!(graph.get_image("hdr_tonemapped"), Some(original.clone()));
    assert_eq!(graph.get_image("final"), Some(original.clone()));
    assert_eq!(graph.get_image(hdr), Some(original));
    assert!(graph.get_buffer("late_alias").is_some());

    // 第二次写同一个资源需要等待第一次写入
    let tonemap = graph.barriers("tonemap").expect("tonemap");
    assert_eq!(tonemap.len(), 1);
    assert_eq!(tonemap[0].src.access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(graph.barriers("present").expect("present")[0].dst, RgResourceState::BLIT_SRC);

    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

fn declare_frame(graph: &mut RenderGraph<'_>) {
    graph.add_image_resource("albedo", RgImageDesc::new_2d(320, 180, vk::Format::R8G8B8A8_UNORM), None);
    graph.add_image_resource("depth", RgImageDesc::new_2d(320, 180, vk::Format::D32_SFLOAT), None);
    graph.add_image_resource("lit", RgImageDesc::new_2d(320, 180, vk::Format::R16G16B16A16_SFLOAT), None);
    graph
        .add_pass("gbuffer", RgPassType::Graphics)
        .add_colour_write("albedo")
        .add_depth_write("depth");
    graph
        .add_pass("lighting", RgPassType::Compute)
        .add_sampled_image_read("albedo", vk::PipelineStageFlags2::COMPUTE_SHADER)
        .add_sampled_image_read("depth", vk::PipelineStageFlags2::COMPUTE_SHADER)
        .add_storage_image_write("lit", vk::PipelineStageFlags2::COMPUTE_SHADER);
}

fn barrier_shape(
    graph: &RenderGraph<'_>,
    pass: &str,
) -> Vec<(RgResourceIndex, RgResourceState, vk::ImageLayout)> {
    graph.barriers(pass).expect("pass is compiled").iter().map(|b| (b.resource, b.dst, b.src.layout)).collect()
}

#[test]
fn reset_and_redeclare_reproduces_the_same_compiled_graph() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());

    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("first compile");
    let order: Vec<String> = graph.execution_order().iter().map(|s| s.to_string()).collect();
    let gbuffer = barrier_shape(&graph, "gbuffer");
    let lighting = barrier_shape(&graph, "lighting");
    let albedo = graph.get_image("albedo").expect("albedo");
    graph.execute(&mut h.cmd).expect("execute");
    let images_after_first = h.device.live_count(GfxObjectKind::Image);

    graph.reset();
    assert_eq!(graph.pass_count(), 0);
    assert!(!graph.is_compiled());

    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("second compile");
    assert_eq!(graph.execution_order(), order.iter().map(String::as_str).collect::<Vec<_>>());
    // src 的 stage 会带上上一帧的使用，其余部分与第一帧一致
    assert_eq!(barrier_shape(&graph, "gbuffer"), gbuffer);
    assert_eq!(barrier_shape(&graph, "lighting"), lighting);

    // 同名的临时资源复用上一帧的物理资源
    assert_eq!(graph.get_image("albedo"), Some(albedo));
    assert_eq!(h.device.live_count(GfxObjectKind::Image), images_after_first);
    assert_eq!(graph.framebuffer_cache().framebuffer_count(), 1);

    h.cmd.reset();
    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

#[test]
fn reused_transient_waits_for_last_frame_readers() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());

    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("first compile");
    let albedo_index = graph.resource_index("albedo").expect("albedo");
    let first = graph.barriers("gbuffer").expect("gbuffer").iter().find(|b| b.resource == albedo_index).copied();
    let first = first.expect("albedo barrier");
    assert!(!first.src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    let albedo = graph.get_image("albedo").expect("albedo");
    graph.execute(&mut h.cmd).expect("execute");

    graph.reset();
    h.cmd.reset();
    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("second compile");
    assert_eq!(graph.get_image("albedo"), Some(albedo));

    // 上一帧 lighting 在 compute 里采样 albedo，本帧 gbuffer 的写入要等它结束
    let albedo_index = graph.resource_index("albedo").expect("albedo");
    let barriers = graph.barriers("gbuffer").expect("gbuffer");
    let second = barriers.iter().find(|b| b.resource == albedo_index).expect("albedo barrier");
    assert!(second.src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    assert_eq!(second.src.layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(second.dst, RgResourceState::COLOR_ATTACHMENT_WRITE);

    // 上一帧的 storage 写入也要在本帧覆盖之前完成
    let lit_index = graph.resource_index("lit").expect("lit");
    let barriers = graph.barriers("lighting").expect("lighting");
    let lit = barriers.iter().find(|b| b.resource == lit_index).expect("lit barrier");
    assert!(lit.src.stage.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    assert!(lit.src.access.contains(vk::AccessFlags2::SHADER_STORAGE_WRITE));
    assert_eq!(lit.src.layout, vk::ImageLayout::UNDEFINED);

    graph.execute(&mut h.cmd).expect("execute");
    let recorded = h.cmd.barrier_commands();
    let (image_barriers, _) = recorded[0];
    let to_attachment = image_barriers
        .iter()
        .find(|b| b.inner().new_layout == vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .expect("albedo transition");
    assert!(to_attachment.inner().src_stage_mask.contains(vk::PipelineStageFlags2::COMPUTE_SHADER));
    assert_eq!(to_attachment.inner().old_layout, vk::ImageLayout::UNDEFINED);

    h.finish(&mut graph);
}

#[test]
fn execute_twice_without_recompile_is_rejected() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("first execute");

    let recorded = h.cmd.commands().len();
    assert!(matches!(graph.execute(&mut h.cmd), Err(RgError::NotCompiled)));
    assert_eq!(h.cmd.commands().len(), recorded);
    h.finish(&mut graph);
}

#[test]
fn persistent_resource_carries_its_state_into_the_next_frame() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    let history_desc = RgImageDesc::new_2d(64, 64, vk::Format::R16G16B16A16_SFLOAT).persistent();

    graph.add_image_resource("history", history_desc.clone(), None);
    graph
        .add_pass("accumulate", RgPassType::Compute)
        .add_storage_image_write("history", vk::PipelineStageFlags2::COMPUTE_SHADER);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");
    graph.reset();

    graph.add_image_resource("history", history_desc, None);
    graph
        .add_pass("resolve", RgPassType::Compute)
        .add_storage_image_read("history", vk::PipelineStageFlags2::COMPUTE_SHADER);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    // 上一帧的写入作为初始状态，不是保守的全屏障
    let barriers = graph.barriers("resolve").expect("resolve");
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src.access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
    assert_eq!(barriers[0].src.layout, vk::ImageLayout::GENERAL);
    assert_ne!(barriers[0].dst.stage, vk::PipelineStageFlags2::ALL_COMMANDS);

    h.cmd.reset();
    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

#[test]
fn read_without_writer_gets_a_conservative_barrier() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    graph.add_buffer_resource("lights", RgBufferDesc::new(1024, vk::BufferUsageFlags::STORAGE_BUFFER), None);
    graph
        .add_pass("shade", RgPassType::Compute)
        .add_storage_buffer_read("lights", vk::PipelineStageFlags2::COMPUTE_SHADER);

    graph.compile(&mut h.device, &mut h.manager).expect("compile still succeeds");
    let barriers = graph.barriers("shade").expect("shade");
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src, RgResourceState::CONSERVATIVE_SRC);
    assert_eq!(barriers[0].dst.stage, vk::PipelineStageFlags2::ALL_COMMANDS);

    graph.execute(&mut h.cmd).expect("execute");
    let recorded = h.cmd.barrier_commands();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].1.len(), 1);
    h.finish(&mut graph);
}

#[test]
fn imported_resource_with_explicit_initial_state() {
    let mut h = Harness::new();
    let swapchain = h
        .manager
        .create_image(
            &mut h.device,
            &GfxImageDesc::new_2d(800, 600, vk::Format::B8G8R8A8_SRGB, vk::ImageUsageFlags::TRANSFER_DST),
            "swapchain",
        )
        .expect("swapchain image");

    let mut graph = RenderGraph::new(no_timers());
    graph.add_image_resource("color", RgImageDesc::swapchain_relative(vk::Format::R8G8B8A8_UNORM), None);
    graph.add_image_resource(
        "swapchain",
        RgImageDesc::new_2d(800, 600, vk::Format::B8G8R8A8_SRGB),
        Some(swapchain.clone()),
    );
    assert!(graph.set_initial_state("swapchain", RgResourceState::PRESENT));
    assert!(!graph.set_initial_state("missing", RgResourceState::PRESENT));
    graph.set_backbuffer("swapchain");

    graph.add_pass("draw", RgPassType::Graphics).add_colour_write("color");
    graph
        .add_pass("blit", RgPassType::Transfer)
        .add_blit_read("color")
        .add_blit_write("swapchain");

    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    // swapchain 大小来自 backbuffer 的实际尺寸
    let color = graph.get_image("color").expect("color");
    let color_desc = h.manager.get_image(&color).expect("live").desc().clone();
    assert_eq!((color_desc.width, color_desc.height), (800, 600));
    assert!(color_desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
    assert_eq!(graph.get_image("swapchain"), Some(swapchain.clone()));

    let blit = graph.barriers("blit").expect("blit");
    let to_dst = blit.iter().find(|b| b.dst == RgResourceState::BLIT_DST).expect("swapchain barrier");
    assert_eq!(to_dst.src.layout, vk::ImageLayout::PRESENT_SRC_KHR);

    graph.execute(&mut h.cmd).expect("execute");
    assert_eq!(
        graph.resources().get(graph.resource_index("swapchain").expect("swapchain")).map(|r| r.current_state()),
        Some(RgResourceState::BLIT_DST)
    );

    drop(color);
    drop(swapchain);
    h.finish(&mut graph);
}

fn blit_into(graph: &mut RenderGraph<'_>, image: GfxImageHandle) {
    graph.add_image_resource("ext", RgImageDesc::new_2d(128, 128, vk::Format::R8G8B8A8_UNORM), Some(image));
    graph.add_image_resource("source", RgImageDesc::new_2d(128, 128, vk::Format::R8G8B8A8_UNORM), None);
    graph.add_pass("fill", RgPassType::Graphics).add_colour_write("source");
    graph
        .add_pass("copy", RgPassType::Transfer)
        .add_blit_read("source")
        .add_blit_write("ext");
}

fn create_external_image(h: &mut Harness, name: &str) -> GfxImageHandle {
    h.manager
        .create_image(
            &mut h.device,
            &GfxImageDesc::new_2d(
                128,
                128,
                vk::Format::R8G8B8A8_UNORM,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            ),
            name,
        )
        .expect("external image")
}

#[test]
fn imported_image_is_released_on_reset() {
    let mut h = Harness::new();
    let ext = create_external_image(&mut h, "ext");
    let raw = h.manager.get_image(&ext).map(|i| i.handle()).expect("live");

    let mut graph = RenderGraph::new(no_timers());
    blit_into(&mut graph, ext.clone());
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");
    h.device.advance_frame();

    graph.reset();
    assert!(graph.resource_index("ext").is_none());
    assert_eq!(graph.get_image("ext"), None);

    // 持有者放手之后，graph 不能再让它存活
    drop(ext);
    for _ in 0..FIF {
        h.manager.cleanup(&mut h.device);
        assert!(h.device.is_alive(vk::Handle::as_raw(raw)));
    }
    h.manager.cleanup(&mut h.device);
    assert!(!h.device.is_alive(vk::Handle::as_raw(raw)));

    h.finish(&mut graph);
}

#[test]
fn reimported_image_keeps_its_state_only_for_the_same_object() {
    let mut h = Harness::new();
    let ext = create_external_image(&mut h, "ext");
    let other = create_external_image(&mut h, "other");

    let mut graph = RenderGraph::new(no_timers());
    blit_into(&mut graph, ext.clone());
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");
    graph.reset();

    // 同一个 image：上一帧的 blit 写入就是初始状态
    graph.add_image_resource("ext", RgImageDesc::new_2d(128, 128, vk::Format::R8G8B8A8_UNORM), Some(ext.clone()));
    graph
        .add_pass("present", RgPassType::Graphics)
        .add_sampled_image_read("ext", vk::PipelineStageFlags2::FRAGMENT_SHADER);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    let barriers = graph.barriers("present").expect("present");
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src, RgResourceState::BLIT_DST);
    h.cmd.reset();
    graph.execute(&mut h.cmd).expect("execute");
    graph.reset();

    // 同名但换了 image：不能沿用上一个 image 的 layout
    blit_into(&mut graph, other.clone());
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    let ext_index = graph.resource_index("ext").expect("ext");
    let barriers = graph.barriers("copy").expect("copy");
    let to_dst = barriers.iter().find(|b| b.resource == ext_index).expect("ext barrier");
    assert_eq!(to_dst.src.layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(to_dst.src.access, vk::AccessFlags2::NONE);
    h.cmd.reset();
    graph.execute(&mut h.cmd).expect("execute");

    drop(ext);
    drop(other);
    h.finish(&mut graph);
}

#[test]
fn allocation_failure_fails_compile_for_this_frame_only() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    declare_frame(&mut graph);

    h.device.fail_next_allocations(1);
    let err = graph.compile(&mut h.device, &mut h.manager).expect_err("out of memory");
    assert!(matches!(err, RgError::Allocation { .. }));
    assert!(matches!(graph.execute(&mut h.cmd), Err(RgError::NotCompiled)));
    assert!(h.cmd.commands().is_empty());

    // 下一帧恢复正常
    graph.reset();
    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");
    h.finish(&mut graph);
}

#[test]
fn gpu_timers_cover_every_pass_in_the_current_slot() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(RgSettings::default());
    declare_frame(&mut graph);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");

    let slot = 0;
    let timers = graph.get_timers(slot);
    let labels: Vec<&str> = timers.iter().map(|t| t.label()).collect();
    assert_eq!(labels, vec!["gbuffer", "lighting"]);
    assert_eq!((timers[1].begin_query(), timers[1].end_query()), (2, 3));
    for timer in timers {
        let ms = timer.elapsed_ms(&h.device).expect("timestamps");
        assert!(ms > 0.0);
    }
    assert!(graph.get_timers(1).is_empty());

    let timestamps = h
        .cmd
        .commands()
        .iter()
        .filter(|c| matches!(c, GfxRecordedCommand::WriteTimestamp { .. }))
        .count();
    assert_eq!(timestamps, 4);
    assert!(matches!(h.cmd.commands()[0], GfxRecordedCommand::ResetQueryPool { query_count: 4, .. }));
    h.finish(&mut graph);
}

fn resize_frame(graph: &mut RenderGraph<'_>, h: &mut Harness) {
    h.manager.cleanup(&mut h.device);
    graph.reset();
    graph.add_image_resource("scene", RgImageDesc::swapchain_relative(vk::Format::R8G8B8A8_UNORM), None);
    graph.set_backbuffer("scene");
    graph.add_pass("draw", RgPassType::Graphics).add_colour_write("scene");
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    h.cmd.reset();
    graph.execute(&mut h.cmd).expect("execute");
    h.device.advance_frame();
}

#[test]
fn backbuffer_resize_reallocates_and_defers_destruction() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());


    graph.set_backbuffer_dimensions(640, 360);
    resize_frame(&mut graph, &mut h);
    resize_frame(&mut graph, &mut h);
    let small = graph.get_image("scene").expect("scene");
    assert_eq!(h.manager.get_image(&small).map(|i| (i.desc().width, i.desc().height)), Some((640, 360)));
    assert_eq!(graph.framebuffer_cache().framebuffer_count(), 1);
    let raw_small = h.manager.get_image(&small).map(|i| i.handle()).expect("live");
    drop(small);

    graph.set_backbuffer_dimensions(1280, 720);
    resize_frame(&mut graph, &mut h);
    let large = graph.get_image("scene").expect("scene");
    assert_eq!(h.manager.get_image(&large).map(|i| (i.desc().width, i.desc().height)), Some((1280, 720)));
    drop(large);

    // 旧尺寸 image 已经被释放，它的 framebuffer 不再参与查找
    assert_eq!(graph.framebuffer_cache().framebuffer_count(), 1);
    assert_eq!(graph.framebuffer_cache().retired_framebuffer_count(), 1);

    // 旧的物理资源在 frames_in_flight + 1 帧之后才销毁
    assert_eq!(h.device.live_count(GfxObjectKind::Image), 2);
    h.manager.cleanup(&mut h.device);
    h.manager.cleanup(&mut h.device);
    assert!(h.device.is_alive(vk::Handle::as_raw(raw_small)));
    h.manager.cleanup(&mut h.device);
    assert!(!h.device.is_alive(vk::Handle::as_raw(raw_small)));
    assert_eq!(h.device.live_count(GfxObjectKind::Image), 1);

    // 旧尺寸的 framebuffer 在超过 frames_in_flight + 1 次编译没有使用后被销毁
    for _ in 0..FIF + 2 {
        resize_frame(&mut graph, &mut h);
    }
    assert_eq!(graph.framebuffer_cache().framebuffer_count(), 1);
    assert_eq!(graph.framebuffer_cache().retired_framebuffer_count(), 0);
    assert_eq!(graph.framebuffer_cache().render_pass_count(), 1);

    h.finish(&mut graph);
}

struct BlurPass<'a> {
    radius: u32,
    executed: &'a Cell<u32>,
}

impl RgRenderPass for BlurPass<'_> {
    fn setup(&mut self, pass: &mut RgPass<'_>) {
        pass.add_sampled_image_read("lit", vk::PipelineStageFlags2::COMPUTE_SHADER)
            .add_storage_image_write("blurred", vk::PipelineStageFlags2::COMPUTE_SHADER);
    }

    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        assert_eq!(ctx.label(), "blur");
        assert!(ctx.get_image("blurred").is_some());
        ctx.cmd.dispatch(glam::UVec3::new(self.radius, 1, 1));
        self.executed.set(self.executed.get() + 1);
    }
}

#[test]
fn render_pass_objects_are_set_up_and_executed() {
    let mut h = Harness::new();
    let executed = Cell::new(0);
    let mut graph = RenderGraph::new(no_timers());
    declare_frame(&mut graph);
    graph.add_image_resource("blurred", RgImageDesc::new_2d(320, 180, vk::Format::R16G16B16A16_SFLOAT), None);
    graph.add_render_pass(
        "blur",
        RgPassType::Compute,
        BlurPass {
            radius: 4,
            executed: &executed,
        },
    );

    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.execute(&mut h.cmd).expect("execute");

    assert_eq!(executed.get(), 1);
    assert!(
        h.cmd
            .commands()
            .iter()
            .any(|c| matches!(c, GfxRecordedCommand::Dispatch(groups) if groups.x == 4))
    );
    assert_eq!(h.cmd.labels(), vec!["gbuffer", "lighting", "blur"]);
    h.finish(&mut graph);
}

#[test]
fn dependency_graph_reports_hazards_between_passes() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(no_timers());
    declare_frame(&mut graph);
    graph.add_image_resource("blurred", RgImageDesc::new_2d(320, 180, vk::Format::R16G16B16A16_SFLOAT), None);
    graph
        .add_pass("blur", RgPassType::Compute)
        .add_sampled_image_read("lit", vk::PipelineStageFlags2::COMPUTE_SHADER)
        .add_storage_image_write("blurred", vk::PipelineStageFlags2::COMPUTE_SHADER);
    graph.compile(&mut h.device, &mut h.manager).expect("compile");

    let deps = graph.dependency_graph().expect("compiled");
    assert_eq!(deps.pass_count(), 3);
    let edge = deps.edge(0, 1).expect("gbuffer -> lighting");
    assert!(edge.hazards.iter().all(|(hazard, _)| *hazard == RgHazard::ReadAfterWrite));
    assert_eq!(edge.hazards.len(), 2);
    assert!(deps.edge(1, 2).is_some());
    assert!(deps.edge(0, 2).is_none());
    assert_eq!(deps.topological_order(), Some(vec![0, 1, 2]));
    assert!(deps.to_dot().contains("RAW"));

    h.finish(&mut graph);
}

#[test]
fn execution_plan_can_be_printed_after_compile() {
    let mut h = Harness::new();
    let mut graph = RenderGraph::new(RgSettings {
        gpu_timers: false,
        print_execution_plan: true,
    });
    declare_frame(&mut graph);
    graph.print_execution_plan();
    graph.compile(&mut h.device, &mut h.manager).expect("compile");
    graph.print_execution_plan();
    h.finish(&mut graph);
}
