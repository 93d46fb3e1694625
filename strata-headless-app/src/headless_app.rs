use anyhow::Context;
use ash::vk;

use strata_crate_tools::config::StrataConfig;
use strata_gfx::device::GfxDevice;
use strata_gfx::headless::{GfxHeadlessDevice, GfxRecordingCommandBuffer};
use strata_gfx::resources::buffer::GfxBufferDesc;
use strata_gfx::resources::image::GfxImageDesc;
use strata_render_graph::{RenderGraph, RgBufferDesc, RgImageDesc, RgPassType, RgResourceState, RgSettings};
use strata_render_interface::frame_counter::FrameCounter;
use strata_render_interface::gfx_resource_manager::GfxResourceManager;
use strata_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

use crate::passes::{BlitToSwapchainPass, GBufferPass, LightingPass, TonemapPass};

const INDEX_COUNT: u32 = 36;

/// 场景用到的、由 app 自己持有的 buffer
struct SceneBuffers {
    camera: GfxBufferHandle,
    vertices: GfxBufferHandle,
    indices: GfxBufferHandle,
}

pub struct HeadlessApp {
    device: GfxHeadlessDevice,
    resource_manager: GfxResourceManager,
    frame_counter: FrameCounter,
    cmd: GfxRecordingCommandBuffer,

    render_graph: RenderGraph<'static>,
    backbuffer_extent: (u32, u32),
    swapchain_image: Option<GfxImageHandle>,
    scene: Option<SceneBuffers>,

    skipped_frames: u64,
}
// new & init
impl HeadlessApp {
    pub fn new(config: &StrataConfig) -> anyhow::Result<Self> {
        let frames_in_flight = config.frames.frames_in_flight;
        let mut device = GfxHeadlessDevice::new(frames_in_flight);
        let mut resource_manager = GfxResourceManager::new(frames_in_flight);

        let scene = Self::create_scene_buffers(&mut device, &mut resource_manager)?;
        let settings = RgSettings {
            gpu_timers: config.render_graph.gpu_timers,
            print_execution_plan: config.render_graph.print_execution_plan,
        };
        log::info!(
            "headless app: {} frames in flight, backbuffer {}x{}",
            frames_in_flight,
            config.backbuffer.width,
            config.backbuffer.height
        );

        let mut app = Self {
            device,
            resource_manager,
            frame_counter: FrameCounter::new(0, frames_in_flight),
            cmd: GfxRecordingCommandBuffer::new("headless-frame"),
            render_graph: RenderGraph::new(settings),
            backbuffer_extent: (config.backbuffer.width, config.backbuffer.height),
            swapchain_image: None,
            scene: Some(scene),
            skipped_frames: 0,
        };
        app.recreate_swapchain_image()?;
        Ok(app)
    }

    fn create_scene_buffers(
        device: &mut GfxHeadlessDevice,
        resource_manager: &mut GfxResourceManager,
    ) -> anyhow::Result<SceneBuffers> {
        let camera = resource_manager
            .create_buffer(device, &GfxBufferDesc::new(256, vk::BufferUsageFlags::UNIFORM_BUFFER), "camera")
            .context("create camera buffer")?;
        let vertices = resource_manager
            .create_buffer(device, &GfxBufferDesc::new(24 * 32, vk::BufferUsageFlags::VERTEX_BUFFER), "cube-vertices")
            .context("create vertex buffer")?;
        let indices = resource_manager
            .create_buffer(
                device,
                &GfxBufferDesc::new(INDEX_COUNT as u64 * 4, vk::BufferUsageFlags::INDEX_BUFFER),
                "cube-indices",
            )
            .context("create index buffer")?;
        Ok(SceneBuffers {
            camera,
            vertices,
            indices,
        })
    }

    /// 模拟 swapchain 重建：旧的 image 交给 resource manager 延迟销毁
    fn recreate_swapchain_image(&mut self) -> anyhow::Result<()> {
        let (width, height) = self.backbuffer_extent;
        let desc = GfxImageDesc::new_2d(
            width,
            height,
            vk::Format::B8G8R8A8_SRGB,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
        );
        let image = self
            .resource_manager
            .create_image(&mut self.device, &desc, "swapchain")
            .context("create swapchain image")?;
        self.swapchain_image = Some(image);
        self.render_graph.set_backbuffer_dimensions(width, height);
        Ok(())
    }
}
// frame loop
impl HeadlessApp {
    pub fn run(&mut self, frame_count: u64) -> anyhow::Result<()> {
        for frame in 0..frame_count {
            if frame == frame_count / 2 && frame > 0 {
                let (width, height) = self.backbuffer_extent;
                self.resize(width * 3 / 2, height * 3 / 2)?;
            }
            self.render_frame()?;
        }

        let stats = self.resource_manager.stats();
        log::info!(
            "headless app: rendered {} frames ({} skipped), live images {}, pending destroy {}",
            frame_count,
            self.skipped_frames,
            stats.images.live,
            stats.images.pending_destroy
        );
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        log::info!("headless app: resize {:?} -> {}x{}", self.backbuffer_extent, width, height);
        self.backbuffer_extent = (width, height);
        self.recreate_swapchain_image()
    }

    fn render_frame(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("HeadlessApp::render_frame");
        let frame_name = self.frame_counter.frame_name();

        self.resource_manager.cleanup(&mut self.device);
        self.render_graph.reset();
        self.cmd.reset();

        self.declare_graph().context("declare render graph")?;
        match self.render_graph.compile(&mut self.device, &mut self.resource_manager) {
            Ok(()) => {
                self.render_graph.execute(&mut self.cmd).context("execute render graph")?;
                log::debug!("{}: {}", frame_name, self.cmd.summary());
                self.report_timers(&frame_name);
            }
            Err(err) => {
                // 本帧跳过，下一帧重新声明
                log::error!("{}: render graph compile failed, frame skipped: {}", frame_name, err);
                self.skipped_frames += 1;
            }
        }

        self.device.advance_frame();
        self.frame_counter.next_frame();
        Ok(())
    }

    fn declare_graph(&mut self) -> anyhow::Result<()> {
        let swapchain = self.swapchain_image.clone().context("swapchain image is missing")?;
        let scene = self.scene.as_ref().context("scene buffers are destroyed")?;
        let graph = &mut self.render_graph;

        graph.add_buffer_resource(
            "camera",
            RgBufferDesc::new(256, vk::BufferUsageFlags::UNIFORM_BUFFER),
            Some(scene.camera.clone()),
        );
        graph.add_buffer_resource(
            "vertices",
            RgBufferDesc::new(24 * 32, vk::BufferUsageFlags::VERTEX_BUFFER),
            Some(scene.vertices.clone()),
        );
        graph.add_buffer_resource(
            "indices",
            RgBufferDesc::new(INDEX_COUNT as u64 * 4, vk::BufferUsageFlags::INDEX_BUFFER),
            Some(scene.indices.clone()),
        );

        let (width, height) = self.backbuffer_extent;
        graph.add_image_resource(
            "swapchain",
            RgImageDesc::new_2d(width, height, vk::Format::B8G8R8A8_SRGB),
            Some(swapchain),
        );
        // presentation engine 交回来的 image 处于 present layout
        graph.set_initial_state("swapchain", RgResourceState::PRESENT);
        graph.set_backbuffer("swapchain");

        graph.add_image_resource("albedo", RgImageDesc::swapchain_relative(vk::Format::R8G8B8A8_UNORM), None);
        graph.add_image_resource("normal", RgImageDesc::swapchain_relative(vk::Format::R16G16B16A16_SFLOAT), None);
        graph.add_image_resource("depth", RgImageDesc::swapchain_relative(vk::Format::D32_SFLOAT), None);
        graph.add_image_resource("hdr", RgImageDesc::swapchain_relative(vk::Format::R16G16B16A16_SFLOAT), None);
        graph.add_alias("hdr", "hdr_tonemapped");

        graph.add_render_pass(
            "gbuffer",
            RgPassType::Graphics,
            GBufferPass {
                index_count: INDEX_COUNT,
            },
        );
        graph.add_render_pass("lighting", RgPassType::Compute, LightingPass);
        graph.add_render_pass("tonemap", RgPassType::Compute, TonemapPass);
        graph.add_render_pass("blit", RgPassType::Transfer, BlitToSwapchainPass);
        Ok(())
    }

    fn report_timers(&self, frame_name: &str) {
        for timer in self.render_graph.get_timers(self.device.current_frame_index()) {
            match timer.elapsed_ms(&self.device) {
                Ok(ms) => log::debug!("{}: pass \"{}\" took {:.3} ms", frame_name, timer.label(), ms),
                Err(err) => log::warn!("{}: timer of \"{}\" is not readable: {}", frame_name, timer.label(), err),
            }
        }
    }
}
// destroy
impl HeadlessApp {
    pub fn destroy(mut self) {
        let _span = tracy_client::span!("HeadlessApp::destroy");

        self.render_graph.destroy(&mut self.device);
        self.swapchain_image = None;
        self.scene = None;
        self.resource_manager.destroy_all(&mut self.device);

        let leaked = self.device.total_live_count();
        if leaked > 0 {
            log::warn!("headless app: {} device objects still alive after shutdown", leaked);
        } else {
            log::info!("headless app: all device objects released");
        }
    }
}
