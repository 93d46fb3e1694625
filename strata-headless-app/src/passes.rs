use ash::vk;

use strata_render_graph::{RgPass, RgPassContext, RgRenderPass};

/// compute pass 的 workgroup 尺寸
const WORKGROUP_SIZE: u32 = 8;

fn dispatch_size(extent: vk::Extent2D) -> glam::UVec3 {
    glam::UVec3::new(extent.width.div_ceil(WORKGROUP_SIZE), extent.height.div_ceil(WORKGROUP_SIZE), 1)
}

/// 写 gbuffer：albedo / normal / depth
pub struct GBufferPass {
    pub index_count: u32,
}

impl RgRenderPass for GBufferPass {
    fn setup(&mut self, pass: &mut RgPass<'_>) {
        pass.add_vertex_read("vertices")
            .add_index_read("indices")
            .add_uniform_buffer_read("camera", vk::PipelineStageFlags2::VERTEX_SHADER)
            .add_colour_write("albedo")
            .add_colour_write("normal")
            .add_depth_write("depth");
    }

    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        ctx.cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, vk::Pipeline::null());
        ctx.cmd.draw(self.index_count, 1, 0, 0);
    }
}

/// 延迟光照，结果写到 hdr
pub struct LightingPass;

impl RgRenderPass for LightingPass {
    fn setup(&mut self, pass: &mut RgPass<'_>) {
        let stage = vk::PipelineStageFlags2::COMPUTE_SHADER;
        pass.add_sampled_image_read("albedo", stage)
            .add_sampled_image_read("normal", stage)
            .add_sampled_image_read("depth", stage)
            .add_uniform_buffer_read("camera", stage)
            .add_storage_image_write("hdr", stage);
    }

    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        ctx.cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, vk::Pipeline::null());
        ctx.cmd.dispatch(dispatch_size(ctx.extent()));
    }
}

/// 原地 tonemap，通过 alias 写出新的逻辑版本
pub struct TonemapPass;

impl RgRenderPass for TonemapPass {
    fn setup(&mut self, pass: &mut RgPass<'_>) {
        let stage = vk::PipelineStageFlags2::COMPUTE_SHADER;
        pass.add_storage_image_read("hdr", stage).add_storage_image_write("hdr_tonemapped", stage);
    }

    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        ctx.cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, vk::Pipeline::null());
        ctx.cmd.dispatch(dispatch_size(ctx.extent()));
    }
}

/// 把结果 blit 到 swapchain image；到 present 的转换由调用者负责
pub struct BlitToSwapchainPass;

impl RgRenderPass for BlitToSwapchainPass {
    fn setup(&mut self, pass: &mut RgPass<'_>) {
        pass.add_blit_read("hdr_tonemapped").add_blit_write("swapchain");
    }

    fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
        let (Some(src), Some(dst)) = (ctx.vk_image("hdr_tonemapped"), ctx.vk_image("swapchain")) else {
            log::error!("{}: blit source or destination is not bound", ctx.label());
            return;
        };
        let src_extent = ctx.image_extent("hdr_tonemapped").unwrap_or(ctx.extent());
        let dst_extent = ctx.image_extent("swapchain").unwrap_or(ctx.extent());
        let subresource = vk::ImageSubresourceLayers::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .layer_count(1);
        let region = vk::ImageBlit::default()
            .src_subresource(subresource)
            .src_offsets([vk::Offset3D::default(), far_corner(src_extent)])
            .dst_subresource(subresource)
            .dst_offsets([vk::Offset3D::default(), far_corner(dst_extent)]);
        ctx.cmd.blit_image(
            src,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
            vk::Filter::LINEAR,
        );
    }
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}
