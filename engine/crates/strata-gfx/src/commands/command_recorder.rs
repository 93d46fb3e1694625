use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::render_pass::GfxRenderPassBeginInfo;

/// 命令录制接口
///
/// RenderGraph 只使用 barrier、render pass、debug label 和 timestamp；
/// 其余命令只会在 pass 的执行回调里被调用。
pub trait GfxCommandRecorder {
    /// 录制的 command buffer 名称，用于调试
    fn name(&self) -> &str;

    /// 一次提交所有的 image / buffer barrier（vkCmdPipelineBarrier2）
    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]);

    fn begin_render_pass(&mut self, begin_info: &GfxRenderPassBeginInfo);
    fn end_render_pass(&mut self);

    fn begin_label(&mut self, label: &str, color: glam::Vec4);
    fn end_label(&mut self);

    fn reset_query_pool(&mut self, query_pool: vk::QueryPool, first_query: u32, query_count: u32);
    fn write_timestamp(&mut self, stage: vk::PipelineStageFlags2, query_pool: vk::QueryPool, query: u32);

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn dispatch(&mut self, group_count: glam::UVec3);
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);
    fn blit_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );
}
