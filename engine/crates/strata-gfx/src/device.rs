use ash::vk;

use crate::error::GfxResult;
use crate::render_pass::{GfxFramebufferDesc, GfxRenderPassDesc};
use crate::resources::buffer::{GfxBuffer, GfxBufferDesc};
use crate::resources::image::{GfxImage, GfxImageDesc};
use crate::resources::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::resources::sampler::{GfxSampler, GfxSamplerDesc};
use crate::resources::shader_module::GfxShaderModule;

/// device 层的窄接口
///
/// 帧同步（fence / semaphore 等待）由实现者负责；调用方假定当前 frame-in-flight
/// 槽位上的资源已经可以被写入。
pub trait GfxDevice {
    /// 同时在 GPU 上执行的帧数
    fn frames_in_flight(&self) -> usize;

    /// 当前帧所在的 frame-in-flight 槽位，范围 `[0, frames_in_flight)`
    fn current_frame_index(&self) -> usize;

    fn create_image(&mut self, desc: &GfxImageDesc, name: &str) -> GfxResult<GfxImage>;
    fn destroy_image(&mut self, image: GfxImage);

    fn create_buffer(&mut self, desc: &GfxBufferDesc, name: &str) -> GfxResult<GfxBuffer>;
    fn destroy_buffer(&mut self, buffer: GfxBuffer);

    fn create_shader_module(&mut self, spirv: &[u32], name: &str) -> GfxResult<GfxShaderModule>;
    fn destroy_shader_module(&mut self, shader_module: GfxShaderModule);

    fn create_pipeline_layout(&mut self, desc: &GfxPipelineLayoutDesc, name: &str) -> GfxResult<GfxPipelineLayout>;
    fn destroy_pipeline_layout(&mut self, pipeline_layout: GfxPipelineLayout);

    fn create_sampler(&mut self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<GfxSampler>;
    fn destroy_sampler(&mut self, sampler: GfxSampler);

    fn create_render_pass(&mut self, desc: &GfxRenderPassDesc, name: &str) -> GfxResult<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);

    fn create_framebuffer(&mut self, desc: &GfxFramebufferDesc, name: &str) -> GfxResult<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    fn create_timestamp_pool(&mut self, query_count: u32, name: &str) -> GfxResult<vk::QueryPool>;
    fn destroy_query_pool(&mut self, query_pool: vk::QueryPool);

    /// 读取 timestamp 查询结果（单位为 tick）
    fn read_timestamps(&self, query_pool: vk::QueryPool, first_query: u32, query_count: u32) -> GfxResult<Vec<u64>>;

    /// 一个 timestamp tick 对应的纳秒数
    fn timestamp_period_ns(&self) -> f32;
}
