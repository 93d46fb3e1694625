use ash::vk;
use ash::vk::Handle;
use slotmap::{Key, KeyData, SlotMap};

use crate::device::GfxDevice;
use crate::error::{GfxError, GfxResult};
use crate::render_pass::{GfxFramebufferDesc, GfxRenderPassDesc};
use crate::resources::buffer::{GfxBuffer, GfxBufferDesc};
use crate::resources::image::{GfxImage, GfxImageDesc};
use crate::resources::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use crate::resources::sampler::{GfxSampler, GfxSamplerDesc};
use crate::resources::shader_module::GfxShaderModule;

slotmap::new_key_type! {
    struct GfxHeadlessObjectKey;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxObjectKind {
    Image,
    ImageView,
    Buffer,
    ShaderModule,
    PipelineLayout,
    Sampler,
    RenderPass,
    Framebuffer,
    QueryPool,
}

struct GfxHeadlessObject {
    kind: GfxObjectKind,
    name: String,
}

/// 无 GPU 的 device
///
/// 每个对象都占用 slotmap 里的一个槽位，vk handle 就是槽位 key 的 ffi 值，
/// 因此 handle 永远非空，且销毁后不会和新对象混淆。
pub struct GfxHeadlessDevice {
    objects: SlotMap<GfxHeadlessObjectKey, GfxHeadlessObject>,

    frames_in_flight: usize,
    frame_index: usize,

    /// 接下来这么多次 image / buffer 创建会返回 OutOfDeviceMemory
    pending_allocation_failures: usize,
    /// 销毁了不存在（或已经销毁过）的对象的次数
    invalid_destroy_count: usize,
    destroyed: Vec<(GfxObjectKind, String)>,
}

// new & init
impl GfxHeadlessDevice {
    /// 每个 timestamp query 之间间隔的 tick 数
    pub const TICKS_PER_QUERY: u64 = 1000;

    pub fn new(frames_in_flight: usize) -> Self {
        let _span = tracy_client::span!("GfxHeadlessDevice::new");
        assert!(frames_in_flight > 0, "frames_in_flight must be at least 1");
        log::info!("headless device: {} frames in flight", frames_in_flight);
        Self {
            objects: SlotMap::with_key(),
            frames_in_flight,
            frame_index: 0,
            pending_allocation_failures: 0,
            invalid_destroy_count: 0,
            destroyed: Vec::new(),
        }
    }
}

// frame & 故障注入
impl GfxHeadlessDevice {
    /// 进入下一帧，切换到下一个 frame-in-flight 槽位
    pub fn advance_frame(&mut self) {
        self.frame_index = (self.frame_index + 1) % self.frames_in_flight;
    }

    /// 让接下来的 `count` 次 image / buffer 创建失败
    pub fn fail_next_allocations(&mut self, count: usize) {
        self.pending_allocation_failures = count;
    }
}

// getters
impl GfxHeadlessDevice {
    #[inline]
    pub fn live_count(&self, kind: GfxObjectKind) -> usize {
        self.objects.values().filter(|obj| obj.kind == kind).count()
    }

    #[inline]
    pub fn total_live_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn invalid_destroy_count(&self) -> usize {
        self.invalid_destroy_count
    }

    /// 按销毁顺序记录的 (类型, 名称)
    #[inline]
    pub fn destroyed_objects(&self) -> &[(GfxObjectKind, String)] {
        &self.destroyed
    }

    pub fn is_alive(&self, raw_handle: u64) -> bool {
        self.objects.contains_key(KeyData::from_ffi(raw_handle).into())
    }
}

// tools
impl GfxHeadlessDevice {
    fn alloc(&mut self, kind: GfxObjectKind, name: &str) -> u64 {
        let key = self.objects.insert(GfxHeadlessObject {
            kind,
            name: name.to_string(),
        });
        log::trace!("headless: create {:?} \"{}\"", kind, name);
        key.data().as_ffi()
    }

    fn free(&mut self, kind: GfxObjectKind, raw_handle: u64) {
        let key: GfxHeadlessObjectKey = KeyData::from_ffi(raw_handle).into();
        match self.objects.get(key) {
            Some(obj) if obj.kind == kind => {
                if let Some(obj) = self.objects.remove(key) {
                    log::trace!("headless: destroy {:?} \"{}\"", kind, obj.name);
                    self.destroyed.push((obj.kind, obj.name));
                }
            }
            _ => {
                log::error!("headless: destroy of unknown {:?} 0x{:x}", kind, raw_handle);
                self.invalid_destroy_count += 1;
            }
        }
    }

    fn take_allocation_failure(&mut self, what: &str) -> GfxResult<()> {
        if self.pending_allocation_failures > 0 {
            self.pending_allocation_failures -= 1;
            return Err(GfxError::OutOfDeviceMemory { what: what.to_string() });
        }
        Ok(())
    }

    fn query_pool_exists(&self, query_pool: vk::QueryPool) -> bool {
        let key: GfxHeadlessObjectKey = KeyData::from_ffi(query_pool.as_raw()).into();
        self.objects.get(key).is_some_and(|obj| obj.kind == GfxObjectKind::QueryPool)
    }
}

impl GfxDevice for GfxHeadlessDevice {
    #[inline]
    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    fn current_frame_index(&self) -> usize {
        self.frame_index
    }

    fn create_image(&mut self, desc: &GfxImageDesc, name: &str) -> GfxResult<GfxImage> {
        self.take_allocation_failure(name)?;
        let image = vk::Image::from_raw(self.alloc(GfxObjectKind::Image, name));
        let view = vk::ImageView::from_raw(self.alloc(GfxObjectKind::ImageView, name));
        Ok(GfxImage::new(image, view, desc.clone(), name))
    }

    fn destroy_image(&mut self, image: GfxImage) {
        self.free(GfxObjectKind::ImageView, image.view().as_raw());
        self.free(GfxObjectKind::Image, image.handle().as_raw());
    }

    fn create_buffer(&mut self, desc: &GfxBufferDesc, name: &str) -> GfxResult<GfxBuffer> {
        self.take_allocation_failure(name)?;
        let buffer = vk::Buffer::from_raw(self.alloc(GfxObjectKind::Buffer, name));
        Ok(GfxBuffer::new(buffer, desc.clone(), name))
    }

    fn destroy_buffer(&mut self, buffer: GfxBuffer) {
        self.free(GfxObjectKind::Buffer, buffer.handle().as_raw());
    }

    fn create_shader_module(&mut self, spirv: &[u32], name: &str) -> GfxResult<GfxShaderModule> {
        let module = vk::ShaderModule::from_raw(self.alloc(GfxObjectKind::ShaderModule, name));
        Ok(GfxShaderModule::new(module, spirv.len(), name))
    }

    fn destroy_shader_module(&mut self, shader_module: GfxShaderModule) {
        self.free(GfxObjectKind::ShaderModule, shader_module.handle().as_raw());
    }

    fn create_pipeline_layout(&mut self, _desc: &GfxPipelineLayoutDesc, name: &str) -> GfxResult<GfxPipelineLayout> {
        let layout = vk::PipelineLayout::from_raw(self.alloc(GfxObjectKind::PipelineLayout, name));
        Ok(GfxPipelineLayout::new(layout, name))
    }

    fn destroy_pipeline_layout(&mut self, pipeline_layout: GfxPipelineLayout) {
        self.free(GfxObjectKind::PipelineLayout, pipeline_layout.handle().as_raw());
    }

    fn create_sampler(&mut self, desc: &GfxSamplerDesc, name: &str) -> GfxResult<GfxSampler> {
        let sampler = vk::Sampler::from_raw(self.alloc(GfxObjectKind::Sampler, name));
        Ok(GfxSampler::new(sampler, *desc, name))
    }

    fn destroy_sampler(&mut self, sampler: GfxSampler) {
        self.free(GfxObjectKind::Sampler, sampler.handle().as_raw());
    }

    fn create_render_pass(&mut self, _desc: &GfxRenderPassDesc, name: &str) -> GfxResult<vk::RenderPass> {
        Ok(vk::RenderPass::from_raw(self.alloc(GfxObjectKind::RenderPass, name)))
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        self.free(GfxObjectKind::RenderPass, render_pass.as_raw());
    }

    fn create_framebuffer(&mut self, desc: &GfxFramebufferDesc, name: &str) -> GfxResult<vk::Framebuffer> {
        let all_alive = desc.attachments.iter().all(|view| self.is_alive(view.as_raw()));
        if !self.is_alive(desc.render_pass.as_raw()) || !all_alive {
            log::error!("headless: framebuffer \"{}\" references destroyed objects", name);
            return Err(GfxError::Vk(vk::Result::ERROR_INITIALIZATION_FAILED));
        }
        Ok(vk::Framebuffer::from_raw(self.alloc(GfxObjectKind::Framebuffer, name)))
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.free(GfxObjectKind::Framebuffer, framebuffer.as_raw());
    }

    fn create_timestamp_pool(&mut self, _query_count: u32, name: &str) -> GfxResult<vk::QueryPool> {
        Ok(vk::QueryPool::from_raw(self.alloc(GfxObjectKind::QueryPool, name)))
    }

    fn destroy_query_pool(&mut self, query_pool: vk::QueryPool) {
        self.free(GfxObjectKind::QueryPool, query_pool.as_raw());
    }

    /// 第 i 个 query 的值固定为 `i * TICKS_PER_QUERY`
    fn read_timestamps(&self, query_pool: vk::QueryPool, first_query: u32, query_count: u32) -> GfxResult<Vec<u64>> {
        if !self.query_pool_exists(query_pool) {
            return Err(GfxError::Vk(vk::Result::ERROR_UNKNOWN));
        }
        Ok((first_query..first_query + query_count).map(|query| query as u64 * Self::TICKS_PER_QUERY).collect())
    }

    #[inline]
    fn timestamp_period_ns(&self) -> f32 {
        1.0
    }
}
