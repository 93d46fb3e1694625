use strata_gfx::GfxResult;
use strata_gfx::device::GfxDevice;
use strata_gfx::resources::buffer::{GfxBuffer, GfxBufferDesc};
use strata_gfx::resources::image::{GfxImage, GfxImageDesc};
use strata_gfx::resources::pipeline_layout::{GfxPipelineLayout, GfxPipelineLayoutDesc};
use strata_gfx::resources::sampler::{GfxSampler, GfxSamplerDesc};
use strata_gfx::resources::shader_module::GfxShaderModule;

use crate::handles::{GfxBufferHandle, GfxImageHandle, GfxPipelineLayoutHandle, GfxSamplerHandle, GfxShaderModuleHandle};
use crate::resource_registry::GfxResourceRegistry;

/// 单个注册表的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxRegistryStats {
    pub live: usize,
    pub pending_destroy: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GfxResourceStats {
    pub images: GfxRegistryStats,
    pub buffers: GfxRegistryStats,
    pub shader_modules: GfxRegistryStats,
    pub pipeline_layouts: GfxRegistryStats,
    pub samplers: GfxRegistryStats,
}

/// 资源管理器
///
/// 每种资源一个 [`GfxResourceRegistry`]，对外提供引用计数的 Handle。
/// 最后一个 Handle 释放之后，资源会在 `frames_in_flight + 1` 次 `cleanup` 之后被销毁。
pub struct GfxResourceManager {
    images: GfxResourceRegistry<GfxImage>,
    buffers: GfxResourceRegistry<GfxBuffer>,
    shader_modules: GfxResourceRegistry<GfxShaderModule>,
    pipeline_layouts: GfxResourceRegistry<GfxPipelineLayout>,
    samplers: GfxResourceRegistry<GfxSampler>,

    frames_in_flight: usize,
    destroyed: bool,
}
// new & init
impl GfxResourceManager {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            images: GfxResourceRegistry::new("images", frames_in_flight),
            buffers: GfxResourceRegistry::new("buffers", frames_in_flight),
            shader_modules: GfxResourceRegistry::new("shader-modules", frames_in_flight),
            pipeline_layouts: GfxResourceRegistry::new("pipeline-layouts", frames_in_flight),
            samplers: GfxResourceRegistry::new("samplers", frames_in_flight),

            frames_in_flight,
            destroyed: false,
        }
    }
}
// destroy
impl GfxResourceManager {
    /// 关闭时调用，无视引用计数销毁所有资源
    pub fn destroy_all(&mut self, device: &mut dyn GfxDevice) {
        let _span = tracy_client::span!("ResourceManager::destroy_all");

        let stats = self.stats();
        log::info!(
            "ResourceManager::destroy_all: images={}, buffers={}, shader_modules={}, pipeline_layouts={}, samplers={}",
            stats.images.live,
            stats.buffers.live,
            stats.shader_modules.live,
            stats.pipeline_layouts.live,
            stats.samplers.live
        );

        self.samplers.clear_all(|_, sampler| device.destroy_sampler(sampler));
        self.pipeline_layouts.clear_all(|_, layout| device.destroy_pipeline_layout(layout));
        self.shader_modules.clear_all(|_, module| device.destroy_shader_module(module));
        self.images.clear_all(|_, image| device.destroy_image(image));
        self.buffers.clear_all(|_, buffer| device.destroy_buffer(buffer));

        self.destroyed = true;
    }
}
impl Drop for GfxResourceManager {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            if !std::thread::panicking() {
                assert!(self.destroyed, "GfxResourceManager dropped without destroy_all");
            }
        }
    }
}
// Subsystem API
impl GfxResourceManager {
    /// 每帧开始时调用，销毁倒数结束的资源，返回销毁的数量
    pub fn cleanup(&mut self, device: &mut dyn GfxDevice) -> usize {
        let _span = tracy_client::span!("ResourceManager::cleanup");

        let mut destroyed = 0;
        destroyed += self.samplers.clear_destroy_queue(|_, sampler| device.destroy_sampler(sampler));
        destroyed += self.pipeline_layouts.clear_destroy_queue(|_, layout| device.destroy_pipeline_layout(layout));
        destroyed += self.shader_modules.clear_destroy_queue(|_, module| device.destroy_shader_module(module));
        destroyed += self.images.clear_destroy_queue(|_, image| device.destroy_image(image));
        destroyed += self.buffers.clear_destroy_queue(|_, buffer| device.destroy_buffer(buffer));

        if destroyed > 0 {
            log::debug!("ResourceManager::cleanup: destroyed {} resources", destroyed);
        }
        destroyed
    }

    pub fn stats(&self) -> GfxResourceStats {
        fn of<T>(registry: &GfxResourceRegistry<T>) -> GfxRegistryStats {
            GfxRegistryStats {
                live: registry.live_count(),
                pending_destroy: registry.pending_destroy_count(),
            }
        }
        GfxResourceStats {
            images: of(&self.images),
            buffers: of(&self.buffers),
            shader_modules: of(&self.shader_modules),
            pipeline_layouts: of(&self.pipeline_layouts),
            samplers: of(&self.samplers),
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }
}
// Buffer API
impl GfxResourceManager {
    pub fn register_buffer(&mut self, buffer: GfxBuffer) -> GfxBufferHandle {
        self.buffers.insert_handle(buffer)
    }

    pub fn create_buffer(
        &mut self,
        device: &mut dyn GfxDevice,
        desc: &GfxBufferDesc,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxBufferHandle> {
        let buffer = device.create_buffer(desc, name.as_ref())?;
        Ok(self.register_buffer(buffer))
    }

    #[inline]
    pub fn get_buffer(&self, handle: &GfxBufferHandle) -> Option<&GfxBuffer> {
        self.buffers.resolve(handle)
    }
}
// Image API
impl GfxResourceManager {
    pub fn register_image(&mut self, image: GfxImage) -> GfxImageHandle {
        self.images.insert_handle(image)
    }

    pub fn create_image(
        &mut self,
        device: &mut dyn GfxDevice,
        desc: &GfxImageDesc,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxImageHandle> {
        let image = device.create_image(desc, name.as_ref())?;
        Ok(self.register_image(image))
    }

    #[inline]
    pub fn get_image(&self, handle: &GfxImageHandle) -> Option<&GfxImage> {
        self.images.resolve(handle)
    }
}
// Shader module API
impl GfxResourceManager {
    pub fn register_shader_module(&mut self, module: GfxShaderModule) -> GfxShaderModuleHandle {
        self.shader_modules.insert_handle(module)
    }

    pub fn create_shader_module(
        &mut self,
        device: &mut dyn GfxDevice,
        spirv: &[u32],
        name: impl AsRef<str>,
    ) -> GfxResult<GfxShaderModuleHandle> {
        let module = device.create_shader_module(spirv, name.as_ref())?;
        Ok(self.register_shader_module(module))
    }

    #[inline]
    pub fn get_shader_module(&self, handle: &GfxShaderModuleHandle) -> Option<&GfxShaderModule> {
        self.shader_modules.resolve(handle)
    }
}
// Pipeline layout API
impl GfxResourceManager {
    pub fn register_pipeline_layout(&mut self, layout: GfxPipelineLayout) -> GfxPipelineLayoutHandle {
        self.pipeline_layouts.insert_handle(layout)
    }

    pub fn create_pipeline_layout(
        &mut self,
        device: &mut dyn GfxDevice,
        desc: &GfxPipelineLayoutDesc,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxPipelineLayoutHandle> {
        let layout = device.create_pipeline_layout(desc, name.as_ref())?;
        Ok(self.register_pipeline_layout(layout))
    }

    #[inline]
    pub fn get_pipeline_layout(&self, handle: &GfxPipelineLayoutHandle) -> Option<&GfxPipelineLayout> {
        self.pipeline_layouts.resolve(handle)
    }
}
// Sampler API
impl GfxResourceManager {
    pub fn register_sampler(&mut self, sampler: GfxSampler) -> GfxSamplerHandle {
        self.samplers.insert_handle(sampler)
    }

    pub fn create_sampler(
        &mut self,
        device: &mut dyn GfxDevice,
        desc: &GfxSamplerDesc,
        name: impl AsRef<str>,
    ) -> GfxResult<GfxSamplerHandle> {
        let sampler = device.create_sampler(desc, name.as_ref())?;
        Ok(self.register_sampler(sampler))
    }

    #[inline]
    pub fn get_sampler(&self, handle: &GfxSamplerHandle) -> Option<&GfxSampler> {
        self.samplers.resolve(handle)
    }
}
