//! 对外的 `RenderGraph`
//!
//! 声明接口放在这里，编译在 `compiler`，执行和调试输出在 `executor`。

use indexmap::IndexMap;

use strata_gfx::device::GfxDevice;
use strata_gfx::resources::buffer::GfxBuffer;
use strata_gfx::resources::image::GfxImage;
use strata_render_interface::handles::{GfxBufferHandle, GfxImageHandle, GfxWeakHandle};

use crate::barrier::RgBarrier;
use crate::buffer_resource::{RgBufferDesc, RgBufferResource};
use crate::compiler::RgCompiledGraph;
use crate::dependency::RgDependencyGraph;
use crate::framebuffer_cache::RgFramebufferCache;
use crate::image_resource::{RgImageDesc, RgImageResource};
use crate::pass::{RgPass, RgPassType, RgRenderPass};
use crate::resource::{RgResourceIndex, RgResourceKind, RgResourceRef, RgResourceTable};
use crate::resource_state::RgResourceState;
use crate::timer::{RgGpuTimers, RgPassTimer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgSettings {
    /// 为每个 pass 写入开始和结束的 timestamp
    pub gpu_timers: bool,
    /// 每次编译成功后打印执行计划
    pub print_execution_plan: bool,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            gpu_timers: true,
            print_execution_plan: false,
        }
    }
}

pub(crate) enum RgCachedBacking {
    Image(GfxImageHandle),
    Buffer(GfxBufferHandle),
}

/// `reset()` 之后暂存的物理资源，同名资源下一帧重新声明时直接复用
pub(crate) struct RgTransientBacking {
    pub backing: RgCachedBacking,
    /// 物理资源最后一次被访问的状态，复用时作为第一个 barrier 的 src
    pub last_state: RgResourceState,
}

enum RgImportedBacking {
    Image(GfxWeakHandle<GfxImage>),
    Buffer(GfxWeakHandle<GfxBuffer>),
}

/// 非 persistent 的导入资源在 `reset()` 时被移除，只记住它最后的状态
struct RgImportedState {
    backing: RgImportedBacking,
    state: RgResourceState,
}

/// 渲染图
///
/// 生命周期参数 `'a` 允许 pass 的执行回调借用外部数据。
pub struct RenderGraph<'a> {
    pub(crate) settings: RgSettings,
    pub(crate) resources: RgResourceTable,
    pub(crate) passes: Vec<RgPass<'a>>,

    pub(crate) backbuffer: Option<RgResourceRef>,
    pub(crate) backbuffer_dimensions: Option<(u32, u32)>,

    pub(crate) transient_cache: IndexMap<String, RgTransientBacking>,
    imported_states: IndexMap<String, RgImportedState>,
    pub(crate) compiled: Option<RgCompiledGraph>,
    pub(crate) executed: bool,

    pub(crate) framebuffer_cache: RgFramebufferCache,
    pub(crate) timers: RgGpuTimers,

    destroyed: bool,
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new(settings: RgSettings) -> Self {
        Self {
            settings,
            resources: RgResourceTable::default(),
            passes: Vec::new(),
            backbuffer: None,
            backbuffer_dimensions: None,
            transient_cache: IndexMap::new(),
            imported_states: IndexMap::new(),
            compiled: None,
            executed: false,
            framebuffer_cache: RgFramebufferCache::new(),
            timers: RgGpuTimers::default(),
            destroyed: false,
        }
    }
}

// 声明
impl<'a> RenderGraph<'a> {
    /// 添加一个 pass，返回它的构建器
    pub fn add_pass(&mut self, label: impl Into<String>, pass_type: RgPassType) -> &mut RgPass<'a> {
        self.compiled = None;
        let index = self.passes.len();
        self.passes.push(RgPass::new(label, pass_type));
        &mut self.passes[index]
    }

    /// 添加一个以对象形式实现的 pass
    pub fn add_render_pass(
        &mut self,
        label: impl Into<String>,
        pass_type: RgPassType,
        mut render_pass: impl RgRenderPass + 'a,
    ) -> &mut RgPass<'a> {
        let pass = self.add_pass(label, pass_type);
        render_pass.setup(pass);
        pass.set_execute_function(move |ctx| render_pass.execute(ctx))
    }

    /// 注册 image；`backing` 不为空时是导入的资源，graph 不会重新分配它
    pub fn add_image_resource(
        &mut self,
        label: &str,
        desc: RgImageDesc,
        backing: Option<GfxImageHandle>,
    ) -> RgResourceIndex {
        self.compiled = None;
        let carried = backing.as_ref().and_then(|handle| match self.imported_states.shift_remove(label) {
            Some(RgImportedState {
                backing: RgImportedBacking::Image(weak),
                state,
            }) if weak.refers_to(handle) => Some(state),
            _ => None,
        });
        let index = self.resources.register(label, RgResourceKind::Image(RgImageResource::new(desc, backing)));
        self.restore_imported_state(index, carried);
        index
    }

    /// 注册 buffer；`backing` 不为空时是导入的资源
    pub fn add_buffer_resource(
        &mut self,
        label: &str,
        desc: RgBufferDesc,
        backing: Option<GfxBufferHandle>,
    ) -> RgResourceIndex {
        self.compiled = None;
        let carried = backing.as_ref().and_then(|handle| match self.imported_states.shift_remove(label) {
            Some(RgImportedState {
                backing: RgImportedBacking::Buffer(weak),
                state,
            }) if weak.refers_to(handle) => Some(state),
            _ => None,
        });
        let index = self.resources.register(label, RgResourceKind::Buffer(RgBufferResource::new(desc, backing)));
        self.restore_imported_state(index, carried);
        index
    }

    /// 同一个外部资源在上一帧结束时的状态
    fn restore_imported_state(&mut self, index: RgResourceIndex, state: Option<RgResourceState>) {
        if let Some(state) = state
            && let Some(resource) = self.resources.get_mut(index)
        {
            resource.current_state = state;
            resource.initialized = true;
        }
    }

    /// 让 `alias` 指向 `target`，target 当前可以解析时返回它的 index
    pub fn add_alias(&mut self, target: impl Into<RgResourceRef>, alias: &str) -> Option<RgResourceIndex> {
        self.compiled = None;
        self.resources.add_alias(target.into(), alias)
    }

    /// 设置资源在下一次编译时所处的状态，并视为已经初始化
    pub fn set_initial_state(&mut self, resource: impl Into<RgResourceRef>, state: RgResourceState) -> bool {
        let resource = resource.into();
        let Some(entry) = self.resources.lookup(&resource).and_then(|index| self.resources.get_mut(index)) else {
            log::warn!("RenderGraph: set_initial_state on unknown resource \"{}\"", resource);
            return false;
        };
        entry.current_state = state;
        entry.initialized = true;
        self.compiled = None;
        true
    }

    /// 作为 backbuffer 的 image，`match_swapchain` 的资源使用它的尺寸
    pub fn set_backbuffer(&mut self, resource: impl Into<RgResourceRef>) {
        self.compiled = None;
        self.backbuffer = Some(resource.into());
    }

    pub fn set_backbuffer_dimensions(&mut self, width: u32, height: u32) {
        if self.backbuffer_dimensions != Some((width, height)) {
            log::info!("RenderGraph: backbuffer dimensions set to {}x{}", width, height);
            self.compiled = None;
        }
        self.backbuffer_dimensions = Some((width, height));
    }
}

// getters
impl<'a> RenderGraph<'a> {
    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceTable {
        &self.resources
    }

    #[inline]
    pub fn resource_index(&self, resource: impl Into<RgResourceRef>) -> Option<RgResourceIndex> {
        self.resources.lookup(&resource.into())
    }

    #[inline]
    pub fn backbuffer_dimensions(&self) -> Option<(u32, u32)> {
        self.backbuffer_dimensions
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }

    #[inline]
    pub fn framebuffer_cache(&self) -> &RgFramebufferCache {
        &self.framebuffer_cache
    }

    /// 编译后 image 的物理资源，alias 和原 label 得到同一个 handle
    pub fn get_image(&self, resource: impl Into<RgResourceRef>) -> Option<GfxImageHandle> {
        let index = self.resources.lookup(&resource.into())?;
        let image = self.resources.get(index)?.as_image()?;
        image.bound.and(image.backing.clone())
    }

    /// 编译后 buffer 的物理资源
    pub fn get_buffer(&self, resource: impl Into<RgResourceRef>) -> Option<GfxBufferHandle> {
        let index = self.resources.lookup(&resource.into())?;
        let buffer = self.resources.get(index)?.as_buffer()?;
        buffer.bound.and(buffer.backing.clone())
    }

    /// 编译后的执行顺序（即声明顺序）
    pub fn execution_order(&self) -> Vec<&str> {
        let Some(compiled) = &self.compiled else {
            return Vec::new();
        };
        compiled.passes.iter().map(|p| self.passes[p.pass_index].label.as_str()).collect()
    }

    /// 编译后某个 pass 之前需要插入的 barrier
    pub fn barriers(&self, pass_label: &str) -> Option<&[RgBarrier]> {
        let compiled = self.compiled.as_ref()?;
        compiled
            .passes
            .iter()
            .find(|p| self.passes[p.pass_index].label == pass_label)
            .map(|p| p.barriers.as_slice())
    }

    /// 编译后的 pass 依赖图
    pub fn dependency_graph(&self) -> Option<&RgDependencyGraph> {
        self.compiled.as_ref().map(|c| &c.dependencies)
    }

    /// 某个 frame-in-flight 槽位上每个 pass 的计时
    pub fn get_timers(&self, frame_slot: usize) -> &[RgPassTimer] {
        self.timers.timers(frame_slot)
    }
}

// reset & destroy
impl<'a> RenderGraph<'a> {
    /// 清空 pass 声明和本帧的资源绑定，准备下一帧重新声明
    pub fn reset(&mut self) {
        let _span = tracy_client::span!("RenderGraph::reset");

        self.passes.clear();
        self.compiled = None;
        self.executed = false;
        // 只保留到下一帧，没有被重新声明的外部资源就此忘记
        self.imported_states.clear();

        for resource in self.resources.reset() {
            let last_state = resource.current_state;
            match resource.kind {
                RgResourceKind::Image(image) if image.imported => {
                    if let Some(handle) = &image.backing {
                        let backing = RgImportedBacking::Image(handle.downgrade());
                        self.imported_states.insert(resource.label, RgImportedState { backing, state: last_state });
                    }
                }
                RgResourceKind::Buffer(buffer) if buffer.imported => {
                    if let Some(handle) = &buffer.backing {
                        let backing = RgImportedBacking::Buffer(handle.downgrade());
                        self.imported_states.insert(resource.label, RgImportedState { backing, state: last_state });
                    }
                }
                RgResourceKind::Image(image) => {
                    if let Some(handle) = image.backing {
                        let backing = RgCachedBacking::Image(handle);
                        self.transient_cache.insert(resource.label, RgTransientBacking { backing, last_state });
                    }
                }
                RgResourceKind::Buffer(buffer) => {
                    if let Some(handle) = buffer.backing {
                        let backing = RgCachedBacking::Buffer(handle);
                        self.transient_cache.insert(resource.label, RgTransientBacking { backing, last_state });
                    }
                }
            }
        }
    }

    /// 释放 graph 持有的所有 device 对象和资源 handle
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        let _span = tracy_client::span!("RenderGraph::destroy");
        log::info!(
            "RenderGraph: destroying {} render passes, {} framebuffers",
            self.framebuffer_cache.render_pass_count(),
            self.framebuffer_cache.framebuffer_count()
        );

        self.framebuffer_cache.destroy(device);
        self.timers.destroy(device);
        self.passes.clear();
        self.compiled = None;
        self.resources.clear();
        self.transient_cache.clear();
        self.imported_states.clear();
        self.destroyed = true;
    }
}

impl Drop for RenderGraph<'_> {
    fn drop(&mut self) {
        if cfg!(debug_assertions) && !std::thread::panicking() {
            let owns_device_objects = !self.framebuffer_cache.is_empty() || !self.timers.is_empty();
            assert!(
                self.destroyed || !owns_device_objects,
                "RenderGraph dropped without destroy(); framebuffers or timer pools leaked"
            );
        }
    }
}
