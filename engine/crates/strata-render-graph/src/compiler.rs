//! RenderGraph 编译
//!
//! 编译分为以下几步，任何一步失败都会让本帧的 `execute()` 返回 `NotCompiled`：
//!
//! 1. 解析所有访问和 backbuffer 的 label，检查资源类型
//! 2. 为每个逻辑资源绑定物理资源（导入的资源只做校验）
//! 3. 合并同一个 pass 对同一资源的多次访问，按声明顺序合成 barrier
//! 4. 构建依赖图（诊断用）
//! 5. 为有 attachment 的 graphics pass 获取 render pass 和 framebuffer
//! 6. 准备当前 frame-in-flight 槽位的 timestamp query pool

use std::collections::HashMap;

use ash::vk;
use indexmap::IndexMap;

use strata_gfx::device::GfxDevice;
use strata_gfx::render_pass::{GfxAttachmentDesc, GfxClearValue, GfxRenderPassDesc};
use strata_gfx::resources::buffer::GfxBuffer;
use strata_gfx::resources::image::GfxImage;
use strata_render_interface::gfx_resource_manager::GfxResourceManager;
use strata_render_interface::handles::GfxWeakHandle;

use crate::barrier::{RgBarrier, RgBarrierBuilder};
use crate::buffer_resource::{RgBoundBuffer, RgBufferResource, buffer_satisfies};
use crate::dependency::RgDependencyGraph;
use crate::error::{RgError, RgResult};
use crate::framebuffer_cache::RgFramebufferAttachment;
use crate::image_resource::{RgBoundImage, RgImageResource, image_satisfies};
use crate::pass::{RgAccessTarget, RgAttachmentRole, RgLoadOp, RgPassType};
use crate::render_graph::{RenderGraph, RgCachedBacking, RgTransientBacking};
use crate::resource::{RgLookupError, RgResourceIndex, RgResourceKind};
use crate::resource_state::{RgAccessKind, RgResourceState};

/// label 已经解析的访问
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgResolvedAccess {
    pub resource: RgResourceIndex,
    pub kind: RgAccessKind,
    pub state: RgResourceState,
    pub attachment: Option<(RgAttachmentRole, RgLoadOp)>,
}

/// 同一个 pass 内对同一资源的访问合并之后的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgMergedAccess {
    pub resource: RgResourceIndex,
    pub kind: RgAccessKind,
    pub state: RgResourceState,
}

pub(crate) struct RgRenderTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub clear_values: Vec<GfxClearValue>,
}

pub(crate) struct RgCompiledPass {
    pub pass_index: usize,
    pub accesses: Vec<RgMergedAccess>,
    pub barriers: Vec<RgBarrier>,
    pub extent: vk::Extent2D,
    pub render_target: Option<RgRenderTarget>,
}

/// 物理资源绑定的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RgBackingOutcome {
    /// 沿用资源自己的物理资源（或导入的资源）
    Kept,
    /// 复用上一帧同名资源留下的物理资源，内容已丢弃
    Reused(RgResourceState),
    Allocated,
}

pub(crate) struct RgCompiledGraph {
    pub passes: Vec<RgCompiledPass>,
    pub final_states: Vec<(RgResourceIndex, RgResourceState)>,
    pub written: Vec<RgResourceIndex>,
    pub timer_pool: Option<vk::QueryPool>,
    pub dependencies: RgDependencyGraph,
}

impl<'a> RenderGraph<'a> {
    /// 编译当前声明的 pass 和资源
    ///
    /// 失败时返回第一个错误，所有错误都会输出到日志。
    pub fn compile(&mut self, device: &mut dyn GfxDevice, manager: &mut GfxResourceManager) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::compile");
        self.compiled = None;
        self.executed = false;

        match self.compile_graph(device, manager) {
            Ok(compiled) => {
                log::debug!(
                    "RenderGraph: compiled {} passes, {} barriers",
                    compiled.passes.len(),
                    compiled.passes.iter().map(|p| p.barriers.len()).sum::<usize>()
                );
                self.compiled = Some(compiled);
                if self.settings.print_execution_plan {
                    self.print_execution_plan();
                }
                Ok(())
            }
            Err(err) => {
                log::error!("RenderGraph: compile failed: {}", err);
                Err(err)
            }
        }
    }

    fn compile_graph(
        &mut self,
        device: &mut dyn GfxDevice,
        manager: &mut GfxResourceManager,
    ) -> RgResult<RgCompiledGraph> {
        let resolved = self.resolve_accesses()?;
        let backbuffer = self.resolve_backbuffer()?;

        let swapchain_extent = self.swapchain_extent(backbuffer, manager);
        self.resolve_backings(device, manager, &resolved, swapchain_extent)?;

        let mut builder = RgBarrierBuilder::default();
        let mut passes = Vec::with_capacity(self.passes.len());
        for (pass_index, accesses) in resolved.iter().enumerate() {
            let accesses = self.merge_accesses(pass_index, accesses);
            let mut barriers = Vec::new();
            for access in &accesses {
                let Some(resource) = self.resources.get(access.resource) else {
                    continue;
                };
                if let Some(barrier) = builder.access(access.resource, resource, access.kind, access.state) {
                    barriers.push(barrier);
                }
            }
            passes.push(RgCompiledPass {
                pass_index,
                accesses,
                barriers,
                extent: vk::Extent2D::default(),
                render_target: None,
            });
        }

        let dependencies = {
            let labels: Vec<&str> = self.passes.iter().map(|p| p.label.as_str()).collect();
            let accesses: Vec<Vec<(RgResourceIndex, RgAccessKind)>> = passes
                .iter()
                .map(|p| p.accesses.iter().map(|a| (a.resource, a.kind)).collect())
                .collect();
            RgDependencyGraph::build(&labels, &accesses)
        };

        self.framebuffer_cache.begin_compile(device);
        for compiled in passes.iter_mut() {
            self.build_render_target(device, &resolved[compiled.pass_index], compiled, swapchain_extent)?;
        }

        let timer_pool = if self.settings.gpu_timers {
            let slot = device.current_frame_index();
            let labels = self.passes.iter().map(|p| p.label.as_str());
            Some(self.timers.prepare(device, slot, labels).map_err(RgError::Timer)?)
        } else {
            None
        };

        Ok(RgCompiledGraph {
            passes,
            final_states: builder.final_states(),
            written: builder.written().to_vec(),
            timer_pool,
            dependencies,
        })
    }
}

// label 解析
impl<'a> RenderGraph<'a> {
    fn lookup_error(pass: &str, error: RgLookupError) -> RgError {
        match error {
            RgLookupError::Unresolved(label) => RgError::UnresolvedResource {
                pass: pass.to_string(),
                label,
            },
            RgLookupError::Cyclic(label) => RgError::CyclicAlias { label },
        }
    }

    fn resolve_accesses(&self) -> RgResult<Vec<Vec<RgResolvedAccess>>> {
        let mut errors = Vec::new();
        let mut resolved = Vec::with_capacity(self.passes.len());

        for pass in &self.passes {
            let mut pass_accesses = Vec::new();
            for access in pass.accesses() {
                let index = match self.resources.resolve(&access.resource) {
                    Ok(index) => index,
                    Err(error) => {
                        errors.push(Self::lookup_error(&pass.label, error));
                        continue;
                    }
                };
                let Some(resource) = self.resources.get(index) else {
                    continue;
                };

                let mut state = access.state;
                match (access.target, resource.kind()) {
                    (RgAccessTarget::Image | RgAccessTarget::Any, RgResourceKind::Image(_)) => {}
                    (RgAccessTarget::Buffer | RgAccessTarget::Any, RgResourceKind::Buffer(_)) => {
                        state.layout = vk::ImageLayout::UNDEFINED;
                    }
                    _ => {
                        errors.push(RgError::ResourceKindMismatch {
                            pass: pass.label.clone(),
                            label: access.resource.to_string(),
                            expected: access.target.name(),
                        });
                        continue;
                    }
                }

                pass_accesses.push(RgResolvedAccess {
                    resource: index,
                    kind: access.kind,
                    state,
                    attachment: access.attachment,
                });
            }
            resolved.push(pass_accesses);
        }

        for error in &errors {
            log::error!("RenderGraph: {}", error);
        }
        match errors.into_iter().next() {
            Some(error) => Err(error),
            None => Ok(resolved),
        }
    }

    fn resolve_backbuffer(&self) -> RgResult<Option<RgResourceIndex>> {
        let Some(backbuffer) = &self.backbuffer else {
            return Ok(None);
        };
        let index = self.resources.resolve(backbuffer).map_err(|e| Self::lookup_error("<backbuffer>", e))?;
        match self.resources.get(index).map(|r| r.kind()) {
            Some(RgResourceKind::Image(_)) => Ok(Some(index)),
            _ => Err(RgError::ResourceKindMismatch {
                pass: "<backbuffer>".to_string(),
                label: backbuffer.to_string(),
                expected: "image",
            }),
        }
    }

    /// `match_swapchain` 资源使用的尺寸
    ///
    /// 优先使用 `set_backbuffer_dimensions`，其次是 backbuffer 的实际尺寸或声明尺寸
    fn swapchain_extent(&self, backbuffer: Option<RgResourceIndex>, manager: &GfxResourceManager) -> Option<(u32, u32)> {
        if let Some(dimensions) = self.backbuffer_dimensions {
            return Some(dimensions);
        }
        let image = self.resources.get(backbuffer?)?.as_image()?;
        if let Some(gfx_image) = image.backing().and_then(|handle| manager.get_image(handle)) {
            return Some((gfx_image.desc().width, gfx_image.desc().height));
        }
        (!image.desc.match_swapchain).then_some((image.desc.width, image.desc.height))
    }
}

// 物理资源绑定
impl<'a> RenderGraph<'a> {
    fn resolve_backings(
        &mut self,
        device: &mut dyn GfxDevice,
        manager: &mut GfxResourceManager,
        resolved: &[Vec<RgResolvedAccess>],
        swapchain_extent: Option<(u32, u32)>,
    ) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::resolve_backings");

        let mut image_usage: HashMap<RgResourceIndex, vk::ImageUsageFlags> = HashMap::new();
        let mut buffer_usage: HashMap<RgResourceIndex, vk::BufferUsageFlags> = HashMap::new();
        for access in resolved.iter().flatten() {
            *image_usage.entry(access.resource).or_default() |= access.state.required_image_usage();
            *buffer_usage.entry(access.resource).or_default() |= access.state.required_buffer_usage();
        }

        let indices: Vec<RgResourceIndex> = self.resources.iter().map(|(index, _)| index).collect();
        for index in indices {
            let Some(resource) = self.resources.get_mut(index) else {
                continue;
            };
            let label = resource.label.clone();
            let outcome = match &mut resource.kind {
                RgResourceKind::Image(image) => {
                    let usage = image_usage.get(&index).copied().unwrap_or_default();
                    if image.desc.match_swapchain && swapchain_extent.is_none() {
                        log::warn!(
                            "RenderGraph: \"{}\" follows the swapchain but no backbuffer size is known, using {}x{}",
                            label,
                            image.desc.width,
                            image.desc.height
                        );
                    }
                    resolve_image_backing(
                        device,
                        manager,
                        &mut self.transient_cache,
                        &label,
                        image,
                        usage,
                        swapchain_extent,
                    )?
                }
                RgResourceKind::Buffer(buffer) => {
                    let usage = buffer_usage.get(&index).copied().unwrap_or_default();
                    resolve_buffer_backing(device, manager, &mut self.transient_cache, &label, buffer, usage)?
                }
            };

            match outcome {
                RgBackingOutcome::Kept => {}
                RgBackingOutcome::Reused(last_state) => {
                    // 内容不需要保留，但上一帧对它的访问可能还没有结束
                    log::trace!("RenderGraph: \"{}\" reuses last frame's backing", label);
                    resource.current_state =
                        RgResourceState::new(last_state.stage, last_state.src_access(), vk::ImageLayout::UNDEFINED);
                    resource.initialized = false;
                }
                RgBackingOutcome::Allocated => {
                    // 新分配的物理资源没有任何有效内容
                    resource.current_state = RgResourceState::UNDEFINED;
                    resource.initialized = false;
                }
            }
        }

        if !self.transient_cache.is_empty() {
            log::debug!("RenderGraph: releasing {} unused transient backings", self.transient_cache.len());
            self.transient_cache.clear();
        }
        Ok(())
    }
}

fn resolve_image_backing(
    device: &mut dyn GfxDevice,
    manager: &mut GfxResourceManager,
    transient_cache: &mut IndexMap<String, RgTransientBacking>,
    label: &str,
    image: &mut RgImageResource,
    extra_usage: vk::ImageUsageFlags,
    swapchain_extent: Option<(u32, u32)>,
) -> RgResult<RgBackingOutcome> {
    if image.imported {
        let bound = image.backing.as_ref().and_then(|handle| manager.get_image(handle)).map(RgBoundImage::from_gfx);
        image.bound = bound;
        return match bound {
            Some(_) => Ok(RgBackingOutcome::Kept),
            None => Err(RgError::InvalidBacking {
                label: label.to_string(),
            }),
        };
    }

    let extent = match (image.desc.match_swapchain, swapchain_extent) {
        (true, Some(extent)) => extent,
        _ => (image.desc.width, image.desc.height),
    };
    let mut want = image.desc.to_gfx(extent, extra_usage);

    let (candidate, cached_state) = match image.backing.take() {
        Some(handle) => (Some(handle), None),
        None => match transient_cache.shift_remove(label) {
            Some(RgTransientBacking {
                backing: RgCachedBacking::Image(handle),
                last_state,
            }) => (Some(handle), Some(last_state)),
            _ => (None, None),
        },
    };
    if let Some(handle) = candidate
        && let Some(existing) = manager.get_image(&handle)
    {
        if image_satisfies(existing.desc(), &want) {
            image.bound = Some(RgBoundImage::from_gfx(existing));
            image.backing = Some(handle);
            return Ok(cached_state.map_or(RgBackingOutcome::Kept, RgBackingOutcome::Reused));
        }
        let have = existing.desc();
        if have.format == want.format && have.samples == want.samples {
            // 只是太小或 usage 不够时，按每个维度的最大值重新分配
            want.width = want.width.max(have.width);
            want.height = want.height.max(have.height);
            want.depth = want.depth.max(have.depth);
            want.usage |= have.usage;
        }
    }

    let handle = manager.create_image(device, &want, label).map_err(|source| {
        log::error!("RenderGraph: failed to allocate image \"{}\": {}", label, source);
        RgError::Allocation {
            label: label.to_string(),
            source,
        }
    })?;
    log::debug!("RenderGraph: allocated image \"{}\" {}x{} {:?}", label, want.width, want.height, want.format);
    image.bound = manager.get_image(&handle).map(RgBoundImage::from_gfx);
    image.backing = Some(handle);
    Ok(RgBackingOutcome::Allocated)
}

fn resolve_buffer_backing(
    device: &mut dyn GfxDevice,
    manager: &mut GfxResourceManager,
    transient_cache: &mut IndexMap<String, RgTransientBacking>,
    label: &str,
    buffer: &mut RgBufferResource,
    extra_usage: vk::BufferUsageFlags,
) -> RgResult<RgBackingOutcome> {
    let bind = |gfx: &GfxBuffer| RgBoundBuffer {
        buffer: gfx.handle(),
        size: gfx.size(),
    };

    if buffer.imported {
        let bound = buffer.backing.as_ref().and_then(|handle| manager.get_buffer(handle)).map(bind);
        buffer.bound = bound;
        return match bound {
            Some(_) => Ok(RgBackingOutcome::Kept),
            None => Err(RgError::InvalidBacking {
                label: label.to_string(),
            }),
        };
    }

    let mut want = buffer.desc.to_gfx(extra_usage);
    let (candidate, cached_state) = match buffer.backing.take() {
        Some(handle) => (Some(handle), None),
        None => match transient_cache.shift_remove(label) {
            Some(RgTransientBacking {
                backing: RgCachedBacking::Buffer(handle),
                last_state,
            }) => (Some(handle), Some(last_state)),
            _ => (None, None),
        },
    };
    if let Some(handle) = candidate
        && let Some(existing) = manager.get_buffer(&handle)
    {
        if buffer_satisfies(existing.desc(), &want) {
            buffer.bound = Some(bind(existing));
            buffer.backing = Some(handle);
            return Ok(cached_state.map_or(RgBackingOutcome::Kept, RgBackingOutcome::Reused));
        }
        want.size = want.size.max(existing.size());
        want.usage |= existing.desc().usage;
    }

    let handle = manager.create_buffer(device, &want, label).map_err(|source| {
        log::error!("RenderGraph: failed to allocate buffer \"{}\": {}", label, source);
        RgError::Allocation {
            label: label.to_string(),
            source,
        }
    })?;
    log::debug!("RenderGraph: allocated buffer \"{}\" ({} bytes)", label, want.size);
    buffer.bound = manager.get_buffer(&handle).map(bind);
    buffer.backing = Some(handle);
    Ok(RgBackingOutcome::Allocated)
}

// barrier 与 framebuffer
impl<'a> RenderGraph<'a> {
    /// 合并同一个 pass 对同一资源的多次访问，保持第一次出现的顺序
    fn merge_accesses(&self, pass_index: usize, accesses: &[RgResolvedAccess]) -> Vec<RgMergedAccess> {
        let mut merged: IndexMap<RgResourceIndex, RgMergedAccess> = IndexMap::new();
        for access in accesses {
            let Some(existing) = merged.get_mut(&access.resource) else {
                merged.insert(
                    access.resource,
                    RgMergedAccess {
                        resource: access.resource,
                        kind: access.kind,
                        state: access.state,
                    },
                );
                continue;
            };

            let layout = match (existing.kind, access.kind) {
                (RgAccessKind::Write, RgAccessKind::Read) => existing.state.layout,
                (RgAccessKind::Read, RgAccessKind::Write) => access.state.layout,
                _ if existing.state.layout == access.state.layout => existing.state.layout,
                (RgAccessKind::Write, RgAccessKind::Write) => existing.state.layout,
                (RgAccessKind::Read, RgAccessKind::Read) => vk::ImageLayout::GENERAL,
            };
            if existing.state.layout != access.state.layout {
                log::warn!(
                    "RenderGraph: pass \"{}\" uses \"{}\" with layouts {:?} and {:?}, using {:?}",
                    self.passes[pass_index].label,
                    self.resources.label_of(access.resource),
                    existing.state.layout,
                    access.state.layout,
                    layout
                );
            }

            existing.state = RgResourceState::new(
                existing.state.stage | access.state.stage,
                existing.state.access | access.state.access,
                layout,
            );
            if access.kind == RgAccessKind::Write {
                existing.kind = RgAccessKind::Write;
            }
        }
        merged.into_values().collect()
    }

    fn build_render_target(
        &mut self,
        device: &mut dyn GfxDevice,
        resolved: &[RgResolvedAccess],
        compiled: &mut RgCompiledPass,
        swapchain_extent: Option<(u32, u32)>,
    ) -> RgResult<()> {
        let pass = &self.passes[compiled.pass_index];

        let bound_image =
            |index: RgResourceIndex| -> Option<(RgBoundImage, vk::SampleCountFlags, GfxWeakHandle<GfxImage>)> {
            let image = self.resources.get(index)?.as_image()?;
            Some((image.bound?, image.desc.samples, image.backing.as_ref()?.downgrade()))
        };

        let attachments: Vec<&RgResolvedAccess> = resolved.iter().filter(|a| a.attachment.is_some()).collect();
        let first_attachment_extent = attachments.iter().find_map(|a| bound_image(a.resource)).map(|(b, _, _)| b.extent);
        let (width, height) = pass.dimensions.or(first_attachment_extent).or(swapchain_extent).unwrap_or((1, 1));
        compiled.extent = vk::Extent2D { width, height };

        if attachments.is_empty() {
            return Ok(());
        }
        if pass.pass_type != RgPassType::Graphics {
            log::warn!("RenderGraph: {:?} pass \"{}\" declares attachments; they are ignored", pass.pass_type, pass.label);
            return Ok(());
        }

        let merged_layout = |index: RgResourceIndex| {
            compiled.accesses.iter().find(|a| a.resource == index).map_or(vk::ImageLayout::GENERAL, |a| a.state.layout)
        };

        let mut desc = GfxRenderPassDesc::default();
        let mut views = Vec::new();
        let mut colour_clears = Vec::new();
        let mut depth_clear = None;
        let mut depth_view = None;
        let mut seen: Vec<RgResourceIndex> = Vec::new();

        for access in attachments {
            let Some((role, load_op)) = access.attachment else {
                continue;
            };
            if seen.contains(&access.resource) {
                continue;
            }
            seen.push(access.resource);
            let Some((bound, samples, owner)) = bound_image(access.resource) else {
                continue;
            };

            let layout = merged_layout(access.resource);
            let attachment = GfxAttachmentDesc {
                format: bound.format,
                samples,
                load_op: load_op.to_vk(),
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: layout,
                final_layout: layout,
            };
            match role {
                RgAttachmentRole::Color => {
                    desc.color_attachments.push(attachment);
                    views.push(RgFramebufferAttachment {
                        view: bound.view,
                        image: owner,
                    });
                    colour_clears.push(match load_op {
                        RgLoadOp::Clear(value) => value,
                        _ => GfxClearValue::BLACK,
                    });
                }
                RgAttachmentRole::Depth if desc.depth_attachment.is_none() => {
                    desc.depth_attachment = Some(attachment);
                    depth_view = Some(RgFramebufferAttachment {
                        view: bound.view,
                        image: owner,
                    });
                    depth_clear = Some(match load_op {
                        RgLoadOp::Clear(value) => value,
                        _ => GfxClearValue::DEPTH_ONE,
                    });
                }
                RgAttachmentRole::Depth => {
                    log::warn!("RenderGraph: pass \"{}\" declares more than one depth attachment", pass.label);
                }
            }
        }

        // attachment 顺序：colour 在前，depth 在最后
        views.extend(depth_view);
        let mut clear_values = colour_clears;
        clear_values.extend(depth_clear);

        let framebuffer_error = |source| RgError::Framebuffer {
            pass: pass.label.clone(),
            source,
        };
        let (render_pass_id, render_pass) =
            self.framebuffer_cache.get_render_pass(device, &desc, &pass.label).map_err(framebuffer_error)?;
        let framebuffer = self
            .framebuffer_cache
            .get_framebuffer(device, render_pass_id, render_pass, &views, compiled.extent, &pass.label)
            .map_err(framebuffer_error)?;

        compiled.render_target = Some(RgRenderTarget {
            render_pass,
            framebuffer,
            clear_values,
        });
        Ok(())
    }
}
