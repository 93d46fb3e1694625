//! render pass 与 framebuffer 缓存
//!
//! render pass 按结构化的描述缓存，ID 由缓存实例自己分配；
//! framebuffer 按 (render pass ID, attachment views, 尺寸) 缓存。
//! 连续 `frames_in_flight + 1` 次编译没有使用的条目会被销毁。
//!
//! framebuffer 同时记住每个 attachment 所属的 image。image 被释放，或者同一个 view
//! 值对应了另一个 image 时，条目立即从缓存中移除，但要等 `frames_in_flight + 1`
//! 次编译之后才真正销毁，之前录制的命令可能还在使用它。

use std::collections::HashMap;

use ash::vk;

use strata_gfx::GfxResult;
use strata_gfx::device::GfxDevice;
use strata_gfx::render_pass::{GfxFramebufferDesc, GfxRenderPassDesc};
use strata_gfx::resources::image::GfxImage;
use strata_render_interface::handles::GfxWeakHandle;

struct RgCachedRenderPass {
    id: u64,
    render_pass: vk::RenderPass,
    last_used: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct RgFramebufferKey {
    render_pass_id: u64,
    attachments: Vec<vk::ImageView>,
    extent: (u32, u32),
}

struct RgCachedFramebuffer {
    framebuffer: vk::Framebuffer,
    /// 与 key 中的 attachments 一一对应
    owners: Vec<GfxWeakHandle<GfxImage>>,
    last_used: u64,
}

/// framebuffer 的一个 attachment
pub struct RgFramebufferAttachment {
    pub view: vk::ImageView,
    pub image: GfxWeakHandle<GfxImage>,
}

#[derive(Default)]
pub struct RgFramebufferCache {
    render_passes: HashMap<GfxRenderPassDesc, RgCachedRenderPass>,
    framebuffers: HashMap<RgFramebufferKey, RgCachedFramebuffer>,
    /// 已经移出缓存、等待销毁的 framebuffer 以及移出时的编译序号
    retired_framebuffers: Vec<(vk::Framebuffer, u64)>,
    next_render_pass_id: u64,
    /// 每次编译加一
    compile_index: u64,
}

// new & init
impl RgFramebufferCache {
    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl RgFramebufferCache {
    #[inline]
    pub fn render_pass_count(&self) -> usize {
        self.render_passes.len()
    }

    #[inline]
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn retired_framebuffer_count(&self) -> usize {
        self.retired_framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.render_passes.is_empty() && self.framebuffers.is_empty() && self.retired_framebuffers.is_empty()
    }
}

// tools
impl RgFramebufferCache {
    /// 新一次编译开始：销毁太久没有使用的条目
    pub fn begin_compile(&mut self, device: &mut dyn GfxDevice) {
        self.compile_index += 1;
        let max_age = device.frames_in_flight() as u64 + 1;
        let compile_index = self.compile_index;
        let expired = |last_used: u64| compile_index - last_used > max_age;

        let mut evicted_framebuffers = 0;
        let retired = &mut self.retired_framebuffers;
        self.framebuffers.retain(|_, cached| {
            if expired(cached.last_used) {
                device.destroy_framebuffer(cached.framebuffer);
                evicted_framebuffers += 1;
                false
            } else if !cached.owners.iter().all(GfxWeakHandle::is_alive) {
                retired.push((cached.framebuffer, compile_index));
                false
            } else {
                true
            }
        });
        self.retired_framebuffers.retain(|&(framebuffer, retired_at)| {
            if expired(retired_at) {
                device.destroy_framebuffer(framebuffer);
                evicted_framebuffers += 1;
                false
            } else {
                true
            }
        });

        let mut evicted_render_passes = 0;
        self.render_passes.retain(|_, cached| {
            if expired(cached.last_used) {
                device.destroy_render_pass(cached.render_pass);
                evicted_render_passes += 1;
                false
            } else {
                true
            }
        });

        if evicted_framebuffers + evicted_render_passes > 0 {
            log::debug!(
                "RgFramebufferCache: evicted {} framebuffers and {} render passes",
                evicted_framebuffers,
                evicted_render_passes
            );
        }
    }

    /// 获取或创建 render pass，返回 (ID, render pass)
    pub fn get_render_pass(
        &mut self,
        device: &mut dyn GfxDevice,
        desc: &GfxRenderPassDesc,
        name: &str,
    ) -> GfxResult<(u64, vk::RenderPass)> {
        if let Some(cached) = self.render_passes.get_mut(desc) {
            cached.last_used = self.compile_index;
            return Ok((cached.id, cached.render_pass));
        }

        let render_pass = device.create_render_pass(desc, name)?;
        let id = self.next_render_pass_id;
        self.next_render_pass_id += 1;
        log::debug!("RgFramebufferCache: created render pass {} for \"{}\"", id, name);

        self.render_passes.insert(
            desc.clone(),
            RgCachedRenderPass {
                id,
                render_pass,
                last_used: self.compile_index,
            },
        );
        Ok((id, render_pass))
    }

    /// 获取或创建 framebuffer
    pub fn get_framebuffer(
        &mut self,
        device: &mut dyn GfxDevice,
        render_pass_id: u64,
        render_pass: vk::RenderPass,
        attachments: &[RgFramebufferAttachment],
        extent: vk::Extent2D,
        name: &str,
    ) -> GfxResult<vk::Framebuffer> {
        let key = RgFramebufferKey {
            render_pass_id,
            attachments: attachments.iter().map(|a| a.view).collect(),
            extent: (extent.width, extent.height),
        };
        let owners: Vec<GfxWeakHandle<GfxImage>> = attachments.iter().map(|a| a.image.clone()).collect();
        if let Some(cached) = self.framebuffers.get_mut(&key) {
            if cached.owners == owners {
                cached.last_used = self.compile_index;
                return Ok(cached.framebuffer);
            }
            // view 的值被另一个 image 复用了
            log::debug!("RgFramebufferCache: framebuffer of \"{}\" refers to replaced images, recreating", name);
            if let Some(stale) = self.framebuffers.remove(&key) {
                self.retired_framebuffers.push((stale.framebuffer, self.compile_index));
            }
        }

        let framebuffer = device.create_framebuffer(
            &GfxFramebufferDesc {
                render_pass,
                attachments: key.attachments.clone(),
                width: extent.width,
                height: extent.height,
                layers: 1,
            },
            name,
        )?;
        log::debug!(
            "RgFramebufferCache: created framebuffer {}x{} with {} attachments for \"{}\"",
            extent.width,
            extent.height,
            attachments.len(),
            name
        );

        self.framebuffers.insert(
            key,
            RgCachedFramebuffer {
                framebuffer,
                owners,
                last_used: self.compile_index,
            },
        );
        Ok(framebuffer)
    }
}

// destroy
impl RgFramebufferCache {
    pub fn destroy(&mut self, device: &mut dyn GfxDevice) {
        for (_, cached) in self.framebuffers.drain() {
            device.destroy_framebuffer(cached.framebuffer);
        }
        for (framebuffer, _) in self.retired_framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer);
        }
        for (_, cached) in self.render_passes.drain() {
            device.destroy_render_pass(cached.render_pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_gfx::headless::{GfxHeadlessDevice, GfxObjectKind};
    use strata_gfx::render_pass::GfxAttachmentDesc;
    use strata_gfx::resources::image::GfxImageDesc;
    use strata_render_interface::gfx_resource_manager::GfxResourceManager;
    use strata_render_interface::handles::GfxImageHandle;

    fn color_pass() -> GfxRenderPassDesc {
        GfxRenderPassDesc {
            color_attachments: vec![GfxAttachmentDesc {
                format: vk::Format::R8G8B8A8_UNORM,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op: vk::AttachmentLoadOp::CLEAR,
                store_op: vk::AttachmentStoreOp::STORE,
                initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }],
            depth_attachment: None,
        }
    }

    fn color_image(device: &mut GfxHeadlessDevice, manager: &mut GfxResourceManager, size: u32) -> GfxImageHandle {
        manager
            .create_image(
                device,
                &GfxImageDesc::new_2d(size, size, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::COLOR_ATTACHMENT),
                "color",
            )
            .expect("headless allocation")
    }

    fn attachment(manager: &GfxResourceManager, view_of: &GfxImageHandle, owner: &GfxImageHandle) -> RgFramebufferAttachment {
        RgFramebufferAttachment {
            view: manager.get_image(view_of).map(|i| i.view()).expect("live image"),
            image: owner.downgrade(),
        }
    }

    #[test]
    fn identical_requests_hit_the_cache() {
        let mut device = GfxHeadlessDevice::new(2);
        let mut manager = GfxResourceManager::new(2);
        let image = color_image(&mut device, &mut manager, 64);
        let extent = vk::Extent2D { width: 64, height: 64 };

        let mut cache = RgFramebufferCache::new();
        cache.begin_compile(&mut device);
        let (id, rp) = cache.get_render_pass(&mut device, &color_pass(), "draw").expect("render pass");
        let fb = cache
            .get_framebuffer(&mut device, id, rp, &[attachment(&manager, &image, &image)], extent, "draw")
            .expect("framebuffer");

        cache.begin_compile(&mut device);
        let (id_again, rp_again) = cache.get_render_pass(&mut device, &color_pass(), "draw").expect("render pass");
        let fb_again = cache
            .get_framebuffer(&mut device, id_again, rp_again, &[attachment(&manager, &image, &image)], extent, "draw")
            .expect("fb");

        assert_eq!((id, rp, fb), (id_again, rp_again, fb_again));
        assert_eq!(device.live_count(GfxObjectKind::RenderPass), 1);
        assert_eq!(device.live_count(GfxObjectKind::Framebuffer), 1);

        cache.destroy(&mut device);
        drop(image);
        manager.destroy_all(&mut device);
        assert_eq!(device.total_live_count(), 0);
    }

    #[test]
    fn unused_entries_are_evicted_after_the_in_flight_window() {
        let mut device = GfxHeadlessDevice::new(2);
        let mut manager = GfxResourceManager::new(2);
        let image = color_image(&mut device, &mut manager, 32);
        let extent = vk::Extent2D { width: 32, height: 32 };

        let mut cache = RgFramebufferCache::new();
        cache.begin_compile(&mut device);
        let (id, rp) = cache.get_render_pass(&mut device, &color_pass(), "draw").expect("render pass");
        cache
            .get_framebuffer(&mut device, id, rp, &[attachment(&manager, &image, &image)], extent, "draw")
            .expect("framebuffer");

        // 还在 frames_in_flight + 1 的窗口内
        for _ in 0..3 {
            cache.begin_compile(&mut device);
        }
        assert_eq!(cache.framebuffer_count(), 1);

        cache.begin_compile(&mut device);
        assert!(cache.is_empty());
        assert_eq!(device.live_count(GfxObjectKind::Framebuffer), 0);
        assert_eq!(device.live_count(GfxObjectKind::RenderPass), 0);

        drop(image);
        manager.destroy_all(&mut device);
    }

    #[test]
    fn released_attachment_retires_its_framebuffer() {
        let mut device = GfxHeadlessDevice::new(2);
        let mut manager = GfxResourceManager::new(2);
        let image = color_image(&mut device, &mut manager, 32);
        let extent = vk::Extent2D { width: 32, height: 32 };

        let mut cache = RgFramebufferCache::new();
        cache.begin_compile(&mut device);
        let (id, rp) = cache.get_render_pass(&mut device, &color_pass(), "draw").expect("render pass");
        cache
            .get_framebuffer(&mut device, id, rp, &[attachment(&manager, &image, &image)], extent, "draw")
            .expect("framebuffer");

        drop(image);
        cache.begin_compile(&mut device);
        assert_eq!(cache.framebuffer_count(), 0);
        assert_eq!(cache.retired_framebuffer_count(), 1);
        // 之前录制的命令可能还在使用，暂时不销毁
        assert_eq!(device.live_count(GfxObjectKind::Framebuffer), 1);

        for _ in 0..3 {
            cache.begin_compile(&mut device);
        }
        assert_eq!(cache.retired_framebuffer_count(), 1);
        cache.begin_compile(&mut device);
        assert_eq!(cache.retired_framebuffer_count(), 0);
        assert_eq!(device.live_count(GfxObjectKind::Framebuffer), 0);

        cache.destroy(&mut device);
        manager.destroy_all(&mut device);
        assert_eq!(device.total_live_count(), 0);
    }

    #[test]
    fn same_view_value_with_another_image_is_not_reused() {
        let mut device = GfxHeadlessDevice::new(2);
        let mut manager = GfxResourceManager::new(2);
        let first = color_image(&mut device, &mut manager, 16);
        let second = color_image(&mut device, &mut manager, 16);
        let extent = vk::Extent2D { width: 16, height: 16 };

        let mut cache = RgFramebufferCache::new();
        cache.begin_compile(&mut device);
        let (id, rp) = cache.get_render_pass(&mut device, &color_pass(), "draw").expect("render pass");
        let old = cache
            .get_framebuffer(&mut device, id, rp, &[attachment(&manager, &first, &first)], extent, "draw")
            .expect("framebuffer");
        // 模拟驱动把同一个 view 值分配给了新的 image
        let new = cache
            .get_framebuffer(&mut device, id, rp, &[attachment(&manager, &first, &second)], extent, "draw")
            .expect("framebuffer");

        assert_ne!(old, new);
        assert_eq!(cache.framebuffer_count(), 1);
        assert_eq!(cache.retired_framebuffer_count(), 1);

        cache.destroy(&mut device);
        drop((first, second));
        manager.destroy_all(&mut device);
        assert_eq!(device.total_live_count(), 0);
    }
}
