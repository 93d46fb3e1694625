use ash::vk;
use strata_gfx::resources::image::{GfxImage, GfxImageDesc};
use strata_render_interface::handles::GfxImageHandle;

/// 图像资源描述
///
/// `usage` 只需要写出 pass 声明推断不出来的部分，编译时会与所有访问需要的 usage 合并。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgImageDesc {
    /// 图像宽度
    pub width: u32,
    /// 图像高度
    pub height: u32,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 图像格式
    pub format: vk::Format,
    /// 图像用途
    pub usage: vk::ImageUsageFlags,
    /// 采样数
    pub samples: vk::SampleCountFlags,
    /// 尺寸跟随 backbuffer，`width` / `height` 会被忽略
    pub match_swapchain: bool,
    /// `reset()` 之后仍然保留（包括物理资源与状态）
    pub persistent: bool,
}

impl Default for RgImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::empty(),
            samples: vk::SampleCountFlags::TYPE_1,
            match_swapchain: false,
            persistent: false,
        }
    }
}

// new & init & builder
impl RgImageDesc {
    /// 创建 2D 图像描述
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// 尺寸与 backbuffer 一致的 2D 图像，跨帧保留
    #[inline]
    pub fn swapchain_relative(format: vk::Format) -> Self {
        Self {
            format,
            match_swapchain: true,
            persistent: true,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// 从已有的物理 image 反推描述（导入资源使用）
    pub fn from_gfx(desc: &GfxImageDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            mip_levels: desc.mip_levels,
            array_layers: desc.array_layers,
            format: desc.format,
            usage: desc.usage,
            samples: desc.samples,
            match_swapchain: false,
            persistent: false,
        }
    }

    /// 转换成创建物理 image 的描述
    pub(crate) fn to_gfx(&self, extent: (u32, u32), extra_usage: vk::ImageUsageFlags) -> GfxImageDesc {
        GfxImageDesc {
            width: extent.0,
            height: extent.1,
            depth: self.depth,
            mip_levels: self.mip_levels,
            array_layers: self.array_layers,
            format: self.format,
            usage: self.usage | extra_usage,
            samples: self.samples,
        }
    }
}

/// 物理 image 能否满足需求：格式一致、usage 是超集、每个维度都不小于需求
pub(crate) fn image_satisfies(have: &GfxImageDesc, want: &GfxImageDesc) -> bool {
    have.format == want.format
        && have.samples == want.samples
        && have.mip_levels == want.mip_levels
        && have.array_layers == want.array_layers
        && have.usage.contains(want.usage)
        && have.width >= want.width
        && have.height >= want.height
        && have.depth >= want.depth
}

/// 编译后绑定到逻辑资源上的物理 image 信息
#[derive(Clone, Copy, Debug)]
pub(crate) struct RgBoundImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: (u32, u32),
    pub aspect: vk::ImageAspectFlags,
}

impl RgBoundImage {
    pub fn from_gfx(image: &GfxImage) -> Self {
        Self {
            image: image.handle(),
            view: image.view(),
            format: image.format(),
            extent: (image.desc().width, image.desc().height),
            aspect: image.aspect(),
        }
    }
}

/// 图像资源条目
#[derive(Debug)]
pub struct RgImageResource {
    pub(crate) desc: RgImageDesc,
    /// 物理资源；导入的资源在注册时提供，其余在编译时分配
    pub(crate) backing: Option<GfxImageHandle>,
    pub(crate) imported: bool,
    pub(crate) bound: Option<RgBoundImage>,
}

// new & init
impl RgImageResource {
    pub(crate) fn new(desc: RgImageDesc, backing: Option<GfxImageHandle>) -> Self {
        Self {
            desc,
            imported: backing.is_some(),
            backing,
            bound: None,
        }
    }
}

// getters
impl RgImageResource {
    #[inline]
    pub fn desc(&self) -> &RgImageDesc {
        &self.desc
    }

    #[inline]
    pub fn backing(&self) -> Option<&GfxImageHandle> {
        self.backing.as_ref()
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        self.imported
    }

    /// 编译后的 vk image
    #[inline]
    pub fn vk_image(&self) -> Option<vk::Image> {
        self.bound.map(|b| b.image)
    }

    /// 编译后的默认 view
    #[inline]
    pub fn vk_view(&self) -> Option<vk::ImageView> {
        self.bound.map(|b| b.view)
    }

    /// 编译后的实际尺寸
    #[inline]
    pub fn extent(&self) -> Option<(u32, u32)> {
        self.bound.map(|b| b.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn larger_image_with_more_usage_satisfies() {
        let want = RgImageDesc::new_2d(512, 512, vk::Format::R8G8B8A8_UNORM)
            .to_gfx((512, 512), vk::ImageUsageFlags::COLOR_ATTACHMENT);
        let mut have = want.clone();
        have.width = 1024;
        have.usage |= vk::ImageUsageFlags::SAMPLED;
        assert!(image_satisfies(&have, &want));

        have.format = vk::Format::R16G16B16A16_SFLOAT;
        assert!(!image_satisfies(&have, &want));
    }

    #[test]
    fn smaller_image_does_not_satisfy() {
        let want = GfxImageDesc::new_2d(512, 512, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        let have = GfxImageDesc::new_2d(512, 256, vk::Format::R8G8B8A8_UNORM, vk::ImageUsageFlags::SAMPLED);
        assert!(!image_satisfies(&have, &want));
    }
}
