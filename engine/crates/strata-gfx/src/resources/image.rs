use ash::vk;

/// 创建 image 所需的信息
///
/// 每个 image 都会带一个覆盖全部 subresource 的默认 view
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxImageDesc {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
}

impl Default for GfxImageDesc {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            samples: vk::SampleCountFlags::TYPE_1,
        }
    }
}

impl GfxImageDesc {
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            width,
            height,
            format,
            usage,
            ..Default::default()
        }
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    #[inline]
    pub fn image_type(&self) -> vk::ImageType {
        if self.depth > 1 { vk::ImageType::TYPE_3D } else { vk::ImageType::TYPE_2D }
    }

    /// 根据 format 推断 aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    #[inline]
    pub fn is_depth_format(format: vk::Format) -> bool {
        Self::infer_aspect(format).contains(vk::ImageAspectFlags::DEPTH)
    }
}

pub struct GfxImage {
    handle: vk::Image,
    view: vk::ImageView,
    desc: GfxImageDesc,
    name: String,
}

// new & init
impl GfxImage {
    /// 由 device 在创建完 vk 对象之后调用
    pub fn new(handle: vk::Image, view: vk::ImageView, desc: GfxImageDesc, name: impl Into<String>) -> Self {
        Self {
            handle,
            view,
            desc,
            name: name.into(),
        }
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn desc(&self) -> &GfxImageDesc {
        &self.desc
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        GfxImageDesc::infer_aspect(self.desc.format)
    }
}

impl std::fmt::Debug for GfxImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxImage")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("extent", &(self.desc.width, self.desc.height, self.desc.depth))
            .field("format", &self.desc.format)
            .finish()
    }
}
