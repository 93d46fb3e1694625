use ash::vk;
use strata_gfx::resources::buffer::GfxBufferDesc;
use strata_render_interface::handles::GfxBufferHandle;

/// 缓冲区资源描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途，会与 pass 声明推断出的 usage 合并
    pub usage: vk::BufferUsageFlags,
    /// `reset()` 之后仍然保留
    pub persistent: bool,
}

impl Default for RgBufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            persistent: false,
        }
    }
}

// new & init
impl RgBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            persistent: false,
        }
    }

    #[inline]
    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    pub fn from_gfx(desc: &GfxBufferDesc) -> Self {
        Self::new(desc.size, desc.usage)
    }

    pub(crate) fn to_gfx(&self, extra_usage: vk::BufferUsageFlags) -> GfxBufferDesc {
        GfxBufferDesc::new(self.size, self.usage | extra_usage)
    }
}

pub(crate) fn buffer_satisfies(have: &GfxBufferDesc, want: &GfxBufferDesc) -> bool {
    have.size >= want.size && have.usage.contains(want.usage)
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct RgBoundBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
}

/// 缓冲区资源条目
#[derive(Debug)]
pub struct RgBufferResource {
    pub(crate) desc: RgBufferDesc,
    pub(crate) backing: Option<GfxBufferHandle>,
    pub(crate) imported: bool,
    pub(crate) bound: Option<RgBoundBuffer>,
}

// new & init
impl RgBufferResource {
    pub(crate) fn new(desc: RgBufferDesc, backing: Option<GfxBufferHandle>) -> Self {
        Self {
            desc,
            imported: backing.is_some(),
            backing,
            bound: None,
        }
    }
}

// getters
impl RgBufferResource {
    #[inline]
    pub fn desc(&self) -> &RgBufferDesc {
        &self.desc
    }

    #[inline]
    pub fn backing(&self) -> Option<&GfxBufferHandle> {
        self.backing.as_ref()
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        self.imported
    }

    #[inline]
    pub fn vk_buffer(&self) -> Option<vk::Buffer> {
        self.bound.map(|b| b.buffer)
    }

    #[inline]
    pub fn size(&self) -> Option<vk::DeviceSize> {
        self.bound.map(|b| b.size)
    }
}
