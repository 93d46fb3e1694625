use ash::vk;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxBufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl GfxBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }
}

#[derive(Debug)]
pub struct GfxBuffer {
    handle: vk::Buffer,
    desc: GfxBufferDesc,
    name: String,
}

// new & init
impl GfxBuffer {
    pub fn new(handle: vk::Buffer, desc: GfxBufferDesc, name: impl Into<String>) -> Self {
        Self {
            handle,
            desc,
            name: name.into(),
        }
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn desc(&self) -> &GfxBufferDesc {
        &self.desc
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
