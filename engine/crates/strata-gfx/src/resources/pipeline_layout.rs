use ash::vk;

#[derive(Clone, Debug, Default)]
pub struct GfxPipelineLayoutDesc {
    pub set_layouts: Vec<vk::DescriptorSetLayout>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

#[derive(Debug)]
pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    name: String,
}

impl GfxPipelineLayout {
    pub fn new(handle: vk::PipelineLayout, name: impl Into<String>) -> Self {
        Self {
            handle,
            name: name.into(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
