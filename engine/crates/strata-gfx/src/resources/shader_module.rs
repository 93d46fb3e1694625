use ash::vk;

#[derive(Debug)]
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    /// SPIR-V 的 word 数量
    code_len: usize,
    name: String,
}

impl GfxShaderModule {
    pub fn new(handle: vk::ShaderModule, code_len: usize, name: impl Into<String>) -> Self {
        Self {
            handle,
            code_len,
            name: name.into(),
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn code_len(&self) -> usize {
        self.code_len
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
