use ash::vk;

/// GFX 层的错误类型
///
/// 只覆盖渲染图需要区分的几种失败，其余情况统一包装成 `vk::Result`。
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("out of device memory while creating {what}")]
    OutOfDeviceMemory { what: String },

    #[error("device lost")]
    DeviceLost,

    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

pub type GfxResult<T> = Result<T, GfxError>;
