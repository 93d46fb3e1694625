//! render pass 与 framebuffer 的描述
//!
//! 描述都实现了 `Hash`，上层可以直接用作缓存的 key。

use ash::vk;

/// attachment 的清除值
///
/// `vk::ClearValue` 是 union，无法比较和打印，所以这里自己定义一份
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl GfxClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 1.0]);
    pub const DEPTH_ONE: Self = Self::DepthStencil { depth: 1.0, stencil: 0 };

    pub fn to_vk(&self) -> vk::ClearValue {
        match *self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GfxAttachmentDesc {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

/// 单 subpass 的 render pass 描述
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GfxRenderPassDesc {
    pub color_attachments: Vec<GfxAttachmentDesc>,
    pub depth_attachment: Option<GfxAttachmentDesc>,
}

impl GfxRenderPassDesc {
    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.color_attachments.len() + self.depth_attachment.iter().count()
    }
}

/// framebuffer 描述，attachments 的顺序与 render pass 一致：先 color，后 depth
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxFramebufferDesc {
    pub render_pass: vk::RenderPass,
    pub attachments: Vec<vk::ImageView>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

#[derive(Clone, Debug)]
pub struct GfxRenderPassBeginInfo {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: Vec<GfxClearValue>,
}

impl GfxRenderPassBeginInfo {
    /// 转换为 vk 的 clear value 列表，供原生后端使用
    pub fn vk_clear_values(&self) -> Vec<vk::ClearValue> {
        self.clear_values.iter().map(GfxClearValue::to_vk).collect()
    }
}
