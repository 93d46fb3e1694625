//! Pass 定义和构建器
//!
//! `RgPass` 记录一个 pass 声明的资源访问，label 在编译阶段才解析，
//! 因此声明顺序和资源注册顺序可以交错。

use ash::vk;

use strata_gfx::basic::color::LabelColor;
use strata_gfx::commands::command_recorder::GfxCommandRecorder;
use strata_gfx::render_pass::GfxClearValue;
use strata_render_interface::handles::{GfxBufferHandle, GfxImageHandle};

use crate::resource::{RgResourceRef, RgResourceTable};
use crate::resource_state::{RgAccessKind, RgResourceState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassType {
    /// 有 attachment 时需要 render pass 和 framebuffer
    Graphics,
    Compute,
    Transfer,
}

impl RgPassType {
    pub fn default_debug_color(self) -> glam::Vec4 {
        match self {
            Self::Graphics => LabelColor::COLOR_PASS,
            Self::Compute => LabelColor::COLOR_COMPUTE_PASS,
            Self::Transfer => LabelColor::COLOR_TRANSFER_PASS,
        }
    }
}

/// attachment 的 load 行为
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgLoadOp {
    Load,
    Clear(GfxClearValue),
    DontCare,
}

impl RgLoadOp {
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            Self::Load => vk::AttachmentLoadOp::LOAD,
            Self::Clear(_) => vk::AttachmentLoadOp::CLEAR,
            Self::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgAttachmentRole {
    Color,
    Depth,
}

/// 访问要求的资源类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgAccessTarget {
    Image,
    Buffer,
    /// transfer 访问对 image 和 buffer 都适用
    Any,
}

impl RgAccessTarget {
    pub fn name(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Buffer => "buffer",
            Self::Any => "image or buffer",
        }
    }
}

/// pass 对一个资源的一次访问
#[derive(Clone, Debug)]
pub struct RgAccess {
    pub resource: RgResourceRef,
    pub kind: RgAccessKind,
    pub state: RgResourceState,
    pub target: RgAccessTarget,
    pub attachment: Option<(RgAttachmentRole, RgLoadOp)>,
}

pub type RgExecuteFn<'a> = Box<dyn FnMut(&mut RgPassContext<'_>) + 'a>;

/// 一个声明的 pass
pub struct RgPass<'a> {
    pub(crate) label: String,
    pub(crate) pass_type: RgPassType,
    pub(crate) inputs: Vec<RgAccess>,
    pub(crate) outputs: Vec<RgAccess>,
    pub(crate) dimensions: Option<(u32, u32)>,
    pub(crate) debug_color: glam::Vec4,
    pub(crate) execute: Option<RgExecuteFn<'a>>,
}

// new & init
impl<'a> RgPass<'a> {
    pub(crate) fn new(label: impl Into<String>, pass_type: RgPassType) -> Self {
        Self {
            label: label.into(),
            pass_type,
            inputs: Vec::new(),
            outputs: Vec::new(),
            dimensions: None,
            debug_color: pass_type.default_debug_color(),
            execute: None,
        }
    }
}

// getters
impl RgPass<'_> {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.pass_type
    }

    #[inline]
    pub fn inputs(&self) -> &[RgAccess] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[RgAccess] {
        &self.outputs
    }

    #[inline]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    #[inline]
    pub fn debug_color(&self) -> glam::Vec4 {
        self.debug_color
    }

    /// 按声明顺序遍历所有访问，先 input 后 output
    pub fn accesses(&self) -> impl Iterator<Item = &RgAccess> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn has_attachments(&self) -> bool {
        self.accesses().any(|access| access.attachment.is_some())
    }
}

// builder
impl<'a> RgPass<'a> {
    fn read(
        &mut self,
        resource: impl Into<RgResourceRef>,
        state: RgResourceState,
        target: RgAccessTarget,
        attachment: Option<(RgAttachmentRole, RgLoadOp)>,
    ) -> &mut Self {
        self.inputs.push(RgAccess {
            resource: resource.into(),
            kind: RgAccessKind::Read,
            state,
            target,
            attachment,
        });
        self
    }

    fn write(
        &mut self,
        resource: impl Into<RgResourceRef>,
        state: RgResourceState,
        target: RgAccessTarget,
        attachment: Option<(RgAttachmentRole, RgLoadOp)>,
    ) -> &mut Self {
        self.outputs.push(RgAccess {
            resource: resource.into(),
            kind: RgAccessKind::Write,
            state,
            target,
            attachment,
        });
        self
    }

    /// 作为 colour attachment 写入，默认清为黑色
    pub fn add_colour_write(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.add_colour_write_with(resource, RgLoadOp::Clear(GfxClearValue::BLACK))
    }

    pub fn add_colour_write_with(&mut self, resource: impl Into<RgResourceRef>, load_op: RgLoadOp) -> &mut Self {
        self.write(
            resource,
            RgResourceState::COLOR_ATTACHMENT_WRITE,
            RgAccessTarget::Image,
            Some((RgAttachmentRole::Color, load_op)),
        )
    }

    /// 作为 input attachment 读取（fragment shader），不参与 framebuffer
    pub fn add_colour_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::COLOR_INPUT_ATTACHMENT_READ, RgAccessTarget::Image, None)
    }

    /// 作为 depth attachment 写入，默认清为 1.0
    pub fn add_depth_write(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.add_depth_write_with(resource, RgLoadOp::Clear(GfxClearValue::DEPTH_ONE))
    }

    pub fn add_depth_write_with(&mut self, resource: impl Into<RgResourceRef>, load_op: RgLoadOp) -> &mut Self {
        self.write(
            resource,
            RgResourceState::DEPTH_ATTACHMENT_WRITE,
            RgAccessTarget::Image,
            Some((RgAttachmentRole::Depth, load_op)),
        )
    }

    /// 作为只读 depth attachment 绑定（depth test 不写入）
    pub fn add_depth_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(
            resource,
            RgResourceState::DEPTH_ATTACHMENT_READ,
            RgAccessTarget::Image,
            Some((RgAttachmentRole::Depth, RgLoadOp::Load)),
        )
    }

    pub fn add_storage_buffer_read(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.read(resource, RgResourceState::storage_buffer_read(stage), RgAccessTarget::Buffer, None)
    }

    pub fn add_storage_buffer_write(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.write(resource, RgResourceState::storage_buffer_write(stage), RgAccessTarget::Buffer, None)
    }

    pub fn add_storage_image_read(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.read(resource, RgResourceState::storage_image_read(stage), RgAccessTarget::Image, None)
    }

    pub fn add_storage_image_write(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.write(resource, RgResourceState::storage_image_write(stage), RgAccessTarget::Image, None)
    }

    pub fn add_uniform_buffer_read(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.read(resource, RgResourceState::uniform_read(stage), RgAccessTarget::Buffer, None)
    }

    pub fn add_sampled_image_read(
        &mut self,
        resource: impl Into<RgResourceRef>,
        stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        self.read(resource, RgResourceState::sampled_read(stage), RgAccessTarget::Image, None)
    }

    pub fn add_indirect_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::INDIRECT_BUFFER, RgAccessTarget::Buffer, None)
    }

    pub fn add_vertex_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::VERTEX_BUFFER, RgAccessTarget::Buffer, None)
    }

    pub fn add_index_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::INDEX_BUFFER, RgAccessTarget::Buffer, None)
    }

    pub fn add_blit_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::BLIT_SRC, RgAccessTarget::Image, None)
    }

    pub fn add_blit_write(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.write(resource, RgResourceState::BLIT_DST, RgAccessTarget::Image, None)
    }

    /// copy 的源，image 使用 TRANSFER_SRC_OPTIMAL，buffer 忽略 layout
    pub fn add_transfer_read(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.read(resource, RgResourceState::TRANSFER_SRC, RgAccessTarget::Any, None)
    }

    /// copy 的目标，image 使用 TRANSFER_DST_OPTIMAL，buffer 忽略 layout
    pub fn add_transfer_write(&mut self, resource: impl Into<RgResourceRef>) -> &mut Self {
        self.write(resource, RgResourceState::TRANSFER_DST, RgAccessTarget::Any, None)
    }

    /// 固定 pass 的渲染区域，优先于 attachment 尺寸和 backbuffer 尺寸
    pub fn set_dimensions(&mut self, width: u32, height: u32) -> &mut Self {
        self.dimensions = Some((width, height));
        self
    }

    pub fn set_debug_color(&mut self, color: glam::Vec4) -> &mut Self {
        self.debug_color = color;
        self
    }

    pub fn set_execute_function(&mut self, execute: impl FnMut(&mut RgPassContext<'_>) + 'a) -> &mut Self {
        self.execute = Some(Box::new(execute));
        self
    }
}

/// 以对象形式声明的 pass
///
/// # 示例
///
/// ```ignore
/// struct BlitPass;
///
/// impl RgRenderPass for BlitPass {
///     fn setup(&mut self, pass: &mut RgPass<'_>) {
///         pass.add_blit_read("lit").add_blit_write("backbuffer");
///     }
///
///     fn execute(&mut self, ctx: &mut RgPassContext<'_>) {
///         // 录制 blit 命令
///     }
/// }
///
/// graph.add_render_pass("blit", RgPassType::Transfer, BlitPass);
/// ```
pub trait RgRenderPass {
    /// 声明资源访问
    fn setup(&mut self, pass: &mut RgPass<'_>);

    /// 录制命令，barrier 和 render pass 已经由 graph 处理
    fn execute(&mut self, ctx: &mut RgPassContext<'_>);
}

/// Pass 执行时的上下文
pub struct RgPassContext<'a> {
    /// 命令录制器
    pub cmd: &'a mut dyn GfxCommandRecorder,

    pub(crate) label: &'a str,
    pub(crate) extent: vk::Extent2D,
    pub(crate) resources: &'a RgResourceTable,
}

impl RgPassContext<'_> {
    #[inline]
    pub fn label(&self) -> &str {
        self.label
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn get_image(&self, resource: impl Into<RgResourceRef>) -> Option<GfxImageHandle> {
        let index = self.resources.lookup(&resource.into())?;
        self.resources.get(index)?.as_image()?.backing().cloned()
    }

    pub fn get_buffer(&self, resource: impl Into<RgResourceRef>) -> Option<GfxBufferHandle> {
        let index = self.resources.lookup(&resource.into())?;
        self.resources.get(index)?.as_buffer()?.backing().cloned()
    }

    pub fn image_view(&self, resource: impl Into<RgResourceRef>) -> Option<vk::ImageView> {
        let index = self.resources.lookup(&resource.into())?;
        self.resources.get(index)?.as_image()?.vk_view()
    }

    pub fn vk_image(&self, resource: impl Into<RgResourceRef>) -> Option<vk::Image> {
        let index = self.resources.lookup(&resource.into())?;
        self.resources.get(index)?.as_image()?.vk_image()
    }

    pub fn vk_buffer(&self, resource: impl Into<RgResourceRef>) -> Option<vk::Buffer> {
        let index = self.resources.lookup(&resource.into())?;
        self.resources.get(index)?.as_buffer()?.vk_buffer()
    }

    pub fn image_extent(&self, resource: impl Into<RgResourceRef>) -> Option<vk::Extent2D> {
        let index = self.resources.lookup(&resource.into())?;
        let (width, height) = self.resources.get(index)?.as_image()?.extent()?;
        Some(vk::Extent2D { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sorts_accesses_into_inputs_and_outputs() {
        let mut pass = RgPass::new("lighting", RgPassType::Graphics);
        pass.add_sampled_image_read("normal", vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .add_uniform_buffer_read("camera", vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .add_colour_write("lit")
            .set_dimensions(640, 360);

        assert_eq!(pass.inputs().len(), 2);
        assert_eq!(pass.outputs().len(), 1);
        assert!(pass.has_attachments());
        assert_eq!(pass.dimensions(), Some((640, 360)));
        assert_eq!(pass.inputs()[0].target, RgAccessTarget::Image);
        assert_eq!(pass.inputs()[1].target, RgAccessTarget::Buffer);
        assert_eq!(
            pass.outputs()[0].attachment,
            Some((RgAttachmentRole::Color, RgLoadOp::Clear(GfxClearValue::BLACK)))
        );
    }

    #[test]
    fn debug_color_defaults_by_pass_type() {
        let compute = RgPass::new("cull", RgPassType::Compute);
        assert_eq!(compute.debug_color(), LabelColor::COLOR_COMPUTE_PASS);

        let mut transfer = RgPass::new("upload", RgPassType::Transfer);
        transfer.set_debug_color(glam::Vec4::ONE);
        assert_eq!(transfer.debug_color(), glam::Vec4::ONE);
        assert!(!transfer.has_attachments());
    }

    #[test]
    fn depth_read_is_a_load_attachment() {
        let mut pass = RgPass::new("forward", RgPassType::Graphics);
        pass.add_depth_read("depth");
        assert_eq!(pass.inputs()[0].attachment, Some((RgAttachmentRole::Depth, RgLoadOp::Load)));
        assert_eq!(pass.inputs()[0].state, RgResourceState::DEPTH_ATTACHMENT_READ);
    }
}
