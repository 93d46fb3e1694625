//! 资源状态定义
//!
//! 封装 Vulkan 的 pipeline stage、access mask 和 image layout，
//! 提供预定义的常用状态组合。buffer 的 layout 始终为 `UNDEFINED`。

use ash::vk;

/// 一次资源访问是读还是写
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccessKind {
    Read,
    Write,
}

/// 资源状态
///
/// 描述资源在某个 Pass 中的使用方式，用于自动计算 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgResourceState {
    /// Pipeline stage
    pub stage: vk::PipelineStageFlags2,
    /// Access mask
    pub access: vk::AccessFlags2,
    /// Image layout
    pub layout: vk::ImageLayout,
}

impl Default for RgResourceState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

const fn stages(a: vk::PipelineStageFlags2, b: vk::PipelineStageFlags2) -> vk::PipelineStageFlags2 {
    vk::PipelineStageFlags2::from_raw(a.as_raw() | b.as_raw())
}

const fn accesses(a: vk::AccessFlags2, b: vk::AccessFlags2) -> vk::AccessFlags2 {
    vk::AccessFlags2::from_raw(a.as_raw() | b.as_raw())
}

// new & 常量定义
impl RgResourceState {
    /// 创建自定义状态
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    /// buffer 状态，没有 layout
    #[inline]
    pub const fn buffer(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self::new(stage, access, vk::ImageLayout::UNDEFINED)
    }

    // ============ image ============

    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 没有写入者、也没有外部初始化的资源被读取时使用的保守源状态
    pub const CONSERVATIVE_SRC: Self = Self::new(
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::MEMORY_WRITE,
        vk::ImageLayout::UNDEFINED,
    );

    /// 颜色附件输出（图形管线写入）
    pub const COLOR_ATTACHMENT_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 颜色附件作为 input attachment 读取
    pub const COLOR_INPUT_ATTACHMENT_READ: Self = Self::new(
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::AccessFlags2::INPUT_ATTACHMENT_READ,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    );

    /// 深度附件写入
    pub const DEPTH_ATTACHMENT_WRITE: Self = Self::new(
        stages(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        accesses(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件只读（深度测试，不写入）
    pub const DEPTH_ATTACHMENT_READ: Self = Self::new(
        stages(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS),
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    );

    /// blit 源
    pub const BLIT_SRC: Self = Self::new(
        vk::PipelineStageFlags2::BLIT,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// blit 目标
    pub const BLIT_DST: Self = Self::new(
        vk::PipelineStageFlags2::BLIT,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 传输源（image）
    pub const TRANSFER_SRC: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// 传输目标（image）
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 呈现（swapchain image）
    pub const PRESENT: Self =
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR);

    /// 着色器采样读取
    #[inline]
    pub const fn sampled_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_SAMPLED_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// 存储图像读取
    #[inline]
    pub const fn storage_image_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_READ, vk::ImageLayout::GENERAL)
    }

    /// 存储图像写入
    #[inline]
    pub const fn storage_image_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_WRITE, vk::ImageLayout::GENERAL)
    }

    // ============ buffer ============

    /// 顶点缓冲区读取
    pub const VERTEX_BUFFER: Self =
        Self::buffer(vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, vk::AccessFlags2::VERTEX_ATTRIBUTE_READ);

    /// 索引缓冲区读取
    pub const INDEX_BUFFER: Self = Self::buffer(vk::PipelineStageFlags2::INDEX_INPUT, vk::AccessFlags2::INDEX_READ);

    /// 间接命令缓冲区
    pub const INDIRECT_BUFFER: Self =
        Self::buffer(vk::PipelineStageFlags2::DRAW_INDIRECT, vk::AccessFlags2::INDIRECT_COMMAND_READ);

    /// 传输源（buffer）
    pub const TRANSFER_SRC_BUFFER: Self =
        Self::buffer(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

    /// 传输目标（buffer）
    pub const TRANSFER_DST_BUFFER: Self =
        Self::buffer(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    /// Uniform 缓冲区读取
    #[inline]
    pub const fn uniform_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::buffer(stage, vk::AccessFlags2::UNIFORM_READ)
    }

    /// 存储缓冲区读取
    #[inline]
    pub const fn storage_buffer_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::buffer(stage, vk::AccessFlags2::SHADER_STORAGE_READ)
    }

    /// 存储缓冲区写入
    #[inline]
    pub const fn storage_buffer_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::buffer(stage, vk::AccessFlags2::SHADER_STORAGE_WRITE)
    }

    // ============ 辅助方法 ============

    /// 写操作的 access flags
    const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw(),
    );

    /// 检查是否为写操作
    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(Self::WRITE_ACCESS)
    }

    /// 获取用于 barrier src 的 access（只保留写操作）
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & Self::WRITE_ACCESS
    }

    /// 合并两个状态的 stage 与 access
    #[inline]
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.stage | other.stage, self.access | other.access, self.layout)
    }

    /// 该状态需要 image 具备的 usage
    pub fn required_image_usage(&self) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::empty();
        let a = self.access;
        if a.intersects(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE | vk::AccessFlags2::COLOR_ATTACHMENT_READ) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if a.intersects(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
        ) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if a.contains(vk::AccessFlags2::INPUT_ATTACHMENT_READ) {
            usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
        }
        if a.contains(vk::AccessFlags2::SHADER_SAMPLED_READ) {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if a.intersects(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE) {
            usage |= vk::ImageUsageFlags::STORAGE;
        }
        if a.contains(vk::AccessFlags2::TRANSFER_READ) {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if a.contains(vk::AccessFlags2::TRANSFER_WRITE) {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        usage
    }

    /// 该状态需要 buffer 具备的 usage
    pub fn required_buffer_usage(&self) -> vk::BufferUsageFlags {
        let mut usage = vk::BufferUsageFlags::empty();
        let a = self.access;
        if a.contains(vk::AccessFlags2::UNIFORM_READ) {
            usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
        }
        if a.intersects(vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE) {
            usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if a.contains(vk::AccessFlags2::INDIRECT_COMMAND_READ) {
            usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
        }
        if a.contains(vk::AccessFlags2::VERTEX_ATTRIBUTE_READ) {
            usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if a.contains(vk::AccessFlags2::INDEX_READ) {
            usage |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        if a.contains(vk::AccessFlags2::TRANSFER_READ) {
            usage |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if a.contains(vk::AccessFlags2::TRANSFER_WRITE) {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        usage
    }
}
