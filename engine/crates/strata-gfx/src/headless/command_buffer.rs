use ash::vk;
use itertools::Itertools;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::command_recorder::GfxCommandRecorder;
use crate::render_pass::GfxRenderPassBeginInfo;

/// 被记录下来的一条命令
#[derive(Clone, Debug)]
pub enum GfxRecordedCommand {
    PipelineBarrier {
        image_barriers: Vec<GfxImageBarrier>,
        buffer_barriers: Vec<GfxBufferBarrier>,
    },
    BeginRenderPass(GfxRenderPassBeginInfo),
    EndRenderPass,
    BeginLabel {
        label: String,
        color: glam::Vec4,
    },
    EndLabel,
    ResetQueryPool {
        query_pool: vk::QueryPool,
        first_query: u32,
        query_count: u32,
    },
    WriteTimestamp {
        stage: vk::PipelineStageFlags2,
        query_pool: vk::QueryPool,
        query: u32,
    },
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    Dispatch(glam::UVec3),
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        region_count: usize,
    },
    BlitImage {
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: Vec<vk::ImageBlit>,
        filter: vk::Filter,
    },
}

impl GfxRecordedCommand {
    fn short_name(&self) -> String {
        match self {
            Self::PipelineBarrier {
                image_barriers,
                buffer_barriers,
            } => format!("barrier(img={}, buf={})", image_barriers.len(), buffer_barriers.len()),
            Self::BeginRenderPass(_) => "begin_render_pass".to_string(),
            Self::EndRenderPass => "end_render_pass".to_string(),
            Self::BeginLabel { label, .. } => format!("begin_label({label})"),
            Self::EndLabel => "end_label".to_string(),
            Self::ResetQueryPool { .. } => "reset_query_pool".to_string(),
            Self::WriteTimestamp { query, .. } => format!("timestamp({query})"),
            Self::BindPipeline { .. } => "bind_pipeline".to_string(),
            Self::Draw { vertex_count, .. } => format!("draw({vertex_count})"),
            Self::Dispatch(groups) => format!("dispatch({}, {}, {})", groups.x, groups.y, groups.z),
            Self::CopyBuffer { region_count, .. } => format!("copy_buffer({region_count})"),
            Self::BlitImage { regions, .. } => format!("blit_image({})", regions.len()),
        }
    }
}

/// 把命令记录到内存中的 command buffer
#[derive(Default)]
pub struct GfxRecordingCommandBuffer {
    name: String,
    commands: Vec<GfxRecordedCommand>,
}

// new & init
impl GfxRecordingCommandBuffer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// 清空已录制的命令，开始新一帧
    pub fn reset(&mut self) {
        self.commands.clear();
    }
}

// getters
impl GfxRecordingCommandBuffer {
    #[inline]
    pub fn commands(&self) -> &[GfxRecordedCommand] {
        &self.commands
    }

    /// 所有的 pipeline barrier 命令，按录制顺序
    pub fn barrier_commands(&self) -> Vec<(&[GfxImageBarrier], &[GfxBufferBarrier])> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCommand::PipelineBarrier {
                    image_barriers,
                    buffer_barriers,
                } => Some((image_barriers.as_slice(), buffer_barriers.as_slice())),
                _ => None,
            })
            .collect()
    }

    /// 所有 debug label 的名称，按录制顺序
    pub fn labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                GfxRecordedCommand::BeginLabel { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn render_pass_count(&self) -> usize {
        self.commands.iter().filter(|cmd| matches!(cmd, GfxRecordedCommand::BeginRenderPass(_))).count()
    }

    /// 一行的命令摘要，用于日志
    pub fn summary(&self) -> String {
        self.commands.iter().map(GfxRecordedCommand::short_name).join(", ")
    }
}

impl GfxCommandRecorder for GfxRecordingCommandBuffer {
    #[inline]
    fn name(&self) -> &str {
        &self.name
    }

    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        self.commands.push(GfxRecordedCommand::PipelineBarrier {
            image_barriers: image_barriers.to_vec(),
            buffer_barriers: buffer_barriers.to_vec(),
        });
    }

    fn begin_render_pass(&mut self, begin_info: &GfxRenderPassBeginInfo) {
        self.commands.push(GfxRecordedCommand::BeginRenderPass(begin_info.clone()));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(GfxRecordedCommand::EndRenderPass);
    }

    fn begin_label(&mut self, label: &str, color: glam::Vec4) {
        self.commands.push(GfxRecordedCommand::BeginLabel {
            label: label.to_string(),
            color,
        });
    }

    fn end_label(&mut self) {
        self.commands.push(GfxRecordedCommand::EndLabel);
    }

    fn reset_query_pool(&mut self, query_pool: vk::QueryPool, first_query: u32, query_count: u32) {
        self.commands.push(GfxRecordedCommand::ResetQueryPool {
            query_pool,
            first_query,
            query_count,
        });
    }

    fn write_timestamp(&mut self, stage: vk::PipelineStageFlags2, query_pool: vk::QueryPool, query: u32) {
        self.commands.push(GfxRecordedCommand::WriteTimestamp {
            stage,
            query_pool,
            query,
        });
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.commands.push(GfxRecordedCommand::BindPipeline { bind_point, pipeline });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.commands.push(GfxRecordedCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn dispatch(&mut self, group_count: glam::UVec3) {
        self.commands.push(GfxRecordedCommand::Dispatch(group_count));
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(GfxRecordedCommand::CopyBuffer {
            src,
            dst,
            region_count: regions.len(),
        });
    }

    fn blit_image(
        &mut self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.commands.push(GfxRecordedCommand::BlitImage {
            src,
            src_layout,
            dst,
            dst_layout,
            regions: regions.to_vec(),
            filter,
        });
    }
}
