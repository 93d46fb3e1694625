//! Barrier 自动计算
//!
//! 按执行顺序遍历 pass，对每个资源记录 layout、上一次写入的状态，
//! 以及上一次写入之后已经同步过的读取 stage/access，据此决定是否需要 barrier。

use ash::vk;

use strata_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};

use crate::buffer_resource::RgBoundBuffer;
use crate::image_resource::RgBoundImage;
use crate::resource::{RgResource, RgResourceIndex};
use crate::resource_state::{RgAccessKind, RgResourceState};

/// 一个逻辑资源上的 barrier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBarrier {
    pub resource: RgResourceIndex,
    /// src 的 access 只包含写操作
    pub src: RgResourceState,
    pub dst: RgResourceState,
}

impl RgBarrier {
    #[inline]
    pub fn is_layout_transition(&self) -> bool {
        self.src.layout != self.dst.layout
    }

    pub(crate) fn to_image_barrier(&self, image: &RgBoundImage) -> GfxImageBarrier {
        GfxImageBarrier::new()
            .image(image.image)
            .layout_transfer(self.src.layout, self.dst.layout)
            .src_mask(self.src.stage, self.src.access)
            .dst_mask(self.dst.stage, self.dst.access)
            .image_aspect_flag(image.aspect)
    }

    pub(crate) fn to_buffer_barrier(&self, buffer: &RgBoundBuffer) -> GfxBufferBarrier {
        GfxBufferBarrier::new()
            .buffer(buffer.buffer, 0, vk::WHOLE_SIZE)
            .src_mask(self.src.stage, self.src.access)
            .dst_mask(self.dst.stage, self.dst.access)
    }
}

/// 读取的 stage 是否已经被覆盖
fn covers_stage(visible: vk::PipelineStageFlags2, stage: vk::PipelineStageFlags2) -> bool {
    visible.contains(vk::PipelineStageFlags2::ALL_COMMANDS) || visible.contains(stage)
}

fn covers_access(visible: vk::AccessFlags2, access: vk::AccessFlags2) -> bool {
    visible.contains(vk::AccessFlags2::MEMORY_READ) || visible.contains(access)
}

/// 单个资源的同步状态
#[derive(Clone, Copy, Debug)]
struct RgResourceTracker {
    layout: vk::ImageLayout,
    last_write: Option<RgResourceState>,
    read_stages: vk::PipelineStageFlags2,
    read_access: vk::AccessFlags2,
    /// 内容已丢弃，但物理资源上一次使用（通常是上一帧）还可能在 GPU 上执行
    retired: Option<RgResourceState>,
}

impl RgResourceTracker {
    fn from_resource(resource: &RgResource) -> Self {
        let state = resource.current_state();
        let initialized = resource.is_initialized();
        Self {
            layout: state.layout,
            last_write: initialized.then_some(state),
            read_stages: vk::PipelineStageFlags2::empty(),
            read_access: vk::AccessFlags2::empty(),
            retired: (!initialized && state != RgResourceState::UNDEFINED).then_some(state),
        }
    }

    /// 上一次写入以及之后的读取所在的 stage
    fn src_stages(&self) -> vk::PipelineStageFlags2 {
        let stages = self.last_write.map_or(vk::PipelineStageFlags2::empty(), |w| w.stage)
            | self.read_stages
            | self.retired.map_or(vk::PipelineStageFlags2::empty(), |r| r.stage);
        if stages.is_empty() { vk::PipelineStageFlags2::TOP_OF_PIPE } else { stages }
    }

    fn src_access(&self) -> vk::AccessFlags2 {
        self.last_write.map_or(vk::AccessFlags2::empty(), |w| w.src_access())
            | self.retired.map_or(vk::AccessFlags2::empty(), |r| r.src_access())
    }

    fn src_state(&self) -> RgResourceState {
        RgResourceState::new(self.src_stages(), self.src_access(), self.layout)
    }

    fn write(&mut self, dst: RgResourceState) -> RgResourceState {
        let src = self.src_state();
        self.layout = dst.layout;
        self.last_write = Some(dst);
        self.read_stages = vk::PipelineStageFlags2::empty();
        self.read_access = vk::AccessFlags2::empty();
        self.retired = None;
        src
    }

    fn read(&mut self, dst: RgResourceState) -> Option<RgResourceState> {
        if dst.layout != self.layout {
            let src = self.src_state();
            // transition 之前的读取已经被这个 barrier 等待
            self.layout = dst.layout;
            self.read_stages = dst.stage;
            self.read_access = dst.access;
            self.retired = None;
            return Some(src);
        }

        if self.src_access().is_empty() {
            // 没有需要可见的写入
            self.read_stages |= dst.stage;
            self.read_access |= dst.access;
            return None;
        }

        if covers_stage(self.read_stages, dst.stage) && covers_access(self.read_access, dst.access) {
            return None;
        }

        let src = self.src_state();
        self.read_stages |= dst.stage;
        self.read_access |= dst.access;
        self.retired = None;
        Some(src)
    }

    /// 执行结束后的状态，作为下一帧的起点
    fn final_state(&self) -> RgResourceState {
        RgResourceState::new(self.src_stages(), self.src_access(), self.layout)
    }
}

/// 编译时的 barrier 构建器
#[derive(Default)]
pub(crate) struct RgBarrierBuilder {
    trackers: Vec<Option<RgResourceTracker>>,
    written: Vec<RgResourceIndex>,
}

impl RgBarrierBuilder {
    /// 记录一次访问，返回需要在这次访问之前插入的 barrier
    pub(crate) fn access(
        &mut self,
        index: RgResourceIndex,
        resource: &RgResource,
        kind: RgAccessKind,
        state: RgResourceState,
    ) -> Option<RgBarrier> {
        if self.trackers.len() <= index.index() {
            self.trackers.resize(index.index() + 1, None);
        }
        let tracker = self.trackers[index.index()].get_or_insert_with(|| RgResourceTracker::from_resource(resource));

        match kind {
            RgAccessKind::Write => {
                if !self.written.contains(&index) {
                    self.written.push(index);
                }
                let src = tracker.write(state);
                Some(RgBarrier {
                    resource: index,
                    src,
                    dst: state,
                })
            }
            RgAccessKind::Read if tracker.last_write.is_none() => {
                log::warn!(
                    "RenderGraph: \"{}\" is read before anything wrote it; inserting a full barrier",
                    resource.label()
                );
                let src = RgResourceState::new(
                    RgResourceState::CONSERVATIVE_SRC.stage,
                    RgResourceState::CONSERVATIVE_SRC.access,
                    tracker.layout,
                );
                let dst = RgResourceState::new(
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE,
                    state.layout,
                );
                tracker.layout = state.layout;
                tracker.last_write = Some(RgResourceState::new(src.stage, src.access, state.layout));
                tracker.read_stages = dst.stage;
                tracker.read_access = dst.access;
                tracker.retired = None;
                Some(RgBarrier {
                    resource: index,
                    src,
                    dst,
                })
            }
            RgAccessKind::Read => tracker.read(state).map(|src| RgBarrier {
                resource: index,
                src,
                dst: state,
            }),
        }
    }

    /// 所有被访问过的资源在执行结束后的状态
    pub(crate) fn final_states(&self) -> Vec<(RgResourceIndex, RgResourceState)> {
        self.trackers
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.map(|t| (RgResourceIndex(i as u32), t.final_state())))
            .collect()
    }

    /// 被写入过的资源
    pub(crate) fn written(&self) -> &[RgResourceIndex] {
        &self.written
    }
}
