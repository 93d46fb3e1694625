//! RenderGraph 执行
//!
//! 按编译好的顺序录制每个 pass：debug label、timestamp、barrier、render pass、回调。
//! 结束时不会插入到 present 的 barrier，由调用者负责。

use ash::vk;
use itertools::Itertools;

use strata_gfx::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use strata_gfx::commands::command_recorder::GfxCommandRecorder;
use strata_gfx::render_pass::GfxRenderPassBeginInfo;

use crate::error::{RgError, RgResult};
use crate::pass::RgPassContext;
use crate::render_graph::RenderGraph;
use crate::resource::RgResourceKind;
use crate::resource_state::RgAccessKind;

impl<'a> RenderGraph<'a> {
    /// 录制编译好的 graph
    ///
    /// 每次编译只能执行一次；执行成功后资源的最终状态会作为下一帧的初始状态。
    pub fn execute(&mut self, cmd: &mut dyn GfxCommandRecorder) -> RgResult<()> {
        let _span = tracy_client::span!("RenderGraph::execute");

        let Some(compiled) = self.compiled.as_ref() else {
            log::error!("RenderGraph: execute called without a successful compile");
            return Err(RgError::NotCompiled);
        };
        if self.executed {
            log::error!("RenderGraph: the compiled graph was already executed, compile again");
            return Err(RgError::NotCompiled);
        }

        if let Some(query_pool) = compiled.timer_pool {
            cmd.reset_query_pool(query_pool, 0, compiled.passes.len() as u32 * 2);
        }

        for (order, compiled_pass) in compiled.passes.iter().enumerate() {
            let pass = &mut self.passes[compiled_pass.pass_index];
            let _pass_span = tracy_client::span!("RenderGraph::execute_pass");

            cmd.begin_label(&pass.label, pass.debug_color);
            if let Some(query_pool) = compiled.timer_pool {
                cmd.write_timestamp(vk::PipelineStageFlags2::TOP_OF_PIPE, query_pool, 2 * order as u32);
            }

            let mut image_barriers: Vec<GfxImageBarrier> = Vec::new();
            let mut buffer_barriers: Vec<GfxBufferBarrier> = Vec::new();
            for barrier in &compiled_pass.barriers {
                match self.resources.get(barrier.resource).map(|r| r.kind()) {
                    Some(RgResourceKind::Image(image)) => {
                        if let Some(bound) = &image.bound {
                            image_barriers.push(barrier.to_image_barrier(bound));
                        }
                    }
                    Some(RgResourceKind::Buffer(buffer)) => {
                        if let Some(bound) = &buffer.bound {
                            buffer_barriers.push(barrier.to_buffer_barrier(bound));
                        }
                    }
                    None => {}
                }
            }
            if !image_barriers.is_empty() || !buffer_barriers.is_empty() {
                cmd.pipeline_barrier(&image_barriers, &buffer_barriers);
            }

            if let Some(target) = &compiled_pass.render_target {
                cmd.begin_render_pass(&GfxRenderPassBeginInfo {
                    render_pass: target.render_pass,
                    framebuffer: target.framebuffer,
                    render_area: vk::Rect2D {
                        offset: vk::Offset2D::default(),
                        extent: compiled_pass.extent,
                    },
                    clear_values: target.clear_values.clone(),
                });
            }

            match pass.execute.as_mut() {
                Some(execute) => {
                    let mut ctx = RgPassContext {
                        cmd: &mut *cmd,
                        label: &pass.label,
                        extent: compiled_pass.extent,
                        resources: &self.resources,
                    };
                    execute(&mut ctx);
                }
                None => log::trace!("RenderGraph: pass \"{}\" has no execute function", pass.label),
            }

            if compiled_pass.render_target.is_some() {
                cmd.end_render_pass();
            }
            if let Some(query_pool) = compiled.timer_pool {
                cmd.write_timestamp(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, query_pool, 2 * order as u32 + 1);
            }
            cmd.end_label();
        }

        let final_states = compiled.final_states.clone();
        let written = compiled.written.clone();
        for (index, state) in final_states {
            if let Some(resource) = self.resources.get_mut(index) {
                resource.current_state = state;
            }
        }
        for index in written {
            if let Some(resource) = self.resources.get_mut(index) {
                resource.initialized = true;
            }
        }
        self.executed = true;
        Ok(())
    }
}

// 调试方法
impl RenderGraph<'_> {
    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 pass 的访问、attachment 和 barrier，资源以 label 显示。
    pub fn print_execution_plan(&self) {
        let Some(compiled) = &self.compiled else {
            log::info!("RenderGraph: not compiled, no execution plan to print");
            return;
        };

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            compiled.passes.len(),
            self.execution_order().join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, compiled_pass) in compiled.passes.iter().enumerate() {
            let pass = &self.passes[compiled_pass.pass_index];

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ [{}/{}] Pass: \"{}\" ({:?}, {}x{})",
                order + 1,
                compiled.passes.len(),
                pass.label,
                pass.pass_type,
                compiled_pass.extent.width,
                compiled_pass.extent.height
            );
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            for access in &compiled_pass.accesses {
                let name = self.resources.label_of(access.resource);
                let (icon, verb) = match access.kind {
                    RgAccessKind::Read => ("📖", "read"),
                    RgAccessKind::Write => ("✏️ ", "write"),
                };
                log::info!(
                    "│   {} {} \"{}\" @ {:?} (stage: {}, access: {})",
                    icon,
                    verb,
                    name,
                    access.state.layout,
                    Self::format_pipeline_stage(access.state.stage),
                    Self::format_access_flags(access.state.access)
                );
            }

            if let Some(target) = &compiled_pass.render_target {
                log::info!("│ Render target: {} attachments", target.clear_values.len());
            }

            if compiled_pass.barriers.is_empty() {
                log::info!("│ No barriers required");
            } else {
                log::info!("├─────────────────────────────────────────────────────────────────┤");
                log::info!("│ Barriers: {}", compiled_pass.barriers.len());
                for barrier in &compiled_pass.barriers {
                    let name = self.resources.label_of(barrier.resource);
                    let layout_change = if barrier.is_layout_transition() {
                        format!("{:?} → {:?}", barrier.src.layout, barrier.dst.layout)
                    } else {
                        format!("{:?} (no layout change)", barrier.src.layout)
                    };
                    log::info!("│   🔒 \"{}\":", name);
                    log::info!("│       Layout: {}", layout_change);
                    log::info!(
                        "│       Stage:  {} → {}",
                        Self::format_pipeline_stage(barrier.src.stage),
                        Self::format_pipeline_stage(barrier.dst.stage)
                    );
                    log::info!(
                        "│       Access: {} → {}",
                        Self::format_access_flags(barrier.src.access),
                        Self::format_access_flags(barrier.dst.access)
                    );
                }
            }

            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    /// 格式化 PipelineStageFlags2 为可读字符串
    pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
        const NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
            (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
            (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
            (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
            (vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT, "VERTEX_ATTRIBUTE_INPUT"),
            (vk::PipelineStageFlags2::INDEX_INPUT, "INDEX_INPUT"),
            (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
            (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
            (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
            (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
            (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
            (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
            (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
            (vk::PipelineStageFlags2::BLIT, "BLIT"),
            (vk::PipelineStageFlags2::ALL_GRAPHICS, "ALL_GRAPHICS"),
            (vk::PipelineStageFlags2::ALL_COMMANDS, "ALL_COMMANDS"),
        ];

        let stages = NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
        if stages.is_empty() { format!("{:?}", stage) } else { stages.join(" | ") }
    }

    /// 格式化 AccessFlags2 为可读字符串
    pub fn format_access_flags(access: vk::AccessFlags2) -> String {
        if access == vk::AccessFlags2::NONE {
            return "NONE".to_string();
        }

        const NAMES: &[(vk::AccessFlags2, &str)] = &[
            (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
            (vk::AccessFlags2::INDEX_READ, "INDEX_READ"),
            (vk::AccessFlags2::VERTEX_ATTRIBUTE_READ, "VERTEX_ATTR_READ"),
            (vk::AccessFlags2::UNIFORM_READ, "UNIFORM_READ"),
            (vk::AccessFlags2::INPUT_ATTACHMENT_READ, "INPUT_ATTACH_READ"),
            (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
            (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
            (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
            (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
            (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
            (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
            (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
            (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
            (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
            (vk::AccessFlags2::HOST_WRITE, "HOST_WRITE"),
            (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
            (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
        ];

        let flags = NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
        if flags.is_empty() { format!("{:?}", access) } else { flags.join(" | ") }
    }
}
