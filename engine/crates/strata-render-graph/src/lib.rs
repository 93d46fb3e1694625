//! RenderGraph - 声明式渲染图
//!
//! 每帧声明 pass 以及它们读写的逻辑资源，编译时解析 label、绑定物理资源、
//! 合成 barrier，执行时按声明顺序录制命令。
//!
//! # 使用流程
//!
//! ```ignore
//! let mut graph = RenderGraph::new(RgSettings::default());
//!
//! graph.add_image_resource("color", RgImageDesc::new_2d(512, 512, vk::Format::R8G8B8A8_UNORM), None);
//! graph.add_buffer_resource("camera", RgBufferDesc::new(64, vk::BufferUsageFlags::UNIFORM_BUFFER), Some(camera));
//!
//! graph
//!     .add_pass("draw", RgPassType::Graphics)
//!     .add_colour_write("color")
//!     .add_uniform_buffer_read("camera", vk::PipelineStageFlags2::FRAGMENT_SHADER)
//!     .set_execute_function(|ctx| ctx.cmd.draw(3, 1, 0, 0));
//!
//! graph.compile(&mut device, &mut resource_manager)?;
//! graph.execute(&mut cmd)?;
//! graph.reset();
//! ```
//!
//! # 模块结构
//!
//! - `resource_state`: stage / access / layout 的组合
//! - `resource` / `image_resource` / `buffer_resource`: 逻辑资源表
//! - `pass`: pass 描述与构建器
//! - `barrier`: barrier 合成
//! - `dependency`: pass 之间的依赖图（诊断用）
//! - `framebuffer_cache` / `timer`: 编译期需要的 device 对象
//! - `compiler` / `executor`: 编译与执行
//! - `render_graph`: 对外的 `RenderGraph`

mod buffer_resource;
mod image_resource;

pub mod barrier;
pub mod compiler;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod framebuffer_cache;
pub mod pass;
pub mod render_graph;
pub mod resource;
pub mod resource_state;
pub mod timer;

pub use barrier::RgBarrier;
pub use buffer_resource::{RgBufferDesc, RgBufferResource};
pub use dependency::{RgDependencyEdge, RgDependencyGraph, RgHazard};
pub use error::{RgError, RgResult};
pub use image_resource::{RgImageDesc, RgImageResource};
pub use pass::{RgLoadOp, RgPass, RgPassContext, RgPassType, RgRenderPass};
pub use render_graph::{RenderGraph, RgSettings};
pub use resource::{RgResourceIndex, RgResourceRef};
pub use resource_state::{RgAccessKind, RgResourceState};
pub use timer::RgPassTimer;
