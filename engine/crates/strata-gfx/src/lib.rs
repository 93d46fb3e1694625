//! Strata GFX 层
//!
//! 渲染图与资源生命周期管理只通过这里定义的窄接口和图形 API 交互：
//!
//! - [`device::GfxDevice`]：物理资源的创建与销毁、frames in flight 信息、timestamp 查询
//! - [`commands::command_recorder::GfxCommandRecorder`]：命令录制（barrier、render pass、debug label 等）
//!
//! 原生 Vulkan 绑定不在本 crate 内；`headless` 模块提供一个不依赖 GPU 的实现，
//! 会生成假的 vk handle 并记录所有命令，用于测试和 demo。

pub mod basic;
pub mod commands;
pub mod device;
pub mod error;
pub mod headless;
pub mod render_pass;
pub mod resources;

pub use error::{GfxError, GfxResult};
