//! 不依赖 GPU 的后端
//!
//! 生成假的 vk handle、统计存活对象，并把所有命令记录下来，供测试与 demo 检查。

pub mod command_buffer;
pub mod device;

pub use command_buffer::{GfxRecordedCommand, GfxRecordingCommandBuffer};
pub use device::{GfxHeadlessDevice, GfxObjectKind};
