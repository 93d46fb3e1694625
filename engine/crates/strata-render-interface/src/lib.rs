//! GPU 资源的生命周期管理
//!
//! - [`handles::GfxHandle`]：带共享引用计数的资源句柄，最后一个句柄释放时只会把槽位放进销毁队列
//! - [`resource_registry::GfxResourceRegistry`]：基于槽位与 free-list 的容器，
//!   销毁会延迟 `frames_in_flight + 1` 帧，保证 GPU 上不再有引用该资源的命令
//! - [`gfx_resource_manager::GfxResourceManager`]：每种资源一个注册表
//! - [`frame_counter::FrameCounter`]：帧序号与 frame-in-flight 槽位

pub mod frame_counter;
pub mod gfx_resource_manager;
pub mod handles;
pub mod resource_registry;
