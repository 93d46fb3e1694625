pub mod buffer;
pub mod image;
pub mod pipeline_layout;
pub mod sampler;
pub mod shader_module;
