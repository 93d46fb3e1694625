pub mod barrier;
pub mod command_recorder;
