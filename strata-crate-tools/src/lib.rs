//! Strata 工具集
//!
//! 提供日志初始化与 TOML 配置加载。库 crate 不直接读取配置文件，
//! 由可执行程序加载 [`config::StrataConfig`] 后把需要的字段传进去。

pub mod config;
pub mod init_log;
