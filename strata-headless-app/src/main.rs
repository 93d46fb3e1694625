//! 在 headless 后端上运行渲染图
//!
//! 用法：`strata-headless [config.toml]`

mod headless_app;
mod passes;

use anyhow::Context;

use strata_crate_tools::config::StrataConfig;
use strata_crate_tools::init_log::{init_log, parse_level};

use crate::headless_app::HeadlessApp;

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => StrataConfig::from_file(&path).with_context(|| format!("load config {path}"))?,
        None => StrataConfig::default(),
    };
    config.validate()?;
    init_log(parse_level(&config.log.level));

    let mut app = HeadlessApp::new(&config)?;
    let result = app.run(config.frames.frame_count);
    app.destroy();

    log::info!("end run.");
    result
}
