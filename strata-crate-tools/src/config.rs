use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Strata 的运行配置
///
/// 所有字段都有默认值，配置文件里只需要写想要覆盖的部分
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    pub log: LogConfig,
    pub frames: FramesConfig,
    pub render_graph: RenderGraphConfig,
    pub backbuffer: BackbufferConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// trace / debug / info / warn / error
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// 同时在 GPU 上执行的帧数
    pub frames_in_flight: usize,
    /// demo 运行的帧数
    pub frame_count: u64,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            frame_count: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderGraphConfig {
    /// 为每个 pass 记录 GPU timestamp
    pub gpu_timers: bool,
    /// 每次编译之后打印执行计划
    pub print_execution_plan: bool,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        Self {
            gpu_timers: true,
            print_execution_plan: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackbufferConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for BackbufferConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl StrataConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("读取配置文件失败: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("解析 TOML 配置失败: {:?}", path.as_ref()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: StrataConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.frames.frames_in_flight > 0, "frames.frames_in_flight 必须大于 0");
        anyhow::ensure!(
            self.backbuffer.width > 0 && self.backbuffer.height > 0,
            "backbuffer 尺寸必须大于 0: {}x{}",
            self.backbuffer.width,
            self.backbuffer.height
        );
        Ok(())
    }
}
