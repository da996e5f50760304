use anyhow::Context;
use gptuber_core::config::Config;
use gptuber_server::StreamFlags;
use std::path::Path;

pub fn run(config_path: &Path, flags: StreamFlags) -> anyhow::Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(gptuber_server::run_stream(config, flags))
}
