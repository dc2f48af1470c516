//! 服务二进制入口：解析命令、加载设置、初始化日志并启动监听。

mod access;
mod api;
mod app;
mod auth;
mod cli;
mod config;
mod files;
mod host;
mod logging;
mod state;
mod transfer;
mod tree;

use anyhow::Context;

#[tokio::main]
/// 启动文件服务。
async fn main() -> anyhow::Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<String>>();
    let settings_path = match cli::dispatch(&args)? {
        cli::CliDispatch::Run(path) => path,
        cli::CliDispatch::Exit => return Ok(()),
    };

    let settings = state::LoadedSettings::load(&settings_path)
        .with_context(|| format!("load settings {}", settings_path.display()))?;
    let _log_runtime = logging::init("tiddlyserver", &settings.config.logging)?;
    tracing::info!("settings loaded from {}", settings_path.display());
    settings.config.warn_ignored();

    app::run(state::AppState::new(settings_path, settings)).await
}
