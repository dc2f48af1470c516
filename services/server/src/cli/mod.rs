//! CLI 分发：`run`、`check`、`doctor`、`version`、`help`。

use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde_json::json;

use crate::{
    config::{ConfigError, settings_path},
    state::LoadedSettings,
};

/// CLI 分发结果。
pub(crate) enum CliDispatch {
    /// 以该设置文件启动服务。
    Run(PathBuf),
    /// 命令已处理完成，主程序应退出。
    Exit,
}

/// 解析并执行 CLI。无参数等同 `run`。
pub(crate) fn dispatch(args: &[String]) -> anyhow::Result<CliDispatch> {
    let Some(cmd) = args.first().map(|arg| arg.trim()) else {
        return Ok(CliDispatch::Run(settings_path(None)));
    };

    match cmd {
        "" | "run" => Ok(CliDispatch::Run(settings_path(optional_path(&args[1..])?))),
        "-h" | "--help" | "help" => {
            print_root_help();
            Ok(CliDispatch::Exit)
        }
        "check" => {
            let path = settings_path(optional_path(&args[1..])?);
            let settings = LoadedSettings::load(&path)
                .with_context(|| format!("settings check failed for {}", path.display()))?;
            println!("settings ok: {}", path.display());
            for line in summary_lines(&settings) {
                println!("  {line}");
            }
            Ok(CliDispatch::Exit)
        }
        "doctor" => {
            let (format, rest) = parse_doctor_format(&args[1..])?;
            let path = settings_path(optional_path(rest)?);
            run_doctor(format, &path);
            Ok(CliDispatch::Exit)
        }
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(CliDispatch::Exit)
        }
        other if other.ends_with(".json") => Ok(CliDispatch::Run(PathBuf::from(other))),
        other => Err(anyhow!(
            "unknown command: {other}; run `tiddlyserver --help` for usage"
        )),
    }
}

/// 至多一个位置参数：设置文件路径。
fn optional_path(args: &[String]) -> anyhow::Result<Option<&str>> {
    match args {
        [] => Ok(None),
        [path] => Ok(Some(path.as_str())),
        _ => Err(anyhow!("expected at most one settings path, got {}", args.len())),
    }
}

/// `doctor` 输出格式。
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum DoctorFormat {
    Text,
    Json,
}

/// 取出 `--format` 参数，返回剩余参数。
fn parse_doctor_format(args: &[String]) -> anyhow::Result<(DoctorFormat, &[String])> {
    match args {
        [flag, value, rest @ ..] if flag == "--format" => {
            let format = match value.as_str() {
                "text" => DoctorFormat::Text,
                "json" => DoctorFormat::Json,
                other => return Err(anyhow!("unsupported doctor format: {other}")),
            };
            Ok((format, rest))
        }
        [flag] if flag == "--format" => Err(anyhow!(
            "usage: tiddlyserver doctor [--format text|json] [settings]"
        )),
        rest => Ok((DoctorFormat::Text, rest)),
    }
}

fn summary_lines(settings: &LoadedSettings) -> Vec<String> {
    let config = &settings.config;
    let bind = &config.bind_info;
    vec![
        format!("bind: {} port {}", bind.bind_address.join(", "), bind.port),
        format!(
            "host permission buckets: {}",
            bind.host_level_permissions.keys().collect::<Vec<_>>().join(", ")
        ),
        format!(
            "auth accounts: {} ({} keys)",
            config.auth_accounts.len(),
            settings.registry.len()
        ),
        format!("putsaver etag: {:?}, window {}s", config.putsaver.etag, config.putsaver.etag_window),
    ]
}

/// 打印诊断信息；设置无法加载时以非零码退出。
fn run_doctor(format: DoctorFormat, path: &Path) {
    let loaded = LoadedSettings::load(path);
    let error = loaded.as_ref().err().map(ConfigError::to_string);

    match format {
        DoctorFormat::Text => {
            println!("settings-path: {}", path.display());
            println!("settings-ok: {}", if error.is_none() { "yes" } else { "no" });
            match &loaded {
                Ok(settings) => {
                    for line in summary_lines(settings) {
                        println!("{line}");
                    }
                }
                Err(err) => println!("settings-error: {err}"),
            }
        }
        DoctorFormat::Json => {
            let summary = loaded.as_ref().map(summary_lines).unwrap_or_default();
            let payload = json!({
                "settingsPath": path.display().to_string(),
                "settingsOk": error.is_none(),
                "settingsError": error,
                "summary": summary,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| "{}".to_string())
            );
        }
    }

    if loaded.is_err() {
        std::process::exit(1);
    }
}

fn print_root_help() {
    println!("tiddlyserver usage:");
    println!("  tiddlyserver [run] [settings.json]");
    println!("  tiddlyserver check [settings.json]");
    println!("  tiddlyserver doctor [--format text|json] [settings.json]");
    println!("  tiddlyserver version");
    println!();
    println!("settings path defaults to $TS_SETTINGS, then ./settings.json");
}
