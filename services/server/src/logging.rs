//! 日志：stdout + 按天滚动文件双通道，历史日期自动打包为 `.7z`。
//!
//! 目录布局：
//! - `<logDir>/raw/<service>.log.<YYYY-MM-DD>`
//! - `<logDir>/archive/<YYYY-MM-DD>.7z`

use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use sevenz_rust::compress_to_path;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::LoggingConfig;

const DEFAULT_LOG_DIR: &str = "logs";
const RAW_DIR_NAME: &str = "raw";
const ARCHIVE_DIR_NAME: &str = "archive";
const ARCHIVE_STAGE_DIR_NAME: &str = ".archive-tmp";
const ARCHIVE_LOCK_DIR_NAME: &str = ".archive-lock";
const DEFAULT_ARCHIVE_INTERVAL_SEC: u64 = 3600;
const DEFAULT_STDOUT_FILTER: &str = "info";

/// 日志目录环境变量，优先于设置文件。
const LOG_DIR_ENV: &str = "TS_LOG_DIR";
/// 文件日志级别环境变量（独立于 `RUST_LOG`）。
const FILE_LOG_LEVEL_ENV: &str = "TS_FILE_LOG_LEVEL";
const ARCHIVE_INTERVAL_ENV: &str = "TS_LOG_ARCHIVE_INTERVAL_SEC";

/// non-blocking writer 的守卫；丢弃即停止写日志。
pub(crate) struct LogRuntime {
    _stdout_guard: WorkerGuard,
    _file_guard: WorkerGuard,
    _archiver: JoinHandle<()>,
}

/// 环境变量 > 设置文件 > 默认值 合并后的日志参数。
#[derive(Debug, Clone, PartialEq)]
struct LogPlan {
    root_dir: PathBuf,
    file_level: LevelFilter,
    archive_interval: Duration,
}

impl LogPlan {
    fn resolve(
        settings: &LoggingConfig,
        env: impl Fn(&str) -> Option<String>,
        cwd: Option<PathBuf>,
    ) -> Self {
        let env = |key: &str| env(key).map(|raw| raw.trim().to_string()).filter(|v| !v.is_empty());

        let root_dir = env(LOG_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| settings.log_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));
        let root_dir = match cwd {
            Some(cwd) if root_dir.is_relative() => cwd.join(root_dir),
            _ => root_dir,
        };

        let file_level = env(FILE_LOG_LEVEL_ENV)
            .or_else(|| settings.file_level.clone())
            .and_then(|raw| raw.parse::<LevelFilter>().ok())
            .unwrap_or(LevelFilter::DEBUG);

        let interval_sec = env(ARCHIVE_INTERVAL_ENV)
            .and_then(|raw| raw.parse::<u64>().ok())
            .or(settings.archive_interval_sec)
            .filter(|sec| *sec > 0)
            .unwrap_or(DEFAULT_ARCHIVE_INTERVAL_SEC);

        Self {
            root_dir,
            file_level,
            archive_interval: Duration::from_secs(interval_sec),
        }
    }

    fn raw_dir(&self) -> PathBuf {
        self.root_dir.join(RAW_DIR_NAME)
    }

    fn archive_dir(&self) -> PathBuf {
        self.root_dir.join(ARCHIVE_DIR_NAME)
    }
}

/// 安装全局 subscriber 并启动归档任务。必须在 tokio 运行时内调用。
pub(crate) fn init(service_name: &str, settings: &LoggingConfig) -> Result<LogRuntime> {
    let plan = LogPlan::resolve(
        settings,
        |key| std::env::var(key).ok(),
        std::env::current_dir().ok(),
    );
    let raw_dir = plan.raw_dir();
    let archive_dir = plan.archive_dir();
    fs::create_dir_all(&raw_dir)
        .with_context(|| format!("create raw log dir: {}", raw_dir.display()))?;
    fs::create_dir_all(&archive_dir)
        .with_context(|| format!("create archive log dir: {}", archive_dir.display()))?;

    archive_finished_days(&plan.root_dir)?;

    let file_appender = tracing_appender::rolling::daily(&raw_dir, format!("{service_name}.log"));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout_writer)
        .with_ansi(true)
        .with_target(false)
        .compact()
        .with_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_STDOUT_FILTER)),
        );
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(plan.file_level);

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    debug!("logging to {}", plan.root_dir.display());
    let archiver = spawn_archiver(plan.root_dir.clone(), plan.archive_interval);
    Ok(LogRuntime {
        _stdout_guard: stdout_guard,
        _file_guard: file_guard,
        _archiver: archiver,
    })
}

fn spawn_archiver(root_dir: PathBuf, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let root = root_dir.clone();
            let outcome = tokio::task::spawn_blocking(move || archive_finished_days(&root)).await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("archive logs failed: {err:#}"),
                Err(err) => warn!("archive task aborted: {err}"),
            }
        }
    })
}

/// 按日期收集 raw 目录下早于 `today` 的日志文件。
fn finished_days(raw_dir: &Path, today: &str) -> Result<BTreeMap<String, Vec<PathBuf>>> {
    let mut grouped: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for entry in
        fs::read_dir(raw_dir).with_context(|| format!("read raw logs: {}", raw_dir.display()))?
    {
        let path = entry
            .with_context(|| format!("read entry under {}", raw_dir.display()))?
            .path();
        if !path.is_file() {
            continue;
        }
        let Some(day) = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(day_of_log_file)
        else {
            continue;
        };
        if day.as_str() < today {
            grouped.entry(day).or_default().push(path);
        }
    }
    for files in grouped.values_mut() {
        files.sort();
    }
    Ok(grouped)
}

/// 归档所有已结束日期；另一个进程持有锁时直接跳过。
fn archive_finished_days(root_dir: &Path) -> Result<()> {
    let raw_dir = root_dir.join(RAW_DIR_NAME);
    if !raw_dir.exists() {
        return Ok(());
    }
    let Some(_lock) = ArchiveLock::acquire(root_dir)? else {
        return Ok(());
    };

    let today = Local::now().date_naive().format("%Y-%m-%d").to_string();
    let archive_dir = root_dir.join(ARCHIVE_DIR_NAME);
    for (day, files) in finished_days(&raw_dir, &today)? {
        archive_day(root_dir, &archive_dir, &day, &files)?;
    }
    Ok(())
}

/// 复制到暂存目录 -> 压缩为 `.7z.tmp` -> 改名 -> 删除原文件。
fn archive_day(root_dir: &Path, archive_dir: &Path, day: &str, files: &[PathBuf]) -> Result<()> {
    let archive_path = archive_dir.join(format!("{day}.7z"));
    if archive_path.exists() {
        remove_all(files);
        return Ok(());
    }

    let stage_dir = root_dir.join(ARCHIVE_STAGE_DIR_NAME).join(day);
    if stage_dir.exists() {
        let _ = fs::remove_dir_all(&stage_dir);
    }
    fs::create_dir_all(&stage_dir)
        .with_context(|| format!("create archive stage dir: {}", stage_dir.display()))?;
    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = stage_dir.join(name);
        fs::copy(file, &target).with_context(|| {
            format!("stage log {} -> {}", file.display(), target.display())
        })?;
    }

    let archive_tmp = archive_dir.join(format!("{day}.7z.tmp"));
    if archive_tmp.exists() {
        let _ = fs::remove_file(&archive_tmp);
    }
    compress_to_path(&stage_dir, &archive_tmp)
        .with_context(|| format!("compress logs to {}", archive_tmp.display()))?;
    fs::rename(&archive_tmp, &archive_path)
        .with_context(|| format!("finalize archive {}", archive_path.display()))?;

    remove_all(files);
    let _ = fs::remove_dir_all(&stage_dir);
    Ok(())
}

fn remove_all(files: &[PathBuf]) {
    for file in files {
        let _ = fs::remove_file(file);
    }
}

/// `<service>.log.<YYYY-MM-DD>` -> `YYYY-MM-DD`。
fn day_of_log_file(file_name: &str) -> Option<String> {
    let day = file_name.rsplit('.').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some(day.to_string())
}

/// 以目录创建的原子性作为跨进程归档锁；析构时释放。
struct ArchiveLock {
    lock_dir: PathBuf,
}

impl ArchiveLock {
    fn acquire(root_dir: &Path) -> Result<Option<Self>> {
        let lock_dir = root_dir.join(ARCHIVE_LOCK_DIR_NAME);
        match fs::create_dir(&lock_dir) {
            Ok(()) => Ok(Some(Self { lock_dir })),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("create archive lock: {}", lock_dir.display()))
            }
        }
    }
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        let _ = fs::remove_dir(&self.lock_dir);
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf, time::Duration};

    use tracing_subscriber::filter::LevelFilter;

    use super::{ArchiveLock, LogPlan, archive_day, day_of_log_file, finished_days};
    use crate::config::LoggingConfig;

    #[test]
    fn env_overrides_settings_which_override_defaults() {
        let settings = LoggingConfig {
            log_dir: Some(PathBuf::from("/var/log/ts")),
            file_level: Some("warn".to_string()),
            archive_interval_sec: Some(60),
        };
        let plan = LogPlan::resolve(&settings, |_| None, None);
        assert_eq!(plan.root_dir, PathBuf::from("/var/log/ts"));
        assert_eq!(plan.file_level, LevelFilter::WARN);
        assert_eq!(plan.archive_interval, Duration::from_secs(60));

        let plan = LogPlan::resolve(
            &settings,
            |key| match key {
                "TS_LOG_DIR" => Some("override".to_string()),
                "TS_FILE_LOG_LEVEL" => Some("trace".to_string()),
                _ => None,
            },
            Some(PathBuf::from("/srv")),
        );
        assert_eq!(plan.root_dir, PathBuf::from("/srv/override"));
        assert_eq!(plan.file_level, LevelFilter::TRACE);

        let defaults = LogPlan::resolve(&LoggingConfig::default(), |_| None, None);
        assert_eq!(defaults.root_dir, PathBuf::from("logs"));
        assert_eq!(defaults.file_level, LevelFilter::DEBUG);
        assert_eq!(defaults.archive_interval, Duration::from_secs(3600));
    }

    #[test]
    fn log_day_comes_from_rolling_suffix() {
        assert_eq!(
            day_of_log_file("tiddlyserver.log.2024-03-09").as_deref(),
            Some("2024-03-09")
        );
        assert_eq!(day_of_log_file("tiddlyserver.log"), None);
        assert_eq!(day_of_log_file("notes.2024-13-40"), None);
    }

    #[test]
    fn only_past_days_are_collected_and_archived() {
        let root = tempfile::tempdir().expect("tempdir");
        let raw = root.path().join("raw");
        let archive = root.path().join("archive");
        fs::create_dir_all(&raw).expect("mkdir");
        fs::create_dir_all(&archive).expect("mkdir");
        fs::write(raw.join("ts.log.2024-01-01"), "old").expect("write");
        fs::write(raw.join("ts.log.2024-01-02"), "today").expect("write");
        fs::write(raw.join("stray.txt"), "x").expect("write");

        let grouped = finished_days(&raw, "2024-01-02").expect("scan");
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["2024-01-01"]);

        let files = &grouped["2024-01-01"];
        archive_day(root.path(), &archive, "2024-01-01", files).expect("archive");
        assert!(archive.join("2024-01-01.7z").exists());
        assert!(!raw.join("ts.log.2024-01-01").exists());
        assert!(raw.join("ts.log.2024-01-02").exists());
    }

    #[test]
    fn archive_lock_is_exclusive() {
        let root = tempfile::tempdir().expect("tempdir");
        let first = ArchiveLock::acquire(root.path()).expect("lock");
        assert!(first.is_some());
        assert!(ArchiveLock::acquire(root.path()).expect("lock").is_none());
        drop(first);
        assert!(ArchiveLock::acquire(root.path()).expect("lock").is_some());
    }
}
