//! Logging setup.
//!
//! Every event goes to a daily-rolling JSON-lines file. With `-v` a compact
//! human-readable copy also goes to stderr. Stdout is never written to: it
//! carries changelog previews and `--json` output.

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Event;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "CHLOG_LOG_PATH";
const ENV_LOG_DIR: &str = "CHLOG_LOG_DIR";
const DEFAULT_LOG_DIR_UNIX: &str = "/var/log";
const LOG_FILE_SUFFIX: &str = ".jsonl";

/// Where and how to log.
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    /// Name used for the log file and the platform data directory.
    pub service: String,
    /// Directory for JSONL log files. Falls back to platform defaults if unset.
    pub log_dir: Option<PathBuf>,
    /// Mirror events to stderr in human-readable form.
    pub stderr: bool,
}

impl ObservabilityConfig {
    /// Config for this binary; `log_dir` usually comes from the config file.
    pub fn from_env_with_overrides(log_dir: Option<PathBuf>, stderr: bool) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            log_dir,
            stderr,
        }
    }
}

#[derive(Clone, Debug)]
struct LogTarget {
    dir: PathBuf,
    file_name: String,
}

impl LogTarget {
    #[cfg(test)]
    fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Keeps the background log writer alive; flushes on drop.
pub struct ObservabilityGuard {
    _log_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// If no log file can be opened the JSON lines go to stderr instead.
pub fn init_observability(
    cfg: &ObservabilityConfig,
    env_filter: EnvFilter,
) -> Result<ObservabilityGuard> {
    let (log_writer, log_guard) = match build_log_writer(&cfg.service, cfg.log_dir.as_deref()) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("Warning: {err}. Falling back to stderr logging.");
            tracing_appender::non_blocking(std::io::stderr())
        }
    };

    let stderr_layer = cfg.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonLogLayer::new(log_writer))
        .with(stderr_layer)
        .init();

    tracing::debug!(service = %cfg.service, "logging initialized");

    Ok(ObservabilityGuard {
        _log_guard: log_guard,
    })
}

/// Build an `EnvFilter` based on CLI flags and environment.
///
/// Priority: quiet flag > verbose flag > RUST_LOG env > default_level
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

// ============================================================================
// JSON Log Layer
// ============================================================================

struct JsonLogLayer<W> {
    writer: W,
}

impl<W> JsonLogLayer<W> {
    const fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<S, W> tracing_subscriber::Layer<S> for JsonLogLayer<W>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: LayerContext<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut visitor = JsonVisitor::default();
            attrs.record(&mut visitor);
            span.extensions_mut().insert(SpanFields {
                values: visitor.values,
            });
        }
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: LayerContext<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = JsonVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            fields.values.extend(visitor.values);
        } else {
            extensions.insert(SpanFields {
                values: visitor.values,
            });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        let mut map = Map::new();
        map.insert("timestamp".to_string(), Value::String(timestamp()));
        map.insert(
            "level".to_string(),
            Value::String(metadata.level().as_str().to_lowercase()),
        );
        map.insert(
            "target".to_string(),
            Value::String(metadata.target().to_string()),
        );

        // Span fields first so event fields win on collision
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    map.extend(fields.values.clone());
                }
            }
        }

        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        map.extend(visitor.values);

        let mut writer = self.writer.make_writer();
        if serde_json::to_writer(&mut writer, &Value::Object(map)).is_ok() {
            let _ = writer.write_all(b"\n");
        }
    }
}

#[derive(Clone, Debug)]
struct SpanFields {
    values: Map<String, Value>,
}

#[derive(Default)]
struct JsonVisitor {
    values: Map<String, Value>,
}

impl JsonVisitor {
    fn put(&mut self, field: &tracing::field::Field, value: Value) {
        self.values.insert(field.name().to_string(), value);
    }
}

impl tracing::field::Visit for JsonVisitor {
    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.put(field, Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        if let Some(number) = serde_json::Number::from_f64(value) {
            self.put(field, Value::Number(number));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_error(
        &mut self,
        field: &tracing::field::Field,
        value: &(dyn std::error::Error + 'static),
    ) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.put(field, Value::String(format!("{value:?}")));
    }
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ============================================================================
// Log Target Resolution
// ============================================================================

fn build_log_writer(
    service: &str,
    config_log_dir: Option<&Path>,
) -> Result<(NonBlocking, WorkerGuard)> {
    let target = resolve_log_target(service, config_log_dir).map_err(|e| anyhow::anyhow!("{e}"))?;
    let appender = tracing_appender::rolling::daily(&target.dir, &target.file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn resolve_log_target(service: &str, config_log_dir: Option<&Path>) -> Result<LogTarget, String> {
    resolve_log_target_with(
        service,
        std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
        std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
        config_log_dir.map(PathBuf::from),
    )
}

/// `CHLOG_LOG_PATH`, then `CHLOG_LOG_DIR`, then the config, then the first
/// writable of `/var/log`, the platform data dir and the working directory.
fn resolve_log_target_with(
    service: &str,
    path_override: Option<PathBuf>,
    dir_override: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Result<LogTarget, String> {
    if let Some(path) = path_override {
        return log_target_from_path(path);
    }
    if let Some(dir) = dir_override.or(config_dir) {
        return log_target_from_dir(dir, service);
    }

    let mut candidates = Vec::new();
    if cfg!(unix) {
        candidates.push(PathBuf::from(DEFAULT_LOG_DIR_UNIX));
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", service) {
        candidates.push(proj_dirs.data_local_dir().join("logs"));
    }
    if let Ok(dir) = std::env::current_dir() {
        candidates.push(dir);
    }

    let file_name = format!("{service}{LOG_FILE_SUFFIX}");
    candidates
        .into_iter()
        .find(|dir| ensure_writable(dir, &file_name).is_ok())
        .map(|dir| LogTarget { dir, file_name })
        .ok_or_else(|| "No writable log directory found".to_string())
}

fn log_target_from_dir(dir: PathBuf, service: &str) -> Result<LogTarget, String> {
    let file_name = format!("{service}{LOG_FILE_SUFFIX}");
    ensure_writable(&dir, &file_name)?;
    Ok(LogTarget { dir, file_name })
}

fn log_target_from_path(path: PathBuf) -> Result<LogTarget, String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("{ENV_LOG_PATH} must include a file name"))?
        .to_str()
        .ok_or_else(|| format!("{ENV_LOG_PATH} must be valid UTF-8"))?
        .to_string();

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    ensure_writable(dir, &file_name)?;

    Ok(LogTarget {
        dir: dir.to_path_buf(),
        file_name,
    })
}

fn ensure_writable(dir: &Path, file_name: &str) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", dir.display()))?;

    let path = dir.join(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file {}: {e}", path.display()))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
