use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::utils::sqllog::SQL_TARGET;

/// Log target for writes (inserts, updates, deletes, drops).
pub const AUDIT_TARGET: &str = "docsql::audit";

const ENC_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

/// Initializes logging from a log4rs YAML file.
///
/// # Errors
/// Returns an error if the file cannot be read or a logger is already installed.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

fn rolling(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let pattern = base.join(format!("{stem}.{{}}.log"));
    let roller = FixedWindowRoller::builder().build(&pattern.display().to_string(), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENC_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Configure logging for the process: `app.log`, `audit.log` and, with `trace_sql`, `sql.log`.
/// - dir: base directory for logs; current directory when `None`.
/// - level: error|warn|info|debug|trace, default info.
/// - retention: rolled files kept per log (default 7).
///
/// A logger installed earlier in the process is left in place.
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
    trace_sql: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = dir.map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        PathBuf::from,
    );
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(7);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .logger(
            Logger::builder()
                .appender("audit")
                .additive(false)
                .build(AUDIT_TARGET, lvl),
        );

    builder = if trace_sql {
        builder
            .appender(Appender::builder().build("sql", Box::new(rolling(&base, "sql", keep)?)))
            .logger(
                Logger::builder()
                    .appender("sql")
                    .additive(false)
                    .build(SQL_TARGET, LevelFilter::Trace),
            )
    } else {
        builder.logger(
            Logger::builder()
                .additive(false)
                .build(SQL_TARGET, LevelFilter::Off),
        )
    };

    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    if log4rs::init_config(config).is_err() {
        log::debug!("logger already installed; keeping existing configuration");
    }
    Ok(())
}

/// Configure logging from environment variables if present:
/// - DOCSQL_LOG_DIR
/// - DOCSQL_LOG_LEVEL
/// - DOCSQL_LOG_RETENTION
/// - DOCSQL_TRACE_SQL
///
/// # Errors
/// See [`configure_logging`].
pub fn configure_from_env() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::var("DOCSQL_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("DOCSQL_LOG_LEVEL").ok();
    let retention = std::env::var("DOCSQL_LOG_RETENTION")
        .ok()
        .and_then(|s| s.parse::<u32>().ok());
    let trace_sql = std::env::var("DOCSQL_TRACE_SQL").is_ok_and(|s| is_truthy(&s));
    configure_logging(dir.as_deref(), level.as_deref(), retention, trace_sql)
}

pub(crate) fn is_truthy(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| LevelFilter::from_str(l).ok())
        .unwrap_or(LevelFilter::Info)
}
