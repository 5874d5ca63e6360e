use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::fs;
use std::path::{Path, PathBuf};

const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

/// Initializes logging to a database-scoped folder: `{base}/{db_name}_logs/{db_name}.log`.
/// Creates the folder if missing and writes rolling log files. If a global
/// logger is already installed, the call leaves it in place.
///
/// # Errors
/// Returns an error if the directory cannot be created or the appender fails to build.
pub fn init_for_db_in(base_dir: &Path, db_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut dir = PathBuf::from(base_dir);
    dir.push(format!("{db_name}_logs"));
    fs::create_dir_all(&dir)?;
    init_rolling(&dir, db_name, LevelFilter::Info, 7)
}

/// Configure logging globally for the process.
/// - `dir`: base directory for logs; current directory if `None`.
/// - `level`: error|warn|info|debug|trace
/// - `retention`: number of rolled files to keep (default 7)
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<usize>) {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let lvl = match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };
    let keep = retention.unwrap_or(7) as u32;
    let _ = init_rolling(&base, "app", lvl, keep);
}

/// Configure logging from environment variables if present:
/// - MEVERSE_LOG_DIR
/// - MEVERSE_LOG_LEVEL
/// - MEVERSE_LOG_RETENTION
pub fn configure_from_env() {
    let dir = std::env::var("MEVERSE_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("MEVERSE_LOG_LEVEL").ok();
    let retention =
        std::env::var("MEVERSE_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention);
}

fn init_rolling(
    dir: &Path,
    stem: &str,
    lvl: LevelFilter,
    keep: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))?;
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(lvl))?;
    // Already-initialized is fine: the first configuration wins.
    let _ = log4rs::init_config(config);
    Ok(())
}
