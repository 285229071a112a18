use std::fmt;
use std::fs;
use std::path::Path;

use chrono::Local;
use fern::colors::{Color, ColoredLevelConfig};
use fern::{Dispatch, FormatCallback};
use log::{LevelFilter, Record};

const LOG_FILE: &str = "server.log";
const TIMESTAMP: &str = "%m/%d/%Y %H:%M:%S";

fn level_from_env() -> LevelFilter {
    std::env::var("RUST_LOG").ok().and_then(|v| v.parse().ok()).unwrap_or(LevelFilter::Info)
}

fn write_record(out: FormatCallback, message: &fmt::Arguments, record: &Record, level: &dyn fmt::Display) {
    let target = record.target().strip_prefix("pbs_server_core::").unwrap_or(record.target());
    out.finish(format_args!("{};{};{};{}", Local::now().format(TIMESTAMP), level, target, message))
}

/// Sets up the process logger: colored records on stderr plus `<log_dir>/server.log`.
///
/// The level comes from `RUST_LOG` (default `info`). A failure to open the log file leaves
/// stderr as the only sink; a second call keeps the logger installed first.
pub fn init(log_dir: &Path) {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::BrightBlack);

    let stderr_sink = Dispatch::new()
        .format(move |out, message, record| write_record(out, message, record, &colors.color(record.level())))
        .chain(std::io::stderr());

    let mut dispatch = Dispatch::new().level(level_from_env()).level_for("serde_json", LevelFilter::Warn).chain(stderr_sink);

    let log_path = log_dir.join(LOG_FILE);
    let file = fs::create_dir_all(log_dir).and_then(|_| fern::log_file(&log_path));
    let file_ok = match file {
        Ok(file) => {
            dispatch = dispatch.chain(Dispatch::new().format(|out, message, record| write_record(out, message, record, &record.level())).chain(file));
            true
        }
        Err(e) => {
            eprintln!("cannot open log file {}: {}", log_path.display(), e);
            false
        }
    };

    if dispatch.apply().is_err() {
        return;
    }
    if file_ok {
        log::info!("logging to {}", log_path.display());
    }
}
