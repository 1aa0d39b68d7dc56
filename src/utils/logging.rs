use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Initialize the logger with custom formatting
///
/// With a `log_file` the output goes there instead of stderr, so log lines
/// do not tear through the live table.
pub fn init_logger(level: LevelFilter, log_file: Option<&Path>) -> std::io::Result<()> {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level);

    if let Some(path) = log_file {
        let file = File::create(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Get log level from string
pub fn get_log_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(get_log_level("TRACE"), LevelFilter::Trace);
        assert_eq!(get_log_level("info"), LevelFilter::Info);
        assert_eq!(get_log_level("Off"), LevelFilter::Off);
    }

    #[test]
    fn unknown_level_falls_back_to_warn() {
        assert_eq!(get_log_level("loud"), LevelFilter::Warn);
    }
}
