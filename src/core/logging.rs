//! Logging initialization
//!
//! Console + file logging via `simplelog`. The level comes from the
//! `LOG_LEVEL` config value so operators can turn on `debug` to see the
//! failing SQL statements the storage layer logs at diagnostic level.

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;

use crate::core::error::{AppError, AppResult};

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `level` - Log verbosity ("error", "warn", "info", "debug", "trace")
/// * `log_file_path` - Path to the log file
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(AppError)` - Failed to create the log file or set the logger
pub fn init_logger(level: &str, log_file_path: &str) -> AppResult<()> {
    let filter = parse_level(level);

    let log_file = File::create(log_file_path)?;

    CombinedLogger::init(vec![
        TermLogger::new(filter, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(filter, Config::default(), log_file),
    ])
    .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_known_values() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
    }

    #[test]
    fn test_parse_level_falls_back_to_info() {
        assert_eq!(parse_level("verbose"), LevelFilter::Info);
        assert_eq!(parse_level(""), LevelFilter::Info);
    }
}
