//! Stderr logger used by the VM hosts.
//!
//! Lines are colored by level and optionally prefixed with a UTC timestamp.
//! The minimum level and the timestamp prefix can be set programmatically or
//! from the environment:
//!
//! - `VMCORE_LOG`: `info`, `warn`, `error` or `off` (default `info`)
//! - `VMCORE_LOG_TIMESTAMPS`: `0` or `false` hides timestamps

use std::fmt::Display;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Log level for filtering messages.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    /// Parses a level name as accepted by `VMCORE_LOG`.
    ///
    /// `off` maps to `None`, which silences every level.
    pub fn parse(name: &str) -> Result<Option<Level>, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Some(Level::Info)),
            "warn" | "warning" => Ok(Some(Level::Warn)),
            "error" => Ok(Some(Level::Error)),
            "off" | "none" => Ok(None),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Info => write!(f, "INFO"),
            Level::Warn => write!(f, "WARN"),
            Level::Error => write!(f, "ERROR"),
        }
    }
}

/// Sentinel stored in [`MIN_LEVEL`] when logging is off.
const LEVEL_OFF: u8 = u8::MAX;

static MIN_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);
pub static SHOW_TIMESTAMP: AtomicBool = AtomicBool::new(true);
pub static SHOW_TYPE: AtomicBool = AtomicBool::new(true);

/// Sets the lowest level that is still written. `None` disables logging.
pub fn set_min_level(level: Option<Level>) {
    let raw = level.map_or(LEVEL_OFF, |l| l as u8);
    MIN_LEVEL.store(raw, Ordering::Relaxed);
}

/// Returns true if a message at `level` would be written.
pub fn enabled(level: Level) -> bool {
    level as u8 >= MIN_LEVEL.load(Ordering::Relaxed)
}

/// Applies `VMCORE_LOG` and `VMCORE_LOG_TIMESTAMPS` from the process environment.
///
/// Returns an error naming the offending value if `VMCORE_LOG` is not a known level;
/// the current settings are left untouched in that case.
pub fn init_from_env() -> Result<(), String> {
    configure(
        std::env::var("VMCORE_LOG").ok().as_deref(),
        std::env::var("VMCORE_LOG_TIMESTAMPS").ok().as_deref(),
    )
}

fn configure(level: Option<&str>, timestamps: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        set_min_level(Level::parse(level)?);
    }
    if let Some(ts) = timestamps {
        let show = !matches!(ts.trim(), "0" | "false" | "no");
        SHOW_TIMESTAMP.store(show, Ordering::Relaxed);
    }
    Ok(())
}

/// Converts days since Unix epoch to (year, month, day).
fn days_to_date(days: u64) -> (u32, u32, u32) {
    // Howard Hinnant's civil_from_days
    let z = days as i64 + 719468;
    let era = z.div_euclid(146097);
    let doe = z.rem_euclid(146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as u32, m, d)
}

/// Formats a `SystemTime` offset from the epoch as `YYYY-MM-DD hh:mm:ss.mmm`.
fn format_timestamp(since_epoch: std::time::Duration) -> String {
    let secs = since_epoch.as_secs();
    let (year, month, day) = days_to_date(secs / 86400);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        year,
        month,
        day,
        (secs / 3600) % 24,
        (secs / 60) % 60,
        secs % 60,
        since_epoch.subsec_millis()
    )
}

/// Internal logging function. Use the `info!`, `warn!`, or `error!` macros instead.
#[doc(hidden)]
pub fn log(level: Level, message: &str) {
    if !enabled(level) {
        return;
    }

    let mut stderr = StandardStream::stderr(ColorChoice::Auto);
    let mut spec = ColorSpec::new();
    match level {
        Level::Warn => {
            spec.set_fg(Some(Color::Yellow)).set_bold(true);
        }
        Level::Error => {
            spec.set_fg(Some(Color::Red)).set_bold(true);
        }
        Level::Info => {
            spec.clear();
        }
    }
    let _ = stderr.set_color(&spec);

    if SHOW_TIMESTAMP.load(Ordering::Relaxed) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let _ = write!(stderr, "{} ", format_timestamp(now));
    }
    if SHOW_TYPE.load(Ordering::Relaxed) {
        let _ = write!(stderr, "[{:5}] ", level);
    }
    let _ = writeln!(stderr, "{}", message);
    let _ = stderr.reset();
}

/// Logs an info-level message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Info, &format!($($arg)*));
        }
    }};
}

/// Logs a warning-level message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Warn, &format!($($arg)*))
        }
    }};
}

/// Logs an error-level message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        if cfg!(not(test)) {
            $crate::utils::log::log($crate::utils::log::Level::Error, &format!($($arg)*))
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn level_ordering() {
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::Info), "INFO");
        assert_eq!(format!("{}", Level::Warn), "WARN");
        assert_eq!(format!("{}", Level::Error), "ERROR");
    }

    #[test]
    fn level_parse() {
        assert_eq!(Level::parse("info"), Ok(Some(Level::Info)));
        assert_eq!(Level::parse(" WARN "), Ok(Some(Level::Warn)));
        assert_eq!(Level::parse("warning"), Ok(Some(Level::Warn)));
        assert_eq!(Level::parse("error"), Ok(Some(Level::Error)));
        assert_eq!(Level::parse("off"), Ok(None));
        assert!(Level::parse("verbose").is_err());
    }

    // The minimum level is global; keep the filter checks in one test.
    #[test]
    fn min_level_filters_and_configure_rejects_garbage() {
        set_min_level(Some(Level::Warn));
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Warn));
        assert!(enabled(Level::Error));

        set_min_level(None);
        assert!(!enabled(Level::Error));

        assert!(configure(Some("loud"), None).is_err());
        assert!(!enabled(Level::Error));

        configure(Some("info"), None).unwrap();
        assert!(enabled(Level::Info));
    }

    #[test]
    fn days_to_date_epoch() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
    }

    #[test]
    fn days_to_date_leap_year() {
        // 2024-02-29 is 19782 days after epoch
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }

    #[test]
    fn timestamp_format() {
        let t = Duration::from_millis(19723 * 86_400_000 + 3_723_045);
        assert_eq!(format_timestamp(t), "2024-01-01 01:02:03.045");
    }
}
