// Kernel Logging Subsystem
//
// Multi-level log output for bring-up and diagnostics. Two front ends feed
// the same sink:
// - The `log_*!` macros, used by kernel code, which carry an explicit
//   subsystem origin
// - The `log` crate facade, used by `lumen_hwinfo`, whose record target
//   becomes the origin
//
// Output format:
// - `[LEVEL] [origin] message` on the serial port, always
// - DEBUG entries also carry `(file:line)`
// - Optionally mirrored to the text console with color coding, on targets
//   whose display is not the serial port itself
//
// Implementation details:
// - Level and mirror flag are atomics, so logging is usable from interrupt
//   context and before anything else is initialized
// - Entries below the current level are dropped before any formatting
// - The `verbose-boot` feature starts at DEBUG with the mirror on;
//   otherwise the level is INFO and only serial receives output
//
// Correctness notes:
// - Serial output before `serial_init` is best effort: COM1 accepts it, an
//   undiscovered PL011 drops it
// - The display mirror takes the console lock; do not log while holding it

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use lumen_hwinfo::ConsoleColor;

use crate::arch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    Panic = 4,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO ",
            LogLevel::Warn => "WARN ",
            LogLevel::Error => "ERROR",
            LogLevel::Panic => "PANIC",
        }
    }

    pub const fn color(&self) -> ConsoleColor {
        match self {
            LogLevel::Debug => ConsoleColor::DarkGray,
            LogLevel::Info => ConsoleColor::White,
            LogLevel::Warn => ConsoleColor::Yellow,
            LogLevel::Error => ConsoleColor::LightRed,
            LogLevel::Panic => ConsoleColor::Red,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Panic,
        }
    }

    const fn filter(self) -> ::log::LevelFilter {
        match self {
            LogLevel::Debug => ::log::LevelFilter::Debug,
            LogLevel::Info => ::log::LevelFilter::Info,
            LogLevel::Warn => ::log::LevelFilter::Warn,
            LogLevel::Error | LogLevel::Panic => ::log::LevelFilter::Error,
        }
    }
}

impl From<::log::Level> for LogLevel {
    fn from(level: ::log::Level) -> Self {
        match level {
            ::log::Level::Error => LogLevel::Error,
            ::log::Level::Warn => LogLevel::Warn,
            ::log::Level::Info => LogLevel::Info,
            ::log::Level::Debug | ::log::Level::Trace => LogLevel::Debug,
        }
    }
}

static CURRENT_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static DISPLAY_OUTPUT_ENABLED: AtomicBool = AtomicBool::new(false);

struct KernelLogger;

impl ::log::Log for KernelLogger {
    fn enabled(&self, metadata: &::log::Metadata) -> bool {
        LogLevel::from(metadata.level()) >= get_level()
    }

    fn log(&self, record: &::log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        _log(
            LogLevel::from(record.level()),
            record.target(),
            *record.args(),
            record.file().unwrap_or("?"),
            record.line().unwrap_or(0),
        );
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

pub fn init() {
    if cfg!(feature = "verbose-boot") {
        set_level(LogLevel::Debug);
        enable_display_output();
    } else {
        set_level(LogLevel::Info);
    }

    // A second call only fails because a logger is already installed.
    let _ = ::log::set_logger(&LOGGER);
}

pub fn set_level(level: LogLevel) {
    CURRENT_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    ::log::set_max_level(level.filter());
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(CURRENT_LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn enable_display_output() {
    DISPLAY_OUTPUT_ENABLED.store(true, Ordering::Relaxed);
}

pub fn _log(level: LogLevel, origin: &str, args: fmt::Arguments, file: &str, line: u32) {
    if level < get_level() {
        return;
    }

    let level_str = level.as_str();

    if level == LogLevel::Debug {
        arch::serial_write_fmt(format_args!(
            "[{}] [{}] {} ({}:{})\n",
            level_str, origin, args, file, line
        ));
    } else {
        arch::serial_write_fmt(format_args!("[{}] [{}] {}\n", level_str, origin, args));
    }

    if !arch::DISPLAY_IS_SERIAL && DISPLAY_OUTPUT_ENABLED.load(Ordering::Relaxed) {
        write_display_log(level, origin, args, file, line);
    }
}

fn write_display_log(level: LogLevel, origin: &str, args: fmt::Arguments, file: &str, line: u32) {
    arch::display_write_fmt(level.color(), format_args!("[{}] ", level.as_str()));
    arch::display_write_fmt(ConsoleColor::LightBlue, format_args!("[{}] ", origin));

    if level == LogLevel::Debug {
        arch::display_write_fmt(ConsoleColor::White, format_args!("{} ({}:{})\n", args, file, line));
    } else {
        arch::display_write_fmt(ConsoleColor::White, format_args!("{}\n", args));
    }
}

#[macro_export]
macro_rules! log_debug {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Debug,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_info {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Info,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_warn {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Warn,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_error {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Error,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[macro_export]
macro_rules! log_panic {
    ($origin:expr, $($arg:tt)*) => {
        $crate::log::_log(
            $crate::log::LogLevel::Panic,
            $origin,
            format_args!($($arg)*),
            file!(),
            line!()
        )
    };
}
