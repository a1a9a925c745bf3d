//! Log output for long crawls
//!
//! Every line reads `HH:MM:SS tag message`. On a terminal the tag is colored
//! and lines are routed through the live progress bars; otherwise output is
//! plain so it survives redirection into a file.

use std::fmt::Arguments;

use indicatif::MultiProgress;

/// Three-letter tag for a level, so columns stay aligned.
fn tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "err",
        log::Level::Warn => "wrn",
        log::Level::Info => "inf",
        log::Level::Debug => "dbg",
        log::Level::Trace => "trc",
    }
}

fn ansi(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "\x1b[1;31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[2m",
        log::Level::Trace => "\x1b[2m",
    }
}

/// One finished log line, without the trailing newline.
fn render(stamp: &str, level: log::Level, args: &Arguments<'_>, color: bool) -> String {
    if color {
        format!("{stamp} {}{}\x1b[0m {args}", ansi(level), tag(level))
    } else {
        format!("{stamp} {} {args}", tag(level))
    }
}

fn clock() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Forwards to stderr from inside `MultiProgress::suspend` so bars are
/// redrawn below the line instead of being torn.
pub struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl IndicatifLogger {
    pub fn new(inner: env_logger::Logger, multi: MultiProgress) -> Self {
        Self { inner, multi }
    }
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            // Only installed when stderr is a terminal
            let line = render(&clock(), record.level(), record.args(), true);
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the process logger.
///
/// Defaults to `info`, `warn` with `quiet`, `debug` with `debug`. A
/// `RUST_LOG` value overrides both. Pass the progress handle when bars are
/// on screen. Calling this twice keeps the first logger.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env).build();
        let max_level = logger.filter();

        if log::set_boxed_logger(Box::new(IndicatifLogger::new(logger, multi.clone()))).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(buf, "{}", render(&clock(), record.level(), record.args(), false))
            })
            .try_init();
    }
}
