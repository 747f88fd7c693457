//! Installs a `log` backend for scheduling-decision messages
//! (`alloc`/`fork`/`exit`/dispatch/demotion): `log::{debug, info, warn}`
//! in a `#![no_std]` kernel, rather than direct `print!`/`println!`/
//! `uprint!` console macros.
//!
//! The sink is a small trait rather than a hardwired UART write, so the
//! destination (real console, or nothing, on the host) is supplied by
//! whoever links this crate in, the same way `collab::Collaborators` is.

use core::fmt::Write as _;
use log::{Level, LevelFilter, Metadata, Record};

/// Receives one already-formatted log line at a time.
pub trait LogSink: Sync {
    fn write_line(&self, line: &str);
}

struct NullSink;
impl LogSink for NullSink {
    fn write_line(&self, _line: &str) {}
}
static NULL_SINK: NullSink = NullSink;

/// Set once at boot, before any secondary CPU starts scheduling, so no
/// further synchronization is needed to read it.
static mut SINK: Option<&'static dyn LogSink> = None;

/// Installs `sink` as the destination for subsequent log lines. Call once,
/// from the single-threaded portion of boot.
///
/// # Safety
/// Must not run concurrently with any other CPU that might be logging.
pub unsafe fn set_sink(sink: &'static dyn LogSink) {
    SINK = Some(sink);
}

fn sink() -> &'static dyn LogSink {
    unsafe { SINK.unwrap_or(&NULL_SINK) }
}

struct LineBuf {
    buf: [u8; 200],
    len: usize,
}
impl core::fmt::Write for LineBuf {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let space = self.buf.len() - self.len;
        let n = bytes.len().min(space);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

struct SchedLogger;
impl log::Log for SchedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.target().starts_with("xv6_sched") || metadata.target().is_empty()
    }
    fn log(&self, record: &Record) {
        let mut line = LineBuf { buf: [0; 200], len: 0 };
        let _ = write!(line, "[{}] {}", record.level(), record.args());
        sink().write_line(core::str::from_utf8(&line.buf[..line.len]).unwrap_or(""));
    }
    fn flush(&self) {}
}
static LOGGER: SchedLogger = SchedLogger;

/// Installs the scheduler's `log` backend and sets the minimum level.
/// Callers that don't otherwise care should pick `Info`: loud enough to
/// see dispatch/demotion decisions without logging every tick's
/// accounting update.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}

pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// Writes one line straight to the installed sink, bypassing `log`'s level
/// filter. For output a caller explicitly asked for (`getps`'s table dump)
/// rather than a diagnostic message, matching how `console/printf.rs`'s
/// `println!`/`uprintln!` write unconditionally rather than through `log`.
pub fn report(args: core::fmt::Arguments) {
    let mut line = LineBuf { buf: [0; 200], len: 0 };
    let _ = line.write_fmt(args);
    sink().write_line(core::str::from_utf8(&line.buf[..line.len]).unwrap_or(""));
}

macro_rules! reportln {
    ($($arg:tt)*) => {
        $crate::logging::report(core::format_args!($($arg)*))
    };
}
pub(crate) use reportln;

#[cfg(test)]
pub mod test_support {
    use super::LogSink;
    use std::sync::Mutex;

    /// Collects log lines into memory so tests can assert on them.
    pub struct VecSink(pub Mutex<std::vec::Vec<std::string::String>>);
    impl VecSink {
        pub const fn new() -> VecSink {
            VecSink(Mutex::new(std::vec::Vec::new()))
        }
    }
    impl LogSink for VecSink {
        fn write_line(&self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }
}
