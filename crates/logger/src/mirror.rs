//! Best-effort secondary sink echoing records to the console

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use termcolor::{Color, ColorChoice, ColorSpec, NoColor, StandardStream, WriteColor};

use crate::{LogLevel, LogRecord};

enum Sink {
    Console {
        stdout: StandardStream,
        stderr: StandardStream,
    },
    Capture(Arc<Mutex<Vec<u8>>>),
}

/// Writes each record as one line. Records at `Error` and above go to
/// stderr, everything else to stdout. Output failures are ignored.
pub struct StdoutMirror {
    sink: Sink,
}

impl std::fmt::Debug for StdoutMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.sink {
            Sink::Console { .. } => "console",
            Sink::Capture(_) => "capture",
        };
        f.debug_struct("StdoutMirror").field("sink", &kind).finish()
    }
}

impl StdoutMirror {
    /// Mirror to the process's stdout and stderr.
    #[must_use]
    pub fn console() -> Self {
        let choice = if cfg!(feature = "color") {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        Self {
            sink: Sink::Console {
                stdout: StandardStream::stdout(choice),
                stderr: StandardStream::stderr(choice),
            },
        }
    }

    /// Mirror into memory. Lines from both streams land in one buffer.
    #[cfg(any(test, feature = "test-support"))]
    #[must_use]
    pub fn capture() -> (Self, MirrorCapture) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                sink: Sink::Capture(buffer.clone()),
            },
            MirrorCapture { buffer },
        )
    }

    /// Echo one record.
    pub fn write(&mut self, record: &LogRecord) {
        let _ = self.with_writer(record.level, |w| render(w, record));
    }

    /// Report an engine diagnostic (backend failure, dropped records).
    pub fn diagnostic(&mut self, level: LogLevel, message: &str) {
        let _ = self.with_writer(LogLevel::Error, |w| {
            write_level(w, level)?;
            writeln!(w, " dblogger: {message}")
        });
    }

    fn with_writer(
        &mut self,
        level: LogLevel,
        f: impl FnOnce(&mut dyn WriteColor) -> io::Result<()>,
    ) -> io::Result<()> {
        match &mut self.sink {
            Sink::Console { stdout, stderr } => {
                let stream = if level >= LogLevel::Error {
                    stderr
                } else {
                    stdout
                };
                let mut lock = stream.lock();
                f(&mut lock)?;
                lock.flush()
            }
            Sink::Capture(buffer) => {
                let mut buffer = buffer.lock();
                f(&mut NoColor::new(&mut *buffer))
            }
        }
    }
}

fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Trace => Color::Magenta,
        LogLevel::Debug => Color::Blue,
        LogLevel::Info => Color::Green,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Error | LogLevel::Fatal => Color::Red,
    }
}

fn write_level(w: &mut dyn WriteColor, level: LogLevel) -> io::Result<()> {
    w.set_color(
        ColorSpec::new()
            .set_fg(Some(level_color(level)))
            .set_bold(true),
    )?;
    write!(w, "{:<5}", level.as_str())?;
    w.reset()
}

fn render(w: &mut dyn WriteColor, record: &LogRecord) -> io::Result<()> {
    write!(w, "{} ", record.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"))?;
    write_level(w, record.level)?;

    w.set_color(ColorSpec::new().set_dimmed(true))?;
    write!(w, " {}", record.logger)?;
    if let Some(location) = &record.location {
        write!(w, " {location}")?;
    }
    w.reset()?;

    for tag in record.tags.iter() {
        w.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        write!(w, " [{tag}]")?;
        w.reset()?;
    }

    writeln!(w, ": {}", record.message)
}

/// Read side of [`StdoutMirror::capture`].
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone)]
pub struct MirrorCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

#[cfg(any(test, feature = "test-support"))]
impl MirrorCapture {
    /// Everything mirrored so far.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Mirrored lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}
