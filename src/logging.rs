use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

/// Destination for run-scoped log records. Owned by the caller and passed
/// into the drivers by argument; writes are serialized by the
/// single-threaded driver layer.
pub trait LogSink {
    fn write(&mut self, line: &str);
    fn flush(&mut self);
}

/// Sink backed by a log file. Creation failures degrade to a sink that
/// drops records, with a diagnostic on the standard logger.
pub struct FileSink {
    file: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open `<prefix>.log`, creating parent directories as needed.
    pub fn create(prefix: &Path) -> FileSink {
        let path = prefix.with_extension("log");
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::error!("cannot create log directory {}: {}", parent.display(), e);
                return FileSink { file: None };
            }
        }
        match File::create(&path) {
            Ok(f) => FileSink {
                file: Some(BufWriter::new(f)),
            },
            Err(e) => {
                log::error!("cannot open log file {}: {}", path.display(), e);
                FileSink { file: None }
            }
        }
    }
}

impl LogSink for FileSink {
    fn write(&mut self, line: &str) {
        if let Some(file) = &mut self.file {
            let _ = writeln!(file, "{}", line);
        }
    }

    fn flush(&mut self) {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
    }
}

/// Sink that swallows everything; used by tests and library callers that
/// do not want a run log.
pub struct NullSink;

impl LogSink for NullSink {
    fn write(&mut self, _line: &str) {}
    fn flush(&mut self) {}
}

/// The run log: tees timestamped records to stdout and the sink, and emits
/// the bare single-line status markers external tools parse. Timestamps
/// are monotonic seconds since the log was opened.
pub struct RunLog {
    sink: Box<dyn LogSink>,
    started: Instant,
    echo: bool,
}

impl RunLog {
    pub fn new(sink: Box<dyn LogSink>) -> RunLog {
        RunLog {
            sink,
            started: Instant::now(),
            echo: true,
        }
    }

    /// A log that only feeds its sink; no stdout echo.
    pub fn quiet(sink: Box<dyn LogSink>) -> RunLog {
        RunLog {
            sink,
            started: Instant::now(),
            echo: false,
        }
    }

    /// Write one timestamped record.
    pub fn line(&mut self, message: &str) {
        let stamped = format!("[{:>10.3}] {}", self.started.elapsed().as_secs_f64(), message);
        if self.echo {
            println!("{}", stamped);
        }
        self.sink.write(&stamped);
    }

    /// Emit a machine-parseable status marker, e.g. `[STAGE:1:START]`.
    /// The marker goes to stdout on its own line exactly as given.
    pub fn status(&mut self, marker: &str) {
        println!("{}", marker);
        let _ = std::io::stdout().flush();
        self.sink.write(marker);
        self.sink.flush();
    }

    pub fn flush(&mut self) {
        self.sink.flush();
    }
}

#[cfg(test)]
pub(crate) mod capture {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::LogSink;

    /// Test sink collecting every record.
    pub struct VecSink {
        pub lines: Rc<RefCell<Vec<String>>>,
    }

    impl VecSink {
        pub fn new() -> (VecSink, Rc<RefCell<Vec<String>>>) {
            let lines = Rc::new(RefCell::new(Vec::new()));
            (
                VecSink {
                    lines: lines.clone(),
                },
                lines,
            )
        }
    }

    impl LogSink for VecSink {
        fn write(&mut self, line: &str) {
            self.lines.borrow_mut().push(line.to_string());
        }

        fn flush(&mut self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::capture::VecSink;
    use super::*;

    #[test]
    fn records_are_timestamped_and_ordered() {
        let (sink, lines) = VecSink::new();
        let mut log = RunLog::quiet(Box::new(sink));
        log.line("first");
        log.line("second");

        let lines = lines.borrow();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("first"));
        assert!(lines[1].contains("second"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn status_markers_reach_the_sink_verbatim() {
        let (sink, lines) = VecSink::new();
        let mut log = RunLog::quiet(Box::new(sink));
        log.status("[STAGE:1:START]");

        assert_eq!(lines.borrow()[0], "[STAGE:1:START]");
    }
}
