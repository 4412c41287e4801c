use std::fmt;

/// Sink for the trainer's progress and loss reports.
pub trait Logger {
    fn log(&mut self, args: fmt::Arguments<'_>);
}

impl<L: Logger + ?Sized> Logger for &mut L {
    fn log(&mut self, args: fmt::Arguments<'_>) {
        (**self).log(args)
    }
}

/// Forwards reports to the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogSink {
    level: log::Level,
}

impl LogSink {
    pub fn new(level: log::Level) -> LogSink {
        LogSink { level }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink::new(log::Level::Info)
    }
}

impl Logger for LogSink {
    fn log(&mut self, args: fmt::Arguments<'_>) {
        log::log!(target: "ffnet::trainer", self.level, "{args}");
    }
}

/// Keeps every report as a line of text.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    lines: Vec<String>,
}

impl MemoryLogger {
    pub fn new() -> MemoryLogger {
        MemoryLogger::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&mut self, args: fmt::Arguments<'_>) {
        self.lines.push(args.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_logger_collects_through_a_borrow() {
        let mut memory = MemoryLogger::new();
        {
            let mut sink: Box<dyn Logger + '_> = Box::new(&mut memory);
            sink.log(format_args!("loss = {:.2}", 0.3));
        }
        assert_eq!(memory.lines(), &["loss = 0.30".to_string()]);
        assert!(memory.contains("loss"));
    }
}
