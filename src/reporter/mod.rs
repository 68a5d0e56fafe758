//! Lifecycle reporting
//!
//! Renders lifecycle lines to the operator console, fancy-log style:
//! `[HH:MM:SS] label message`, with only the label colorized.

use std::sync::Arc;

use chrono::Local;
use colored::{ColoredString, Colorize};
use parking_lot::Mutex;

/// Label styles used for lifecycle lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// A cycle is starting
    Info,
    /// A cycle finished
    Success,
    /// A cycle failed
    Failure,
}

impl Style {
    pub fn paint(self, label: &str) -> ColoredString {
        match self {
            Style::Info => label.white().on_blue(),
            Style::Success => label.black().on_green(),
            Style::Failure => label.white().on_red(),
        }
    }
}

/// Output stream of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Where reporter lines end up
pub trait Sink: Send + Sync {
    fn write_line(&self, stream: Stream, line: &str);
}

/// Writes to the process stdout/stderr
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl Sink for ConsoleSink {
    fn write_line(&self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => println!("{}", line),
            Stream::Stderr => eprintln!("{}", line),
        }
    }
}

/// Keeps lines in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every line written so far, in order
    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines.lock().clone()
    }

    /// Lines written to one stream
    pub fn stream(&self, stream: Stream) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl Sink for MemorySink {
    fn write_line(&self, stream: Stream, line: &str) {
        self.lines.lock().push((stream, line.to_string()));
    }
}

/// Stateless lifecycle reporter
#[derive(Clone)]
pub struct Reporter {
    sink: Arc<dyn Sink>,
}

impl Reporter {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// Reporter writing to the process console
    pub fn console() -> Self {
        Self::new(Arc::new(ConsoleSink))
    }

    /// Log `label message`, colorizing the label when a style is given
    pub fn report(&self, label: &str, message: &str, style: Option<Style>) {
        let label = match style {
            Some(style) => style.paint(label).to_string(),
            None => label.to_string(),
        };
        self.sink.write_line(
            Stream::Stdout,
            &format!("{} {} {}", timestamp(), label, message),
        );
    }

    /// Print a source snippet framed by separator lines
    pub fn snippet(&self, snippet: &str) {
        let framed = format!("---\n{}\n---", snippet);
        self.sink.write_line(Stream::Stderr, &framed.red().to_string());
    }

    /// Print an error stack trace
    pub fn stack(&self, stack: &str) {
        self.sink.write_line(Stream::Stderr, stack);
    }

    /// Print a diagnostic for a lifecycle code outside the known set
    pub fn unknown(&self, code: &str) {
        self.sink
            .write_line(Stream::Stderr, &format!("unknown event {}", code));
    }
}

fn timestamp() -> String {
    format!("[{}]", Local::now().format("%H:%M:%S").to_string().bright_black())
}
