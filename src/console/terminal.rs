use super::surface::ConsoleSurface;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Notify;

/// Console surface on a terminal (or any writer).
///
/// Output is written verbatim and flushed so prompts without a trailing
/// newline show up before the program blocks on input.
pub struct TerminalSurface {
    out: Mutex<Box<dyn Write + Send>>,
    err: Mutex<Box<dyn Write + Send>>,
    /// Most recent plain output chunk, if nothing else was shown since.
    last_output: Mutex<Option<String>>,
    input_wanted: Arc<Notify>,
}

impl TerminalSurface {
    pub fn stdio() -> Self {
        Self::new(Box::new(std::io::stdout()), Box::new(std::io::stderr()))
    }

    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
            last_output: Mutex::new(None),
            input_wanted: Arc::new(Notify::new()),
        }
    }

    /// Signalled every time the program starts waiting for input.
    pub fn input_wanted(&self) -> Arc<Notify> {
        Arc::clone(&self.input_wanted)
    }

    fn write_out(&self, text: &str) {
        let mut out = self.out.lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl ConsoleSurface for TerminalSurface {
    fn output(&self, text: &str) {
        self.write_out(text);
        *self.last_output.lock() = Some(text.to_string());
    }

    fn error(&self, text: &str) {
        *self.last_output.lock() = None;
        let mut err = self.err.lock();
        let _ = writeln!(err, "\nERROR: {text}");
        let _ = err.flush();
    }

    /// A prompt the program already printed as its latest output is not
    /// shown twice; the transcript skips it the same way.
    fn prompt(&self, prompt: &str) {
        let already_shown = self.last_output.lock().take().as_deref() == Some(prompt);
        if !prompt.is_empty() && !already_shown {
            self.write_out(prompt);
        }
        self.input_wanted.notify_one();
    }

    fn input_accepted(&self, _value: &str) {
        *self.last_output.lock() = None;
    }
}
