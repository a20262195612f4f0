use parking_lot::Mutex;

/// Display side of the console: where relay events become visible.
///
/// Calls are made while the relay holds its state lock, which is what keeps
/// the display in the same order as the transcript. Implementations must not
/// call back into the relay from these methods.
pub trait ConsoleSurface: Send + Sync {
    /// A chunk of program output, forwarded verbatim (whitespace included).
    fn output(&self, text: &str);

    /// An error-flavored message.
    fn error(&self, text: &str);

    /// The program is waiting for input; `prompt` may be empty.
    fn prompt(&self, prompt: &str);

    /// The user's value was accepted and forwarded to the program.
    fn input_accepted(&self, _value: &str) {}

    /// The run reached its terminal state.
    fn finished(&self) {}
}

/// Surface that discards everything.
pub struct NullSurface;

impl ConsoleSurface for NullSurface {
    fn output(&self, _text: &str) {}

    fn error(&self, _text: &str) {}

    fn prompt(&self, _prompt: &str) {}
}

/// Event observed by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Output(String),
    Error(String),
    Prompt(String),
    InputAccepted(String),
    Finished,
}

/// Surface that records every call, for headless callers and tests.
#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == SurfaceEvent::Finished)
            .count()
    }
}

impl ConsoleSurface for RecordingSurface {
    fn output(&self, text: &str) {
        self.events.lock().push(SurfaceEvent::Output(text.to_string()));
    }

    fn error(&self, text: &str) {
        self.events.lock().push(SurfaceEvent::Error(text.to_string()));
    }

    fn prompt(&self, prompt: &str) {
        self.events.lock().push(SurfaceEvent::Prompt(prompt.to_string()));
    }

    fn input_accepted(&self, value: &str) {
        self.events
            .lock()
            .push(SurfaceEvent::InputAccepted(value.to_string()));
    }

    fn finished(&self) {
        self.events.lock().push(SurfaceEvent::Finished);
    }
}
