//! Run/input relay.
//!
//! Drives one execution at a time, records an ordered transcript of what the
//! backend printed and what the user typed, and parks the backend's resume
//! callback while it waits for input.
//!
//! ```text
//! Idle -> Running -> (WaitingForInput <-> Running)* -> Completed
//! ```
//!
//! A backend sees the relay only through [`RunHandlers`]. Handlers belonging
//! to a superseded session are inert: everything they report is dropped.

use super::surface::ConsoleSurface;
use super::transcript::{Transcript, TranscriptEntry};
use crate::backends::ExecutionBackend;
use crate::languages::Language;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Backend-supplied continuation, invoked with the user's value.
pub type ResumeFn = Box<dyn FnOnce(String) + Send + 'static>;

/// Externally visible state of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    WaitingForInput,
    Completed,
}

/// Point-in-time view of the relay for a UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub language: Option<Language>,
    pub state: RunState,
    pub pending_prompt: Option<String>,
}

struct Session {
    id: Uuid,
    language: Language,
    running: bool,
    waiting_for_input: bool,
    pending_prompt: Option<String>,
    resume: Option<ResumeFn>,
}

impl Session {
    fn state(&self) -> RunState {
        if !self.running {
            RunState::Completed
        } else if self.waiting_for_input {
            RunState::WaitingForInput
        } else {
            RunState::Running
        }
    }

    /// Move to Completed, handing back any parked resume so the caller can
    /// drop it outside the lock.
    fn finalize(&mut self) -> Option<ResumeFn> {
        self.running = false;
        self.waiting_for_input = false;
        self.pending_prompt = None;
        self.resume.take()
    }
}

struct RelayState {
    transcript: Transcript,
    session: Option<Session>,
}

impl RelayState {
    /// The session `id` if it is still the current one and has not completed.
    fn live_session(&mut self, id: Uuid) -> Option<&mut Session> {
        self.session
            .as_mut()
            .filter(|session| session.id == id && session.running)
    }
}

/// The relay. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Relay {
    state: Arc<Mutex<RelayState>>,
    surface: Arc<dyn ConsoleSurface>,
}

impl Relay {
    pub fn new(surface: Arc<dyn ConsoleSurface>) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState {
                transcript: Transcript::new(),
                session: None,
            })),
            surface,
        }
    }

    /// Open a fresh session and return the handlers a backend reports through.
    ///
    /// The transcript is cleared. A session that is still running is
    /// superseded: it is marked completed, its pending resume is dropped, and
    /// its handlers stop having any effect.
    pub fn begin(&self, language: Language) -> RunHandlers {
        let id = Uuid::new_v4();
        let abandoned = {
            let mut state = self.state.lock();
            let abandoned = match state.session.as_mut() {
                Some(previous) if previous.running => {
                    tracing::info!(session = %previous.id, "run.superseded");
                    previous.finalize()
                }
                _ => None,
            };
            state.transcript.clear();
            state.session = Some(Session {
                id,
                language,
                running: true,
                waiting_for_input: false,
                pending_prompt: None,
                resume: None,
            });
            abandoned
        };
        drop(abandoned);

        tracing::info!(session = %id, language = %language, "run.start");
        RunHandlers {
            session_id: id,
            state: Arc::clone(&self.state),
            surface: Arc::clone(&self.surface),
        }
    }

    /// Start `source` on `backend` in a new task.
    ///
    /// Whatever the backend returns, the run ends with a single completion:
    /// an `Err` or a panic is first recorded as exactly one error entry.
    /// Must be called from within a Tokio runtime.
    pub fn start(
        &self,
        source: impl Into<String>,
        language: Language,
        backend: Arc<dyn ExecutionBackend>,
    ) -> RunHandle {
        let source = source.into();
        let handlers = self.begin(language);
        let session_id = handlers.session_id;

        let run_handlers = handlers.clone();
        let backend_name = backend.name().to_string();
        let task = tokio::spawn(async move { backend.run(&source, &run_handlers).await });

        let driver = tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    tracing::warn!(session = %session_id, backend = %backend_name, error = %err, "run.failed");
                    handlers.error(&format!("{err:#}"));
                }
                Err(join_err) => {
                    let message = describe_join_error(join_err);
                    tracing::warn!(session = %session_id, backend = %backend_name, error = %message, "run.aborted");
                    handlers.error(&message);
                }
            }
            handlers.complete();
        });

        RunHandle { session_id, driver }
    }

    /// Deliver the user's value to the waiting backend.
    ///
    /// Returns false, touching nothing, when no input is awaited.
    pub fn submit_input(&self, value: impl Into<String>) -> bool {
        let value = value.into();
        let resume = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(session) = state
                .session
                .as_mut()
                .filter(|s| s.running && s.waiting_for_input)
            else {
                return false;
            };

            let prompt = session.pending_prompt.take().unwrap_or_default();
            if !prompt.is_empty() && !state.transcript.ends_with_output(&prompt) {
                state.transcript.push(TranscriptEntry::output(prompt));
            }
            state.transcript.push(TranscriptEntry::input(value.clone()));
            session.waiting_for_input = false;
            self.surface.input_accepted(&value);
            session.resume.take()
        };

        if let Some(resume) = resume {
            resume(value);
        }
        true
    }

    /// Console "Clear": drop the transcript without touching the session.
    pub fn clear(&self) {
        self.state.lock().transcript.clear();
    }

    pub fn transcript(&self) -> Transcript {
        self.state.lock().transcript.clone()
    }

    /// Console text for the current transcript.
    pub fn render(&self) -> String {
        self.state.lock().transcript.render()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock();
        match state.session.as_ref() {
            Some(session) => SessionSnapshot {
                session_id: Some(session.id),
                language: Some(session.language),
                state: session.state(),
                pending_prompt: session.pending_prompt.clone(),
            },
            None => SessionSnapshot {
                session_id: None,
                language: None,
                state: RunState::Idle,
                pending_prompt: None,
            },
        }
    }

    pub fn is_waiting_for_input(&self) -> bool {
        self.snapshot().state == RunState::WaitingForInput
    }
}

/// Handle to a started run.
pub struct RunHandle {
    session_id: Uuid,
    driver: JoinHandle<()>,
}

impl RunHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Wait until the run has completed.
    pub async fn finished(self) {
        if let Err(err) = self.driver.await {
            tracing::error!(session = %self.session_id, error = %err, "run driver task failed");
        }
    }
}

/// The callbacks a backend reports through, bound to one session.
#[derive(Clone)]
pub struct RunHandlers {
    session_id: Uuid,
    state: Arc<Mutex<RelayState>>,
    surface: Arc<dyn ConsoleSurface>,
}

impl RunHandlers {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// A chunk of program output.
    pub fn output(&self, text: &str) {
        let mut state = self.state.lock();
        if state.live_session(self.session_id).is_none() {
            return;
        }
        state.transcript.push(TranscriptEntry::output(text));
        self.surface.output(text);
    }

    /// An error message. Does not end the run.
    pub fn error(&self, text: &str) {
        let mut state = self.state.lock();
        if state.live_session(self.session_id).is_none() {
            return;
        }
        state.transcript.push(TranscriptEntry::error(text));
        self.surface.error(text);
    }

    /// Park `resume` until the user submits a value.
    ///
    /// Only one request may be outstanding. A second one is a protocol
    /// violation: it is recorded as an error and the session is finalized.
    pub fn request_input(&self, prompt: &str, resume: ResumeFn) {
        let dropped = {
            let mut state = self.state.lock();
            let state = &mut *state;
            let Some(session) = state
                .session
                .as_mut()
                .filter(|s| s.id == self.session_id && s.running)
            else {
                return;
            };

            if session.waiting_for_input {
                tracing::warn!(session = %self.session_id, "run.protocol_violation");
                let message = "backend requested input while another input request was pending";
                state.transcript.push(TranscriptEntry::error(message));
                self.surface.error(message);
                let previous = session.finalize();
                self.surface.finished();
                (previous, Some(resume))
            } else {
                session.waiting_for_input = true;
                session.pending_prompt = Some(prompt.to_string());
                session.resume = Some(resume);
                self.surface.prompt(prompt);
                (None, None)
            }
        };
        drop(dropped);
    }

    /// Ask the user for a value and wait for it.
    ///
    /// Resolves to `None` when the session ends first (superseded, finalized,
    /// or the request was rejected).
    pub async fn input(&self, prompt: &str) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        self.request_input(
            prompt,
            Box::new(move |value| {
                let _ = tx.send(value);
            }),
        );
        rx.await.ok()
    }

    /// Terminal signal. Idempotent.
    pub fn complete(&self) {
        let abandoned = {
            let mut state = self.state.lock();
            let Some(session) = state.live_session(self.session_id) else {
                return;
            };
            let abandoned = session.finalize();
            self.surface.finished();
            abandoned
        };
        drop(abandoned);
        tracing::info!(session = %self.session_id, "run.complete");
    }
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("Execution error: backend panicked: {detail}")
    } else {
        "Execution error: run was cancelled".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::surface::{RecordingSurface, SurfaceEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn relay() -> (Relay, Arc<RecordingSurface>) {
        let surface = Arc::new(RecordingSurface::new());
        (Relay::new(surface.clone()), surface)
    }

    fn counting_resume(counter: &Arc<AtomicUsize>, seen: &Arc<Mutex<Vec<String>>>) -> ResumeFn {
        let counter = Arc::clone(counter);
        let seen = Arc::clone(seen);
        Box::new(move |value| {
            counter.fetch_add(1, Ordering::SeqCst);
            seen.lock().push(value);
        })
    }

    #[test]
    fn name_prompt_example() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::Python);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        handlers.output("Enter your name: ");
        handlers.request_input("", counting_resume(&calls, &seen));
        assert!(relay.is_waiting_for_input());
        assert!(relay.submit_input("Ada"));

        let transcript = relay.transcript();
        assert_eq!(
            transcript
                .entries()
                .iter()
                .map(|e| (e.is_input(), e.text().to_string()))
                .collect::<Vec<_>>(),
            vec![
                (false, "Enter your name: ".to_string()),
                (true, "Ada".to_string())
            ]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock(), vec!["Ada".to_string()]);
        assert_eq!(relay.snapshot().state, RunState::Running);
        assert_eq!(relay.snapshot().pending_prompt, None);
    }

    #[test]
    fn prompt_is_echoed_once_when_not_already_printed() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::Python);
        handlers.request_input("Age? ", Box::new(|_| {}));
        relay.submit_input("7");

        handlers.output("Age? ");
        handlers.request_input("Age? ", Box::new(|_| {}));
        relay.submit_input("8");

        assert_eq!(relay.transcript().len(), 4);
        assert_eq!(relay.render(), "Age? 7\nAge? 8\n");
    }

    #[test]
    fn submit_without_pending_request_is_noop() {
        let (relay, surface) = relay();
        assert!(!relay.submit_input("ignored"));

        let handlers = relay.begin(Language::JavaScript);
        handlers.output("x");
        let before = relay.transcript();
        assert!(!relay.submit_input("ignored"));
        assert_eq!(relay.transcript(), before);
        assert!(!surface
            .events()
            .contains(&SurfaceEvent::InputAccepted("ignored".into())));
    }

    #[test]
    fn complete_is_idempotent() {
        let (relay, surface) = relay();
        let handlers = relay.begin(Language::JavaScript);
        handlers.output("done\n");
        handlers.complete();
        let once = (relay.snapshot(), relay.transcript());
        handlers.complete();
        assert_eq!((relay.snapshot(), relay.transcript()), once);
        assert_eq!(surface.finished_count(), 1);
        assert_eq!(relay.snapshot().state, RunState::Completed);
    }

    #[test]
    fn error_does_not_end_the_run() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::C);
        handlers.error("compile failed");
        assert_eq!(relay.snapshot().state, RunState::Running);
        assert!(relay.transcript().entries()[0].is_error());
    }

    #[test]
    fn second_input_request_is_fatal() {
        let (relay, surface) = relay();
        let handlers = relay.begin(Language::Python);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        handlers.request_input("a", counting_resume(&calls, &seen));
        handlers.request_input("b", counting_resume(&calls, &seen));

        let snapshot = relay.snapshot();
        assert_eq!(snapshot.state, RunState::Completed);
        let transcript = relay.transcript();
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].is_error());
        assert!(!relay.submit_input("late"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(surface.finished_count(), 1);

        handlers.complete();
        assert_eq!(surface.finished_count(), 1);
    }

    #[test]
    fn ordering_follows_call_order() {
        let (relay, surface) = relay();
        let handlers = relay.begin(Language::Python);
        handlers.output("1");
        handlers.request_input("", Box::new(|_| {}));
        relay.submit_input("in-1");
        handlers.output("2");
        handlers.output("   ");
        handlers.request_input("p> ", Box::new(|_| {}));
        relay.submit_input("in-2");
        handlers.output("3");

        let texts: Vec<String> = relay
            .transcript()
            .entries()
            .iter()
            .map(|e| e.text().to_string())
            .collect();
        assert_eq!(texts, vec!["1", "in-1", "2", "   ", "p> ", "in-2", "3"]);
        assert!(surface.events().contains(&SurfaceEvent::Output("   ".into())));
    }

    #[test]
    fn new_run_supersedes_waiting_session() {
        let (relay, _surface) = relay();
        let old = relay.begin(Language::Python);
        old.output("old output");
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        old.request_input("?", counting_resume(&calls, &seen));

        let new = relay.begin(Language::Python);
        assert!(relay.transcript().is_empty());
        assert_eq!(relay.snapshot().session_id, Some(new.session_id()));

        old.output("stale");
        old.request_input("again", Box::new(|_| {}));
        assert!(relay.transcript().is_empty());
        assert!(!relay.submit_input("x"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        new.output("fresh");
        assert_eq!(relay.render(), "fresh");
    }

    #[tokio::test]
    async fn input_future_resolves_with_submitted_value() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::Python);
        let waiter = {
            let handlers = handlers.clone();
            tokio::spawn(async move { handlers.input("name? ").await })
        };
        while !relay.is_waiting_for_input() {
            tokio::task::yield_now().await;
        }
        assert!(relay.submit_input("Grace"));
        assert_eq!(waiter.await.unwrap(), Some("Grace".to_string()));
    }

    #[tokio::test]
    async fn input_future_resolves_none_when_superseded() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::Python);
        let waiter = {
            let handlers = handlers.clone();
            tokio::spawn(async move { handlers.input("name? ").await })
        };
        while !relay.is_waiting_for_input() {
            tokio::task::yield_now().await;
        }
        relay.begin(Language::Python);
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[test]
    fn clear_keeps_session_state() {
        let (relay, _surface) = relay();
        let handlers = relay.begin(Language::Python);
        handlers.output("x");
        handlers.request_input("", Box::new(|_| {}));
        relay.clear();
        assert!(relay.transcript().is_empty());
        assert!(relay.is_waiting_for_input());
    }
}
