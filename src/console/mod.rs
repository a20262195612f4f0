pub mod relay;
pub mod surface;
pub mod terminal;
pub mod transcript;

pub use relay::{Relay, ResumeFn, RunHandle, RunHandlers, RunState, SessionSnapshot};
pub use surface::{ConsoleSurface, NullSurface, RecordingSurface, SurfaceEvent};
pub use terminal::TerminalSurface;
pub use transcript::{Transcript, TranscriptEntry};
