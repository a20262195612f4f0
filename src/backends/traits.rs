use crate::console::RunHandlers;
use async_trait::async_trait;

/// Something that can execute a program and report through the relay.
///
/// A backend reports output, errors and input requests through `handlers`.
/// Returning `Err` (or panicking) is converted by the relay into one error
/// entry; the relay signals completion after `run` returns either way.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Backend name (used in logs and `doctor`)
    fn name(&self) -> &str;

    /// Execute `source` to completion.
    async fn run(&self, source: &str, handlers: &RunHandlers) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{Relay, RecordingSurface, RunState};
    use crate::languages::Language;
    use std::sync::Arc;

    struct EchoBackend;

    #[async_trait]
    impl ExecutionBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run(&self, source: &str, handlers: &RunHandlers) -> anyhow::Result<()> {
            let value = handlers.input("> ").await.unwrap_or_default();
            handlers.output(&format!("{source}:{value}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn backend_resumes_after_input() {
        let surface = Arc::new(RecordingSurface::new());
        let relay = Relay::new(surface.clone());
        let handle = relay.start("src", Language::Python, Arc::new(EchoBackend));

        while !relay.is_waiting_for_input() {
            tokio::task::yield_now().await;
        }
        assert!(relay.submit_input("v"));
        handle.finished().await;

        assert_eq!(relay.render(), "> v\nsrc:v");
        assert_eq!(relay.snapshot().state, RunState::Completed);
        assert_eq!(surface.finished_count(), 1);
    }

    #[test]
    fn backend_name_is_exposed() {
        assert_eq!(EchoBackend.name(), "echo");
    }
}
