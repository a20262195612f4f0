//! Synchronous in-process JavaScript evaluation on an embedded QuickJS runtime.

use super::traits::ExecutionBackend;
use crate::config::JavaScriptConfig;
use crate::console::RunHandlers;
use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Replaces `console` with collectors that mirror what the browser console
/// would show: `> ` for log lines, `ERROR: ` for error lines.
const CONSOLE_PRELUDE: &str = r"
globalThis.__codebuddy_logs = [];
globalThis.console = {
    log: function () {
        __codebuddy_logs.push('> ' + Array.prototype.join.call(arguments, ' '));
    },
    error: function () {
        __codebuddy_logs.push('ERROR: ' + Array.prototype.join.call(arguments, ' '));
    },
};
console.info = console.log;
console.warn = console.error;
";

pub const NO_OUTPUT_MESSAGE: &str = "Code executed successfully (no output)";

/// What one evaluation produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub logs: Vec<String>,
    pub exception: Option<String>,
}

pub struct QuickJsBackend {
    memory_limit: usize,
    cpu_time_limit: Duration,
}

impl QuickJsBackend {
    pub fn new(config: &JavaScriptConfig) -> Self {
        Self {
            memory_limit: config.memory_limit_bytes,
            cpu_time_limit: Duration::from_millis(config.cpu_time_limit_ms),
        }
    }

    /// Evaluate `source` as the body of a function, collecting console lines.
    ///
    /// Blocks the calling thread until the script finishes, throws, or runs
    /// past the CPU deadline.
    pub fn evaluate(&self, source: &str) -> anyhow::Result<Evaluation> {
        use rquickjs::{Context, Runtime};

        let rt = Runtime::new()
            .map_err(|e| anyhow::anyhow!("QuickJS runtime creation failed: {e}"))?;
        rt.set_memory_limit(self.memory_limit);

        let deadline = Instant::now() + self.cpu_time_limit;
        rt.set_interrupt_handler(Some(Box::new(move || Instant::now() > deadline)));

        let ctx = Context::full(&rt)
            .map_err(|e| anyhow::anyhow!("QuickJS context creation failed: {e}"))?;

        let script = format!("(function () {{\n{source}\n}})();");
        let cpu_limit_ms = self.cpu_time_limit.as_millis();

        ctx.with(|ctx| {
            ctx.eval::<rquickjs::Value, _>(CONSOLE_PRELUDE)
                .map_err(|e| anyhow::anyhow!("console setup failed: {e}"))?;

            let exception = match ctx.eval::<rquickjs::Value, _>(script.as_str()) {
                Ok(_) => None,
                Err(_) if Instant::now() > deadline => Some(format!(
                    "Script exceeded the {cpu_limit_ms} ms time limit"
                )),
                Err(rquickjs::Error::Exception) => Some(describe_exception(&ctx)),
                Err(e) => Some(e.to_string()),
            };

            let logs: Vec<String> = ctx
                .globals()
                .get("__codebuddy_logs")
                .unwrap_or_default();

            Ok(Evaluation { logs, exception })
        })
    }
}

fn describe_exception(ctx: &rquickjs::Ctx<'_>) -> String {
    let caught = ctx.catch();
    if let Some(exception) = caught.as_exception() {
        if let Some(message) = exception.message() {
            return message;
        }
    }
    if let Some(text) = caught.as_string().and_then(|s| s.to_string().ok()) {
        return text;
    }
    "uncaught exception".to_string()
}

#[async_trait]
impl ExecutionBackend for QuickJsBackend {
    fn name(&self) -> &str {
        "quickjs"
    }

    async fn run(&self, source: &str, handlers: &RunHandlers) -> anyhow::Result<()> {
        let backend = Self {
            memory_limit: self.memory_limit,
            cpu_time_limit: self.cpu_time_limit,
        };
        let source = source.to_string();
        let evaluation = tokio::task::spawn_blocking(move || backend.evaluate(&source)).await??;

        tracing::debug!(
            lines = evaluation.logs.len(),
            failed = evaluation.exception.is_some(),
            "quickjs.evaluated"
        );

        if !evaluation.logs.is_empty() {
            handlers.output(&format!("{}\n", evaluation.logs.join("\n")));
        }

        match evaluation.exception {
            Some(message) => anyhow::bail!(
                "{message}\n\nMake sure your code is valid JavaScript!"
            ),
            None => {
                if evaluation.logs.is_empty() {
                    handlers.output(&format!("{NO_OUTPUT_MESSAGE}\n"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::{RecordingSurface, Relay, RunState};
    use crate::languages::Language;
    use std::sync::Arc;

    fn backend() -> QuickJsBackend {
        QuickJsBackend::new(&JavaScriptConfig::default())
    }

    #[test]
    fn console_lines_are_prefixed() {
        let result = backend()
            .evaluate("console.log('a', 1); console.error('bad'); console.log([1, 2]);")
            .unwrap();
        assert_eq!(result.logs, vec!["> a 1", "ERROR: bad", "> 1,2"]);
        assert_eq!(result.exception, None);
    }

    #[test]
    fn thrown_error_message_is_captured() {
        let result = backend()
            .evaluate("console.log('before'); throw new Error('kaboom');")
            .unwrap();
        assert_eq!(result.logs, vec!["> before"]);
        assert!(result.exception.unwrap().contains("kaboom"));
    }

    #[test]
    fn syntax_error_is_reported() {
        let result = backend().evaluate("let = ;").unwrap();
        assert!(result.exception.is_some());
        assert!(result.logs.is_empty());
    }

    #[test]
    fn runaway_loop_hits_deadline() {
        let config = JavaScriptConfig {
            cpu_time_limit_ms: 50,
            ..JavaScriptConfig::default()
        };
        let result = QuickJsBackend::new(&config)
            .evaluate("while (true) {}")
            .unwrap();
        assert!(result.exception.unwrap().contains("time limit"));
    }

    #[test]
    fn top_level_return_is_allowed() {
        let result = backend().evaluate("console.log('x'); return; console.log('y');").unwrap();
        assert_eq!(result.logs, vec!["> x"]);
    }

    #[tokio::test]
    async fn silent_script_reports_no_output() {
        let relay = Relay::new(Arc::new(RecordingSurface::new()));
        relay
            .start("let x = 1 + 1;", Language::JavaScript, Arc::new(backend()))
            .finished()
            .await;
        assert_eq!(relay.render(), format!("{NO_OUTPUT_MESSAGE}\n"));
    }

    #[tokio::test]
    async fn exception_becomes_single_error_entry() {
        let relay = Relay::new(Arc::new(RecordingSurface::new()));
        relay
            .start("null.x", Language::JavaScript, Arc::new(backend()))
            .finished()
            .await;

        let transcript = relay.transcript();
        assert_eq!(transcript.len(), 1);
        assert!(transcript.entries()[0].is_error());
        assert!(transcript.entries()[0]
            .text()
            .contains("Make sure your code is valid JavaScript!"));
        assert_eq!(relay.snapshot().state, RunState::Completed);
    }
}
