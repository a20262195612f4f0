pub mod interpreter;
pub mod judge0;
pub mod prompt_frames;
#[cfg(feature = "js-runtime")]
pub mod quickjs;
pub mod traits;

pub use interpreter::{InterpreterHandle, InterpreterInfo, PythonBackend};
pub use judge0::{Judge0Backend, Judge0Client, Judge0Error};
#[cfg(feature = "js-runtime")]
pub use quickjs::QuickJsBackend;
pub use traits::ExecutionBackend;

use crate::config::Config;
use crate::console::RunHandlers;
use crate::languages::Language;
use async_trait::async_trait;
use std::sync::Arc;

/// Stand-in for languages that can be edited but not executed.
pub struct UnsupportedBackend {
    reason: String,
}

impl UnsupportedBackend {
    pub fn for_language(language: Language) -> Self {
        Self {
            reason: format!("Code execution for {} is not supported", language.label()),
        }
    }

    #[cfg(not(feature = "js-runtime"))]
    fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ExecutionBackend for UnsupportedBackend {
    fn name(&self) -> &str {
        "unsupported"
    }

    async fn run(&self, _source: &str, _handlers: &RunHandlers) -> anyhow::Result<()> {
        anyhow::bail!("{}", self.reason)
    }
}

/// Owns the long-lived backend resources and hands out one backend per run.
pub struct BackendRegistry {
    config: Config,
    judge0: Arc<Judge0Client>,
    interpreter: Arc<InterpreterHandle>,
}

impl BackendRegistry {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            config: config.clone(),
            judge0: Arc::new(Judge0Client::new(&config.judge0)?),
            interpreter: Arc::new(InterpreterHandle::new(&config.python)),
        })
    }

    /// Pick the backend for `language`.
    pub fn backend_for(&self, language: Language) -> Arc<dyn ExecutionBackend> {
        match language {
            Language::JavaScript | Language::TypeScript => self.javascript_backend(language),
            Language::C | Language::Cpp => {
                Arc::new(Judge0Backend::new(Arc::clone(&self.judge0), language))
            }
            Language::Python => Arc::new(PythonBackend::new(Arc::clone(&self.interpreter))),
            Language::Html | Language::Css | Language::Json | Language::Markdown => {
                Arc::new(UnsupportedBackend::for_language(language))
            }
        }
    }

    #[cfg(feature = "js-runtime")]
    fn javascript_backend(&self, _language: Language) -> Arc<dyn ExecutionBackend> {
        Arc::new(QuickJsBackend::new(&self.config.javascript))
    }

    #[cfg(not(feature = "js-runtime"))]
    fn javascript_backend(&self, language: Language) -> Arc<dyn ExecutionBackend> {
        Arc::new(UnsupportedBackend::with_reason(format!(
            "Code execution for {} requires the js-runtime feature",
            language.label()
        )))
    }

    pub fn judge0(&self) -> &Judge0Client {
        &self.judge0
    }

    pub fn interpreter(&self) -> &InterpreterHandle {
        &self.interpreter
    }

    /// Tear down long-lived resources. Runs still using them are stopped.
    pub fn shutdown(&self) {
        self.interpreter.shutdown();
    }
}

/// Factory: create the backend for one language straight from config.
pub fn create_backend(language: Language, config: &Config) -> anyhow::Result<Arc<dyn ExecutionBackend>> {
    Ok(BackendRegistry::new(config)?.backend_for(language))
}
