pub mod schema;

pub use schema::{Config, DriveConfig, JavaScriptConfig, Judge0Config, PythonConfig};
