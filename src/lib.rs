#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::cast_possible_wrap,
    clippy::format_push_string
)]

pub mod auth;
pub mod backends;
pub mod config;
pub mod console;
pub mod doctor;
pub mod documents;
pub mod languages;
pub mod storage;
pub mod util;

pub use config::Config;
pub use console::{Relay, RunHandlers};
pub use languages::Language;
