//! Command-line front end for the coaching server.
//!
//! ```text
//! Args --initialize--> RepcoachSettings --build_workflow--> start_server
//!  (clap)   (.env, tracing, settings.toml)
//! ```

mod args;
mod bootstrap;

pub use args::Args;
pub use bootstrap::initialize;
