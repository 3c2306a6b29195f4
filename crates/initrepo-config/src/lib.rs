//! Configuration for the initrepo agent.
//!
//! Values are resolved with precedence CLI > config file > built-in defaults,
//! and every resolved key remembers where it came from.
//!
//! ```toml
//! # .initrepo/config.toml
//! [backend]
//! call_timeout_secs = 45
//!
//! [execution]
//! item_pacing_ms = 0
//!
//! [gates]
//! min_success_ratio = 0.9
//! ```

mod builder;
mod discovery;
mod model;
pub mod server;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use model::{
    BackendConfig, CliArgs, Config, ConfigSource, ExecutionConfig, GatesConfig, defaults,
};
pub use server::{ServerLocation, locate_server};
