#![deny(unsafe_code)]

//! Shared test utilities for the savdi workspace.
//!
//! Provides a scripted fake scanning daemon, sample files and config
//! builders so that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! savdi-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod daemon;
pub mod fixtures;

pub use config::TestConfigBuilder;
pub use daemon::{EICAR, EICAR_SIGNATURE, FakeDaemon, FakeDaemonBuilder, ReceivedRequest};
pub use fixtures::SampleFiles;
