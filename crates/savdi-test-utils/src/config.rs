//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use savdi_config::AppConfig;

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .endpoint(daemon.network(), daemon.address())
///     .command_timeout_secs(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn endpoint(mut self, network: &str, address: &str) -> Self {
        self.config.client.network = network.to_string();
        self.config.client.address = address.to_string();
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.client.connect_timeout_secs = secs;
        self
    }

    pub fn connect_retries(mut self, retries: i64) -> Self {
        self.config.client.connect_retries = retries;
        self
    }

    pub fn connect_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.client.connect_retry_delay_ms = ms;
        self
    }

    pub fn command_timeout_secs(mut self, secs: u64) -> Self {
        self.config.client.command_timeout_secs = secs;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }

    /// Render the config as a TOML document, for tests that load files.
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(&self.config).expect("failed to serialize test config")
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
