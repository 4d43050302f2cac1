//! Server configuration.

use rowsync_engine::SyncOptions;
use rowsync_protocol::SerializationFormat;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The option set the server hosts.
    pub options: SyncOptions,
    /// Format assumed for requests that name no content type.
    pub default_format: SerializationFormat,
    /// Maximum change records accepted in one uploaded batch.
    pub max_upload_batch: usize,
    /// Maximum concurrent sessions.
    pub session_capacity: usize,
}

impl ServerConfig {
    /// Creates a server configuration hosting `options`.
    pub fn new(options: SyncOptions) -> Self {
        Self {
            default_format: options.serialization_format,
            options,
            max_upload_batch: 10_000,
            session_capacity: 1000,
        }
    }

    /// Sets the maximum uploaded batch size.
    pub fn with_max_upload_batch(mut self, size: usize) -> Self {
        self.max_upload_batch = size;
        self
    }

    /// Sets the format assumed for requests without a content type.
    pub fn with_default_format(mut self, format: SerializationFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Sets the maximum number of concurrent sessions.
    pub fn with_session_capacity(mut self, capacity: usize) -> Self {
        self.session_capacity = capacity;
        self
    }

    /// Scope name the server answers for.
    pub fn scope_name(&self) -> &str {
        &self.options.scope_name
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SyncOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowsync_schema::ConflictPolicy;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.session_capacity, 1000);
        assert_eq!(config.scope_name(), "DefaultScope");
        assert_eq!(config.default_format, SerializationFormat::Json);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new(
            SyncOptions::new(["Customer"]).with_conflict_policy(ConflictPolicy::ClientWins),
        )
        .with_max_upload_batch(50)
        .with_default_format(SerializationFormat::Binary)
        .with_session_capacity(2);

        assert_eq!(config.max_upload_batch, 50);
        assert_eq!(config.session_capacity, 2);
        assert_eq!(config.default_format, SerializationFormat::Binary);
        assert_eq!(config.options.conflict_policy, ConflictPolicy::ClientWins);
    }
}
