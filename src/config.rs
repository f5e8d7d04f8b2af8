//! Connection and pool defaults.
//!
//! These mirror the defaults an infrastructure tool applies before handing a
//! descriptor to this crate: port 22, file mode `0644`, and a small per-host
//! cap on concurrent users of one pooled connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// SSH port used when a descriptor does not name one.
pub const DEFAULT_PORT: u16 = 22;

/// Mode applied to managed files when none is declared.
pub const DEFAULT_PERMISSIONS: &str = "0644";

/// Concurrent references allowed on one pooled connection.
pub const DEFAULT_MAX_SESSIONS_PER_CONNECTION: usize = 3;

/// Interval between keepalive messages on idle pooled connections.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Command the shell strategy prefixes for privilege escalation.
pub const PRIVILEGE_ESCALATION_COMMAND: &str = "sudo";

/// Connection pool tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on outstanding acquisitions per connection identity.
    pub max_sessions_per_connection: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_connection: DEFAULT_MAX_SESSIONS_PER_CONNECTION,
        }
    }
}

impl PoolConfig {
    pub fn with_max_sessions(max_sessions_per_connection: usize) -> Self {
        Self {
            max_sessions_per_connection,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), RemoteError> {
        if self.max_sessions_per_connection == 0 {
            return Err(RemoteError::ConfigurationInvalid(
                "max_sessions_per_connection must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
