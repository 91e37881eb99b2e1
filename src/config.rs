use std::time::Duration;

use crate::error::DhtError;

pub const DEFAULT_K: usize = 20;
pub const DEFAULT_ALPHA: usize = 3;
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_COMMAND_BUFFER: usize = 100;

/// Tunables for a node.
///
/// - `k`: bucket capacity, shortlist size and replication factor.
/// - `alpha`: number of peers probed concurrently per lookup round.
/// - `rpc_timeout`: bounded wait for any single outbound RPC.
/// - `command_buffer`: capacity of the node actor's inbound channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub k: usize,
    pub alpha: usize,
    pub rpc_timeout: Duration,
    pub command_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl NodeConfig {
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), DhtError> {
        if self.k == 0 {
            return Err(DhtError::InvalidConfig("k must be at least 1".into()));
        }
        if self.alpha == 0 {
            return Err(DhtError::InvalidConfig("alpha must be at least 1".into()));
        }
        if self.command_buffer == 0 {
            return Err(DhtError::InvalidConfig(
                "command buffer must hold at least one command".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = NodeConfig::default();
        assert_eq!(config.k, 20);
        assert_eq!(config.alpha, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_fan_out_is_rejected() {
        assert!(NodeConfig::default().with_alpha(0).validate().is_err());
        assert!(NodeConfig::default().with_k(0).validate().is_err());
    }
}
