pub mod config;
pub mod console;
pub mod core;
pub mod dht;
pub mod error;
pub mod lookup;
pub mod net;
pub mod node;
pub mod protocol;
#[cfg(test)]
mod test_support;

// Re-export commonly used types for consumers and integration tests
pub use crate::config::NodeConfig;
pub use crate::core::contact::Contact;
pub use crate::core::identifier::{Distance, KademliaId};
pub use crate::core::storage::{StoreStatus, Value};
pub use crate::dht::{GetOutcome, KademliaDht, StoreReceipt};
pub use crate::error::DhtError;
pub use crate::protocol::{FindDataReply, Request, Response, RpcClient};
