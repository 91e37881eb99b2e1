use std::fmt;
use std::str::FromStr;

use ethereum_types::H160;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::ID_LENGTH;
use crate::error::DhtError;

/// Request/response correlation token carried by every wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpcId(u64);

impl RpcId {
    pub fn new_random() -> Self {
        let val: u64 = rand::rng().random();
        Self(val)
    }
}

/// A 160-bit identifier locating a node or a key in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KademliaId(pub H160);

impl KademliaId {
    /// Generate a uniformly random id from the process-wide rng.
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_LENGTH];
        rand::rng().fill_bytes(&mut bytes);
        Self(H160::from(bytes))
    }

    pub fn zero() -> Self {
        Self(H160::zero())
    }

    /// Build an id from raw bytes. Anything other than exactly 20 bytes is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DhtError> {
        if bytes.len() != ID_LENGTH {
            return Err(DhtError::MalformedIdentifier {
                input: hex::encode(bytes),
                reason: format!("expected {ID_LENGTH} bytes, got {}", bytes.len()),
            });
        }
        Ok(Self(H160::from_slice(bytes)))
    }

    /// Parse a 40 character hex string. Short, long or non-hex input fails;
    /// there is no padding or truncation.
    pub fn from_hex(input: &str) -> Result<Self, DhtError> {
        let bytes = hex::decode(input).map_err(|e| DhtError::MalformedIdentifier {
            input: input.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes).map_err(|_| DhtError::MalformedIdentifier {
            input: input.to_owned(),
            reason: format!("expected {} hex characters, got {}", ID_LENGTH * 2, input.len()),
        })
    }

    /// The SHA-1 digest of `input`. This is the content hash used as a storage key.
    pub fn from_hashed<S: AsRef<[u8]>>(input: &S) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(input.as_ref());
        let digest = hasher.finalize();
        Self(H160::from_slice(&digest))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn distance(&self, other: &KademliaId) -> Distance {
        Distance(self.0 ^ other.0)
    }

    /// Return a short, human-friendly hex for logging, like ab12cd34…ef90a1b2
    pub fn short_hex(&self) -> String {
        let b = self.0.to_fixed_bytes();
        format!(
            "{:02x}{:02x}{:02x}{:02x}…{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[16], b[17], b[18], b[19]
        )
    }
}

impl fmt::Display for KademliaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.as_bytes()))
    }
}

impl FromStr for KademliaId {
    type Err = DhtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// XOR of two ids. Orders as a big-endian unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Distance(H160);

impl Distance {
    /// Strict big-endian comparison: the first differing byte decides and
    /// equal distances are not less.
    pub fn less(&self, other: &Distance) -> bool {
        self < other
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Number of leading zero bits, i.e. the length of the common prefix of the
    /// two ids this distance was computed from. 160 for the zero distance.
    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for byte in self.0.as_bytes() {
            if *byte == 0 {
                zeros += 8;
            } else {
                zeros += byte.leading_zeros();
                break;
            }
        }
        zeros
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.as_bytes()))
    }
}
