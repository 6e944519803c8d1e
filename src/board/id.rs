//! Task identifiers.
//!
//! A [`TaskId`] is 12 bytes rendered as 24 lowercase hex characters:
//! 4 bytes of big-endian creation seconds, 5 process-random bytes and a
//! 3-byte counter. Byte order therefore follows creation order, which the
//! storage backends use to break ties between equal ranks.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const ID_LEN: usize = 12;

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

/// Storage-assigned identifier of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId([u8; ID_LEN]);

/// Returned when a string is not a 24-character hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid task id: {0}")]
pub struct InvalidTaskId(pub String);

impl TaskId {
    /// Allocate a fresh identifier.
    pub fn generate() -> Self {
        let seconds = Utc::now().timestamp() as u32;
        let process = PROCESS_UNIQUE.get_or_init(rand::random::<[u8; 5]>);
        let count = COUNTER
            .get_or_init(|| AtomicU32::new(rand::random::<u32>()))
            .fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0u8; ID_LEN];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Parse the hex form, rejecting anything that is not exactly 24 hex digits.
    pub fn parse(value: &str) -> Result<Self, InvalidTaskId> {
        let invalid = || InvalidTaskId(value.to_string());
        if value.len() != ID_LEN * 2 {
            return Err(invalid());
        }
        let mut bytes = [0u8; ID_LEN];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }

    /// Seconds since the Unix epoch embedded in the id.
    pub fn timestamp_secs(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for TaskId {
    type Err = InvalidTaskId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
