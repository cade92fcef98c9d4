use std::net::SocketAddr;
use std::string::FromUtf8Error;

/// All error types that can occur while syncing screen colors to bulbs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to serialize data to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Failed to deserialize JSON data.
    #[error("failed to load json: {0:?}")]
    JsonLoad(serde_json::Error),

    /// A network socket operation failed while communicating with a bulb.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// The UDP response from a bulb contained invalid UTF-8.
    #[error("utf8 decoding error: {0:?}")]
    Utf8Decode(FromUtf8Error),

    /// Discovery finished without finding the requested device.
    #[error("no device matching {0} answered discovery")]
    DeviceNotFound(String),

    /// The bulb answered but reported a failure.
    #[error("device at {addr} rejected the command (code {code}): {message}")]
    Device {
        addr: SocketAddr,
        code: i64,
        message: String,
    },

    /// The bulb configuration has neither an address nor a discoverable identity.
    #[error("bulb {0} has no host and no discovery identity")]
    MissingIdentity(String),

    /// The color processor failed to sample a zone.
    #[error("failed to sample zone {zone}: {reason}")]
    Sampling { zone: String, reason: String },

    /// The color processor did not answer in time.
    #[error("sampling zone {0} timed out")]
    SamplingTimeout(String),

    /// `start` was called on a coordinator that is already running.
    #[error("coordinator is already running")]
    AlreadyRunning,

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),

    /// Failed to parse a [`crate::Mode`] from a string.
    #[error("invalid mode: {0}")]
    InvalidMode(String),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new sampling error
    pub fn sampling(zone: &str, reason: impl ToString) -> Self {
        Error::Sampling {
            zone: zone.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a new device error
    pub fn device(addr: SocketAddr, code: i64, message: &str) -> Self {
        Error::Device {
            addr,
            code,
            message: message.to_string(),
        }
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}
