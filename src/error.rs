use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("operand #{index} = {value} is out of byte range")]
    OperandOutOfRange { index: usize, value: i64 },
    #[error("too many operands ({0}, at most 8)")]
    TooManyOperands(usize),
    #[error("non-finite value {0}")]
    NonFinite(f64),
    #[error("invalid duration of {0} seconds")]
    InvalidDuration(f64),
    #[error("text is {len} bytes long, at most {max} allowed")]
    TextTooLong { len: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("acknowledgement has {0} bytes, expected 9")]
    AckLength(usize),
    #[error("malformed identification pair '{0}'")]
    MalformedInfo(String),
    #[error("no firmware info")]
    NoFirmwareInfo,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("connection to {port:?} failed")]
    Connection {
        port: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("read timed out ({received} of {expected} bytes)")]
    Timeout { expected: usize, received: usize },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("image transfer incomplete ({received} of {expected} bytes)")]
    ImageTransfer { expected: usize, received: usize },
    #[error("driver is not connected")]
    NotConnected,
    #[error("driver is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

impl DriverError {
    /// Whether retrying the same exchange can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }

    /// The device may still be sending the reply this error cut short.
    pub(crate) fn leaves_stale_input(&self) -> bool {
        matches!(
            self,
            DriverError::Timeout { .. } | DriverError::ImageTransfer { .. }
        )
    }

    pub(crate) fn is_interrupt(&self) -> bool {
        match self {
            DriverError::Io(e) => e.kind() == io::ErrorKind::Interrupted,
            _ => false,
        }
    }
}
