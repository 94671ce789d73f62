use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Incompatible filter configurations: {reason}")]
    IncompatibleConfig { reason: String },

    #[error("Index out of bounds: {index} >= {capacity}")]
    IndexOutOfBounds { index: usize, capacity: usize },

    #[error("Value {value} does not fit into a {width}-bit counter")]
    ValueTooWide { value: u64, width: u8 },

    #[error("Positions and values differ in length: {positions} != {values}")]
    LengthMismatch { positions: usize, values: usize },

    #[error("Storage operation failed: {0}")]
    StorageError(String),

    #[cfg(feature = "redis")]
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}
