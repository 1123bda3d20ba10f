//! Error types for the kelcore library.

use thiserror::Error;

/// Errors raised by the primitive (Matter/Counter/Indexer) codec layer.
#[derive(Debug, Error)]
pub enum MatterError {
    #[error("Empty material: {0}")]
    EmptyMaterial(String),

    #[error("Shortage: {0}")]
    Shortage(String),

    #[error("Unsupported code: {0}")]
    UnexpectedCode(String),

    #[error("Unexpected count code start: {0}")]
    UnexpectedCountCode(String),

    #[error("Unexpected op code start: {0}")]
    UnexpectedOpCode(String),

    #[error("Invalid code: {0}")]
    InvalidCode(String),

    #[error("Invalid code size: {0}")]
    InvalidCodeSize(String),

    #[error("Invalid var raw size: {0}")]
    InvalidVarRawSize(String),

    #[error("Invalid var index: {0}")]
    InvalidVarIndex(String),

    #[error("Invalid soft material: {0}")]
    InvalidSoft(String),

    #[error("Raw material error: {0}")]
    RawMaterial(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Value error: {0}")]
    Value(String),
}

/// Errors raised by the protocol layer: serder, event constructors, kever,
/// kevery, parser. Kinds are distinguishable at the boundary so callers can
/// route recoverable failures into the right escrow.
#[derive(Debug, Error)]
pub enum KeriError {
    /// Unknown or invalid derivation code or malformed qb64 material.
    #[error("Derivation error: {0}")]
    DerivationError(String),

    /// Event well formed but violates a stateful invariant.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Signing threshold not yet met; recoverable via escrow.
    #[error("Missing signature error: {0}")]
    MissingSignatureError(String),

    /// Witness threshold not yet met; recoverable via escrow.
    #[error("Missing witness signature error: {0}")]
    MissingWitnessSignatureError(String),

    /// Sequence number gap; recoverable via escrow.
    #[error("Out of order error: {0}")]
    OutOfOrderError(String),

    /// Delegator KEL not yet caught up; recoverable via escrow.
    #[error("Missing delegation error: {0}")]
    MissingDelegationError(String),

    /// Irreconcilable fork; surfaced and persisted, not retried.
    #[error("Likely duplicitous error: {0}")]
    LikelyDuplicitousError(String),

    /// Referenced event not (yet) in the database.
    #[error("Missing entry error: {0}")]
    MissingEntryError(String),

    /// Parser cannot align to a message boundary.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Not enough bytes to finish extracting; driver should feed more.
    #[error("Shortage error: need {0} more bytes")]
    ShortageError(usize),

    #[error("Version error: {0}")]
    VersionError(String),

    #[error("Kind error: {0}")]
    KindError(String),

    #[error("Serialization error: {0}")]
    SerializeError(String),

    #[error("Deserialization error: {0}")]
    DeserializeError(String),

    #[error("Field error: {0}")]
    FieldError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Value error: {0}")]
    ValueError(String),
}

impl From<MatterError> for KeriError {
    fn from(err: MatterError) -> Self {
        KeriError::DerivationError(err.to_string())
    }
}

pub type MatterResult<T> = std::result::Result<T, MatterError>;
pub type KeriResult<T> = std::result::Result<T, KeriError>;
