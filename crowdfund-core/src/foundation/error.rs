use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidStart,
    InvalidPledge,
    InvalidCancel,
    InvalidEnd,
    InvalidCashMove,
    InvalidCashIssue,
    UnrecognisedCommand,
    AmbiguousCommand,
    MissingCommand,
    PledgeRejected,
    SettlementRejected,
    DoubleSpendConflict,
    NotManager,
    InvalidStateTransition,
    TimestampOutOfTolerance,
    RecordNotFound,
    CampaignNotActive,
    UnknownIdentity,
    InsufficientFunds,
    CurrencyMismatch,
    InvalidSignature,
    MissingSignatures,
    StorageError,
    SerializationError,
    TransportError,
    ConfigError,
    CryptoError,
    Message,
}

/// Coarse grouping used by callers to decide how far an error unwinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Deterministic rule violation; the proposer must build a corrected proposal.
    Validation,
    /// A counterparty or the notary refused; the whole protocol instance is abandoned.
    Protocol,
    Authorization,
    Infrastructure,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub category: ErrorCategory,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum EscrowError {
    // === Verification engine ===
    #[error("invalid start: {0}")]
    InvalidStart(String),

    #[error("invalid pledge: {0}")]
    InvalidPledge(String),

    #[error("invalid cancel: {0}")]
    InvalidCancel(String),

    #[error("invalid end: {0}")]
    InvalidEnd(String),

    #[error("invalid cash move: {0}")]
    InvalidCashMove(String),

    #[error("invalid cash issue: {0}")]
    InvalidCashIssue(String),

    #[error("unrecognised command: {0}")]
    UnrecognisedCommand(String),

    #[error("ambiguous command: expected one {kind} command, found {count}")]
    AmbiguousCommand { kind: String, count: usize },

    #[error("missing {kind} command")]
    MissingCommand { kind: String },

    // === Protocol ===
    #[error("pledge rejected: {details}")]
    PledgeRejected { details: String },

    #[error("settlement rejected by {party}: {details}")]
    SettlementRejected { party: String, details: String },

    #[error("double spend conflict on {record} (consumed by {consumed_by})")]
    DoubleSpendConflict { record: String, consumed_by: String },

    // === Authorization ===
    #[error("party {party} is not the manager of campaign {campaign_id}")]
    NotManager { party: String, campaign_id: String },

    #[error("timestamp {timestamp_nanos} outside notary tolerance (now {now_nanos}, tolerance {tolerance_nanos})")]
    TimestampOutOfTolerance { timestamp_nanos: u64, now_nanos: u64, tolerance_nanos: u64 },

    // === Infrastructure ===
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("campaign {0} is not active")]
    CampaignNotActive(String),

    #[error("unknown identity for key {0}")]
    UnknownIdentity(String),

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    #[error("currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    #[error("invalid signature from key {key}")]
    InvalidSignature { key: String },

    #[error("transaction {tx_id} is missing signatures from {missing:?}")]
    MissingSignatures { tx_id: String, missing: Vec<String> },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: String, details: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, EscrowError>;

impl EscrowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EscrowError::InvalidStart(_) => ErrorCode::InvalidStart,
            EscrowError::InvalidPledge(_) => ErrorCode::InvalidPledge,
            EscrowError::InvalidCancel(_) => ErrorCode::InvalidCancel,
            EscrowError::InvalidEnd(_) => ErrorCode::InvalidEnd,
            EscrowError::InvalidCashMove(_) => ErrorCode::InvalidCashMove,
            EscrowError::InvalidCashIssue(_) => ErrorCode::InvalidCashIssue,
            EscrowError::UnrecognisedCommand(_) => ErrorCode::UnrecognisedCommand,
            EscrowError::AmbiguousCommand { .. } => ErrorCode::AmbiguousCommand,
            EscrowError::MissingCommand { .. } => ErrorCode::MissingCommand,
            EscrowError::PledgeRejected { .. } => ErrorCode::PledgeRejected,
            EscrowError::SettlementRejected { .. } => ErrorCode::SettlementRejected,
            EscrowError::DoubleSpendConflict { .. } => ErrorCode::DoubleSpendConflict,
            EscrowError::NotManager { .. } => ErrorCode::NotManager,
            EscrowError::TimestampOutOfTolerance { .. } => ErrorCode::TimestampOutOfTolerance,
            EscrowError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            EscrowError::RecordNotFound(_) => ErrorCode::RecordNotFound,
            EscrowError::CampaignNotActive(_) => ErrorCode::CampaignNotActive,
            EscrowError::UnknownIdentity(_) => ErrorCode::UnknownIdentity,
            EscrowError::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            EscrowError::CurrencyMismatch { .. } => ErrorCode::CurrencyMismatch,
            EscrowError::InvalidSignature { .. } => ErrorCode::InvalidSignature,
            EscrowError::MissingSignatures { .. } => ErrorCode::MissingSignatures,
            EscrowError::StorageError { .. } => ErrorCode::StorageError,
            EscrowError::SerializationError { .. } => ErrorCode::SerializationError,
            EscrowError::TransportError { .. } => ErrorCode::TransportError,
            EscrowError::ConfigError(_) => ErrorCode::ConfigError,
            EscrowError::CryptoError { .. } => ErrorCode::CryptoError,
            EscrowError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.code() {
            ErrorCode::InvalidStart
            | ErrorCode::InvalidPledge
            | ErrorCode::InvalidCancel
            | ErrorCode::InvalidEnd
            | ErrorCode::InvalidCashMove
            | ErrorCode::InvalidCashIssue
            | ErrorCode::UnrecognisedCommand
            | ErrorCode::AmbiguousCommand
            | ErrorCode::MissingCommand => ErrorCategory::Validation,
            ErrorCode::PledgeRejected
            | ErrorCode::SettlementRejected
            | ErrorCode::DoubleSpendConflict
            | ErrorCode::TimestampOutOfTolerance => ErrorCategory::Protocol,
            ErrorCode::NotManager => ErrorCategory::Authorization,
            _ => ErrorCategory::Infrastructure,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext { code: self.code(), category: self.category(), message: self.to_string() }
    }

    pub fn transport(operation: impl Into<String>, details: impl ToString) -> Self {
        EscrowError::TransportError { operation: operation.into(), details: details.to_string() }
    }

    pub fn settlement_rejected(party: impl ToString, details: impl Into<String>) -> Self {
        EscrowError::SettlementRejected { party: party.to_string(), details: details.into() }
    }
}

impl From<bincode::Error> for EscrowError {
    fn from(err: bincode::Error) -> Self {
        EscrowError::SerializationError { format: "bincode".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for EscrowError {
    fn from(err: serde_json::Error) -> Self {
        EscrowError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<hex::FromHexError> for EscrowError {
    fn from(err: hex::FromHexError) -> Self {
        EscrowError::SerializationError { format: "hex".to_string(), details: err.to_string() }
    }
}

impl From<ed25519_dalek::SignatureError> for EscrowError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        EscrowError::CryptoError { operation: "ed25519".to_string(), details: err.to_string() }
    }
}

impl From<figment::Error> for EscrowError {
    fn from(err: figment::Error) -> Self {
        EscrowError::ConfigError(format!("config extraction failed: {err}"))
    }
}

impl From<io::Error> for EscrowError {
    fn from(err: io::Error) -> Self {
        EscrowError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::EscrowError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! serde_err {
    ($fmt:expr, $err:expr) => {
        $crate::foundation::EscrowError::SerializationError { format: $fmt.into(), details: $err.to_string() }
    };
}
