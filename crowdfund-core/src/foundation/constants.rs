//! System-wide constants for the crowdfunding escrow.

/// Nanoseconds per second (10^9).
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Nanoseconds per hour.
pub const NANOS_PER_HOUR: u64 = 60 * 60 * NANOS_PER_SECOND;

/// Overrides the wall clock for `SystemClock` when set (tests and demos).
pub const TEST_NOW_NANOS_ENV_VAR: &str = "CROWDFUND_TEST_NOW_NANOS";

/// Maximum campaign name length in bytes.
pub const MAX_CAMPAIGN_NAME_LENGTH: usize = 256;

/// Maximum encoded size of a single session message (4 MB).
pub const MAX_MESSAGE_SIZE_BYTES: usize = 4 * 1024 * 1024;

/// Default buffered messages per direction of a session.
pub const DEFAULT_SESSION_CHANNEL_CAPACITY: usize = 32;

/// Default buffered inbound sessions per party.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Domain separator mixed into transaction ids.
pub const TX_ID_DOMAIN: &[u8] = b"crowdfund/tx/v1";

/// Domain separator for identity disclosure proofs.
pub const IDENTITY_PROOF_DOMAIN: &[u8] = b"crowdfund/identity/v1";
