use crate::foundation::{MAX_MESSAGE_SIZE_BYTES, NANOS_PER_SECOND};
use crate::infrastructure::config::types::EscrowConfig;

const MAX_TIME_TOLERANCE_SECS: u64 = 3_600;

impl EscrowConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.node.name.trim().is_empty() {
            errors.push("node.name must not be empty".to_string());
        }
        if self.notary.name.trim().is_empty() {
            errors.push("notary.name must not be empty".to_string());
        }
        if self.notary.name.trim() == self.node.name.trim() {
            errors.push("notary.name must differ from node.name".to_string());
        }
        if self.notary.time_tolerance_secs > MAX_TIME_TOLERANCE_SECS {
            errors.push(format!("notary.time_tolerance_secs must be <= {MAX_TIME_TOLERANCE_SECS}"));
        }
        if self.transport.session_channel_capacity == 0 {
            errors.push("transport.session_channel_capacity must be > 0".to_string());
        }
        if self.transport.inbox_capacity == 0 {
            errors.push("transport.inbox_capacity must be > 0".to_string());
        }
        if self.transport.max_message_bytes == 0 || self.transport.max_message_bytes > MAX_MESSAGE_SIZE_BYTES {
            errors.push(format!("transport.max_message_bytes must be in 1..={MAX_MESSAGE_SIZE_BYTES}"));
        }
        if self.scheduler.enabled && self.scheduler.poll_interval_ms == 0 {
            errors.push("scheduler.poll_interval_ms must be > 0 when the scheduler is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn notary_tolerance_nanos(&self) -> u64 {
        self.notary.time_tolerance_secs.saturating_mul(NANOS_PER_SECOND)
    }
}
