//! Default values for loader options and diagnostics.

/// File extension recognised as a script source.
pub const SCRIPT_EXTENSION: &str = "lua";

/// Prefix of every invocation error message.
pub const INVOCATION_ERROR_PREFIX: &str = "Error running lua script:";

/// Delay before waiting on the store again after a connection error.
pub const CONNECT_RETRY_DELAY_MS: u64 = 500;

/// Capacity of the loader event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub fn extension() -> String {
    SCRIPT_EXTENSION.to_string()
}

pub fn connect_retry_delay_ms() -> u64 {
    CONNECT_RETRY_DELAY_MS
}
