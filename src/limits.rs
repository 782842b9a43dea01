use crate::model::Ms;

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 256;

pub const MAX_SLOTS_PER_TENANT: usize = 100_000;
pub const MAX_REQUESTS_PER_TENANT: usize = 100_000;
pub const MAX_TITLE_LEN: usize = 256;

/// Timestamps must fall in [1970, 2100).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single slot may not span more than one year.
pub const MAX_SPAN_DURATION_MS: Ms = 31_536_000_000;
