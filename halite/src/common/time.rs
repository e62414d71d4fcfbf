use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

#[inline]
pub fn current_time_millis() -> Result<i64, SystemTimeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
}

// Fast path: returns 0 on any error instead of double error handling
#[inline]
pub fn current_time_millis_or_zero() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
