use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as stored in SQLite `INTEGER` columns.
/// Clamps to zero if the clock is before 1970.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_after_2020() {
        assert!(now_secs() > 1_600_000_000);
    }
}
