use snowflake::SnowflakeIdBucket;
use std::sync::{Mutex, OnceLock};

static BUCKET: OnceLock<Mutex<SnowflakeIdBucket>> = OnceLock::new();

/// Fixes the generator's identity (machine and node, each 0-31).
///
/// The first call wins; later calls are ignored. IDs requested before
/// any call come from a default (1, 1) bucket.
pub fn init(machine_id: i32, node_id: i32) {
    let _ = BUCKET.set(Mutex::new(SnowflakeIdBucket::new(machine_id, node_id)));
}

/// A fresh snowflake ID, decimal-encoded.
pub fn next_id() -> String {
    BUCKET
        .get_or_init(|| Mutex::new(SnowflakeIdBucket::new(1, 1)))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .get_id()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        init(1, 1);
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = next_id();
            assert!(!id.is_empty());
            assert!(seen.insert(id), "duplicate ID generated");
        }
    }

    #[test]
    fn ids_are_decimal_i64() {
        let id = next_id();
        assert!(id.parse::<i64>().is_ok(), "not a valid i64: {id}");
    }
}
