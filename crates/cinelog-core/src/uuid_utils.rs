//! UUID v7 utilities for time-ordered identifiers.
//!
//! Videos, sources, and jobs all use UUIDv7 primary keys: the embedded
//! millisecond timestamp gives free creation-time ordering, which the job
//! queue's oldest-first claim relies on as a tiebreaker-friendly index.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check if a UUID is version 7.
#[inline]
pub fn is_v7(uuid: &Uuid) -> bool {
    uuid.get_version_num() == 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_version_7() {
        assert!(is_v7(&new_v7()));
    }

    #[test]
    fn test_v7_ordering() {
        let id1 = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = new_v7();
        assert!(id2 > id1);
    }
}
