use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Order Numbers
// ============================================================================
//
// Format: ORD-YYYYMMDD-XXXXXXXX (8 uppercase alphanumerics).
// Uniqueness is checked by the lifecycle service inside the order
// transaction; the unique index on orders.order_number is the backstop.
//
// ============================================================================

pub const ORDER_NUMBER_PREFIX: &str = "ORD";
const SUFFIX_LEN: usize = 8;

pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> String;
}

/// Random suffix taken from a v4 uuid
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberGenerator for RandomOrderNumbers {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(SUFFIX_LEN)
            .collect::<String>()
            .to_uppercase();
        format_order_number(now, &suffix)
    }
}

pub fn format_order_number(now: DateTime<Utc>, suffix: &str) -> String {
    format!("{}-{}-{}", ORDER_NUMBER_PREFIX, now.format("%Y%m%d"), suffix)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Hands out the given suffixes in order, repeating the last one
    pub(crate) struct ScriptedOrderNumbers {
        suffixes: Mutex<Vec<String>>,
    }

    impl ScriptedOrderNumbers {
        pub(crate) fn new(suffixes: &[&str]) -> Self {
            let mut suffixes: Vec<String> = suffixes.iter().map(|s| s.to_string()).collect();
            suffixes.reverse();
            Self { suffixes: Mutex::new(suffixes) }
        }
    }

    impl OrderNumberGenerator for ScriptedOrderNumbers {
        fn generate(&self, now: DateTime<Utc>) -> String {
            let mut suffixes = self.suffixes.lock().unwrap();
            let suffix = if suffixes.len() > 1 {
                suffixes.pop().unwrap()
            } else {
                suffixes[0].clone()
            };
            format_order_number(now, &suffix)
        }
    }

    #[test]
    fn test_random_order_number_format() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 23, 59, 59).unwrap();
        let number = RandomOrderNumbers.generate(now);

        assert_eq!(number.len(), "ORD-20260105-".len() + 8);
        assert!(number.starts_with("ORD-20260105-"));

        let suffix = &number["ORD-20260105-".len()..];
        assert!(suffix.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_random_order_numbers_differ() {
        let now = Utc::now();
        assert_ne!(RandomOrderNumbers.generate(now), RandomOrderNumbers.generate(now));
    }

    #[test]
    fn test_scripted_numbers_repeat_last() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let numbers = ScriptedOrderNumbers::new(&["AAAAAAAA", "BBBBBBBB"]);

        assert_eq!(numbers.generate(now), "ORD-20260105-AAAAAAAA");
        assert_eq!(numbers.generate(now), "ORD-20260105-BBBBBBBB");
        assert_eq!(numbers.generate(now), "ORD-20260105-BBBBBBBB");
    }
}
