use std::time::Instant;

use crate::types::Value;

/// A value plus its optional absolute expiry instant.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Value) -> Self {
        Entry {
            value,
            expires_at: None,
        }
    }

    pub fn with_expiry(value: Value, expires_at: Option<Instant>) -> Self {
        Entry { value, expires_at }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Time-to-live in seconds (rounded to nearest), or -1 if no expiry.
    pub fn ttl_seconds(&self, now: Instant) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => {
                let ms = exp.saturating_duration_since(now).as_millis() as i64;
                (ms + 500) / 1000
            }
        }
    }

    /// Time-to-live in milliseconds, or -1 if no expiry.
    pub fn ttl_millis(&self, now: Instant) -> i64 {
        match self.expires_at {
            None => -1,
            Some(exp) => exp.saturating_duration_since(now).as_millis() as i64,
        }
    }
}

/// Return the value in `slot`, creating it with `make` when the key is absent.
pub fn value_or_insert_with(slot: &mut Option<Entry>, make: impl FnOnce() -> Value) -> &mut Value {
    &mut slot.get_or_insert_with(|| Entry::new(make())).value
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::types::list::ListValue;

    #[test]
    fn test_ttl_rounding() {
        let now = Instant::now();
        let entry = Entry::with_expiry(
            Value::List(ListValue::new()),
            Some(now + Duration::from_millis(4600)),
        );
        assert_eq!(entry.ttl_seconds(now), 5);
        assert_eq!(entry.ttl_millis(now), 4600);
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_secs(5)));
        assert_eq!(Entry::new(Value::List(ListValue::new())).ttl_seconds(now), -1);
    }

    #[test]
    fn test_value_or_insert_with() {
        let mut slot = None;
        value_or_insert_with(&mut slot, || Value::List(ListValue::new()))
            .as_list_mut()
            .unwrap()
            .push_back("a".into());
        assert_eq!(slot.unwrap().value.as_list().unwrap().len(), 1);
    }
}
