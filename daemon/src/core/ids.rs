use mint_common::time::get_current_time_in_millis;

/// Source of unique ids for ledger entries and redemption records.
///
/// The only contract is process-global uniqueness; ids are opaque to every
/// consumer. Injectable so tests can use a deterministic sequence.
pub trait IdGenerator: Send + Sync {
    fn transaction_id(&self) -> String;

    fn redemption_id(&self) -> String;
}

/// Default scheme: millis timestamp plus a random 64-bit suffix.
///
/// A bare timestamp is not collision-free under concurrency, the random
/// suffix closes that hole without any shared state.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl RandomIdGenerator {
    fn next(prefix: &str) -> String {
        format!(
            "{}_{}_{:016x}",
            prefix,
            get_current_time_in_millis(),
            rand::random::<u64>()
        )
    }
}

impl IdGenerator for RandomIdGenerator {
    fn transaction_id(&self) -> String {
        Self::next("txn")
    }

    fn redemption_id(&self) -> String {
        Self::next("red")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_carry_their_prefix() {
        let ids = RandomIdGenerator;
        assert!(ids.transaction_id().starts_with("txn_"));
        assert!(ids.redemption_id().starts_with("red_"));
    }

    #[test]
    fn ids_do_not_repeat() {
        let ids = RandomIdGenerator;
        let generated: HashSet<String> = (0..1000).map(|_| ids.transaction_id()).collect();
        assert_eq!(generated.len(), 1000);
    }
}
