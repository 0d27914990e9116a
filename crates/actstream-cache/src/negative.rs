//! The negative-existence filter (spec §4.5 step 1): short-circuits a
//! lookup for a customer that has never been positively cached and isn't
//! part of the current preload set, without touching L1/L2 at all.

use dashmap::DashSet;
use parking_lot::RwLock;

pub struct NegativeFilter {
    ever_positive: DashSet<String>,
    preload: RwLock<DashSet<String>>,
}

impl Default for NegativeFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl NegativeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self { ever_positive: DashSet::new(), preload: RwLock::new(DashSet::new()) }
    }

    /// Marks `customer` as having been positively cached at least once.
    pub fn mark_positive(&self, customer: &str) {
        self.ever_positive.insert(customer.to_string());
    }

    /// Replaces the preload set, used by the warmer to whitelist customers
    /// it is about to populate ahead of any positive hit.
    pub fn set_preload(&self, customers: impl IntoIterator<Item = String>) {
        let set = DashSet::new();
        for customer in customers {
            set.insert(customer);
        }
        *self.preload.write() = set;
    }

    #[must_use]
    pub fn may_exist(&self, customer: &str) -> bool {
        self.ever_positive.contains(customer) || self.preload.read().contains(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_customer_is_filtered_out() {
        let filter = NegativeFilter::new();
        assert!(!filter.may_exist("cust-1"));
    }

    #[test]
    fn positively_cached_customer_passes_the_filter() {
        let filter = NegativeFilter::new();
        filter.mark_positive("cust-1");
        assert!(filter.may_exist("cust-1"));
    }

    #[test]
    fn preloaded_customer_passes_before_any_positive_hit() {
        let filter = NegativeFilter::new();
        filter.set_preload(["cust-2".to_string()]);
        assert!(filter.may_exist("cust-2"));
        assert!(!filter.may_exist("cust-3"));
    }
}
