//! Visually stable ordering of groups across data updates.
//!
//! As batches stream in, group counts change and a plain resort would keep
//! reshuffling the presentation. This layer remembers the order the user has
//! already seen and reconciles every fresh grouping against it: surviving
//! groups keep their relative position, new groups are appended. Only a
//! fingerprint change (the user switched filters or strategy) resets the
//! order to the fresh sort.

use std::collections::HashMap;

use crate::filter::RecordFilter;
use crate::grouping::{Group, GroupingStrategy};

/// Remembered ordering of group keys under one fingerprint.
#[derive(Debug, Clone, Default)]
pub struct GroupOrderState {
    fingerprint: String,
    ordered_keys: Vec<String>,
}

impl GroupOrderState {
    /// Creates an empty order state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently remembered key order.
    pub fn ordered_keys(&self) -> &[String] {
        &self.ordered_keys
    }

    /// Reconciles fresh grouping output against the remembered order.
    ///
    /// With a changed fingerprint the fresh order is adopted wholesale; with
    /// an unchanged fingerprint the relative order of surviving keys is
    /// preserved, newly appeared keys are appended in their fresh relative
    /// order, and vanished keys are dropped. This is the single ordering
    /// entry point, invoked on every data update; it never resorts.
    pub fn reconcile(&mut self, fingerprint: &str, fresh: Vec<Group>) -> Vec<Group> {
        if self.fingerprint != fingerprint {
            self.fingerprint = fingerprint.to_owned();
            self.ordered_keys = fresh.iter().map(|group| group.key.clone()).collect();
            return fresh;
        }

        let fresh_keys: Vec<String> = fresh.iter().map(|group| group.key.clone()).collect();
        let mut by_key: HashMap<String, Group> = fresh
            .into_iter()
            .map(|group| (group.key.clone(), group))
            .collect();

        let mut result = Vec::with_capacity(by_key.len());

        // Surviving keys keep their remembered position.
        for key in &self.ordered_keys {
            if let Some(group) = by_key.remove(key) {
                result.push(group);
            }
        }

        // New keys are appended in their fresh relative order.
        for key in &fresh_keys {
            if let Some(group) = by_key.remove(key) {
                result.push(group);
            }
        }

        self.ordered_keys = result.iter().map(|group| group.key.clone()).collect();

        result
    }
}

/// Deterministic encoding of the active filters and strategy.
///
/// Two states with equal fingerprints present the same logical view, so the
/// remembered group order carries over; any difference resets it.
pub fn order_fingerprint(filter: &RecordFilter, strategy: GroupingStrategy) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        strategy,
        filter.state,
        filter.repository.as_deref().unwrap_or(""),
        filter.author.as_deref().unwrap_or(""),
        filter.owner.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::StateFilter;

    fn group(key: &str, count: usize) -> Group {
        Group {
            key: key.to_owned(),
            label: key.to_owned(),
            base_ref: "main".to_owned(),
            labels: Vec::new(),
            records: Vec::new(),
            count,
        }
    }

    fn keys(groups: &[Group]) -> Vec<&str> {
        groups.iter().map(|group| group.key.as_str()).collect()
    }

    #[test]
    fn appends_new_groups_after_known_ones() {
        let mut state = GroupOrderState::new();

        let first = state.reconcile("fp", vec![group("A", 5), group("B", 3)]);
        assert_eq!(keys(&first), vec!["A", "B"]);

        // A fresh sort would put C first; the reconciled order must not.
        let second = state.reconcile("fp", vec![group("C", 10), group("A", 6), group("B", 3)]);
        assert_eq!(keys(&second), vec!["A", "B", "C"]);
    }

    #[test]
    fn fingerprint_change_adopts_fresh_order() {
        let mut state = GroupOrderState::new();

        state.reconcile("fp", vec![group("A", 5), group("B", 3)]);
        let reordered = state.reconcile("fp2", vec![group("B", 9), group("A", 5)]);

        assert_eq!(keys(&reordered), vec!["B", "A"]);
    }

    #[test]
    fn vanished_keys_are_dropped() {
        let mut state = GroupOrderState::new();

        state.reconcile("fp", vec![group("A", 5), group("B", 3), group("C", 1)]);
        let next = state.reconcile("fp", vec![group("C", 2), group("A", 5)]);

        assert_eq!(keys(&next), vec!["A", "C"]);
        assert_eq!(state.ordered_keys(), &["A".to_owned(), "C".to_owned()]);
    }

    #[test]
    fn reconcile_is_idempotent_on_identical_input() {
        let mut state = GroupOrderState::new();

        let input = vec![group("A", 5), group("B", 3)];
        let first = state.reconcile("fp", input.clone());
        let second = state.reconcile("fp", input);

        assert_eq!(keys(&first), keys(&second));
    }

    #[test]
    fn fingerprint_encodes_filters_and_strategy() {
        let mut filter = RecordFilter::default();
        let a = order_fingerprint(&filter, GroupingStrategy::Dependency);

        filter.state = StateFilter::Open;
        let b = order_fingerprint(&filter, GroupingStrategy::Dependency);
        let c = order_fingerprint(&filter, GroupingStrategy::Repository);

        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
