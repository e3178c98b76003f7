//! Inbound/outbound bookkeeping for grants and discounts between properties.

use std::collections::{BTreeMap, BTreeSet};

use crate::ruleset::Discount;

/// What one source currently contributes to one target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropagationData {
    pub source: String,
    pub target: String,
    pub grants: i32,
    pub discounts: Vec<Discount>,
}

impl PropagationData {
    /// Record that withdraws everything `source` gave `target`.
    pub fn empty(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.grants == 0 && self.discounts.is_empty()
    }
}

/// Everything a source wants to emit, gathered before it is pushed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outbound {
    grants: BTreeMap<String, i32>,
    discounts: BTreeMap<String, Vec<Discount>>,
}

impl Outbound {
    pub fn grant(&mut self, target: impl Into<String>, amount: i32) {
        *self.grants.entry(target.into()).or_default() += amount;
    }

    pub fn grants_mut(&mut self) -> &mut BTreeMap<String, i32> {
        &mut self.grants
    }

    pub fn discount(&mut self, target: impl Into<String>, discount: Discount) {
        self.discounts.entry(target.into()).or_default().push(discount);
    }

    /// One record per target. An inactive source emits empty records so its
    /// previous contributions are withdrawn.
    pub fn into_records(self, source: &str, active: bool) -> Vec<PropagationData> {
        let Self {
            mut grants,
            mut discounts,
        } = self;
        let targets: BTreeSet<String> = grants.keys().chain(discounts.keys()).cloned().collect();
        targets
            .into_iter()
            .map(|target| {
                let mut record = PropagationData::empty(source, target.clone());
                if active {
                    record.grants = grants.remove(&target).unwrap_or_default();
                    record.discounts = discounts.remove(&target).unwrap_or_default();
                }
                record
            })
            .collect()
    }
}

/// Store of current propagation records.
#[derive(Clone, Debug, Default)]
pub struct PropagationStore {
    /// target -> source -> record
    inbound: BTreeMap<String, BTreeMap<String, PropagationData>>,
    /// source -> targets
    outbound: BTreeMap<String, BTreeSet<String>>,
    revision: u64,
}

impl PropagationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the record for `(source, target)`. Empty data deletes it.
    /// Returns whether anything changed.
    pub fn replace(&mut self, data: PropagationData) -> bool {
        let existing = self
            .inbound
            .get(&data.target)
            .and_then(|sources| sources.get(&data.source));

        if data.is_empty() {
            if existing.is_none() {
                return false;
            }
            if let Some(sources) = self.inbound.get_mut(&data.target) {
                sources.remove(&data.source);
                if sources.is_empty() {
                    self.inbound.remove(&data.target);
                }
            }
            if let Some(targets) = self.outbound.get_mut(&data.source) {
                targets.remove(&data.target);
                if targets.is_empty() {
                    self.outbound.remove(&data.source);
                }
            }
        } else {
            if existing == Some(&data) {
                return false;
            }
            self.outbound
                .entry(data.source.clone())
                .or_default()
                .insert(data.target.clone());
            self.inbound
                .entry(data.target.clone())
                .or_default()
                .insert(data.source.clone(), data);
        }
        self.revision += 1;
        true
    }

    /// Total ranks granted to `target`.
    pub fn granted(&self, target: &str) -> i32 {
        self.sources(target).map(|d| d.grants).sum()
    }

    /// Discounts on `target`, ordered by source id.
    pub fn discounts(&self, target: &str) -> Vec<Discount> {
        self.sources(target)
            .flat_map(|d| d.discounts.iter().copied())
            .collect()
    }

    pub fn sources(&self, target: &str) -> impl Iterator<Item = &PropagationData> {
        self.inbound.get(target).into_iter().flat_map(BTreeMap::values)
    }

    /// Targets `source` currently contributes to.
    pub fn targets_of(&self, source: &str) -> BTreeSet<String> {
        self.outbound.get(source).cloned().unwrap_or_default()
    }

    /// Every id that currently receives something.
    pub fn targets(&self) -> impl Iterator<Item = &String> {
        self.inbound.keys()
    }

    /// Every id that currently contributes something.
    pub fn emitters(&self) -> impl Iterator<Item = &String> {
        self.outbound.keys()
    }

    /// Bumped on every effective change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn clear(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(source: &str, target: &str, grants: i32) -> PropagationData {
        PropagationData {
            grants,
            ..PropagationData::empty(source, target)
        }
    }

    #[test]
    fn replace_reports_effective_changes_only() {
        let mut store = PropagationStore::new();
        assert!(store.replace(grant("a", "b", 1)));
        assert!(!store.replace(grant("a", "b", 1)));
        assert!(store.replace(grant("a", "b", 2)));
        assert_eq!(store.granted("b"), 2);
        assert_eq!(store.revision(), 2);
    }

    #[test]
    fn grants_from_several_sources_add_up() {
        let mut store = PropagationStore::new();
        store.replace(grant("a", "t", 1));
        store.replace(grant("b", "t", 2));
        assert_eq!(store.granted("t"), 3);
        assert_eq!(store.targets_of("a").len(), 1);
    }

    #[test]
    fn empty_record_withdraws_contribution() {
        let mut store = PropagationStore::new();
        store.replace(grant("a", "b", 1));
        assert!(store.replace(PropagationData::empty("a", "b")));
        assert_eq!(store.granted("b"), 0);
        assert!(store.targets_of("a").is_empty());
        assert_eq!(store.targets().count(), 0);
        assert!(!store.replace(PropagationData::empty("a", "b")));
    }

    #[test]
    fn discounts_are_ordered_by_source() {
        let mut store = PropagationStore::new();
        store.replace(PropagationData {
            discounts: vec![Discount::new(2)],
            ..PropagationData::empty("z", "t")
        });
        store.replace(PropagationData {
            discounts: vec![Discount::new(1)],
            ..PropagationData::empty("a", "t")
        });
        let amounts: Vec<_> = store.discounts("t").iter().map(|d| d.discount).collect();
        assert_eq!(amounts, vec![1, 2]);
    }

    #[test]
    fn inactive_outbound_emits_withdrawals() {
        let mut outbound = Outbound::default();
        outbound.grant("b", 1);
        outbound.discount("c", Discount::new(1));
        let records = outbound.clone().into_records("a", true);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_empty()));
        let withdrawn = outbound.into_records("a", false);
        assert!(withdrawn.iter().all(PropagationData::is_empty));
    }
}
