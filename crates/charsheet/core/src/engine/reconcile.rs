//! Re-derivation of propagation after a change.
//!
//! `reconcile` recomputes what one feature pushes to others and cascades to
//! every target whose inbound data actually changed. `reconcile_all` repeats
//! that over the whole character until the propagation store stops changing,
//! which also settles conditional grants whose requirements depend on values
//! elsewhere in the graph.

use std::collections::BTreeSet;

use super::CharacterController;
use crate::error::InternalFault;
use crate::expr::PropExpression;
use crate::graph::{Outbound, PropagationData, PropertyController};

/// Source id for grants the game applies through character metadata.
pub const PLOT_SOURCE: &str = "#plot";

impl CharacterController {
    /// Re-derives one feature: tidies its model entry and pushes its grants
    /// and discounts.
    pub fn reconcile(&mut self, full_id: &str) -> Result<(), InternalFault> {
        self.reconcile_at(full_id, 0)
    }

    fn reconcile_at(&mut self, full_id: &str, depth: usize) -> Result<(), InternalFault> {
        if depth > self.config().max_propagation_depth {
            return Err(InternalFault::PropagationTooDeep {
                source_id: full_id.to_owned(),
                depth,
            });
        }
        let Ok(expr) = PropExpression::parse(full_id) else {
            return Ok(());
        };
        if expr.attribute.is_some() {
            return Ok(());
        }

        self.invalidate();
        let (value, records) = match self.concrete(&expr) {
            Ok(feature) => (feature.value(), feature.outbound_records()),
            // attributes, templates and ids the ruleset no longer has
            Err(_) => return Ok(()),
        };

        if let Some(entry) = self.model.features.get_mut(full_id) {
            entry.choices.retain(|_, taken| !taken.is_empty());
            if !entry.should_keep() {
                self.model.features.remove(full_id);
            }
        }
        tracing::trace!(id = full_id, value, records = records.len(), depth, "reconcile");
        self.push(full_id, records, depth)
    }

    /// Replaces `source`'s records, withdrawing from targets it no longer
    /// reaches, and cascades to every target that changed.
    fn push(
        &mut self,
        source: &str,
        mut records: Vec<PropagationData>,
        depth: usize,
    ) -> Result<(), InternalFault> {
        let current: BTreeSet<&str> = records.iter().map(|r| r.target.as_str()).collect();
        let stale: Vec<String> = self
            .propagation
            .targets_of(source)
            .into_iter()
            .filter(|target| !current.contains(target.as_str()))
            .collect();
        records.extend(
            stale
                .into_iter()
                .map(|target| PropagationData::empty(source, target)),
        );

        for record in records {
            let to = record.target.clone();
            let grants = record.grants;
            if self.propagation.replace(record) {
                tracing::trace!(from = source, to = %to, grants, "propagated");
                self.invalidate();
                self.reconcile_at(&to, depth + 1)?;
            }
        }
        Ok(())
    }

    /// Pushes the metadata-level grants from the virtual plot source.
    fn reconcile_plot(&mut self) -> Result<(), InternalFault> {
        let mut outbound = Outbound::default();
        for (target, amount) in &self.model.metadata.grants {
            outbound.grant(target.full_id(), *amount);
        }
        let records = outbound.into_records(PLOT_SOURCE, true);
        self.push(PLOT_SOURCE, records, 0)
    }

    /// Reconciles every feature until propagation settles.
    pub fn reconcile_all(&mut self) -> Result<(), InternalFault> {
        let passes = self.config().max_propagation_depth.max(1);
        for pass in 0..passes {
            let revision = self.propagation.revision();
            self.reconcile_plot()?;

            let ids: BTreeSet<String> = self
                .model
                .features
                .keys()
                .chain(self.propagation.targets())
                .chain(self.propagation.emitters())
                .filter(|id| id.as_str() != PLOT_SOURCE)
                .cloned()
                .collect();
            for id in ids {
                self.reconcile_at(&id, 0)?;
            }

            if self.propagation.revision() == revision {
                tracing::trace!(pass, "propagation settled");
                return Ok(());
            }
        }
        Err(InternalFault::Unsettled { passes })
    }
}
