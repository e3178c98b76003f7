//! Property graph: read-only controllers over a character.
//!
//! Controllers are short-lived views borrowed from a
//! [`CharacterController`](crate::engine::CharacterController). They compute
//! values and answer `can_*` questions; every mutation goes through the
//! character controller itself.

pub mod attribute;
pub mod feature;
pub mod propagation;
pub mod template;

mod cache;

pub use attribute::AttributeController;
pub use feature::FeatureController;
pub use propagation::{Outbound, PropagationData, PropagationStore};
pub use template::OptionTemplateController;

pub(crate) use cache::GenerationCache;

use crate::decision::Decision;
use crate::ruleset::FeatureDefinition;

/// Any node that has a value.
pub trait PropertyController {
    /// Identity of the node (`id`, `id+Option`, `id.attr`).
    fn full_id(&self) -> &str;

    fn value(&self) -> i32;

    /// Best single-instance value; equal to [`value`](Self::value) for
    /// properties that only ever have one instance.
    fn max_value(&self) -> i32 {
        self.value()
    }
}

/// A feature node, either a concrete feature or an option template.
pub trait FeatureNode: PropertyController {
    fn definition(&self) -> &FeatureDefinition;

    fn is_option_template(&self) -> bool {
        false
    }

    fn purchased_ranks(&self) -> i32;

    fn granted_ranks(&self) -> i32;

    fn paid_ranks(&self) -> i32;

    fn max_ranks(&self) -> i32;

    /// Currency spent on the node after discounts.
    fn cost(&self) -> i32;

    fn can_increase(&self, ranks: i32) -> Decision;

    fn can_decrease(&self, ranks: i32) -> Decision;

    /// Human-readable breakdown of how the node got its value.
    fn explain(&self) -> Vec<String>;
}
