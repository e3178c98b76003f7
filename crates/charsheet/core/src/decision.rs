//! The universal result value returned by every query and mutation.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Outcome of a query (`can_increase`, requirement evaluation) or a mutation.
///
/// `Decision` is plain data: it is returned, never raised, and serializes
/// with serde so callers can hand it to a UI as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub success: bool,

    /// Set when the only thing missing is an option choice.
    #[serde(default)]
    pub needs_option: bool,

    /// Human-readable explanation, usually present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// For hypothetical checks: how much of the request could be satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i32>,

    /// Currency needed to go through with the request, by currency id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub need_currency: BTreeMap<String, i32>,

    /// True when a mutation changed (and committed) the character model.
    #[serde(default)]
    pub mutation_applied: bool,

    /// Source location where a failure was produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl Decision {
    pub const OK: Decision = Decision {
        success: true,
        needs_option: false,
        reason: None,
        amount: None,
        need_currency: BTreeMap::new(),
        mutation_applied: false,
        trace: None,
    };

    pub const MUTATED: Decision = Decision {
        success: true,
        needs_option: false,
        reason: None,
        amount: None,
        need_currency: BTreeMap::new(),
        mutation_applied: true,
        trace: None,
    };

    /// The request is acceptable once an option is supplied.
    pub const NEEDS_OPTION: Decision = Decision {
        success: true,
        needs_option: true,
        reason: None,
        amount: None,
        need_currency: BTreeMap::new(),
        mutation_applied: false,
        trace: None,
    };

    pub const NO: Decision = Decision {
        success: false,
        needs_option: false,
        reason: None,
        amount: None,
        need_currency: BTreeMap::new(),
        mutation_applied: false,
        trace: None,
    };

    /// Creates a failed decision, recording the caller's location as trace.
    #[track_caller]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            trace: Some(Location::caller().to_string()),
            ..Self::NO
        }
    }

    /// Attaches an amount (builder pattern).
    #[must_use]
    pub fn with_amount(mut self, amount: i32) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Records currency needed for the request (builder pattern).
    #[must_use]
    pub fn with_need_currency(mut self, currency: impl Into<String>, amount: i32) -> Self {
        self.need_currency.insert(currency.into(), amount);
        self
    }

    /// Marks the decision as having mutated the model (builder pattern).
    #[must_use]
    pub fn applied(mut self) -> Self {
        self.mutation_applied = true;
        self
    }

    #[must_use]
    pub fn without_trace(mut self) -> Self {
        self.trace = None;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Reason text, or an empty string for successes.
    pub fn reason_str(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }
}

impl From<bool> for Decision {
    fn from(success: bool) -> Self {
        if success { Decision::OK } else { Decision::NO }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reason, self.success) {
            (Some(reason), _) => f.write_str(reason),
            (None, true) if self.needs_option => f.write_str("needs option"),
            (None, true) => f.write_str("ok"),
            (None, false) => f.write_str("failed"),
        }
    }
}
