//! Common error infrastructure for charsheet-core.
//!
//! Four failure families exist:
//!
//! - [`DefinitionError`]: a ruleset definition is malformed or references an
//!   unknown id. Raised only while loading, and collected per definition into
//!   [`DefinitionErrors`] so the rest of the ruleset still loads.
//! - [`RequestError`]: a mutation is structurally invalid (unknown feature,
//!   unknown choice, zero ranks). Converted into a failed [`Decision`].
//! - Validation failures: a mutation left the character globally invalid.
//!   These are plain failed decisions and trigger rollback.
//! - [`InternalFault`]: something unexpected happened during evaluation. Caught
//!   at the mutation boundary, converted into a failed [`Decision`], and the
//!   character is rolled back.
//!
//! [`LoadError`] covers character models that cannot be attached to a ruleset.

use crate::decision::Decision;
use crate::expr::ParseError;

/// Severity level of an error, used for categorization and logging priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSeverity {
    /// Invalid input that should be rejected without retry.
    Validation,

    /// Unexpected state inconsistency. These indicate bugs.
    Internal,

    /// The ruleset or character data cannot be used at all.
    Fatal,
}

impl ErrorSeverity {
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Common trait for all charsheet-core errors.
pub trait RulesError: core::fmt::Display + core::fmt::Debug {
    fn severity(&self) -> ErrorSeverity;

    /// Stable machine-readable code, e.g. `"DEFINITION_UNKNOWN_ID"`.
    fn error_code(&self) -> &'static str;
}

// ============================================================================
// Load-time errors
// ============================================================================

/// A single bad ruleset definition.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("{id}: could not be read: {message}")]
    Malformed { id: String, message: String },

    #[error("{id}: duplicate id")]
    DuplicateId { id: String },

    #[error("{id}: {field} references unknown id `{identifier}`")]
    UnknownIdentifier {
        id: String,
        field: &'static str,
        identifier: String,
    },

    #[error("{id}: choice `{choice}` uses unknown matcher strategy `{tag}`")]
    UnknownStrategy {
        id: String,
        choice: String,
        tag: String,
    },

    #[error("{id}: choice `{choice}`: {message}")]
    InvalidChoice {
        id: String,
        choice: String,
        message: String,
    },

    #[error("{id}: {message}")]
    Invalid { id: String, message: String },
}

impl DefinitionError {
    /// Id of the definition this error belongs to.
    pub fn definition_id(&self) -> &str {
        match self {
            Self::Malformed { id, .. }
            | Self::DuplicateId { id }
            | Self::UnknownIdentifier { id, .. }
            | Self::UnknownStrategy { id, .. }
            | Self::InvalidChoice { id, .. }
            | Self::Invalid { id, .. } => id,
        }
    }
}

impl RulesError for DefinitionError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Fatal
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "DEFINITION_MALFORMED",
            Self::DuplicateId { .. } => "DEFINITION_DUPLICATE_ID",
            Self::UnknownIdentifier { .. } => "DEFINITION_UNKNOWN_ID",
            Self::UnknownStrategy { .. } => "DEFINITION_UNKNOWN_STRATEGY",
            Self::InvalidChoice { .. } => "DEFINITION_INVALID_CHOICE",
            Self::Invalid { .. } => "DEFINITION_INVALID",
        }
    }
}

/// Every definition error found while loading one ruleset.
#[derive(Clone, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("{} ruleset definition error(s), first: {}", .0.len(), first_message(.0))]
pub struct DefinitionErrors(pub Vec<DefinitionError>);

fn first_message(errors: &[DefinitionError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

impl DefinitionErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefinitionError> {
        self.0.iter()
    }

    /// Errors reported against one definition id.
    pub fn for_id<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a DefinitionError> {
        self.0.iter().filter(move |e| e.definition_id() == id)
    }

    pub(crate) fn push(&mut self, error: DefinitionError) {
        self.0.push(error);
    }
}

// ============================================================================
// Request errors
// ============================================================================

/// A mutation or query that names something the ruleset does not have.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("unknown feature `{id}`")]
    UnknownFeature { id: String },

    #[error("`{id}` is an attribute, not a feature")]
    NotAFeature { id: String },

    #[error("`{id}` has no choice `{choice}`")]
    UnknownChoice { id: String, choice: String },

    #[error("`{id}` has no ranks, so choice `{choice}` is unavailable")]
    ChoiceUnavailable { id: String, choice: String },

    #[error("rank change for `{id}` must be non-zero")]
    ZeroRanks { id: String },

    #[error("rank change of {ranks} for `{id}` is out of range")]
    RankOutOfRange { id: String, ranks: i32 },

    #[error("`{id}`: an option is required")]
    OptionRequired { id: String },

    #[error("bad expression: {0}")]
    BadExpression(#[from] ParseError),
}

impl RulesError for RequestError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownFeature { .. } => "REQUEST_UNKNOWN_FEATURE",
            Self::NotAFeature { .. } => "REQUEST_NOT_A_FEATURE",
            Self::UnknownChoice { .. } => "REQUEST_UNKNOWN_CHOICE",
            Self::ChoiceUnavailable { .. } => "REQUEST_CHOICE_UNAVAILABLE",
            Self::ZeroRanks { .. } => "REQUEST_ZERO_RANKS",
            Self::RankOutOfRange { .. } => "REQUEST_RANK_OUT_OF_RANGE",
            Self::OptionRequired { .. } => "REQUEST_OPTION_REQUIRED",
            Self::BadExpression(_) => "REQUEST_BAD_EXPRESSION",
        }
    }
}

impl From<RequestError> for Decision {
    fn from(error: RequestError) -> Self {
        Decision::fail(error.to_string())
    }
}

// ============================================================================
// Internal faults
// ============================================================================

/// Unexpected failure during evaluation.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InternalFault {
    #[error("propagation from `{source_id}` exceeded depth {depth}")]
    PropagationTooDeep { source_id: String, depth: usize },

    #[error("propagation did not settle after {passes} passes")]
    Unsettled { passes: usize },

    #[error("panic during {phase}: {message}")]
    Panicked { phase: &'static str, message: String },
}

impl RulesError for InternalFault {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Internal
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::PropagationTooDeep { .. } => "INTERNAL_PROPAGATION_TOO_DEEP",
            Self::Unsettled { .. } => "INTERNAL_UNSETTLED",
            Self::Panicked { .. } => "INTERNAL_PANIC",
        }
    }
}

impl From<InternalFault> for Decision {
    fn from(fault: InternalFault) -> Self {
        Decision::fail(format!("Internal error: {fault}"))
    }
}

// ============================================================================
// Character load errors
// ============================================================================

/// A serialized character could not be attached to the loaded ruleset.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("character belongs to ruleset `{found}`, not `{expected}`")]
    RulesetMismatch { expected: String, found: String },

    #[error("character was saved with ruleset version {found}, newer than loaded version {loaded}")]
    VersionTooNew { loaded: String, found: String },

    #[error("malformed character data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("character could not be reconciled: {0}")]
    Reconcile(#[from] InternalFault),
}

impl RulesError for LoadError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Reconcile(_) => ErrorSeverity::Internal,
            _ => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::RulesetMismatch { .. } => "LOAD_RULESET_MISMATCH",
            Self::VersionTooNew { .. } => "LOAD_VERSION_TOO_NEW",
            Self::Malformed(_) => "LOAD_MALFORMED",
            Self::Reconcile(_) => "LOAD_RECONCILE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_errors_become_failed_decisions() {
        let decision = Decision::from(RequestError::UnknownFeature { id: "nope".into() });
        assert!(!decision.success);
        assert_eq!(decision.reason_str(), "unknown feature `nope`");
    }

    #[test]
    fn internal_faults_are_flagged_internal() {
        let fault = InternalFault::PropagationTooDeep {
            source_id: "a".into(),
            depth: 64,
        };
        assert!(fault.severity().is_internal());
        assert_eq!(fault.error_code(), "INTERNAL_PROPAGATION_TOO_DEEP");
        assert!(Decision::from(fault).reason_str().starts_with("Internal error"));
    }

    #[test]
    fn definition_errors_filter_by_id() {
        let errors = DefinitionErrors(vec![
            DefinitionError::DuplicateId { id: "a".into() },
            DefinitionError::Invalid {
                id: "b".into(),
                message: "bad".into(),
            },
        ]);
        assert_eq!(errors.for_id("b").count(), 1);
        assert!(errors.to_string().starts_with("2 ruleset definition error(s)"));
        assert_eq!(ErrorSeverity::Fatal.to_string(), "fatal");
    }
}
