//! The unified error type for prompt composition, coalescing, and streaming.

use thiserror::Error;

use crate::types::role::{CompletionKind, Role};

/// Errors produced by the composition engine and the completion stream.
///
/// The taxonomy splits into three groups:
/// - composition errors: local, deterministic, caller-fixable;
/// - merge/coalescing errors: invariant violations while combining values;
/// - stream errors: source failures and misuse of the stream lifecycle.
#[derive(Error, Debug)]
pub enum PromptError {
    /// A chat conversion encountered a non-whitespace component with no
    /// resolvable role while other components carry roles.
    #[error("Role missing for a non-whitespace prompt component")]
    RoleMissing,

    /// Kind inference over the composed components did not collapse to a
    /// single completion kind.
    #[error("Ambiguous completion type: components do not agree on text vs. chat")]
    AmbiguousCompletionKind,

    /// A role constraint filtered down to an empty acceptable set for the
    /// requested completion kind.
    #[error("No clear role selection for {0} completion")]
    NoClearRoleSelection(CompletionKind),

    /// More than one role of the requested completion kind remained
    /// acceptable, so the constraint cannot pick one.
    #[error("Unsupported completion type: {0} does not identify a single role")]
    UnsupportedCompletionKind(CompletionKind),

    /// A structural precondition was violated while building a prompt
    /// (e.g. a function call authored by a non-assistant role).
    #[error("Illegal prompt composition: {0}")]
    IllegalComposition(String),

    /// A composition form that is recognized but not supported yet.
    ///
    /// The core never raises this; it is reserved for collaborators
    /// layering richer payload forms (e.g. additional media kinds) on top
    /// of the shared taxonomy.
    #[error("Unimplemented prompt form: {0}")]
    Unimplemented(String),

    /// A lazy variable was still unresolved at degeneration time.
    #[error("Dynamic variable unresolved: {name}")]
    UnresolvedVariable {
        /// Diagnostic name of the offending variable.
        name: String,
    },

    /// Two context maps carry inequal, non-mergeable values for the same key.
    #[error("Context merge conflict on key `{key}`")]
    ContextConflict {
        /// Type name of the colliding context key.
        key: &'static str,
    },

    /// Merging two role constraints produced an empty acceptable set.
    #[error("Unsatisfiable role constraint: merging `{left}` with `{right}` leaves no role")]
    UnsatisfiableConstraint {
        left: String,
        right: String,
    },

    /// Two partials carry different non-nil identities.
    #[error("Identity mismatch while coalescing: {left} != {right}")]
    IdentityMismatch {
        left: String,
        right: String,
    },

    /// Two partials (or messages) carry different non-nil roles.
    #[error("Role mismatch while coalescing: {left} != {right}")]
    RoleMismatch {
        left: Role,
        right: Role,
    },

    /// Delta events arrived out of source order.
    #[error("Non-monotonic partial index: {previous} then {next}")]
    NonMonotonicIndex {
        previous: u64,
        next: u64,
    },

    /// A whole/delta combination that the coalescing law does not define.
    ///
    /// Unreachable through the closed `PartialKind` set; reserved for event
    /// translators reporting malformed vendor partials.
    #[error("Illegal coalescence: {0}")]
    IllegalCoalescence(String),

    /// A message may carry at most one function call or one function result;
    /// merging a second one is not defined.
    #[error("A message may carry at most one function {0}")]
    DuplicateFunctionCall(&'static str),

    /// Multi-way coalescing of completion partials has no defined semantics
    /// and is rejected unconditionally.
    #[error("Coalescing a sequence of completion partials is unsupported")]
    UnsupportedCompletionCoalescing,

    /// A completion stream is single-consumer; a second subscription was
    /// attempted while the first is (or was) active.
    #[error("Completion stream already subscribed; construct a new stream to re-drive")]
    AlreadySubscribed,

    /// The stream reached a terminal state and cannot deliver further values.
    #[error("Completion stream is closed ({0})")]
    StreamClosed(&'static str),

    /// Failure reported by the collaborator-supplied event source, wrapped
    /// without reinterpretation.
    #[error("Event source error: {0}")]
    Source(String),

    /// JSON (de)serialization failure for function-call payloads.
    #[error("JSON error: {0}")]
    Json(String),
}

impl PromptError {
    /// Shorthand for an [`PromptError::IllegalComposition`].
    pub fn illegal(message: impl Into<String>) -> Self {
        Self::IllegalComposition(message.into())
    }

    /// Shorthand for a wrapped event-source failure.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }

    /// True for local, deterministic composition errors that the caller can
    /// fix by changing the composed prompt.
    pub const fn is_composition_error(&self) -> bool {
        matches!(
            self,
            Self::RoleMissing
                | Self::AmbiguousCompletionKind
                | Self::NoClearRoleSelection(_)
                | Self::UnsupportedCompletionKind(_)
                | Self::IllegalComposition(_)
                | Self::Unimplemented(_)
                | Self::UnresolvedVariable { .. }
                | Self::ContextConflict { .. }
                | Self::UnsatisfiableConstraint { .. }
        )
    }

    /// True for invariant violations while merging partials or contexts.
    pub const fn is_coalescing_error(&self) -> bool {
        matches!(
            self,
            Self::IdentityMismatch { .. }
                | Self::RoleMismatch { .. }
                | Self::NonMonotonicIndex { .. }
                | Self::IllegalCoalescence(_)
                | Self::DuplicateFunctionCall(_)
        )
    }

    /// True for misuse of the API surface rather than bad runtime data.
    pub const fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadySubscribed | Self::UnsupportedCompletionCoalescing
        )
    }
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, PromptError>;
