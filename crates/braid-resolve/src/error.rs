//! Resolution errors.
//!
//! User errors describe programs the resolver rejects and always carry the
//! source span of the offending construct. Internal errors mean the AST
//! handed over by earlier passes broke an invariant; they are wrapped into
//! [`ResolveError::Internal`] so callers see a single error type.

use braid_common::Span;
use thiserror::Error;

/// A violated invariant of the incoming AST.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InternalError {
    #[error("formal `{formal}` of `{function}` has no type annotation")]
    MissingFormalAnnotation { function: String, formal: String, span: Span },

    #[error("function `{function}` has no return type annotation")]
    MissingReturnAnnotation { function: String, span: Span },

    #[error("cannot equate terms with {left} and {right} children")]
    MismatchedShape { left: usize, right: usize },

    #[error("unsupported where-clause constraint `{what}`")]
    UnsupportedWhereClause { what: String, span: Span },

    #[error("reference to unresolved name `{name}`")]
    UnresolvedReference { name: String, span: Span },

    #[error("definition of `{name}` has neither a type nor an initializer")]
    EmptyDefinition { name: String, span: Span },

    #[error("not implemented: {what}")]
    Unimplemented { what: String, span: Span },
}

impl InternalError {
    pub fn span(&self) -> Option<Span> {
        match self {
            InternalError::MissingFormalAnnotation { span, .. }
            | InternalError::MissingReturnAnnotation { span, .. }
            | InternalError::UnsupportedWhereClause { span, .. }
            | InternalError::UnresolvedReference { span, .. }
            | InternalError::EmptyDefinition { span, .. }
            | InternalError::Unimplemented { span, .. } => Some(*span),
            InternalError::MismatchedShape { .. } => None,
        }
    }
}

/// Any error produced by resolution or early verification.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unresolved call `{name}({})`", .arg_types.join(", "))]
    UnresolvedCall { name: String, arg_types: Vec<String>, span: Span },

    #[error("ambiguous call `{name}({})`", .arg_types.join(", "))]
    AmbiguousCall {
        name: String,
        arg_types: Vec<String>,
        /// Signatures of the surviving candidates.
        candidates: Vec<String>,
        span: Span,
    },

    #[error("conflicting return types in `{function}`: {first} and {second}")]
    ReturnTypeConflict { function: String, first: String, second: String, span: Span },

    #[error("no function `{name}` matches the call signature")]
    SignatureMismatch { name: String, span: Span },

    #[error("returned value does not have the declared return type of `{function}`")]
    ReturnMismatch { function: String, span: Span },

    #[error("initializer of `{name}` does not match its declared type")]
    DeclarationMismatch { name: String, span: Span },

    #[error("entry point `{name}` not found")]
    MissingEntryPoint { name: String },

    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

impl ResolveError {
    pub fn is_internal(&self) -> bool {
        matches!(self, ResolveError::Internal(_))
    }

    /// Primary source span, if the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            ResolveError::UnresolvedCall { span, .. }
            | ResolveError::AmbiguousCall { span, .. }
            | ResolveError::ReturnTypeConflict { span, .. }
            | ResolveError::SignatureMismatch { span, .. }
            | ResolveError::ReturnMismatch { span, .. }
            | ResolveError::DeclarationMismatch { span, .. } => Some(*span),
            ResolveError::MissingEntryPoint { .. } => None,
            ResolveError::Internal(err) => err.span(),
        }
    }
}
