//! Errors raised while resolving and while moving program images.

use std::fmt;

use kestrel_core::{ExpiredHandle, TextSpan};
use kestrel_diagnostics::{messages, Diagnostic};
use thiserror::Error;

/// The registration that was attempted in the wrong kind of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeOperation {
    Member,
    Method,
    Property,
    NativeMethod,
    Namespace,
    Inheritance,
}

impl fmt::Display for ScopeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ScopeOperation::Member => "class member",
            ScopeOperation::Method => "class method",
            ScopeOperation::Property => "class property",
            ScopeOperation::NativeMethod => "native method",
            ScopeOperation::Namespace => "namespace",
            ScopeOperation::Inheritance => "parent class",
        };
        f.write_str(text)
    }
}

/// A semantic error in the program being resolved.
///
/// The call that returns one leaves the context usable, so a driver may keep
/// going and collect further errors as [`Diagnostic`]s.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("undefined symbol '{name}'")]
    UndefinedSymbol { name: String, span: TextSpan },

    #[error("symbol '{name}' is not a class")]
    NotAClass { name: String, span: TextSpan },

    #[error("class '{name}' is not defined yet")]
    ClassNotDefined { name: String, span: TextSpan },

    #[error("'{name}' conflicts with an existing declaration")]
    NameConflict { name: String, span: TextSpan },

    #[error("invalid scope for {operation} '{name}'")]
    InvalidScope {
        operation: ScopeOperation,
        name: String,
        span: TextSpan,
    },

    #[error("cannot override non-method '{name}' in class '{class}'")]
    OverrideNonMethod {
        name: String,
        class: String,
        span: TextSpan,
    },

    #[error("cannot enter '{name}'")]
    CannotEnter { name: String, span: TextSpan },

    #[error("attribute '{name}' cannot be overridden")]
    AttributeOverride { name: String, span: TextSpan },

    #[error("invalid numeric literal '{text}'")]
    InvalidLiteral { text: String, span: TextSpan },

    #[error("label '{name}' does not name an enclosing block")]
    UndefinedLabel { name: String, span: TextSpan },

    #[error("'{name}' does not name a value")]
    NotAValue { name: String, span: TextSpan },

    #[error("'{name}' cannot be captured by a closure")]
    CannotCapture { name: String, span: TextSpan },

    #[error(transparent)]
    Expired(#[from] ExpiredHandle),
}

impl ResolveError {
    pub fn span(&self) -> Option<TextSpan> {
        match self {
            ResolveError::UndefinedSymbol { span, .. }
            | ResolveError::NotAClass { span, .. }
            | ResolveError::ClassNotDefined { span, .. }
            | ResolveError::NameConflict { span, .. }
            | ResolveError::InvalidScope { span, .. }
            | ResolveError::OverrideNonMethod { span, .. }
            | ResolveError::CannotEnter { span, .. }
            | ResolveError::AttributeOverride { span, .. }
            | ResolveError::InvalidLiteral { span, .. }
            | ResolveError::UndefinedLabel { span, .. }
            | ResolveError::NotAValue { span, .. }
            | ResolveError::CannotCapture { span, .. } => Some(*span),
            ResolveError::Expired(_) => None,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let diagnostic = match self {
            ResolveError::UndefinedSymbol { name, .. } => {
                Diagnostic::new(&messages::UNDEFINED_SYMBOL_0, &[name.as_str()])
            }
            ResolveError::NotAClass { name, .. } => {
                Diagnostic::new(&messages::SYMBOL_0_IS_NOT_A_CLASS, &[name.as_str()])
            }
            ResolveError::ClassNotDefined { name, .. } => {
                Diagnostic::new(&messages::CLASS_0_IS_NOT_DEFINED_YET, &[name.as_str()])
            }
            ResolveError::NameConflict { name, .. } => {
                Diagnostic::new(&messages::NAMES_CONFLICT_0, &[name.as_str()])
            }
            ResolveError::InvalidScope { operation, name, .. } => {
                let message = match operation {
                    ScopeOperation::Member => &messages::INVALID_SCOPE_FOR_MEMBER_0,
                    ScopeOperation::Method => &messages::INVALID_SCOPE_FOR_METHOD_0,
                    ScopeOperation::Property => &messages::INVALID_SCOPE_FOR_PROPERTY_0,
                    ScopeOperation::NativeMethod => &messages::INVALID_SCOPE_FOR_NATIVE_METHOD_0,
                    ScopeOperation::Namespace => &messages::NAMESPACES_ONLY_AT_GLOBAL_SCOPE_0,
                    ScopeOperation::Inheritance => &messages::INVALID_SCOPE_FOR_INHERITANCE_0,
                };
                Diagnostic::new(message, &[name.as_str()])
            }
            ResolveError::OverrideNonMethod { name, class, .. } => {
                Diagnostic::new(&messages::CANNOT_OVERRIDE_NON_METHOD_0_IN_CLASS_1, &[name.as_str(), class.as_str()])
            }
            ResolveError::CannotEnter { name, .. } => {
                Diagnostic::new(&messages::CANNOT_ENTER_0, &[name.as_str()])
            }
            ResolveError::AttributeOverride { name, .. } => {
                Diagnostic::new(&messages::ATTRIBUTE_0_CANNOT_BE_OVERRIDDEN, &[name.as_str()])
            }
            ResolveError::InvalidLiteral { text, .. } => {
                Diagnostic::new(&messages::INVALID_NUMERIC_LITERAL_0, &[text.as_str()])
            }
            ResolveError::UndefinedLabel { name, .. } => {
                Diagnostic::new(&messages::UNDEFINED_LABEL_0, &[name.as_str()])
            }
            ResolveError::NotAValue { name, .. } => {
                Diagnostic::new(&messages::NOT_A_VALUE_0, &[name.as_str()])
            }
            ResolveError::CannotCapture { name, .. } => {
                Diagnostic::new(&messages::CANNOT_CAPTURE_0, &[name.as_str()])
            }
            ResolveError::Expired(expired) => {
                let handle = format!("#{}v{}", expired.slot, expired.generation);
                Diagnostic::new(&messages::DESTROYED_SCOPE_0, &[handle.as_str()])
            }
        };
        match self.span() {
            Some(span) => Diagnostic {
                span: Some(span),
                ..diagnostic
            },
            None => diagnostic,
        }
    }
}

/// Failure to write or read a program image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to encode or decode program image: {0}")]
    Json(#[from] serde_json::Error),

    #[error("program image i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported program image version {found}, expected {expected}")]
    Version { found: u32, expected: u32 },

    #[error("program image name table is corrupt")]
    Atoms,

    #[error("program image has a dangling reference: {0}")]
    Dangling(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_carries_span_and_code() {
        let err = ResolveError::OverrideNonMethod {
            name: "legs".to_string(),
            class: "Dog".to_string(),
            span: TextSpan::new(12, 4),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.code, 2203);
        assert_eq!(diag.span, Some(TextSpan::new(12, 4)));
        assert_eq!(diag.message_text, "Cannot override non-method 'legs' in class 'Dog'.");
    }

    #[test]
    fn test_invalid_scope_messages_per_operation() {
        let err = ResolveError::InvalidScope {
            operation: ScopeOperation::Method,
            name: "speak".to_string(),
            span: TextSpan::synthetic(),
        };
        assert_eq!(err.to_string(), "invalid scope for class method 'speak'");
        assert_eq!(err.to_diagnostic().code, 2102);
    }
}
