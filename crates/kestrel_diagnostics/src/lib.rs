//! kestrel_diagnostics: Diagnostic messages and error reporting.
//!
//! Every user-facing error the resolver can raise has a numbered entry in
//! [`messages`]. A [`Diagnostic`] is a realized message: template arguments
//! substituted, source span attached.

use kestrel_core::text::{LineMap, TextSpan};
use std::fmt;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Message,
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticCategory::Warning => write!(f, "warning"),
            DiagnosticCategory::Error => write!(f, "error"),
            DiagnosticCategory::Message => write!(f, "message"),
        }
    }
}

/// A message template with a code and category.
#[derive(Debug, Clone)]
pub struct DiagnosticMessage {
    /// Numeric code, rendered as `KS<code>`.
    pub code: u32,
    pub category: DiagnosticCategory,
    /// Template text; `{0}`, `{1}`, ... are replaced by arguments.
    pub message: &'static str,
}

/// A realized diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub file: Option<String>,
    pub span: Option<TextSpan>,
    pub message_text: String,
    pub code: u32,
    pub category: DiagnosticCategory,
    /// Secondary locations, e.g. the earlier declaration in a name conflict.
    pub related_information: Vec<Diagnostic>,
}

impl Diagnostic {
    /// A diagnostic with no location.
    pub fn new(message: &DiagnosticMessage, args: &[&str]) -> Self {
        Self {
            file: None,
            span: None,
            message_text: format_message(message.message, args),
            code: message.code,
            category: message.category,
            related_information: Vec::new(),
        }
    }

    /// A diagnostic at `span` in the file currently being resolved.
    pub fn at(span: TextSpan, message: &DiagnosticMessage, args: &[&str]) -> Self {
        Self {
            span: Some(span),
            ..Self::new(message, args)
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_related(mut self, related: Diagnostic) -> Self {
        self.related_information.push(related);
        self
    }

    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }

    /// Render with a line/column position taken from `lines`.
    pub fn render(&self, lines: &LineMap) -> String {
        let mut out = String::new();
        if let Some(ref file) = self.file {
            out.push_str(file);
        }
        if let Some(span) = self.span {
            out.push_str(&format!("({})", lines.location(span.start)));
        }
        if !out.is_empty() {
            out.push_str(": ");
        }
        out.push_str(&format!("{} KS{}: {}", self.category, self.code, self.message_text));
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}", file)?;
            if let Some(span) = self.span {
                write!(f, "({})", span.start)?;
            }
            write!(f, ": ")?;
        } else if let Some(span) = self.span {
            write!(f, "{}: ", span)?;
        }
        write!(f, "{} KS{}: {}", self.category, self.code, self.message_text)
    }
}

/// Substitute `{0}`, `{1}`, ... in `template`.
pub fn format_message(template: &str, args: &[&str]) -> String {
    let mut result = template.to_string();
    for (i, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{}}}", i), arg);
    }
    result
}

/// Diagnostics accumulated while a compilation unit is resolved.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticCollection {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollection {
    pub fn new() -> Self {
        Self {
            diagnostics: Vec::new(),
        }
    }

    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn extend(&mut self, other: DiagnosticCollection) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// Order by file, then by position.
    pub fn sort(&mut self) {
        self.diagnostics.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then_with(|| a.span.map(|s| s.start).cmp(&b.span.map(|s| s.start)))
        });
    }
}

// ============================================================================
// Diagnostic messages
// ============================================================================

pub mod messages {
    use super::*;

    macro_rules! diag {
        ($code:expr, Error, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Error, message: $msg }
        };
        ($code:expr, Warning, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Warning, message: $msg }
        };
        ($code:expr, Message, $msg:expr) => {
            DiagnosticMessage { code: $code, category: DiagnosticCategory::Message, message: $msg }
        };
    }

    // ========================================================================
    // Name resolution (2000-2099)
    // ========================================================================
    pub const UNDEFINED_SYMBOL_0: DiagnosticMessage = diag!(2001, Error, "Undefined symbol '{0}'.");
    pub const NAMES_CONFLICT_0: DiagnosticMessage = diag!(2002, Error, "Name '{0}' is already declared as a different kind of symbol.");
    pub const CANNOT_ENTER_0: DiagnosticMessage = diag!(2003, Error, "Cannot enter '{0}': no such declaration in the current scope.");
    pub const UNDEFINED_LABEL_0: DiagnosticMessage = diag!(2004, Error, "Label '{0}' does not name an enclosing block.");
    pub const CANNOT_CAPTURE_0: DiagnosticMessage = diag!(2005, Error, "'{0}' cannot be captured by a closure.");
    pub const INVALID_NUMERIC_LITERAL_0: DiagnosticMessage = diag!(2006, Error, "Invalid numeric literal '{0}'.");
    pub const NOT_A_VALUE_0: DiagnosticMessage = diag!(2007, Error, "'{0}' does not name a value.");
    pub const DESTROYED_SCOPE_0: DiagnosticMessage = diag!(2008, Error, "Reference to destroyed scope {0}.");

    // ========================================================================
    // Scope misuse (2100-2199)
    // ========================================================================
    pub const INVALID_SCOPE_FOR_MEMBER_0: DiagnosticMessage = diag!(2101, Error, "Invalid scope for class member '{0}' registration.");
    pub const INVALID_SCOPE_FOR_METHOD_0: DiagnosticMessage = diag!(2102, Error, "Invalid scope for class method '{0}' registration.");
    pub const INVALID_SCOPE_FOR_PROPERTY_0: DiagnosticMessage = diag!(2103, Error, "Invalid scope for class property '{0}' registration.");
    pub const INVALID_SCOPE_FOR_NATIVE_METHOD_0: DiagnosticMessage = diag!(2104, Error, "Native method '{0}' registered outside of a class.");
    pub const NAMESPACES_ONLY_AT_GLOBAL_SCOPE_0: DiagnosticMessage = diag!(2105, Error, "Namespace '{0}' can only be declared at global or namespace scope.");
    pub const INVALID_SCOPE_FOR_INHERITANCE_0: DiagnosticMessage = diag!(2106, Error, "Parent class '{0}' given outside of a class declaration.");

    // ========================================================================
    // Classes (2200-2299)
    // ========================================================================
    pub const SYMBOL_0_IS_NOT_A_CLASS: DiagnosticMessage = diag!(2201, Error, "Symbol '{0}' is not a class.");
    pub const CLASS_0_IS_NOT_DEFINED_YET: DiagnosticMessage = diag!(2202, Error, "Class '{0}' is not defined yet.");
    pub const CANNOT_OVERRIDE_NON_METHOD_0_IN_CLASS_1: DiagnosticMessage = diag!(2203, Error, "Cannot override non-method '{0}' in class '{1}'.");
    pub const ATTRIBUTE_0_CANNOT_BE_OVERRIDDEN: DiagnosticMessage = diag!(2204, Error, "Attribute '{0}' is already set and cannot be overridden.");

    // ========================================================================
    // Configuration (5000-5099)
    // ========================================================================
    pub const INVALID_RESOLVER_OPTION_0_1: DiagnosticMessage = diag!(5001, Error, "Invalid resolver option '{0}': {1}.");

    // ========================================================================
    // Informational (6000+)
    // ========================================================================
    pub const PREVIOUS_DECLARATION_OF_0: DiagnosticMessage = diag!(6001, Message, "'{0}' was previously declared here.");
    pub const SHADOWED_LOCAL_0: DiagnosticMessage = diag!(6002, Warning, "Declaration of '{0}' shadows an outer binding.");
}
