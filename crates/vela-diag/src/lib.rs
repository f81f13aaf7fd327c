//! Error reporting and diagnostics for Vela.
//!
//! This crate provides structured diagnostics with source location tracking.
//! The key invariant: no raw type variables in user-facing output — callers
//! substitute and canonicalize before rendering.
//!
//! Diagnostics are created by other crates (for example, `vela-solve`) and
//! rendered here for display.

use std::fmt;

// ---------------------------------------------------------------------------
// Diagnostic severity and categories
// ---------------------------------------------------------------------------

/// How severe a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Broad category for diagnostics. Used for filtering and grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Type mismatch: expected X, got Y.
    TypeMismatch,
    /// Expression admits more than one best typing.
    AmbiguousExpression,
    /// A type variable could not be resolved to a concrete type.
    UnresolvedTypeVariable,
    /// A type does not conform to a required protocol.
    ConformanceFailure,
    /// A named member does not exist on the base type.
    MemberNotFound,
    /// Occurs check: a type would have to contain itself.
    RecursiveType,
    /// A function was applied to arguments it cannot accept.
    InvalidApplication,
    /// General type error.
    TypeError,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::TypeMismatch,
        Category::AmbiguousExpression,
        Category::UnresolvedTypeVariable,
        Category::ConformanceFailure,
        Category::MemberNotFound,
        Category::RecursiveType,
        Category::InvalidApplication,
        Category::TypeError,
    ];

    pub fn all() -> &'static [Category] {
        &Self::ALL
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::TypeMismatch => "type_mismatch",
            Category::AmbiguousExpression => "ambiguous_expression",
            Category::UnresolvedTypeVariable => "unresolved_type_variable",
            Category::ConformanceFailure => "conformance_failure",
            Category::MemberNotFound => "member_not_found",
            Category::RecursiveType => "recursive_type",
            Category::InvalidApplication => "invalid_application",
            Category::TypeError => "type_error",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Category::TypeMismatch => "E0001",
            Category::AmbiguousExpression => "E0002",
            Category::UnresolvedTypeVariable => "E0003",
            Category::ConformanceFailure => "E0004",
            Category::MemberNotFound => "E0005",
            Category::RecursiveType => "E0006",
            Category::InvalidApplication => "E0007",
            Category::TypeError => "E0008",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Category::TypeMismatch => "Expression type does not match expected type.",
            Category::AmbiguousExpression => {
                "More than one typing of the expression scores equally well."
            }
            Category::UnresolvedTypeVariable => {
                "The solver could not determine a concrete type for an expression."
            }
            Category::ConformanceFailure => "A type does not conform to a required protocol.",
            Category::MemberNotFound => "A referenced member does not exist on the base type.",
            Category::RecursiveType => "A type would have to contain itself to satisfy usage.",
            Category::InvalidApplication => {
                "A call site's arguments cannot be applied to the callee's type."
            }
            Category::TypeError => "General type checking error.",
        }
    }

    pub fn example_fix(self) -> &'static str {
        match self {
            Category::TypeMismatch => {
                "Adjust the expression or add a conversion to match expected type."
            }
            Category::AmbiguousExpression => {
                "Add a type annotation to pick one of the candidate typings."
            }
            Category::UnresolvedTypeVariable => {
                "Annotate the expression so every type can be determined."
            }
            Category::ConformanceFailure => "Use a conforming type or add the conformance.",
            Category::MemberNotFound => "Fix the member name or extend the base type.",
            Category::RecursiveType => "Break the cycle with an explicit annotation.",
            Category::InvalidApplication => {
                "Call the function with arguments of its declared parameter types."
            }
            Category::TypeError => "Follow the labeled spans and help text to align types.",
        }
    }
}

// ---------------------------------------------------------------------------
// Source locations (independent of vela-ast's Span)
// ---------------------------------------------------------------------------

/// A source location for diagnostics.
///
/// Uses byte offsets. Callers convert from `vela-ast` spans to this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file_id: u32,
    pub start: u32,
    pub end: u32,
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

/// A structured diagnostic message.
///
/// Every diagnostic carries enough context to produce an actionable error
/// message without exposing internal solver state.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Stable diagnostic code (e.g. E0001).
    pub code: Option<String>,
    pub severity: Severity,
    pub category: Category,
    /// Primary message: what went wrong.
    pub message: String,
    /// Where it went wrong.
    pub location: Option<SourceLocation>,
    /// Additional labeled spans (e.g., "expected type came from here").
    pub labels: Vec<DiagLabel>,
    /// Suggested fix, if any.
    pub help: Option<String>,
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone)]
pub struct DiagLabel {
    pub location: SourceLocation,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Error,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            code: Some(category.code().to_string()),
            severity: Severity::Warning,
            category,
            message: message.into(),
            location: None,
            labels: Vec::new(),
            help: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_label(mut self, location: SourceLocation, message: impl Into<String>) -> Self {
        self.labels.push(DiagLabel {
            location,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        if let Some(code) = &self.code {
            write!(f, "{prefix}[{code}]: {}", self.message)?;
        } else {
            write!(f, "{prefix}: {}", self.message)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type for crates that produce diagnostics
// ---------------------------------------------------------------------------

/// Error type wrapping one or more diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", .0.first().map(|d| d.to_string()).unwrap_or_default())]
pub struct DiagnosticError(pub Vec<Diagnostic>);

impl DiagnosticError {
    pub fn single(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }

    pub fn multiple(diags: Vec<Diagnostic>) -> Self {
        Self(diags)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.0
    }
}
