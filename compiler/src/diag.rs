// diag.rs — Unified error model for kernel construction
//
// Every failure in the construction pipeline is fatal and surfaces as one
// `Diagnostic`. Codes are grouped by category (see `codes`).
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0401`).
///
/// Once assigned, a code must never be reassigned to a different semantic
/// meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable codes, one block per error category.
pub mod codes {
    use super::DiagCode;

    // ── Parse (E01xx) ──
    pub const E0100: DiagCode = DiagCode("E0100"); // matches both grammars
    pub const E0101: DiagCode = DiagCode("E0101"); // matches neither grammar
    pub const E0102: DiagCode = DiagCode("E0102"); // expression syntax
    pub const E0103: DiagCode = DiagCode("E0103"); // invalid assignee
    pub const E0104: DiagCode = DiagCode("E0104"); // invalid substitution lhs
    pub const E0105: DiagCode = DiagCode("E0105"); // empty option token
    pub const E0106: DiagCode = DiagCode("E0106"); // non-integer priority
    pub const E0107: DiagCode = DiagCode("E0107"); // unrecognized option
    pub const E0108: DiagCode = DiagCode("E0108"); // unknown element type
    pub const E0109: DiagCode = DiagCode("E0109"); // malformed special form
    pub const E0110: DiagCode = DiagCode("E0110"); // option needs a value

    // ── Macro (E02xx) ──
    pub const E0200: DiagCode = DiagCode("E0200"); // list value in single-valued context

    // ── Naming (E03xx) ──
    pub const E0300: DiagCode = DiagCode("E0300"); // cross-namespace duplicate
    pub const E0301: DiagCode = DiagCode("E0301"); // registry conflict
    pub const E0302: DiagCode = DiagCode("E0302"); // duplicate instruction id

    // ── Domain (E04xx) ──
    pub const E0400: DiagCode = DiagCode("E0400"); // unnamed dimension
    pub const E0401: DiagCode = DiagCode("E0401"); // redefined iname
    pub const E0402: DiagCode = DiagCode("E0402"); // unparseable domain
    pub const E0403: DiagCode = DiagCode("E0403"); // foreign set context
    pub const E0404: DiagCode = DiagCode("E0404"); // bound extraction failed

    // ── Reference (E05xx) ──
    pub const E0500: DiagCode = DiagCode("E0500"); // forced dep on unknown iname
    pub const E0501: DiagCode = DiagCode("E0501"); // assignee not declared
    pub const E0502: DiagCode = DiagCode("E0502"); // non-iname lvalue index
    pub const E0503: DiagCode = DiagCode("E0503"); // temporary already exists

    // ── Structural consistency (E06xx) ──
    pub const E0600: DiagCode = DiagCode("E0600"); // bound writer count != 1
    pub const E0601: DiagCode = DiagCode("E0601"); // parallel reduction iname
    pub const E0602: DiagCode = DiagCode("E0602"); // '@' iname duplication

    // ── Configuration (E07xx) ──
    pub const E0700: DiagCode = DiagCode("E0700"); // internal-only option
    pub const E0701: DiagCode = DiagCode("E0701"); // unknown option key
    pub const E0702: DiagCode = DiagCode("E0702"); // invalid iname tag
}

// ── Category ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Parse,
    Macro,
    Naming,
    Domain,
    Reference,
    Consistency,
    Config,
}

impl ErrorCategory {
    fn of(code: DiagCode) -> Self {
        match &code.0[..3] {
            "E01" => ErrorCategory::Parse,
            "E02" => ErrorCategory::Macro,
            "E03" => ErrorCategory::Naming,
            "E04" => ErrorCategory::Domain,
            "E05" => ErrorCategory::Reference,
            "E06" => ErrorCategory::Consistency,
            _ => ErrorCategory::Config,
        }
    }
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A fatal kernel-construction error.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub code: DiagCode,
    pub category: ErrorCategory,
    pub message: String,
    pub hint: Option<String>,
    /// Outer-to-inner context, e.g. the source line being parsed.
    pub context: Vec<String>,
}

pub type Result<T> = std::result::Result<T, Diagnostic>;

impl Diagnostic {
    /// Create a new diagnostic; the category is derived from the code block.
    pub fn new(code: DiagCode, message: impl Into<String>) -> Self {
        Self {
            code,
            category: ErrorCategory::of(code),
            message: message.into(),
            hint: None,
            context: Vec::new(),
        }
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Prepend a context line (callers wrap errors from the inside out).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.insert(0, context.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error[{}]: {}", self.code, self.message)?;
        for ctx in &self.context {
            write!(f, "\n  while {}", ctx)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}
