//! Error types for mapperc

use thiserror::Error;

/// Result type alias for compilation steps
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while compiling query descriptions into statements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The token stream and the supplied parameters disagree on the number of bound values.
    #[error("Method '{method}' expects {expected} bindable argument(s) but {actual} were supplied")]
    ArgumentCountMismatch {
        method: String,
        expected: usize,
        actual: usize,
    },

    /// Case folding was requested on a property that is not textual.
    #[error("Cannot ignore case on non-textual property '{property}'")]
    UnsupportedIgnoreCase { property: String },

    /// The target dialect has no pagination idiom for the request.
    #[error("Pagination is not supported for dialect '{dialect}': {reason}")]
    UnsupportedPagination { dialect: String, reason: String },

    /// A query string mixes `?N` and `:name` placeholders.
    #[error("Query mixes indexed and named parameters: {query}")]
    MixedParameterStyle { query: String },

    /// A query shape the compiler cannot render.
    #[error("Unsupported query shape: {reason}")]
    UnsupportedQueryShape { reason: String },

    /// A fragment was constructed with inconsistent state.
    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    /// A method name does not follow the derived query grammar.
    #[error("Invalid method name '{method}': {reason}")]
    InvalidMethodName { method: String, reason: String },

    /// A property path could not be resolved against the entity.
    #[error("No property '{path}' on entity '{entity}'")]
    UnknownProperty { entity: String, path: String },

    /// A template expression could not be evaluated.
    #[error("Expression error in '{expr}': {message}")]
    Expression { expr: String, message: String },
}

impl CompileError {
    /// Create an unsupported query shape error
    pub fn shape(reason: impl Into<String>) -> Self {
        Self::UnsupportedQueryShape {
            reason: reason.into(),
        }
    }

    /// Create an invalid fragment error
    pub fn fragment(message: impl Into<String>) -> Self {
        Self::InvalidFragment(message.into())
    }

    /// Create an invalid method name error
    pub fn method_name(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMethodName {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Create an expression evaluation error
    pub fn expression(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Expression {
            expr: expr.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported pagination error
    pub fn pagination(dialect: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedPagination {
            dialect: dialect.into(),
            reason: reason.into(),
        }
    }

    /// Whether the statement assembler may replace the failing statement with a placeholder.
    ///
    /// Recoverable errors only affect a single statement; the rest of the namespace still
    /// compiles.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UnsupportedQueryShape { .. })
    }

    /// Check if this is an argument count mismatch
    pub fn is_argument_mismatch(&self) -> bool {
        matches!(self, Self::ArgumentCountMismatch { .. })
    }
}
