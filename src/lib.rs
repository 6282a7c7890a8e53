//! Egg - a tiny expression language with a tree-walking interpreter
//!
//! This crate parses Egg source text into an expression tree and evaluates it
//! against a chain of lexical scopes. Everything in Egg is an expression:
//!
//! ```text
//! # comments run to the end of the line
//! do(define(total, 0),
//!    define(count, 1),
//!    while(<(count, 11),
//!          do(define(total, +(total, count)),
//!             define(count, +(count, 1)))),
//!    total)
//! ```
//!
//! ## Evaluation Model
//!
//! - Literals (`42`, `"text"`) evaluate to themselves
//! - Words are looked up through the scope chain, innermost scope first
//! - `operator(args...)` either dispatches to a special form (`if`, `while`,
//!   `do`, `define`, `set`, `fun`) which receives its arguments unevaluated, or
//!   evaluates the operator and the arguments left to right and calls the result
//! - Only the boolean `false` is falsy; `0` and `""` count as true
//!
//! ## Embedding
//!
//! A host builds a root environment with [`evaluator::create_global_env`],
//! optionally registers its own primitives on it, then calls [`run_in`]. Each
//! run gets a fresh child scope, so top-level `define`s never leak into the
//! shared root.
//!
//! ```
//! use egglang::ast::Value;
//!
//! let result = egglang::run("do(define(f, fun(a, fun(b, +(a, b)))), f(4)(5))").unwrap();
//! assert_eq!(result, Value::Number(9.0));
//! ```
//!
//! ## Modules
//!
//! - `parser`: text to expression tree, including comment skipping
//! - `ast`: expression tree and runtime values
//! - `evaluator`: scope chain, evaluation, special forms
//! - `builtinops`: registry of special forms and primitive functions
//! - `json`: expression tree interchange as JSON (feature `json`)

use std::fmt;

use crate::evaluator::{Arity, Environment};

/// Maximum nesting of call forms accepted by the parser
pub const MAX_PARSE_DEPTH: usize = 128;

/// Maximum evaluation depth before a program is aborted.
/// Each nested `Apply`, special-form body or function call uses one level;
/// a non-tail recursive Egg function spends about three per call. The native
/// stack grows on demand up to this bound.
pub const MAX_EVAL_DEPTH: usize = 10_000;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Nothing at this position starts a string, number or word
    UnexpectedSyntax,
    /// An argument was followed by something other than `,` or `)`
    ExpectedSeparator,
    /// Extra input found after a complete program
    TrailingText,
    /// Call forms nested beyond [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 60 chars)
    pub context: Option<String>,
    /// The unparsed remainder of the input at the failure point
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError pointing at the byte offset `error_offset` of `input`.
    /// The remainder of the input from that offset is recorded as `found`.
    pub fn at_offset(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        const MAX_CONTEXT: usize = 60;
        const LEAD_IN: usize = 20;

        let error_offset = floor_char_boundary(input, error_offset);
        let remaining = &input[error_offset..];
        let char_offset = input[..error_offset].chars().count();
        let total_chars = char_offset + remaining.chars().count();
        let context_start = char_offset.saturating_sub(LEAD_IN);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();
        let shown = context_str.chars().count();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + shown < total_chars {
            display_context.push_str("[...]");
        }
        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(
            kind,
            message,
            Some(display_context),
            Some(remaining.to_owned()),
        )
    }
}

fn floor_char_boundary(input: &str, mut offset: usize) -> usize {
    offset = offset.min(input.len());
    while !input.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed source text
    SyntaxError(ParseError),
    /// A word, or the target of `set`, is not bound anywhere in the scope chain
    UndefinedBinding(String),
    /// The operator of a call evaluated to something that cannot be called
    NotCallable(String),
    /// A special form, closure or primitive got the wrong number of arguments
    ArityError {
        expected: Arity,
        got: usize,
        form: Option<String>,
    },
    /// A special form is structurally invalid (e.g. `define(1, 2)`)
    MalformedForm(String),
    /// A primitive got an operand of the wrong type
    TypeError(String),
    /// `element` was asked for an index outside the array
    IndexError { index: f64, len: usize },
    /// `set` targeted a binding owned by a sealed scope
    ReadOnlyBinding(String),
    /// Evaluation nested deeper than [`MAX_EVAL_DEPTH`]
    DepthLimit(usize),
    /// Failure reported by a host-provided builtin
    EvalError(String),
}

impl Error {
    /// Create an ArityError for an exact argument count without form context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected: Arity::Exact(expected),
            got,
            form: None,
        }
    }

    /// Create an ArityError naming the special form or builtin that rejected the call
    pub fn arity_error_for(form: &str, expected: Arity, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            form: Some(form.to_owned()),
        }
    }

    pub(crate) fn syntax(error: ParseError) -> Self {
        Error::SyntaxError(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SyntaxError(e) => {
                write!(f, "SyntaxError: {}", e.message)?;
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::UndefinedBinding(name) => write!(f, "ReferenceError: Undefined binding: {name}"),
            Error::NotCallable(value) => {
                write!(f, "TypeError: Applying a non-function: {value}")
            }
            Error::ArityError {
                expected,
                got,
                form,
            } => match form {
                Some(form) => write!(
                    f,
                    "ArityError: {form} expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
            Error::MalformedForm(msg) => write!(f, "SyntaxError: {msg}"),
            Error::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Error::IndexError { index, len } => write!(
                f,
                "IndexError: index {index} out of range for array of length {len}"
            ),
            Error::ReadOnlyBinding(name) => {
                write!(f, "ReferenceError: Binding is read-only: {name}")
            }
            Error::DepthLimit(max) => {
                write!(f, "EvaluationError: Evaluation depth limit exceeded (max: {max})")
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// Host builtins may fail with a plain message
impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::EvalError(msg.to_owned())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::EvalError(msg)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod parser;
mod stack;

#[cfg(feature = "json")]
pub mod json;

/// Parse and evaluate `program` in a fresh child scope of a new global environment.
pub fn run(program: &str) -> Result<ast::Value, Error> {
    run_in(program, &evaluator::create_global_env())
}

/// Parse and evaluate `program` in a fresh child scope of `root`.
///
/// Bindings created by the program's top-level `define`s live in the child
/// scope and are discarded afterwards; `root` itself is only read, or mutated
/// through `set` when it is not sealed.
#[tracing::instrument(level = "debug", skip_all, fields(bytes = program.len()))]
pub fn run_in(program: &str, root: &Environment) -> Result<ast::Value, Error> {
    let expr = parser::parse(program)?;
    let scope = Environment::with_parent(root);
    let result = evaluator::evaluate(&expr, &scope);
    if let Err(err) = &result {
        tracing::debug!(%err, "program aborted");
    }
    result
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::Value;

    #[test]
    fn test_parse_error_context() {
        let input = "do(define(x, 1), )oops";
        let err = ParseError::at_offset(ParseErrorKind::TrailingText, "msg", input, 17);
        assert_eq!(err.found.as_deref(), Some(")oops"));
        assert_eq!(err.context.as_deref(), Some(input));

        let long = format!("{}#tail", "a".repeat(100));
        let err = ParseError::at_offset(ParseErrorKind::UnexpectedSyntax, "msg", &long, 100);
        let context = err.context.unwrap();
        assert!(context.starts_with("[...]"));
        assert!(context.contains("#tail"));

        let multiline = "a\nb";
        let err = ParseError::at_offset(ParseErrorKind::UnexpectedSyntax, "msg", multiline, 2);
        assert_eq!(err.context.as_deref(), Some("a\\nb"));
        assert_eq!(err.found.as_deref(), Some("b"));
    }

    #[test]
    fn test_error_display() {
        let cases = vec![
            (
                Error::UndefinedBinding("quux".into()),
                "Undefined binding: quux",
            ),
            (Error::arity_error(2, 1), "expected exactly 2 arguments but got 1"),
            (
                Error::arity_error_for("if", Arity::Exact(3), 2),
                "if expected exactly 3 arguments, got 2",
            ),
            (
                Error::IndexError { index: 5.0, len: 3 },
                "index 5 out of range for array of length 3",
            ),
            (Error::DepthLimit(MAX_EVAL_DEPTH), "depth limit exceeded"),
            (Error::NotCallable("1".into()), "non-function"),
        ];
        for (err, expected) in cases {
            let msg = format!("{err}");
            assert!(msg.contains(expected), "'{msg}' should contain '{expected}'");
        }
    }

    #[test]
    fn test_run_uses_fresh_child_scope() {
        let root = evaluator::create_global_env();
        assert_eq!(
            run_in("define(answer, 42)", &root).unwrap(),
            Value::Number(42.0)
        );
        // The define above went into the run's own scope, not into the root
        assert_eq!(
            run_in("answer", &root),
            Err(Error::UndefinedBinding("answer".into()))
        );
    }

    #[test]
    fn test_run_reports_syntax_errors() {
        match run("+(1, 2") {
            Err(Error::SyntaxError(e)) => assert_eq!(e.kind, ParseErrorKind::ExpectedSeparator),
            other => panic!("expected syntax error, got {other:?}"),
        }
        match run("f(") {
            Err(Error::SyntaxError(e)) => assert_eq!(e.kind, ParseErrorKind::UnexpectedSyntax),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }
}
