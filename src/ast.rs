//! This module defines the expression tree produced by the parser and the
//! runtime values produced by the evaluator. [`Expr`] is a closed sum type over
//! literals, words and call forms; [`Value`] covers every dynamically typed
//! value an Egg program can hold, including host primitives and closures.
//! Ergonomic helper functions such as [`val`], [`word`] and [`apply`] are
//! provided for building trees in tests, and conversion traits are implemented
//! for common Rust types.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::Error;
use crate::evaluator::Environment;
use crate::evaluator::intooperation::OperationFn;

/// Type alias for number values in the interpreter
pub(crate) type NumberType = f64;

/// Characters that terminate a word, in addition to whitespace
pub(crate) const WORD_DELIMITERS: &str = "(),#\"";

/// Check if a character may appear in a word
pub(crate) fn is_word_char(c: char) -> bool {
    !c.is_whitespace() && !WORD_DELIMITERS.contains(c)
}

/// A literal payload of a `Value` expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(NumberType),
}

/// Expression tree node
///
/// Trees are immutable once parsed. `Apply::operator` may be any expression,
/// so `f(4)(5)` is an `Apply` whose operator is another `Apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A literal string or number
    Value(Literal),
    /// An identifier reference
    Word(String),
    /// A call form; arguments are kept in source order
    Apply { operator: Box<Expr>, args: Vec<Expr> },
}

impl Expr {
    /// The name of this expression if it is a `Word`
    pub fn as_word(&self) -> Option<&str> {
        match self {
            Expr::Word(name) => Some(name),
            _ => None,
        }
    }
}

/// A function value created by evaluating a `fun` form.
///
/// Captures the scope active at definition time; every call evaluates `body`
/// in a fresh child of that scope.
pub struct Closure {
    pub(crate) params: Vec<String>,
    pub(crate) body: Expr,
    pub(crate) scope: Environment,
}

impl Closure {
    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }
}

/// Runtime value
#[derive(Clone)]
pub enum Value {
    /// Numbers (IEEE-754 doubles)
    Number(NumberType),
    /// String values
    String(String),
    /// Booleans; `false` is also the result of forms with nothing meaningful to return
    Bool(bool),
    /// Sequence container built by `array`
    Array(Vec<Value>),
    /// Host primitive, compared by `id`
    BuiltinFunction {
        id: String,
        // Stored as an Arc so typed Rust functions can be wrapped into the
        // canonical evaluator signature (see `intooperation`).
        func: Arc<OperationFn>,
    },
    /// User-defined function, compared by identity
    Function(Rc<Closure>),
}

impl Value {
    /// Only the boolean `false` is falsy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Array(_) => "array",
            Value::BuiltinFunction { .. } | Value::Function(_) => "function",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::BuiltinFunction { .. } | Value::Function(_))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "Number({})", format_number(*n)),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
            Value::BuiltinFunction { id, .. } => write!(f, "BuiltinFunction({id})"),
            Value::Function(closure) => {
                write!(
                    f,
                    "Function(params={:?}, body={})",
                    closure.params, closure.body
                )
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::BuiltinFunction { id: id1, .. }, Value::BuiltinFunction { id: id2, .. }) => {
                id1 == id2
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false, // Different variants are never equal
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NumberType> for Value {
    fn from(n: NumberType) -> Self {
        Value::Number(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(n as NumberType)
            }
        }
    };
}

impl_from_integer!(i32);
impl_from_integer!(u32);
impl_from_integer!(i64);
impl_from_integer!(usize);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Array(arr.into_iter().map(|x| x.into()).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types.

impl std::convert::TryInto<NumberType> for Value {
    type Error = Error;

    fn try_into(self) -> Result<NumberType, Error> {
        if let Value::Number(n) = self {
            Ok(n)
        } else {
            Err(Error::TypeError(format!(
                "expected number, got {}",
                self.type_name()
            )))
        }
    }
}

impl std::convert::TryInto<bool> for Value {
    type Error = Error;

    fn try_into(self) -> Result<bool, Error> {
        if let Value::Bool(b) = self {
            Ok(b)
        } else {
            Err(Error::TypeError(format!(
                "expected boolean, got {}",
                self.type_name()
            )))
        }
    }
}

/// Helper function for creating Values - accepts any type that can be converted to Value
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper for a number literal expression
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn num<N: Into<NumberType>>(n: N) -> Expr {
    Expr::Value(Literal::Number(n.into()))
}

/// Helper for a string literal expression
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn text<S: AsRef<str>>(s: S) -> Expr {
    Expr::Value(Literal::String(s.as_ref().to_owned()))
}

/// Helper for a word expression
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn word<S: AsRef<str>>(name: S) -> Expr {
    Expr::Word(name.as_ref().to_owned())
}

/// Helper for a call form
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn apply<const N: usize>(operator: Expr, args: [Expr; N]) -> Expr {
    Expr::Apply {
        operator: Box::new(operator),
        args: args.into(),
    }
}

/// Format a number the way Egg prints it: integral values without a fraction,
/// `Infinity`/`NaN` spelled out.
pub(crate) fn format_number(n: NumberType) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        let sign = if n > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if n == 0.0 {
        // Covers negative zero
        "0".to_owned()
    } else {
        format!("{n}")
    }
}

/// Prints the expression as Egg source that parses back to the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value(Literal::String(s)) => write!(f, "\"{s}\""),
            Expr::Value(Literal::Number(n)) => write!(f, "{}", format_number(*n)),
            Expr::Word(name) => write!(f, "{name}"),
            Expr::Apply { operator, args } => {
                write!(f, "{operator}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Prints values the way `print` shows them: strings raw at the top level,
/// quoted inside arrays.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Value::String(s) => write!(f, "\"{s}\"")?,
                        other => write!(f, "{other}")?,
                    }
                }
                write!(f, "]")
            }
            Value::BuiltinFunction { id, .. } => write!(f, "#<builtin:{id}>"),
            Value::Function(closure) => write!(f, "#<fun({})>", closure.params.join(", ")),
        }
    }
}
