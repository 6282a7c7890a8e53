//! Registry of built-in operations: the special forms and the primitive
//! functions of the root scope.
//!
//! ```text
//! if(<(x, 10), "small", "large")     # special form
//! +(1, 2)                            # function
//! element(array(1, 2, 3), 0)         # function
//! ```
//!
//! ## Functions vs Special Forms
//!
//! - **Functions** (`+`, `==`, `length`, ...) receive evaluated arguments.
//!   They are bound as ordinary values in the root scope by
//!   [`crate::evaluator::create_global_env`], so they can be passed around,
//!   shadowed or rebound in child scopes.
//! - **Special forms** (`if`, `while`, `do`, `define`, `set`, `fun`) receive
//!   their argument expressions unevaluated. They are recognized by name at
//!   every call site and are never looked up in the scope chain.
//!
//! ## Typing
//!
//! Only `+` converts between types: if either operand is a string the display
//! forms are concatenated. The other arithmetic operators require numbers,
//! `<`/`>` require two numbers or two strings, and `==` compares any two
//! values structurally without coercion.
//!
//! ## Adding New Operations
//!
//! 1. Write a typed Rust function (see [`crate::evaluator::intooperation`])
//! 2. Add a `BuiltinOp` entry to `BUILTIN_OPS` with its arity
//! 3. Add cases to the tests below

use crate::Error;
use crate::ast::{Expr, NumberType, Value};
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{
    Arity, Environment, ValueIter, eval_define, eval_do, eval_fun, eval_if, eval_set, eval_while,
};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// Handler of a special form: raw argument expressions, the current scope
/// and the current evaluation depth
pub type SpecialFormFn = fn(&[Expr], &Environment, usize) -> Result<Value, Error>;

/// Represents the implementation of a built-in operation
#[derive(Clone)]
pub enum OpKind {
    /// Takes evaluated arguments through the erased builtin signature
    Function(Arc<OperationFn>),
    /// Takes unevaluated arguments and controls their evaluation
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    /// The name the operation is called by
    pub id: &'static str,
    pub op_kind: OpKind,
    /// Expected number of arguments
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

//
// Builtin Function Implementations
//

fn builtin_add(a: Value, b: Value) -> Result<Value, Error> {
    match (&a, &b) {
        (Value::Number(x), Value::Number(y)) => Ok(Value::Number(x + y)),
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(format!("{a}{b}"))),
        _ => Err(Error::TypeError(format!(
            "cannot add {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn builtin_sub(a: NumberType, b: NumberType) -> NumberType {
    a - b
}

fn builtin_mul(a: NumberType, b: NumberType) -> NumberType {
    a * b
}

fn builtin_div(a: NumberType, b: NumberType) -> NumberType {
    a / b
}

fn builtin_equal(a: Value, b: Value) -> bool {
    a == b
}

// Ordering comparisons accept two numbers or two strings
macro_rules! ordering_comparison {
    ($name:ident, $op:tt, $op_str:literal) => {
        fn $name(a: Value, b: Value) -> Result<bool, Error> {
            match (&a, &b) {
                (Value::Number(x), Value::Number(y)) => Ok(x $op y),
                (Value::String(x), Value::String(y)) => Ok(x $op y),
                _ => Err(Error::TypeError(format!(
                    concat!("'", $op_str, "' cannot compare {} with {}"),
                    a.type_name(),
                    b.type_name()
                ))),
            }
        }
    };
}

ordering_comparison!(builtin_lt, <, "<");
ordering_comparison!(builtin_gt, >, ">");

fn builtin_array(args: ValueIter<'_>) -> Value {
    Value::Array(args.cloned().collect())
}

fn builtin_length(seq: Value) -> Result<usize, Error> {
    match seq {
        Value::Array(items) => Ok(items.len()),
        Value::String(s) => Ok(s.chars().count()),
        other => Err(Error::TypeError(format!(
            "length expects an array or string, got {}",
            other.type_name()
        ))),
    }
}

// Negative, fractional and out-of-range indices are all rejected
fn builtin_element(mut items: ValueIter<'_>, index: NumberType) -> Result<Value, Error> {
    let len = items.len();
    let out_of_range = Error::IndexError { index, len };
    if index.fract() != 0.0 || index < 0.0 || index >= len as NumberType {
        return Err(out_of_range);
    }
    items.nth(index as usize).cloned().ok_or(out_of_range)
}

fn builtin_print(value: Value) -> Result<Value, Error> {
    write_line(&mut std::io::stdout().lock(), value)
}

// A closed stdout is an evaluation error rather than a panic
fn write_line(out: &mut impl std::io::Write, value: Value) -> Result<Value, Error> {
    writeln!(out, "{value}").map_err(|e| Error::EvalError(format!("print failed: {e}")))?;
    Ok(value)
}

/// Global registry of all built-in operations, built once on first use.
/// Functions are wired through the same typed adapters hosts use.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    vec![
        // Special forms
        BuiltinOp {
            id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Exact(3),
        },
        BuiltinOp {
            id: "while",
            op_kind: OpKind::SpecialForm(eval_while),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "do",
            op_kind: OpKind::SpecialForm(eval_do),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "define",
            op_kind: OpKind::SpecialForm(eval_define),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "set",
            op_kind: OpKind::SpecialForm(eval_set),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "fun",
            op_kind: OpKind::SpecialForm(eval_fun),
            arity: Arity::AtLeast(1),
        },
        // Arithmetic
        BuiltinOp {
            id: "+",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_add)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "-",
            op_kind: OpKind::Function(builtin_fixed::<(NumberType, NumberType), _>(builtin_sub)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "*",
            op_kind: OpKind::Function(builtin_fixed::<(NumberType, NumberType), _>(builtin_mul)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "/",
            op_kind: OpKind::Function(builtin_fixed::<(NumberType, NumberType), _>(builtin_div)),
            arity: Arity::Exact(2),
        },
        // Comparison
        BuiltinOp {
            id: "==",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_equal)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "<",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_lt)),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: ">",
            op_kind: OpKind::Function(builtin_fixed::<(Value, Value), _>(builtin_gt)),
            arity: Arity::Exact(2),
        },
        // Arrays
        BuiltinOp {
            id: "array",
            op_kind: OpKind::Function(builtin_variadic::<(ValueIter<'static>,), _>(builtin_array)),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "length",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_length)),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "element",
            op_kind: OpKind::Function(builtin_fixed::<(ValueIter<'static>, NumberType), _>(
                builtin_element,
            )),
            arity: Arity::Exact(2),
        },
        // Output
        BuiltinOp {
            id: "print",
            op_kind: OpKind::Function(builtin_fixed::<(Value,), _>(builtin_print)),
            arity: Arity::Exact(1),
        },
    ]
});

/// Lazy static map from id to BuiltinOp (private - use find_op)
static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations
pub fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by name
pub fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;

    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    /// Invoke a builtin through the registry using the erased signature,
    /// which also exercises the adapter layer.
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        let op = find_op(name).unwrap();
        match &op.op_kind {
            OpKind::Function(func) => func(args.to_vec()),
            OpKind::SpecialForm(_) => {
                panic!("expected function builtin in tests, got special form: {name}")
            }
        }
    }

    #[test]
    fn test_builtin_ops_registry() {
        for (name, arity) in [
            ("if", Arity::Exact(3)),
            ("while", Arity::Exact(2)),
            ("do", Arity::Any),
            ("define", Arity::Exact(2)),
            ("set", Arity::Exact(2)),
            ("fun", Arity::AtLeast(1)),
        ] {
            let op = find_op(name).unwrap();
            assert!(
                matches!(op.op_kind, OpKind::SpecialForm(_)),
                "{name} should be a special form"
            );
            assert_eq!(op.arity, arity, "arity of {name}");
        }

        for name in ["+", "-", "*", "/", "==", "<", ">", "array", "length", "element", "print"] {
            let op = find_op(name).unwrap();
            assert!(
                matches!(op.op_kind, OpKind::Function(_)),
                "{name} should be a function"
            );
        }

        assert!(find_op("unknown").is_none());
        assert!(find_op("true").is_none());
        assert_eq!(get_builtin_ops().len(), 17);
        assert!(std::ptr::eq(find_op("+").unwrap(), &get_builtin_ops()[6]));
    }

    /// Macro to create test cases, invoking builtins via the registry.
    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let nested = val([val([val(1)]), val("x")]);

        let test_cases: Vec<TestCase> = vec![
            // === ADDITION ===
            test!("+", &[val(1), val(2)], success(3)),
            test!("+", &[val(0.5), val(0.25)], success(0.75)),
            test!("+", &[val("egg"), val("nog")], success("eggnog")),
            test!("+", &[val("n="), val(5)], success("n=5")),
            test!("+", &[val(5), val("!")], success("5!")),
            test!("+", &[val("x"), val(true)], success("xtrue")),
            test!("+", &[val(1), val(true)], None),
            test!("+", &[val([1]), val(1)], None),
            test!("+", &[val(1)], None),
            test!("+", &[val(1), val(2), val(3)], None),
            // === SUBTRACTION / MULTIPLICATION / DIVISION ===
            test!("-", &[val(10), val(3)], success(7)),
            test!("-", &[val(3), val(10)], success(-7)),
            test!("-", &[val("10"), val(3)], None),
            test!("*", &[val(6), val(7)], success(42)),
            test!("*", &[val(2), val(false)], None),
            test!("/", &[val(7), val(2)], success(3.5)),
            test!("/", &[val(1), val(0)], success(f64::INFINITY)),
            test!("/", &[val(-1), val(0)], success(f64::NEG_INFINITY)),
            test!("/", &[val(1)], None),
            // === EQUALITY ===
            test!("==", &[val(1), val(1)], success(true)),
            test!("==", &[val(1), val(2)], success(false)),
            test!("==", &[val(1), val("1")], success(false)),
            test!("==", &[val("a"), val("a")], success(true)),
            test!("==", &[val(false), val(false)], success(true)),
            test!("==", &[nested.clone(), nested.clone()], success(true)),
            test!("==", &[val([1, 2]), val([1, 3])], success(false)),
            test!("==", &[val(f64::NAN), val(f64::NAN)], success(false)),
            // === ORDERING ===
            test!("<", &[val(1), val(2)], success(true)),
            test!("<", &[val(2), val(2)], success(false)),
            test!(">", &[val(3), val(2)], success(true)),
            test!(">", &[val(-3), val(2)], success(false)),
            test!("<", &[val("abc"), val("abd")], success(true)),
            test!(">", &[val("b"), val("a")], success(true)),
            test!("<", &[val(1), val("2")], None),
            test!(">", &[val(true), val(false)], None),
            test!("<", &[val(1)], None),
            // === ARRAYS ===
            test!("array", &[], success(Vec::<Value>::new())),
            test!("array", &[val(1), val("two"), val(true)], success(vec![val(1), val("two"), val(true)])),
            test!("length", &[val([1, 2, 3])], success(3)),
            test!("length", &[val(Vec::<Value>::new())], success(0)),
            test!("length", &[val("héllo")], success(5)),
            test!("length", &[val(42)], None),
            test!("length", &[], None),
            test!("element", &[val([10, 20, 30]), val(0)], success(10)),
            test!("element", &[val([10, 20, 30]), val(2)], success(30)),
            test!("element", &[nested.clone(), val(0)], success([1])),
            test!("element", &[val([10, 20, 30]), val(3)], None),
            test!("element", &[val([10, 20, 30]), val(-1)], None),
            test!("element", &[val([10, 20, 30]), val(0.5)], None),
            test!("element", &[val("abc"), val(0)], None),
            test!("element", &[val([1]), val("0")], None),
            // === PRINT ===
            test!("print", &[val("hello")], success("hello")),
            test!("print", &[val([1, 2])], success([1, 2])),
            test!("print", &[], None),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {} // Expected error
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }
    }

    #[test]
    fn test_print_output() {
        struct ClosedPipe;
        impl std::io::Write for ClosedPipe {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::ErrorKind::BrokenPipe.into())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut out = Vec::new();
        assert_eq!(write_line(&mut out, val("hi")).unwrap(), val("hi"));
        write_line(&mut out, val([1, 2])).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hi\n[1, 2]\n");

        match write_line(&mut ClosedPipe, val(1)) {
            Err(Error::EvalError(msg)) => assert!(msg.contains("print failed"), "{msg}"),
            other => panic!("Expected EvalError, got {other:?}"),
        }
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            call_builtin("element", &[val([1, 2]), val(5)]),
            Err(Error::IndexError { index: 5.0, len: 2 })
        );
        assert_eq!(
            call_builtin("element", &[val([1, 2]), val(-1)]),
            Err(Error::IndexError { index: -1.0, len: 2 })
        );
        assert_eq!(
            call_builtin("+", &[val(1)]),
            Err(Error::arity_error(2, 1))
        );
        match call_builtin("+", &[val(1), val(false)]).unwrap_err() {
            Error::TypeError(msg) => assert_eq!(msg, "cannot add number and boolean"),
            other => panic!("Expected TypeError, got {other:?}"),
        }
        match call_builtin("<", &[val(1), val("a")]).unwrap_err() {
            Error::TypeError(msg) => assert_eq!(msg, "'<' cannot compare number with string"),
            other => panic!("Expected TypeError, got {other:?}"),
        }
        match call_builtin("-", &[val("a"), val(1)]).unwrap_err() {
            Error::TypeError(msg) => assert_eq!(msg, "expected number, got string"),
            other => panic!("Expected TypeError, got {other:?}"),
        }
    }
}
