use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Closure, Expr, Literal, Value};
use crate::builtinops::{OpKind, find_op, get_builtin_ops};
use crate::stack::ensure_sufficient_stack;
use intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

pub mod intooperation;

pub use intooperation::{NumIter, ValueIter};

/// Expected number of arguments for a special form, closure or builtin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly N arguments
    Exact(usize),
    /// At least N arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid for this arity
    pub fn validate(&self, got: usize) -> Result<(), Error> {
        let ok = match *self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::ArityError {
                expected: *self,
                got,
                form: None,
            })
        }
    }

    /// Like [`Arity::validate`], naming the form in the error
    pub(crate) fn validate_for(&self, form: &str, got: usize) -> Result<(), Error> {
        self.validate(got)
            .map_err(|_| Error::arity_error_for(form, *self, got))
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

struct Scope {
    bindings: RefCell<HashMap<String, Value>>,
    parent: Option<Environment>,
    sealed: bool,
}

/// A scope in the scope chain.
///
/// `Environment` is a cheap handle: clones refer to the same scope, so a
/// closure that captured a scope sees later `define`s and `set`s made
/// through any other handle.
#[derive(Clone)]
pub struct Environment(Rc<Scope>);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A root scope with no parent
    pub fn new() -> Self {
        Self::from_scope(None, false)
    }

    /// A root scope whose bindings the language cannot `set`.
    /// Rust-side `define` and the registration methods still work.
    pub fn sealed() -> Self {
        Self::from_scope(None, true)
    }

    /// A fresh empty scope whose parent is `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Self::from_scope(Some(parent.clone()), false)
    }

    fn from_scope(parent: Option<Environment>, sealed: bool) -> Self {
        Environment(Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent,
            sealed,
        }))
    }

    pub fn is_sealed(&self) -> bool {
        self.0.sealed
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    /// Bind `name` in this scope, replacing any existing binding here.
    /// Parent scopes are never touched.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look `name` up through the scope chain, innermost first
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            if let Some(value) = env.0.bindings.borrow().get(name) {
                return Some(value.clone());
            }
            scope = env.parent();
        }
        None
    }

    /// Replace the binding of `name` in the nearest scope that owns it.
    pub fn set(&self, name: &str, value: Value) -> Result<(), Error> {
        let mut scope = Some(self);
        while let Some(env) = scope {
            let mut bindings = env.0.bindings.borrow_mut();
            if let Some(slot) = bindings.get_mut(name) {
                if env.is_sealed() {
                    return Err(Error::ReadOnlyBinding(name.to_owned()));
                }
                *slot = value;
                return Ok(());
            }
            drop(bindings);
            scope = env.parent();
        }
        Err(Error::UndefinedBinding(name.to_owned()))
    }

    /// Register a host function working directly on the evaluated argument
    /// slice.
    ///
    /// # Example
    /// ```
    /// use egglang::evaluator::create_global_env;
    /// use egglang::ast::Value;
    /// use egglang::Error;
    ///
    /// fn count_args(args: &[Value]) -> Result<Value, Error> {
    ///     Ok(Value::from(args.len()))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("count", count_args);
    /// assert_eq!(egglang::run_in("count(1, 2, 3)", &env).unwrap(), Value::Number(3.0));
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Value]) -> Result<Value, Error>) {
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| func(&args));
        self.define_builtin(name, wrapped);
    }

    /// Register a strongly-typed Rust function, with arguments extracted
    /// and the result converted automatically.
    ///
    /// ```
    /// use egglang::ast::Value;
    ///
    /// fn safe_div(a: f64, b: f64) -> Result<f64, &'static str> {
    ///     if b == 0.0 { Err("division by zero") } else { Ok(a / b) }
    /// }
    ///
    /// let env = egglang::evaluator::create_global_env();
    /// env.register_builtin_operation::<_, (f64, f64)>("safeDiv", safe_div);
    /// assert_eq!(egglang::run_in("safeDiv(6, 3)", &env).unwrap(), Value::Number(2.0));
    /// assert!(egglang::run_in("safeDiv(1, 0)", &env).is_err());
    /// ```
    ///
    /// Supported parameter types:
    /// - `f64` (number) and `bool`
    /// - `&str` (borrowed string)
    /// - `Value` (the raw argument)
    /// - [`ValueIter`] / [`NumIter`] (elements of an array argument)
    ///
    /// Return types are anything `Into<Value>`, or `Result<T, E>` with
    /// `T: Into<Value>` and `E: Into<Error>` (a `&str` or `String` message
    /// becomes `Error::EvalError`). Arity is enforced automatically and
    /// conversion failures yield `Error::TypeError`.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        self.define_builtin(name, func.into_operation());
    }

    /// Register a function whose last parameter collects the remaining
    /// arguments as a [`ValueIter`] or [`NumIter`], e.g.
    /// `fn(NumIter<'_>) -> f64` or `fn(f64, ValueIter<'_>) -> Value`.
    ///
    /// The total argument count is validated against `arity` before the
    /// function runs.
    pub fn register_variadic_builtin_operation<F, Args>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args> + 'static,
    {
        let inner = func.into_variadic_operation();
        let wrapped: Arc<OperationFn> = Arc::new(move |args: Vec<Value>| {
            arity.validate(args.len())?;
            inner(args)
        });
        self.define_builtin(name, wrapped);
    }

    fn define_builtin(&self, name: &str, func: Arc<OperationFn>) {
        self.define(
            name,
            Value::BuiltinFunction {
                id: name.to_owned(),
                func,
            },
        );
    }

    /// Get all bindings visible from this scope, sorted by name.
    /// Inner bindings shadow outer ones.
    pub fn get_all_bindings(&self) -> Vec<(String, Value)> {
        let mut bindings = match self.parent() {
            Some(parent) => parent.get_all_bindings().into_iter().collect(),
            None => HashMap::new(),
        };
        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }
        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.0.bindings.borrow();
        let mut names: Vec<&String> = bindings.keys().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("sealed", &self.0.sealed)
            .field("parent", &self.0.parent)
            .finish()
    }
}

/// Evaluate an expression in `env`
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow
fn eval_with_depth_tracking(expr: &Expr, env: &Environment, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        tracing::warn!(max = MAX_EVAL_DEPTH, "evaluation depth limit exceeded");
        return Err(Error::DepthLimit(MAX_EVAL_DEPTH));
    }
    match expr {
        Expr::Value(Literal::String(s)) => Ok(Value::String(s.clone())),
        Expr::Value(Literal::Number(n)) => Ok(Value::Number(*n)),
        Expr::Word(name) => env
            .get(name)
            .ok_or_else(|| Error::UndefinedBinding(name.clone())),
        Expr::Apply { operator, args } => {
            ensure_sufficient_stack(|| eval_apply(operator, args, env, depth))
        }
    }
}

/// Evaluate a call form.
///
/// A word operator naming a special form dispatches on the raw argument
/// expressions, regardless of any binding with that name. Anything else
/// evaluates the operator, then the arguments left to right, and calls the
/// result.
fn eval_apply(
    operator: &Expr,
    args: &[Expr],
    env: &Environment,
    depth: usize,
) -> Result<Value, Error> {
    if let Some(name) = operator.as_word()
        && let Some(op) = find_op(name)
        && let OpKind::SpecialForm(special_form) = op.op_kind
    {
        op.arity.validate_for(op.id, args.len())?;
        tracing::debug!(form = op.id, argc = args.len(), "special form");
        return special_form(args, env, depth);
    }

    let func = eval_with_depth_tracking(operator, env, depth + 1)?;
    let args = eval_args(args, env, depth)?;
    call_function(&func, args, depth)
}

/// Helper function to evaluate argument expressions with depth tracking
fn eval_args(args: &[Expr], env: &Environment, depth: usize) -> Result<Vec<Value>, Error> {
    args.iter()
        .map(|arg| eval_with_depth_tracking(arg, env, depth + 1))
        .collect()
}

/// Invoke a callable value with already-evaluated arguments
fn call_function(func: &Value, args: Vec<Value>, depth: usize) -> Result<Value, Error> {
    match func {
        Value::BuiltinFunction { id, func } => {
            tracing::trace!(builtin = %id, argc = args.len(), "builtin call");
            func(args)
        }
        Value::Function(closure) => {
            if closure.params.len() != args.len() {
                return Err(Error::arity_error(closure.params.len(), args.len()));
            }
            tracing::debug!(params = ?closure.params, "closure call");

            let scope = Environment::with_parent(&closure.scope);
            for (param, arg) in closure.params.iter().zip(args) {
                scope.define(param.clone(), arg);
            }
            eval_with_depth_tracking(&closure.body, &scope, depth + 1)
        }
        other => Err(Error::NotCallable(format!("{other}"))),
    }
}

/// `if(cond, then, else)`: only `false` selects the else branch
pub(crate) fn eval_if(args: &[Expr], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [condition, then_expr, else_expr] => {
            if eval_with_depth_tracking(condition, env, depth + 1)?.is_truthy() {
                eval_with_depth_tracking(then_expr, env, depth + 1)
            } else {
                eval_with_depth_tracking(else_expr, env, depth + 1)
            }
        }
        _ => Err(Error::arity_error_for("if", Arity::Exact(3), args.len())),
    }
}

/// `while(cond, body)`: always yields `false`
pub(crate) fn eval_while(args: &[Expr], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [condition, body] => {
            while eval_with_depth_tracking(condition, env, depth + 1)?.is_truthy() {
                eval_with_depth_tracking(body, env, depth + 1)?;
            }
            Ok(Value::Bool(false))
        }
        _ => Err(Error::arity_error_for("while", Arity::Exact(2), args.len())),
    }
}

/// `do(expr...)`: value of the last expression, `false` when empty
pub(crate) fn eval_do(args: &[Expr], env: &Environment, depth: usize) -> Result<Value, Error> {
    let mut value = Value::Bool(false);
    for arg in args {
        value = eval_with_depth_tracking(arg, env, depth + 1)?;
    }
    Ok(value)
}

pub(crate) fn eval_define(args: &[Expr], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Expr::Word(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.define(name.clone(), value.clone());
            Ok(value)
        }
        [_, _] => Err(Error::MalformedForm(
            "Incorrect use of define: the first argument must be a word".to_owned(),
        )),
        _ => Err(Error::arity_error_for("define", Arity::Exact(2), args.len())),
    }
}

/// `set(word, value)`: the value is evaluated before the target is looked up
pub(crate) fn eval_set(args: &[Expr], env: &Environment, depth: usize) -> Result<Value, Error> {
    match args {
        [Expr::Word(name), expr] => {
            let value = eval_with_depth_tracking(expr, env, depth + 1)?;
            env.set(name, value.clone())?;
            Ok(value)
        }
        [_, _] => Err(Error::MalformedForm(
            "Incorrect use of set: the first argument must be a word".to_owned(),
        )),
        _ => Err(Error::arity_error_for("set", Arity::Exact(2), args.len())),
    }
}

/// `fun(param..., body)`: builds a closure over `env`, evaluating nothing
pub(crate) fn eval_fun(args: &[Expr], env: &Environment, _depth: usize) -> Result<Value, Error> {
    match args {
        [param_exprs @ .., body] => {
            let params = param_exprs
                .iter()
                .map(|param| match param {
                    Expr::Word(name) => Ok(name.clone()),
                    other => Err(Error::MalformedForm(format!(
                        "Parameter names must be words, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Value::Function(Rc::new(Closure {
                params,
                body: body.clone(),
                scope: env.clone(),
            })))
        }
        [] => Err(Error::arity_error_for("fun", Arity::AtLeast(1), 0)),
    }
}

/// Create the sealed root environment: `true`, `false` and every builtin
/// function from the registry.
pub fn create_global_env() -> Environment {
    let env = Environment::sealed();
    env.define("true", Value::Bool(true));
    env.define("false", Value::Bool(false));

    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = &builtin_op.op_kind {
            env.define_builtin(builtin_op.id, Arc::clone(func));
        }
    }

    env
}
