//! Expression trees as JSON.
//!
//! Every node is an object tagged by `"type"`:
//!
//! ```json
//! {"type": "apply",
//!  "operator": {"type": "word", "name": "+"},
//!  "args": [{"type": "word", "name": "a"}, {"type": "value", "value": 10}]}
//! ```
//!
//! This is the shape `+(a, 10)` has when printed by other Egg tools, so trees
//! can be exchanged with them or inspected without an Egg printer.

use serde_json::json;

use crate::ast::{Expr, Literal, NumberType, is_word_char};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

fn json_error(message: impl Into<String>) -> Error {
    Error::syntax(ParseError::from_message(
        ParseErrorKind::UnexpectedSyntax,
        message,
    ))
}

/// Parse JSON text holding an expression tree
pub fn parse_json(input: &str) -> Result<Expr, Error> {
    let json: serde_json::Value =
        serde_json::from_str(input).map_err(|e| json_error(format!("Invalid JSON: {e}")))?;
    expr_from_json(&json)
}

/// Convert a JSON node into an expression tree.
/// Only trees with an Egg source form are accepted: words made of word
/// characters, strings without `"`, and non-negative integers.
pub fn expr_from_json(json: &serde_json::Value) -> Result<Expr, Error> {
    expr_from_json_with_depth(json, 0)
}

fn expr_from_json_with_depth(json: &serde_json::Value, depth: usize) -> Result<Expr, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::syntax(ParseError::from_message(
            ParseErrorKind::TooDeeplyNested,
            format!("JSON expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        )));
    }

    let serde_json::Value::Object(node) = json else {
        return Err(json_error(format!("Expected an expression object, got {json}")));
    };

    match node.get("type").and_then(serde_json::Value::as_str) {
        Some("value") => match node.get("value") {
            Some(serde_json::Value::String(s)) if s.contains('"') => Err(json_error(format!(
                "String literal cannot contain a double quote: {s:?}"
            ))),
            Some(serde_json::Value::String(s)) => Ok(Expr::Value(Literal::String(s.clone()))),
            Some(serde_json::Value::Number(n)) => match n.as_f64() {
                Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 => {
                    Ok(Expr::Value(Literal::Number(n)))
                }
                _ => Err(json_error(format!(
                    "Number literal must be a non-negative integer, got {n}"
                ))),
            },
            Some(other) => Err(json_error(format!(
                "Literal must be a string or number, got {other}"
            ))),
            None => Err(json_error("Value node without \"value\"")),
        },
        Some("word") => match node.get("name").and_then(serde_json::Value::as_str) {
            Some(name) if is_word_name(name) => Ok(Expr::Word(name.to_owned())),
            Some(name) => Err(json_error(format!("Not a valid word: {name:?}"))),
            None => Err(json_error("Word node needs a string \"name\"")),
        },
        Some("apply") => {
            let operator = node
                .get("operator")
                .ok_or_else(|| json_error("Apply node without \"operator\""))?;
            let operator = expr_from_json_with_depth(operator, depth + 1)?;

            let args = match node.get("args") {
                Some(serde_json::Value::Array(args)) => args
                    .iter()
                    .map(|arg| expr_from_json_with_depth(arg, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?,
                _ => return Err(json_error("Apply node needs an \"args\" array")),
            };

            Ok(Expr::Apply {
                operator: Box::new(operator),
                args,
            })
        }
        Some(other) => Err(json_error(format!("Unknown node type: {other}"))),
        None => Err(json_error("Node without a string \"type\"")),
    }
}

// All digits would read back as a number
fn is_word_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(is_word_char)
        && !name.bytes().all(|b| b.is_ascii_digit())
}

/// Convert an expression tree into JSON.
/// Integral numbers are written without a fraction.
pub fn expr_to_json(expr: &Expr) -> serde_json::Value {
    match expr {
        Expr::Value(Literal::String(s)) => json!({"type": "value", "value": s}),
        Expr::Value(Literal::Number(n)) => json!({"type": "value", "value": number_to_json(*n)}),
        Expr::Word(name) => json!({"type": "word", "name": name}),
        Expr::Apply { operator, args } => json!({
            "type": "apply",
            "operator": expr_to_json(operator),
            "args": args.iter().map(expr_to_json).collect::<Vec<_>>(),
        }),
    }
}

fn number_to_json(n: NumberType) -> serde_json::Value {
    const MAX_EXACT: NumberType = 9_007_199_254_740_992.0; // 2^53
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        json!(n as i64)
    } else {
        // Non-finite numbers have no JSON form and become null
        json!(n)
    }
}

/// Serialize an expression tree as compact JSON text
pub fn expr_to_json_string(expr: &Expr) -> String {
    expr_to_json(expr).to_string()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{apply, num, text, word};
    use crate::parser::parse;

    #[test]
    fn test_expr_to_json() {
        let cases = vec![
            (num(10), json!({"type": "value", "value": 10})),
            (num(2.5), json!({"type": "value", "value": 2.5})),
            (text("hi"), json!({"type": "value", "value": "hi"})),
            (word("x"), json!({"type": "word", "name": "x"})),
            (
                apply(word("+"), [word("a"), num(10)]),
                json!({
                    "type": "apply",
                    "operator": {"type": "word", "name": "+"},
                    "args": [
                        {"type": "word", "name": "a"},
                        {"type": "value", "value": 10}
                    ]
                }),
            ),
            (
                apply(apply(word("f"), [num(4)]), []),
                json!({
                    "type": "apply",
                    "operator": {
                        "type": "apply",
                        "operator": {"type": "word", "name": "f"},
                        "args": [{"type": "value", "value": 4}]
                    },
                    "args": []
                }),
            ),
        ];
        for (expr, expected) in cases {
            assert_eq!(expr_to_json(&expr), expected, "for {expr}");
        }
    }

    #[test]
    fn test_parsed_program_survives_json() {
        let programs = [
            "do(define(total, 0), define(count, 1), while(<(count, 11), do(define(total, +(total, count)), define(count, +(count, 1)))), total)",
            "define(f, fun(a, fun(b, +(a, b))))",
            "print(\"a, b\")(1)()",
        ];
        for program in programs {
            let tree = parse(program).unwrap();
            let text = expr_to_json_string(&tree);
            assert_eq!(parse_json(&text).unwrap(), tree, "via {text}");
        }
    }

    #[test]
    fn test_invalid_json_trees() {
        let cases = vec![
            ("not json", "Invalid JSON"),
            ("[]", "Expected an expression object"),
            ("{}", "Node without a string \"type\""),
            (r#"{"type": "lambda"}"#, "Unknown node type: lambda"),
            (r#"{"type": "value"}"#, "without \"value\""),
            (r#"{"type": "value", "value": true}"#, "string or number"),
            (r#"{"type": "word", "name": ""}"#, "Not a valid word"),
            (r#"{"type": "word", "name": "a b"}"#, "Not a valid word"),
            (r#"{"type": "word", "name": "f(x)"}"#, "Not a valid word"),
            (r#"{"type": "word", "name": "a#b"}"#, "Not a valid word"),
            (r#"{"type": "word", "name": "42"}"#, "Not a valid word"),
            (r#"{"type": "word", "name": 3}"#, "needs a string"),
            (r#"{"type": "value", "value": "say \"hi\""}"#, "double quote"),
            (r#"{"type": "value", "value": -1}"#, "non-negative integer"),
            (r#"{"type": "value", "value": 2.5}"#, "non-negative integer"),
            (
                r#"{"type": "apply", "args": []}"#,
                "without \"operator\"",
            ),
            (
                r#"{"type": "apply", "operator": {"type": "word", "name": "f"}}"#,
                "\"args\" array",
            ),
            (
                r#"{"type": "apply", "operator": {"type": "word", "name": "f"}, "args": [1]}"#,
                "Expected an expression object",
            ),
        ];
        for (input, expected) in cases {
            match parse_json(input) {
                Err(Error::SyntaxError(e)) => assert!(
                    e.message.contains(expected),
                    "'{}' should contain '{expected}' for {input}",
                    e.message
                ),
                other => panic!("expected syntax error for {input}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_accepted_trees_print_as_source() {
        let inputs = [
            r#"{"type": "word", "name": "x1"}"#,
            r#"{"type": "word", "name": "<="}"#,
            r#"{"type": "word", "name": "1a"}"#,
            r#"{"type": "value", "value": "a, b (c) # d"}"#,
            r#"{"type": "value", "value": 12345678901234567890}"#,
        ];
        for input in inputs {
            let tree = parse_json(input).unwrap();
            assert_eq!(parse(&tree.to_string()).unwrap(), tree, "for {input}");
        }
    }

    #[test]
    fn test_json_depth_limit() {
        let mut json = json!({"type": "word", "name": "x"});
        for _ in 0..MAX_PARSE_DEPTH + 1 {
            json = json!({"type": "apply", "operator": json, "args": []});
        }
        match expr_from_json(&json) {
            Err(Error::SyntaxError(e)) => assert_eq!(e.kind, ParseErrorKind::TooDeeplyNested),
            other => panic!("expected depth error, got {other:?}"),
        }
    }
}
