use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, digit1, satisfy},
    combinator::{not, recognize},
    error::ErrorKind,
    multi::many0_count,
    sequence::{delimited, preceded, terminated},
};

use crate::MAX_PARSE_DEPTH;
use crate::ast::{Expr, Literal, NumberType, is_word_char};
use crate::{Error, ParseError, ParseErrorKind};

type ParseResult<'a, O> = IResult<&'a str, O>;

/// Strip leading whitespace and `#` line comments, in any interleaving.
///
/// A comment runs up to, not including, the next line break.
pub fn skip_space(input: &str) -> &str {
    let comment = recognize(preceded(
        char('#'),
        take_till(|c: char| c == '\n' || c == '\r'),
    ));
    let mut blanks = recognize(many0_count(alt((take_while1(char::is_whitespace), comment))));
    let result: ParseResult<'_, &str> = blanks.parse(input);
    match result {
        Ok((rest, _)) => rest,
        Err(_) => input,
    }
}

/// Convert nom parsing errors into a `SyntaxError` pointing into `source`
fn to_syntax_error(source: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = source.len().saturating_sub(e.input.len());
            let (kind, message) = match e.code {
                ErrorKind::TooLarge => (
                    ParseErrorKind::TooDeeplyNested,
                    format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                ),
                ErrorKind::Char => (
                    ParseErrorKind::ExpectedSeparator,
                    "Expected ',' or ')'".to_owned(),
                ),
                _ if e.input.is_empty() => (
                    ParseErrorKind::UnexpectedSyntax,
                    "Unexpected syntax: end of input".to_owned(),
                ),
                _ => {
                    let near: String = e.input.chars().take(20).collect();
                    (
                        ParseErrorKind::UnexpectedSyntax,
                        format!("Unexpected syntax: {near}"),
                    )
                }
            };
            Error::syntax(ParseError::at_offset(kind, message, source, offset))
        }
        nom::Err::Incomplete(_) => Error::syntax(ParseError::from_message(
            ParseErrorKind::UnexpectedSyntax,
            "Incomplete input",
        )),
    }
}

/// Parse a string literal; there are no escape sequences
fn parse_string(input: &str) -> ParseResult<'_, Expr> {
    let (rest, text) = delimited(char('"'), take_till(|c: char| c == '"'), char('"')).parse(input)?;
    Ok((rest, Expr::Value(Literal::String(text.to_owned()))))
}

/// Parse a run of ASCII digits ending at a word boundary
fn parse_number(input: &str) -> ParseResult<'_, Expr> {
    let (rest, digits) = terminated(
        digit1,
        not(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_')),
    )
    .parse(input)?;

    match digits.parse::<NumberType>() {
        Ok(n) => Ok((rest, Expr::Value(Literal::Number(n)))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        ))),
    }
}

/// Parse a word: anything up to whitespace or one of `(),#"`
fn parse_word(input: &str) -> ParseResult<'_, Expr> {
    let (rest, name) = take_while1(is_word_char).parse(input)?;
    Ok((rest, Expr::Word(name.to_owned())))
}

/// Consume the punctuation character `c`, if present
fn punct(input: &str, c: char) -> Option<&str> {
    char::<_, nom::error::Error<&str>>(c)
        .parse(input)
        .ok()
        .map(|(rest, _)| rest)
}

/// Parse one expression, including any call suffixes
fn parse_expr(input: &str, depth: usize) -> ParseResult<'_, Expr> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::TooLarge,
        )));
    }
    let input = skip_space(input);
    let (rest, atom) = alt((parse_string, parse_number, parse_word))
        .parse(input)
        .map_err(|_| nom::Err::Failure(nom::error::Error::new(input, ErrorKind::Alt)))?;
    parse_apply(atom, rest, depth)
}

/// Wrap `expr` into call forms for every `(args...)` that follows it,
/// so `f(4)(5)` applies the result of `f(4)` to `5`.
/// Each suffix nests the tree one level deeper through the operator.
fn parse_apply(mut expr: Expr, mut input: &str, mut depth: usize) -> ParseResult<'_, Expr> {
    loop {
        let open = skip_space(input);
        let Some(mut rest) = punct(open, '(') else {
            return Ok((open, expr));
        };
        depth += 1;
        if depth >= MAX_PARSE_DEPTH {
            return Err(nom::Err::Failure(nom::error::Error::new(
                open,
                ErrorKind::TooLarge,
            )));
        }

        let mut args = Vec::new();
        rest = skip_space(rest);
        loop {
            if let Some(after) = punct(rest, ')') {
                rest = after;
                break;
            }
            let (after, arg) = parse_expr(rest, depth)?;
            args.push(arg);

            let after = skip_space(after);
            if let Some(after) = punct(after, ',') {
                // A trailing comma before `)` is allowed
                rest = skip_space(after);
            } else if let Some(after) = punct(after, ')') {
                rest = after;
                break;
            } else {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    after,
                    ErrorKind::Char,
                )));
            }
        }

        expr = Expr::Apply {
            operator: Box::new(expr),
            args,
        };
        input = rest;
    }
}

/// Parse one expression from the front of `program`, returning it with the
/// unconsumed remainder (leading whitespace and comments already skipped).
pub fn parse_expression(program: &str) -> Result<(Expr, &str), Error> {
    match parse_expr(program, 0) {
        Ok((rest, expr)) => Ok((expr, rest)),
        Err(e) => Err(to_syntax_error(program, e)),
    }
}

/// Parse a complete program: exactly one expression, optionally surrounded
/// by whitespace and comments.
pub fn parse(program: &str) -> Result<Expr, Error> {
    let (expr, rest) = parse_expression(program)?;
    let rest = skip_space(rest);
    if rest.is_empty() {
        Ok(expr)
    } else {
        Err(Error::syntax(ParseError::at_offset(
            ParseErrorKind::TrailingText,
            "Unexpected text after program",
            program,
            program.len() - rest.len(),
        )))
    }
}
