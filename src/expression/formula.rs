// Copyright 2016 The Cartographer Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A small infix language compiled into expression trees:
//!
//! ```text
//! height * 2 + $minZ
//! concat(upper(name), '-', [building type])
//! ```
//!
//! Bare identifiers and `[bracketed names]` look up properties, `$name`
//! refers to a derived geometry scalar.

use crate::errors::*;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1};
use nom::character::complete::{char, multispace0, none_of, one_of};
use nom::combinator::{all_consuming, cut, map, opt, recognize, value};
use nom::error::{convert_error, ErrorKind as NomErrorKind, ParseError, VerboseError};
use nom::multi::{fold_many0, separated_list0};
use nom::number::complete::double;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;
use serde_json::{json, Value as JsonValue};

type ParseResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> ParseResult<'a, O>
where
    F: FnMut(&'a str) -> ParseResult<'a, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn identifier(input: &str) -> ParseResult<&str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn quoted(quote: char) -> impl FnMut(&str) -> ParseResult<String> {
    let normal = if quote == '"' { "\\\"" } else { "\\'" };
    move |input| {
        delimited(
            char(quote),
            map(
                opt(escaped_transform(
                    none_of(normal),
                    '\\',
                    alt((
                        value("\\", tag("\\")),
                        value("\"", tag("\"")),
                        value("'", tag("'")),
                        value("\n", tag("n")),
                    )),
                )),
                Option::unwrap_or_default,
            ),
            cut(char(quote)),
        )(input)
    }
}

fn string_literal(input: &str) -> ParseResult<JsonValue> {
    map(alt((quoted('"'), quoted('\''))), JsonValue::String)(input)
}

fn func_reference(input: &str) -> ParseResult<JsonValue> {
    map(recognize(pair(char('$'), identifier)), |name: &str| {
        json!(["func", name])
    })(input)
}

fn bracketed_property(input: &str) -> ParseResult<JsonValue> {
    map(delimited(char('['), is_not("]"), cut(char(']'))), |name: &str| {
        json!(["property", name.trim()])
    })(input)
}

fn property(input: &str) -> ParseResult<JsonValue> {
    map(identifier, |name| json!(["property", name]))(input)
}

fn number(input: &str) -> ParseResult<JsonValue> {
    map(double, |n| json!(n))(input)
}

fn call(input: &str) -> ParseResult<JsonValue> {
    let (rest, name) = identifier(input)?;
    let (rest, arguments) = preceded(
        ws(char('(')),
        cut(|i| {
            let (i, arguments) = separated_list0(ws(char(',')), expression)(i)?;
            let (i, _) = ws(char(')'))(i)?;
            Ok((i, arguments))
        }),
    )(rest)?;
    let unknown = || {
        nom::Err::Failure(VerboseError::from_error_kind(input, NomErrorKind::Verify))
    };
    let mut arguments = arguments.into_iter();
    let tree = match name {
        "concat" => {
            let first = arguments.next().unwrap_or_else(|| json!(""));
            let first = json!(["concat", first, ""]);
            arguments.fold(first, |acc, next| json!(["concat", acc, next]))
        }
        "upper" | "uppercase" | "lower" | "lowercase" => {
            let operator = if name.starts_with("upper") {
                "uppercase"
            } else {
                "lowercase"
            };
            match (arguments.next(), arguments.next()) {
                (Some(argument), None) => json!([operator, argument]),
                _ => return Err(unknown()),
            }
        }
        _ => return Err(unknown()),
    };
    Ok((rest, tree))
}

fn parenthesized(input: &str) -> ParseResult<JsonValue> {
    delimited(ws(char('(')), expression, cut(ws(char(')'))))(input)
}

fn atom(input: &str) -> ParseResult<JsonValue> {
    ws(alt((
        string_literal,
        func_reference,
        bracketed_property,
        call,
        property,
        number,
        parenthesized,
    )))(input)
}

fn unary(input: &str) -> ParseResult<JsonValue> {
    alt((
        map(preceded(ws(char('-')), unary), |operand| json!(["-", 0, operand])),
        atom,
    ))(input)
}

fn binary<'a>(
    operators: &'static str,
    operand: fn(&'a str) -> ParseResult<'a, JsonValue>,
) -> impl FnMut(&'a str) -> ParseResult<'a, JsonValue> {
    move |input| {
        let (input, first) = operand(input)?;
        fold_many0(
            pair(ws(one_of(operators)), operand),
            move || first.clone(),
            |acc, (operator, rhs)| json!([operator.to_string(), acc, rhs]),
        )(input)
    }
}

fn term(input: &str) -> ParseResult<JsonValue> {
    binary("*/", unary)(input)
}

fn expression(input: &str) -> ParseResult<JsonValue> {
    binary("+-", term)(input)
}

/// Compiles a formula into an operator tree understood by `evaluate`.
pub fn compile(formula: &str) -> Result<JsonValue> {
    all_consuming(ws(expression))(formula)
        .map(|(_, tree)| tree)
        .map_err(|err| {
            let reason = match err {
                nom::Err::Error(e) | nom::Err::Failure(e) => convert_error(formula, e),
                nom::Err::Incomplete(_) => "unexpected end of formula".to_string(),
            };
            ErrorKind::InvalidFormula(formula.to_string(), reason).into()
        })
}
