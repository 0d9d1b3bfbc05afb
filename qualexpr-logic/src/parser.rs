//! Expression Parser
//!
//! Parses quality expression text into an unresolved syntax tree.
//!
//! # Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := '-' factor | '(' expr ')' | metric | integer
//! metric  := ident ('::' ident)+ '/' ident
//! ident   := [A-Za-z_][A-Za-z0-9_]*
//! integer := [0-9]+
//! ```
//!
//! Whitespace is allowed between tokens except inside a `::` path. A metric
//! such as `net::bytes/sum` names semantic `bytes` under namespace `net`,
//! aggregated with the `sum` kind.

use crate::compute::BinaryOp;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, one_of, satisfy},
    combinator::{all_consuming, map, map_res, recognize},
    error::{Error, ErrorKind},
    multi::{many0, many1},
    sequence::{delimited, pair, preceded},
};
use std::fmt;
use thiserror::Error;

/// Longest accepted expression text, in bytes
pub const MAX_EXPRESSION_LEN: usize = 4096;

/// Deepest accepted nesting of parentheses and unary minus
pub const MAX_NESTING: usize = 64;

/// Syntax error with the byte offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    /// Byte offset into the expression text
    pub offset: usize,
    /// What went wrong
    pub message: String,
}

/// Unresolved expression syntax tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal
    Literal(i64),
    /// `path::name/aggregator` reference
    Metric {
        /// Namespace segments, outermost first
        path: Vec<String>,
        /// Semantic leaf name
        name: String,
        /// Aggregator kind name
        aggregator: String,
    },
    /// Unary minus
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
}

impl Expr {
    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Metric {
                path,
                name,
                aggregator,
            } => write!(f, "{}::{name}/{aggregator}", path.join("::")),
            Expr::Neg(operand) => write!(f, "-{operand}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

/// Parse expression text
pub fn parse_expression(text: &str) -> Result<Expr, ParseError> {
    if text.len() > MAX_EXPRESSION_LEN {
        return Err(ParseError {
            offset: MAX_EXPRESSION_LEN,
            message: format!("expression longer than {MAX_EXPRESSION_LEN} bytes"),
        });
    }

    match all_consuming(|i| expr(i, 0)).parse(text) {
        Ok((_, tree)) => Ok(tree),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(ParseError {
            offset: text.len() - e.input.len(),
            message: describe(e.code).to_string(),
        }),
        Err(nom::Err::Incomplete(_)) => Err(ParseError {
            offset: text.len(),
            message: "unexpected end of expression".to_string(),
        }),
    }
}

fn describe(code: ErrorKind) -> &'static str {
    match code {
        ErrorKind::Eof => "unexpected trailing input",
        ErrorKind::TooLarge => "expression nested too deeply",
        ErrorKind::MapRes => "integer literal out of range",
        _ => "expected a number, metric or '('",
    }
}

fn expr(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = term(input, depth)?;
    let (input, rest) = many0(pair(one_of("+-"), |i| term(i, depth))).parse(input)?;
    let tree = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
        Expr::binary(op, lhs, rhs)
    });
    Ok((input, tree))
}

fn term(input: &str, depth: usize) -> IResult<&str, Expr> {
    let (input, first) = factor(input, depth)?;
    let (input, rest) = many0(pair(one_of("*/"), |i| factor(i, depth))).parse(input)?;
    let tree = rest.into_iter().fold(first, |lhs, (op, rhs)| {
        let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
        Expr::binary(op, lhs, rhs)
    });
    Ok((input, tree))
}

/// One operand, with surrounding whitespace consumed
fn factor(input: &str, depth: usize) -> IResult<&str, Expr> {
    if depth > MAX_NESTING {
        return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
    }
    let (input, _) = multispace0(input)?;
    let (input, node) = alt((
        map(preceded(char('-'), |i| factor(i, depth + 1)), |e| {
            Expr::Neg(Box::new(e))
        }),
        delimited(char('('), |i| expr(i, depth + 1), char(')')),
        metric,
        literal,
    ))
    .parse(input)?;
    let (input, _) = multispace0(input)?;
    Ok((input, node))
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn metric(input: &str) -> IResult<&str, Expr> {
    let (input, head) = identifier(input)?;
    let (input, tail) = many1(preceded(tag("::"), identifier)).parse(input)?;
    let (input, _) = delimited(multispace0, char('/'), multispace0).parse(input)?;
    let (input, aggregator) = identifier(input)?;

    let mut path: Vec<String> = std::iter::once(head)
        .chain(tail)
        .map(str::to_string)
        .collect();
    // many1 guarantees at least one tail segment
    let name = path.pop().unwrap_or_default();
    Ok((
        input,
        Expr::Metric {
            path,
            name,
            aggregator: aggregator.to_string(),
        },
    ))
}

fn literal(input: &str) -> IResult<&str, Expr> {
    map(map_res(digit1, str::parse::<i64>), Expr::Literal).parse(input)
}
