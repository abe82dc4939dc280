//! Recursive-descent grammar for matcher expressions.
//!
//! The matcher language is a small boolean/arithmetic expression language
//! over field references (`r.sub`, `p.obj`), literals, bracket lists with
//! `in`, and function calls (`keyMatch(...)`, `g(...)`, `eval(...)`).
//! Precedence, loosest to tightest: `||`, `&&`, comparison, `+ -`,
//! `* / %`, unary `! -`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, not, opt, recognize, value},
    multi::{fold_many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use crate::error::{EngineError, EngineResult};

use super::ast::{BinaryOp, Expr, UnaryOp, Value};

/// Parses an expression, requiring the whole input to be consumed.
pub fn parse(source: &str) -> EngineResult<Expr> {
    match all_consuming(terminated(or_expr, multispace0))(source) {
        Ok((_, expr)) => Ok(expr),
        Err(err) => Err(EngineError::ExpressionSyntax {
            expression: source.to_string(),
            message: err.to_string(),
        }),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

fn number(input: &str) -> IResult<&str, Expr> {
    map(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| Expr::Literal(Value::Num(s.parse().unwrap_or(0.0))),
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, Expr> {
    map(
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
        |s: &str| Expr::Literal(Value::Str(s.to_string())),
    )(input)
}

fn list_literal(input: &str) -> IResult<&str, Expr> {
    map(
        delimited(
            char('['),
            separated_list0(preceded(multispace0, char(',')), or_expr),
            preceded(multispace0, char(']')),
        ),
        Expr::List,
    )(input)
}

fn paren(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), or_expr, preceded(multispace0, char(')')))(input)
}

fn call_args(input: &str) -> IResult<&str, Vec<Expr>> {
    delimited(
        preceded(multispace0, char('(')),
        separated_list0(preceded(multispace0, char(',')), or_expr),
        preceded(multispace0, char(')')),
    )(input)
}

/// Identifier-led operands: keyword literals, `base.field` references,
/// function calls, and bare identifiers.
fn call_or_name(input: &str) -> IResult<&str, Expr> {
    let (rest, name) = identifier(input)?;

    match name {
        "true" => return Ok((rest, Expr::Literal(Value::Bool(true)))),
        "false" => return Ok((rest, Expr::Literal(Value::Bool(false)))),
        _ => {}
    }

    let attr: IResult<&str, &str> = preceded(char('.'), identifier)(rest);
    if let Ok((rest, field)) = attr {
        return Ok((
            rest,
            Expr::Attr {
                base: name.to_string(),
                field: field.to_string(),
            },
        ));
    }

    let call: IResult<&str, Vec<Expr>> = call_args(rest);
    if let Ok((rest, args)) = call {
        return Ok((
            rest,
            Expr::Call {
                name: name.to_string(),
                args,
            },
        ));
    }

    Ok((rest, Expr::Ident(name.to_string())))
}

fn primary(input: &str) -> IResult<&str, Expr> {
    preceded(
        multispace0,
        alt((number, string_literal, list_literal, paren, call_or_name)),
    )(input)
}

fn unary(input: &str) -> IResult<&str, Expr> {
    let (input, _) = multispace0(input)?;
    let bang: IResult<&str, char> = char('!')(input);
    if let Ok((rest, _)) = bang {
        let (rest, inner) = unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(inner),
            },
        ));
    }
    let minus: IResult<&str, char> = char('-')(input);
    if let Ok((rest, _)) = minus {
        let (rest, inner) = unary(rest)?;
        return Ok((
            rest,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(inner),
            },
        ));
    }
    primary(input)
}

fn mul_expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = unary(input)?;
    fold_many0(
        pair(
            preceded(
                multispace0,
                alt((
                    value(BinaryOp::Mul, char('*')),
                    value(BinaryOp::Div, char('/')),
                    value(BinaryOp::Mod, char('%')),
                )),
            ),
            unary,
        ),
        move || init.clone(),
        |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
    )(input)
}

fn add_expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = mul_expr(input)?;
    fold_many0(
        pair(
            preceded(
                multispace0,
                alt((
                    value(BinaryOp::Add, char('+')),
                    value(BinaryOp::Sub, char('-')),
                )),
            ),
            mul_expr,
        ),
        move || init.clone(),
        |lhs, (op, rhs)| Expr::binary(op, lhs, rhs),
    )(input)
}

fn cmp_op(input: &str) -> IResult<&str, BinaryOp> {
    preceded(
        multispace0,
        alt((
            value(BinaryOp::Eq, tag("==")),
            value(BinaryOp::Ne, tag("!=")),
            value(BinaryOp::Le, tag("<=")),
            value(BinaryOp::Ge, tag(">=")),
            value(BinaryOp::Lt, char('<')),
            value(BinaryOp::Gt, char('>')),
            value(BinaryOp::In, terminated(tag("in"), not(satisfy(is_ident_char)))),
        )),
    )(input)
}

/// Comparisons are non-associative: `a == b == c` is a syntax error at
/// the top level rather than a silent chain.
fn cmp_expr(input: &str) -> IResult<&str, Expr> {
    let (input, lhs) = add_expr(input)?;
    let (input, tail) = opt(pair(cmp_op, add_expr))(input)?;
    Ok(match tail {
        Some((op, rhs)) => (input, Expr::binary(op, lhs, rhs)),
        None => (input, lhs),
    })
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = cmp_expr(input)?;
    fold_many0(
        preceded(preceded(multispace0, tag("&&")), cmp_expr),
        move || init.clone(),
        |lhs, rhs| Expr::binary(BinaryOp::And, lhs, rhs),
    )(input)
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (input, init) = and_expr(input)?;
    fold_many0(
        preceded(preceded(multispace0, tag("||")), and_expr),
        move || init.clone(),
        |lhs, rhs| Expr::binary(BinaryOp::Or, lhs, rhs),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(source: &str) -> Expr {
        parse(source).expect(source)
    }

    #[test]
    fn parses_attribute_equality() {
        assert_eq!(
            ok("r.sub == p.sub"),
            Expr::binary(
                BinaryOp::Eq,
                Expr::Attr {
                    base: "r".into(),
                    field: "sub".into()
                },
                Expr::Attr {
                    base: "p".into(),
                    field: "sub".into()
                },
            )
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = ok("a.x || b.x && c.x");
        match expr {
            Expr::Binary { op: BinaryOp::Or, rhs, .. } => match *rhs {
                Expr::Binary { op: BinaryOp::And, .. } => {}
                other => panic!("expected && on the right, got {other:?}"),
            },
            other => panic!("expected || at the top, got {other:?}"),
        }
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let expr = ok("r.sub == p.sub && r.obj == p.obj");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn parses_function_calls_with_arguments() {
        assert_eq!(
            ok("g(r.sub, p.sub, r.dom)"),
            Expr::Call {
                name: "g".into(),
                args: vec![
                    Expr::Attr { base: "r".into(), field: "sub".into() },
                    Expr::Attr { base: "p".into(), field: "sub".into() },
                    Expr::Attr { base: "r".into(), field: "dom".into() },
                ],
            }
        );
    }

    #[test]
    fn parses_arithmetic_with_precedence() {
        let expr = ok("r.age + 2 * 3 > 10");
        match expr {
            Expr::Binary { op: BinaryOp::Gt, lhs, .. } => {
                assert!(matches!(*lhs, Expr::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected comparison at the top, got {other:?}"),
        }
    }

    #[test]
    fn parses_unary_not_and_negation() {
        assert!(matches!(
            ok("!g(r.sub, p.sub)"),
            Expr::Unary { op: UnaryOp::Not, .. }
        ));
        assert!(matches!(ok("-r.x < 0"), Expr::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn parses_in_with_list_literal() {
        let expr = ok("r.act in [\"read\", \"write\"]");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::In, .. }));
    }

    #[test]
    fn in_requires_a_word_boundary() {
        // `index` must parse as an identifier, not `in` followed by `dex`.
        assert!(matches!(ok("index"), Expr::Ident(name) if name == "index"));
    }

    #[test]
    fn parses_string_literals_both_quote_styles() {
        assert_eq!(
            ok("r.act == 'read'"),
            ok("r.act == \"read\""),
        );
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["r.sub ==", "&&", "(r.sub", "r.sub == p.sub extra", "[1, 2", ""] {
            let err = parse(bad).unwrap_err();
            assert!(
                matches!(err, EngineError::ExpressionSyntax { .. }),
                "expected syntax error for `{bad}`, got {err:?}"
            );
        }
    }

    #[test]
    fn keyword_literals_parse_as_booleans() {
        assert_eq!(ok("true"), Expr::Literal(Value::Bool(true)));
        assert_eq!(ok("false"), Expr::Literal(Value::Bool(false)));
    }
}
