//! Scalar operands of CQL2 text filters
//!
//! Supports property references, string/number/boolean literals, `NULL`,
//! `DATE('..')` and `TIMESTAMP('..')` literals, arithmetic and the functions
//! `CASEI`, `ACCENTI`, `DIAMETER2D` and `DIAMETER3D`.

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, none_of, one_of},
    combinator::{map, opt, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, preceded},
    IResult, Parser,
};

use super::errors::FilterError;
use super::EncodingContext;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    Date(String),
    Timestamp(String),
}

impl Literal {
    pub fn to_sql(&self, ctx: &EncodingContext<'_>) -> String {
        match self {
            Literal::String(s) => format!("'{}'", ctx.dialect.escape_string(s)),
            Literal::Integer(i) => i.to_string(),
            Literal::Float(f) => f.to_string(),
            Literal::Boolean(true) => "TRUE".to_string(),
            Literal::Boolean(false) => "FALSE".to_string(),
            Literal::Null => "NULL".to_string(),
            Literal::Date(d) => ctx.dialect.apply_to_date_literal(d),
            Literal::Timestamp(t) => ctx.dialect.apply_to_datetime_literal(t),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
}

impl Operator {
    pub fn to_str(&self) -> &'static str {
        match self {
            Operator::Addition => "+",
            Operator::Subtraction => "-",
            Operator::Multiplication => "*",
            Operator::Division => "/",
        }
    }
}

/// Filter operand AST
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Property reference, resolved to a column when encoded
    Property(String),

    Literal(Literal),

    /// Function call: CASEI(name)
    Function { name: String, args: Vec<Expr> },

    BinaryOp {
        op: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Property names referenced by this operand
    pub fn properties(&self) -> Vec<String> {
        match self {
            Expr::Property(name) => vec![name.clone()],
            Expr::Literal(_) => vec![],
            Expr::Function { args, .. } => args.iter().flat_map(Expr::properties).collect(),
            Expr::BinaryOp { left, right, .. } => {
                let mut properties = left.properties();
                properties.extend(right.properties());
                properties
            }
        }
    }

    pub fn to_sql(&self, ctx: &EncodingContext<'_>) -> Result<String, FilterError> {
        match self {
            Expr::Property(name) => Ok(ctx.resolver.resolve(name)?.expression),
            Expr::Literal(literal) => Ok(literal.to_sql(ctx)),
            Expr::Function { name, args } => function_to_sql(name, args, ctx),
            Expr::BinaryOp { op, left, right } => Ok(format!(
                "({} {} {})",
                left.to_sql(ctx)?,
                op.to_str(),
                right.to_sql(ctx)?
            )),
        }
    }
}

fn single_arg<'a>(name: &str, args: &'a [Expr]) -> Result<&'a Expr, FilterError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(FilterError::unsupported(name, "expects exactly one argument")),
    }
}

fn function_to_sql(
    name: &str,
    args: &[Expr],
    ctx: &EncodingContext<'_>,
) -> Result<String, FilterError> {
    match name.to_ascii_uppercase().as_str() {
        "CASEI" => Ok(format!("LOWER({})", single_arg(name, args)?.to_sql(ctx)?)),
        "ACCENTI" => {
            let arg = single_arg(name, args)?.to_sql(ctx)?;
            match ctx.accenti_collation {
                Some(collation) => Ok(format!("{} COLLATE \"{}\"", arg, collation)),
                None => Err(FilterError::unsupported(
                    name,
                    "no accent insensitive collation is configured",
                )),
            }
        }
        upper @ ("DIAMETER2D" | "DIAMETER3D") => {
            let arg = single_arg(name, args)?.to_sql(ctx)?;
            ctx.dialect
                .apply_to_diameter(&arg, upper == "DIAMETER3D")
                .map_err(|e| FilterError::unsupported(name, e.to_string()))
        }
        _ => Err(FilterError::unsupported(name, "unknown function")),
    }
}

/// Parse an additive expression
pub(crate) fn parse_expr(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_multiplicative(input)?;

    let mut current = left;
    let mut current_input = input;

    loop {
        let (new_input, _) = multispace0(current_input)?;
        let op = if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('+')(new_input) {
            Some((rest, Operator::Addition))
        } else if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('-')(new_input) {
            Some((rest, Operator::Subtraction))
        } else {
            None
        };

        let Some((rest, op)) = op else {
            return Ok((current_input, current));
        };
        let (rest, _) = multispace0(rest)?;
        match parse_multiplicative(rest) {
            Ok((rest, right)) => {
                current = Expr::BinaryOp {
                    op,
                    left: Box::new(current),
                    right: Box::new(right),
                };
                current_input = rest;
            }
            Err(_) => return Ok((current_input, current)),
        }
    }
}

fn parse_multiplicative(input: &str) -> IResult<&str, Expr> {
    let (input, left) = parse_primary(input)?;

    let mut current = left;
    let mut current_input = input;

    loop {
        let (new_input, _) = multispace0(current_input)?;
        let op = if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('*')(new_input) {
            Some((rest, Operator::Multiplication))
        } else if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('/')(new_input) {
            Some((rest, Operator::Division))
        } else {
            None
        };

        let Some((rest, op)) = op else {
            return Ok((current_input, current));
        };
        let (rest, _) = multispace0(rest)?;
        match parse_primary(rest) {
            Ok((rest, right)) => {
                current = Expr::BinaryOp {
                    op,
                    left: Box::new(current),
                    right: Box::new(right),
                };
                current_input = rest;
            }
            Err(_) => return Ok((current_input, current)),
        }
    }
}

fn parse_primary(input: &str) -> IResult<&str, Expr> {
    alt((
        parse_temporal_literal,
        parse_function_call,
        map(parse_string, |s| Expr::Literal(Literal::String(s))),
        parse_number,
        parse_identifier_expr,
        delimited(
            char('('),
            delimited(multispace0, parse_expr, multispace0),
            char(')'),
        ),
    ))
    .parse(input)
}

/// `DATE('2020-01-01')`, `TIMESTAMP('2020-01-01T00:00:00Z')`
fn parse_temporal_literal(input: &str) -> IResult<&str, Expr> {
    let (input, kind) = alt((
        value(true, tag_no_case("TIMESTAMP")),
        value(false, tag_no_case("DATE")),
    ))
    .parse(input)?;
    let (input, _) = multispace0(input)?;
    let (input, text) = delimited(
        char('('),
        delimited(multispace0, delimited(char('\''), take_until("'"), char('\'')), multispace0),
        char(')'),
    )
    .parse(input)?;

    let literal = if kind {
        Literal::Timestamp(text.to_string())
    } else {
        Literal::Date(text.to_string())
    };
    Ok((input, Expr::Literal(literal)))
}

fn parse_function_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = parse_identifier_str(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = multispace0(input)?;

    let (input, args) =
        separated_list0(delimited(multispace0, char(','), multispace0), parse_expr).parse(input)?;

    let (input, _) = multispace0(input)?;
    let (input, _) = char(')')(input)?;

    Ok((
        input,
        Expr::Function {
            name: name.to_string(),
            args,
        },
    ))
}

/// Single quoted string, `''` escapes a quote
pub(crate) fn parse_string(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            many0(alt((value('\'', tag("''")), none_of("'")))),
            char('\''),
        ),
        |chars: Vec<char>| chars.into_iter().collect(),
    )
    .parse(input)
}

fn parse_number(input: &str) -> IResult<&str, Expr> {
    let (rest, text) =
        recognize((opt(one_of("+-")), digit1, opt(preceded(char('.'), digit1)))).parse(input)?;

    let literal = if text.contains('.') {
        text.parse().map(Literal::Float).ok()
    } else {
        text.parse().map(Literal::Integer).ok()
    };

    match literal {
        Some(literal) => Ok((rest, Expr::Literal(literal))),
        None => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

/// Identifier or one of the keywords TRUE, FALSE, NULL
fn parse_identifier_expr(input: &str) -> IResult<&str, Expr> {
    map(parse_identifier_str, |s: &str| match s.to_ascii_uppercase().as_str() {
        "TRUE" => Expr::Literal(Literal::Boolean(true)),
        "FALSE" => Expr::Literal(Literal::Boolean(false)),
        "NULL" => Expr::Literal(Literal::Null),
        _ => Expr::Property(s.to_string()),
    })
    .parse(input)
}

/// Property names may contain dots for nested properties
pub(crate) fn parse_identifier_str(input: &str) -> IResult<&str, &str> {
    recognize((
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_"), tag(".")))),
    ))
    .parse(input)
}
