//! Boolean predicates of CQL2 text filters
//!
//! - Comparison operators: `=`, `<>`, `<`, `>`, `<=`, `>=`
//! - Boolean operators: `AND`, `OR`, `NOT`
//! - `IN`, `LIKE`, `BETWEEN`, `IS NULL`, `IS NOT NULL`

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, multispace0, multispace1},
    combinator::value,
    multi::separated_list1,
    sequence::delimited,
    IResult, Parser,
};

use super::errors::FilterError;
use super::expression::{parse_expr, parse_string, Expr};
use super::{EncodingContext, Subquery};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        left: Expr,
        op: ComparisonOp,
        right: Expr,
    },

    And(Box<Predicate>, Box<Predicate>),

    Or(Box<Predicate>, Box<Predicate>),

    Not(Box<Predicate>),

    In {
        expr: Expr,
        values: Vec<Expr>,
        negated: bool,
    },

    Like {
        expr: Expr,
        pattern: String,
        negated: bool,
    },

    Between {
        expr: Expr,
        low: Expr,
        high: Expr,
        negated: bool,
    },

    IsNull {
        expr: Expr,
        negated: bool,
    },

    Parenthesized(Box<Predicate>),

    /// Boolean property or literal: `active`, `TRUE`
    Scalar(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl ComparisonOp {
    pub fn to_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "=",
            ComparisonOp::NotEqual => "<>",
            ComparisonOp::Less => "<",
            ComparisonOp::LessOrEqual => "<=",
            ComparisonOp::Greater => ">",
            ComparisonOp::GreaterOrEqual => ">=",
        }
    }
}

fn not_prefix(negated: bool) -> &'static str {
    if negated {
        "NOT "
    } else {
        ""
    }
}

impl Predicate {
    pub fn to_sql(&self, ctx: &EncodingContext<'_>) -> Result<String, FilterError> {
        match self {
            Predicate::And(left, right) => {
                Ok(format!("({} AND {})", left.to_sql(ctx)?, right.to_sql(ctx)?))
            }
            Predicate::Or(left, right) => {
                Ok(format!("({} OR {})", left.to_sql(ctx)?, right.to_sql(ctx)?))
            }
            Predicate::Not(inner) => Ok(format!("NOT {}", inner.to_sql(ctx)?)),
            Predicate::Parenthesized(inner) => Ok(format!("({})", inner.to_sql(ctx)?)),
            _ => self.leaf_to_sql(ctx),
        }
    }

    /// Leaf predicates on properties of joined tables become a subquery on
    /// the join column of the root table
    fn leaf_to_sql(&self, ctx: &EncodingContext<'_>) -> Result<String, FilterError> {
        let mut subqueries: Vec<Subquery> = Vec::new();
        for property in self.properties() {
            if let Some(subquery) = ctx.resolver.resolve(&property)?.subquery {
                if !subqueries.contains(&subquery) {
                    subqueries.push(subquery);
                }
            }
        }

        let sql = self.leaf_sql(ctx)?;
        match subqueries.as_slice() {
            [] => Ok(sql),
            [subquery] => match &subquery.condition {
                Some(condition) => Ok(format!(
                    "{} IN ({} WHERE {} AND {})",
                    subquery.column, subquery.select, condition, sql
                )),
                None => Ok(format!(
                    "{} IN ({} WHERE {})",
                    subquery.column, subquery.select, sql
                )),
            },
            _ => Err(FilterError::unsupported(
                "predicate",
                "properties from different tables cannot be compared",
            )),
        }
    }

    fn leaf_sql(&self, ctx: &EncodingContext<'_>) -> Result<String, FilterError> {
        Ok(match self {
            Predicate::Comparison { left, op, right } => {
                format!("{} {} {}", left.to_sql(ctx)?, op.to_sql(), right.to_sql(ctx)?)
            }
            Predicate::In {
                expr,
                values,
                negated,
            } => {
                let values = values
                    .iter()
                    .map(|v| v.to_sql(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                format!(
                    "{} {}IN ({})",
                    expr.to_sql(ctx)?,
                    not_prefix(*negated),
                    values.join(", ")
                )
            }
            Predicate::Like {
                expr,
                pattern,
                negated,
            } => format!(
                "{} {}LIKE '{}'",
                expr.to_sql(ctx)?,
                not_prefix(*negated),
                ctx.dialect.escape_string(pattern)
            ),
            Predicate::Between {
                expr,
                low,
                high,
                negated,
            } => format!(
                "{} {}BETWEEN {} AND {}",
                expr.to_sql(ctx)?,
                not_prefix(*negated),
                low.to_sql(ctx)?,
                high.to_sql(ctx)?
            ),
            Predicate::IsNull { expr, negated } => {
                let null = if *negated { "IS NOT NULL" } else { "IS NULL" };
                format!("{} {}", expr.to_sql(ctx)?, null)
            }
            Predicate::Scalar(expr) => expr.to_sql(ctx)?,
            Predicate::And(..) | Predicate::Or(..) | Predicate::Not(_) | Predicate::Parenthesized(_) => {
                self.to_sql(ctx)?
            }
        })
    }

    /// Property names referenced anywhere in the predicate
    pub fn properties(&self) -> Vec<String> {
        match self {
            Predicate::Comparison { left, right, .. } => {
                let mut properties = left.properties();
                properties.extend(right.properties());
                properties
            }
            Predicate::And(left, right) | Predicate::Or(left, right) => {
                let mut properties = left.properties();
                properties.extend(right.properties());
                properties
            }
            Predicate::Not(inner) | Predicate::Parenthesized(inner) => inner.properties(),
            Predicate::In { expr, values, .. } => {
                let mut properties = expr.properties();
                properties.extend(values.iter().flat_map(Expr::properties));
                properties
            }
            Predicate::Like { expr, .. } | Predicate::IsNull { expr, .. } => expr.properties(),
            Predicate::Between { expr, low, high, .. } => {
                let mut properties = expr.properties();
                properties.extend(low.properties());
                properties.extend(high.properties());
                properties
            }
            Predicate::Scalar(expr) => expr.properties(),
        }
    }
}

/// Parse OR expressions, the lowest precedence
pub(crate) fn parse_or(input: &str) -> IResult<&str, Predicate> {
    let (input, left) = parse_and(input)?;

    let mut current = left;
    let mut current_input = input;

    loop {
        let (new_input, _) = multispace0(current_input)?;

        if let Ok((new_input, _)) = tag_no_case::<_, _, nom::error::Error<_>>("OR")(new_input) {
            if let Ok((new_input, _)) = multispace1::<_, nom::error::Error<_>>(new_input) {
                if let Ok((new_input, right)) = parse_and(new_input) {
                    current = Predicate::Or(Box::new(current), Box::new(right));
                    current_input = new_input;
                    continue;
                }
            }
        }
        break;
    }

    Ok((current_input, current))
}

fn parse_and(input: &str) -> IResult<&str, Predicate> {
    let (input, left) = parse_not(input)?;

    let mut current = left;
    let mut current_input = input;

    loop {
        let (new_input, _) = multispace0(current_input)?;

        if let Ok((new_input, _)) = tag_no_case::<_, _, nom::error::Error<_>>("AND")(new_input) {
            if let Ok((new_input, _)) = multispace1::<_, nom::error::Error<_>>(new_input) {
                if let Ok((new_input, right)) = parse_not(new_input) {
                    current = Predicate::And(Box::new(current), Box::new(right));
                    current_input = new_input;
                    continue;
                }
            }
        }
        break;
    }

    Ok((current_input, current))
}

fn parse_not(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = multispace0(input)?;

    if let Ok((rest, _)) = tag_no_case::<_, _, nom::error::Error<_>>("NOT")(input) {
        if let Ok((rest, _)) = multispace1::<_, nom::error::Error<_>>(rest) {
            let (rest, inner) = parse_not(rest)?;
            return Ok((rest, Predicate::Not(Box::new(inner))));
        }
    }

    parse_comparison(input)
}

fn parse_comparison(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = multispace0(input)?;

    if let Ok((rest, _)) = char::<_, nom::error::Error<_>>('(')(input) {
        if let Ok((rest, inner)) = delimited(multispace0, parse_or, multispace0).parse(rest) {
            // `(a + b) > 3` is an arithmetic operand, not a nested predicate
            let is_operand = matches!(inner, Predicate::Scalar(_));
            if let (false, Ok((rest, _))) =
                (is_operand, char::<_, nom::error::Error<_>>(')')(rest))
            {
                return Ok((rest, Predicate::Parenthesized(Box::new(inner))));
            }
        }
    }

    let (input, left) = parse_expr(input)?;
    let (input, _) = multispace0(input)?;

    if let Ok(result) = parse_is_null(&left, input) {
        return Ok(result);
    }
    if let Ok(result) = parse_in(&left, input) {
        return Ok(result);
    }
    if let Ok(result) = parse_like(&left, input) {
        return Ok(result);
    }
    if let Ok(result) = parse_between(&left, input) {
        return Ok(result);
    }
    if let Ok(result) = parse_comparison_op(&left, input) {
        return Ok(result);
    }

    Ok((input, Predicate::Scalar(left)))
}

fn parse_comparison_op<'a>(left: &Expr, input: &'a str) -> IResult<&'a str, Predicate> {
    let (input, op) = alt((
        value(ComparisonOp::NotEqual, tag("<>")),
        value(ComparisonOp::LessOrEqual, tag("<=")),
        value(ComparisonOp::GreaterOrEqual, tag(">=")),
        value(ComparisonOp::Less, tag("<")),
        value(ComparisonOp::Greater, tag(">")),
        value(ComparisonOp::Equal, tag("=")),
    ))
    .parse(input)?;

    let (input, _) = multispace0(input)?;
    let (input, right) = parse_expr(input)?;

    Ok((
        input,
        Predicate::Comparison {
            left: left.clone(),
            op,
            right,
        },
    ))
}

fn parse_negation(input: &str) -> IResult<&str, bool> {
    if let Ok((rest, _)) = tag_no_case::<_, _, nom::error::Error<_>>("NOT")(input) {
        let (rest, _) = multispace1(rest)?;
        return Ok((rest, true));
    }
    Ok((input, false))
}

fn parse_is_null<'a>(left: &Expr, input: &'a str) -> IResult<&'a str, Predicate> {
    let (input, _) = tag_no_case("IS")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, negated) = parse_negation(input)?;
    let (input, _) = tag_no_case("NULL")(input)?;

    Ok((
        input,
        Predicate::IsNull {
            expr: left.clone(),
            negated,
        },
    ))
}

fn parse_in<'a>(left: &Expr, input: &'a str) -> IResult<&'a str, Predicate> {
    let (input, negated) = parse_negation(input)?;
    let (input, _) = tag_no_case("IN")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, values) = delimited(
        (char('('), multispace0),
        separated_list1(delimited(multispace0, char(','), multispace0), parse_expr),
        (multispace0, char(')')),
    )
    .parse(input)?;

    Ok((
        input,
        Predicate::In {
            expr: left.clone(),
            values,
            negated,
        },
    ))
}

fn parse_like<'a>(left: &Expr, input: &'a str) -> IResult<&'a str, Predicate> {
    let (input, negated) = parse_negation(input)?;
    let (input, _) = tag_no_case("LIKE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, pattern) = parse_string(input)?;

    Ok((
        input,
        Predicate::Like {
            expr: left.clone(),
            pattern,
            negated,
        },
    ))
}

fn parse_between<'a>(left: &Expr, input: &'a str) -> IResult<&'a str, Predicate> {
    let (input, negated) = parse_negation(input)?;
    let (input, _) = tag_no_case("BETWEEN")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, low) = parse_expr(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_no_case("AND")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, high) = parse_expr(input)?;

    Ok((
        input,
        Predicate::Between {
            expr: left.clone(),
            low,
            high,
            negated,
        },
    ))
}
