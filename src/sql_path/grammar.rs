use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while, take_while1},
    character::complete::{char, satisfy},
    combinator::{opt, recognize},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, separated_pair, terminated},
    IResult, Parser,
};

/// `(key, value)` of one `{key=value}` or `{key}` flag
pub(super) type RawFlag<'a> = (&'a str, Option<&'a str>);

#[derive(Debug, PartialEq)]
pub(super) struct RawTable<'a> {
    pub schema: Option<&'a str>,
    pub name: &'a str,
    pub join: Option<(&'a str, &'a str)>,
    pub flags: Vec<RawFlag<'a>>,
}

#[derive(Debug, PartialEq)]
pub(super) enum RawLeaf<'a> {
    Columns {
        columns: Vec<&'a str>,
        flags: Vec<RawFlag<'a>>,
    },
    Connected {
        connector: &'a str,
        column: &'a str,
        flags: Vec<RawFlag<'a>>,
        path_in_connector: Vec<&'a str>,
    },
}

// [a-zA-Z_][a-zA-Z0-9_]*
pub(super) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))
    .parse(input)
}

fn qualified_table(input: &str) -> IResult<&str, (Option<&str>, &str)> {
    pair(opt(terminated(identifier, char('.'))), identifier).parse(input)
}

// 'it''s', doubled quotes escape a quote
fn quoted(input: &str) -> IResult<&str, &str> {
    recognize((char('\''), many0(alt((tag("''"), is_not("'")))), char('\''))).parse(input)
}

/// Flag value up to the closing brace; braces inside quoted literals belong
/// to the value
fn flag_value(input: &str) -> IResult<&str, &str> {
    recognize(many0(alt((quoted, is_not("}'"))))).parse(input)
}

fn flag(input: &str) -> IResult<&str, RawFlag<'_>> {
    delimited(
        char('{'),
        pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
            opt(preceded(char('='), flag_value)),
        ),
        char('}'),
    )
    .parse(input)
}

fn flags(input: &str) -> IResult<&str, Vec<RawFlag<'_>>> {
    many0(flag).parse(input)
}

fn join(input: &str) -> IResult<&str, (&str, &str)> {
    delimited(
        char('['),
        separated_pair(identifier, char('='), identifier),
        char(']'),
    )
    .parse(input)
}

fn root_table(input: &str) -> IResult<&str, RawTable<'_>> {
    let (input, _) = char('/').parse(input)?;
    let (input, (schema, name)) = qualified_table(input)?;
    let (input, flags) = flags(input)?;

    Ok((
        input,
        RawTable {
            schema,
            name,
            join: None,
            flags,
        },
    ))
}

fn joined_table(input: &str) -> IResult<&str, RawTable<'_>> {
    let (input, join) = join(input)?;
    let (input, (schema, name)) = qualified_table(input)?;
    let (input, flags) = flags(input)?;

    Ok((
        input,
        RawTable {
            schema,
            name,
            join: Some(join),
            flags,
        },
    ))
}

/// `/root{flags}/[a=b]joined{flags}/...` or a relative `[a=b]joined/...`
pub(super) fn table_path(input: &str) -> IResult<&str, Vec<RawTable<'_>>> {
    let (input, root) = opt(root_table).parse(input)?;

    let (input, joined) = match root {
        Some(_) => many0(preceded(char('/'), joined_table)).parse(input)?,
        None => separated_list1(char('/'), joined_table).parse(input)?,
    };

    let tables = root.into_iter().chain(joined).collect();
    Ok((input, tables))
}

fn column_leaf(input: &str) -> IResult<&str, RawLeaf<'_>> {
    let (input, columns) = separated_list1(char(':'), identifier).parse(input)?;
    let (input, flags) = flags(input)?;

    Ok((input, RawLeaf::Columns { columns, flags }))
}

fn connected_leaf(input: &str) -> IResult<&str, RawLeaf<'_>> {
    let (input, connector) = delimited(char('['), identifier, char(']')).parse(input)?;
    let (input, column) = identifier(input)?;
    let (input, flags) = flags(input)?;
    let (input, path_in_connector) = many0(preceded(char('/'), identifier)).parse(input)?;

    Ok((
        input,
        RawLeaf::Connected {
            connector,
            column,
            flags,
            path_in_connector,
        },
    ))
}

/// Joined tables followed by a column leaf, optionally starting at a root table
pub(super) fn column_path(input: &str) -> IResult<&str, (Vec<RawTable<'_>>, RawLeaf<'_>)> {
    let (input, root) = opt(terminated(root_table, char('/'))).parse(input)?;
    let (input, joined) = many0(terminated(joined_table, char('/'))).parse(input)?;

    let (input, leaf) = match connected_leaf(input) {
        Ok(result) => result,
        Err(_) => column_leaf(input)?,
    };

    let tables = root.into_iter().chain(joined).collect();
    Ok((input, (tables, leaf)))
}
