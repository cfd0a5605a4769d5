use super::alias::Aliases;
use super::errors::QueryError;
use crate::dialect::SqlDialect;
use crate::filter::{CqlFilter, Subquery};
use crate::sql_path::SqlRelation;

fn join_condition(
    left: &str,
    right: &str,
    filter: Option<&str>,
    filter_alias: &str,
    dialect: &dyn SqlDialect,
) -> Result<String, QueryError> {
    match filter {
        Some(filter) => Ok(format!(
            "({}={} AND {})",
            left,
            right,
            encode(filter, filter_alias, dialect)?
        )),
        None => Ok(format!("({}={})", left, right)),
    }
}

/// JOIN clauses for a relation chain, filters of joined tables go into ON
pub fn join_clauses(
    relations: &[SqlRelation],
    aliases: &Aliases,
    dialect: &dyn SqlDialect,
) -> Result<Vec<String>, QueryError> {
    let mut joins = Vec::with_capacity(relations.len());

    for (i, relation) in relations.iter().enumerate() {
        let source = &aliases.tables[i];
        let target = &aliases.tables[i + 1];

        match (&relation.junction, &aliases.junctions[i]) {
            (Some(junction), Some(junction_alias)) => {
                let on = join_condition(
                    &format!("{}.{}", source, relation.source_field),
                    &format!("{}.{}", junction_alias, junction.source_field),
                    junction.filter.as_deref(),
                    junction_alias,
                    dialect,
                )?;
                joins.push(format!("JOIN {} {} ON {}", junction.name, junction_alias, on));

                let on = join_condition(
                    &format!("{}.{}", junction_alias, junction.target_field),
                    &format!("{}.{}", target, relation.target_field),
                    relation.target_filter.as_deref(),
                    target,
                    dialect,
                )?;
                joins.push(format!(
                    "{}JOIN {} {} ON {}",
                    relation.join_type.sql_prefix(),
                    relation.target_container,
                    target,
                    on
                ));
            }
            _ => {
                let on = join_condition(
                    &format!("{}.{}", source, relation.source_field),
                    &format!("{}.{}", target, relation.target_field),
                    relation.target_filter.as_deref(),
                    target,
                    dialect,
                )?;
                joins.push(format!(
                    "{}JOIN {} {} ON {}",
                    relation.join_type.sql_prefix(),
                    relation.target_container,
                    target,
                    on
                ));
            }
        }
    }

    Ok(joins)
}

/// Correlated subquery reaching the tables of `relations` from the outer
/// table `outer`; used to filter on properties of joined tables.
pub fn subquery(
    relations: &[SqlRelation],
    outer: &str,
    dialect: &dyn SqlDialect,
) -> Result<(Subquery, Aliases), QueryError> {
    let aliases = Aliases::for_subquery(relations, outer);
    let Some(first) = relations.first() else {
        return Err(QueryError::NoRelation {
            table: outer.to_string(),
        });
    };
    let column = format!("{}.{}", outer, first.source_field);
    let target = &aliases.tables[1];

    let rest = Aliases {
        tables: aliases.tables[1..].to_vec(),
        junctions: aliases.junctions[1..].to_vec(),
    };
    let rest_joins = join_clauses(&relations[1..], &rest, dialect)?;

    let (mut select, condition) = match (&first.junction, &aliases.junctions[0]) {
        (Some(junction), Some(junction_alias)) => {
            let on = join_condition(
                &format!("{}.{}", junction_alias, junction.target_field),
                &format!("{}.{}", target, first.target_field),
                first.target_filter.as_deref(),
                target,
                dialect,
            )?;
            let select = format!(
                "SELECT {ja}.{} FROM {} {ja} {}JOIN {} {} ON {}",
                junction.source_field,
                junction.name,
                first.join_type.sql_prefix(),
                first.target_container,
                target,
                on,
                ja = junction_alias,
            );
            let condition = junction
                .filter
                .as_deref()
                .map(|filter| encode(filter, junction_alias, dialect))
                .transpose()?;
            (select, condition)
        }
        _ => {
            let select = format!(
                "SELECT {t}.{} FROM {} {t}",
                first.target_field,
                first.target_container,
                t = target
            );
            let condition = first
                .target_filter
                .as_deref()
                .map(|filter| encode(filter, target, dialect))
                .transpose()?;
            (select, condition)
        }
    };

    for join in rest_joins {
        select.push(' ');
        select.push_str(&join);
    }

    Ok((
        Subquery {
            column,
            select,
            condition,
        },
        aliases,
    ))
}

fn encode(filter: &str, alias: &str, dialect: &dyn SqlDialect) -> Result<String, QueryError> {
    let sql = CqlFilter::parse(filter)?.to_sql_with_alias(alias, dialect)?;
    Ok(format!("({})", sql))
}
