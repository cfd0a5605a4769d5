//! Table aliases of generated queries
//!
//! The root table is `A`, every joined table takes the next letter, a
//! junction table takes one of its own in front of its target. Subqueries
//! use the alias of the outer table as prefix, `AA`, `AB`, ...

use crate::sql_path::SqlRelation;

/// `0 -> A`, `25 -> Z`, `26 -> BA`
pub fn alias(index: usize) -> String {
    let mut out = Vec::new();
    let mut rest = index;
    loop {
        out.push((b'A' + (rest % 26) as u8) as char);
        rest /= 26;
        if rest == 0 {
            break;
        }
    }
    out.iter().rev().collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aliases {
    /// Root first, then the target of every relation
    pub tables: Vec<String>,
    /// Junction alias per relation, only for M:N
    pub junctions: Vec<Option<String>>,
}

impl Aliases {
    pub fn for_relations(relations: &[SqlRelation], prefix: &str) -> Self {
        Self::allocate(relations, prefix, None)
    }

    /// Aliases of a subquery correlated with the table `outer`, which keeps
    /// its alias as the first table
    pub fn for_subquery(relations: &[SqlRelation], outer: &str) -> Self {
        Self::allocate(relations, outer, Some(outer.to_string()))
    }

    fn allocate(relations: &[SqlRelation], prefix: &str, root: Option<String>) -> Self {
        let mut next = 0;
        let mut take = || {
            let name = format!("{}{}", prefix, alias(next));
            next += 1;
            name
        };

        let mut tables = vec![root.unwrap_or_else(&mut take)];
        let mut junctions = Vec::with_capacity(relations.len());
        for relation in relations {
            junctions.push(relation.junction.as_ref().map(|_| take()));
            tables.push(take());
        }

        Aliases { tables, junctions }
    }

    pub fn root(&self) -> &str {
        &self.tables[0]
    }

    /// Alias of the last table in the chain
    pub fn target(&self) -> &str {
        self.tables.last().map(String::as_str).unwrap_or("A")
    }
}
