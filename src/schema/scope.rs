//! Scope filters applied before deriving relational schemas

use super::feature_schema::{FeatureSchema, Scope};

/// Copy of `schema` without the properties that exclude `scope`.
///
/// Objects that end up without properties are dropped as well, unless they
/// are mapped to a column of their own.
pub fn apply_scope(schema: &FeatureSchema, scope: Scope) -> FeatureSchema {
    let mut scoped = schema.clone();
    scoped.properties = schema
        .properties
        .iter()
        .filter(|property| property.is_in_scope(scope))
        .map(|property| apply_scope(property, scope))
        .filter(|property| {
            !property.schema_type.is_object()
                || !property.properties.is_empty()
                || property.concat.iter().any(|c| !c.properties.is_empty())
                || is_column_object(property)
        })
        .collect();
    scoped.concat = schema
        .concat
        .iter()
        .map(|alternative| apply_scope(alternative, scope))
        .collect();
    scoped
}

/// Objects read from a single connected column, `[JSON]doc`
fn is_column_object(schema: &FeatureSchema) -> bool {
    schema
        .source_path
        .as_deref()
        .map(|path| path.starts_with('[') && !path.contains('='))
        .unwrap_or(false)
}

/// Dotted paths of all value properties, the candidates for queryables
/// and sortables
pub fn value_paths(schema: &FeatureSchema, scope: Scope) -> Vec<(String, &FeatureSchema)> {
    let mut paths = Vec::new();
    collect_value_paths(schema, scope, "", &mut paths);
    paths
}

fn collect_value_paths<'a>(
    schema: &'a FeatureSchema,
    scope: Scope,
    prefix: &str,
    paths: &mut Vec<(String, &'a FeatureSchema)>,
) {
    for property in schema.properties.iter().filter(|p| p.is_in_scope(scope)) {
        let path = if prefix.is_empty() {
            property.name.clone()
        } else {
            format!("{}.{}", prefix, property.name)
        };

        if property.properties.is_empty() {
            if scope != Scope::Sortable || !property.schema_type.is_array() {
                paths.push((path, property));
            }
        } else {
            collect_value_paths(property, scope, &path, paths);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaType;

    fn schema() -> FeatureSchema {
        let mut secret = FeatureSchema::new("secret", SchemaType::String).with_source_path("secret");
        secret.excluded_scopes = vec![Scope::Returnable];

        let mut hidden = FeatureSchema::new("hidden", SchemaType::String).with_source_path("hidden");
        hidden.excluded_scopes = vec![Scope::Returnable];

        FeatureSchema::new("kita", SchemaType::Object)
            .with_source_path("/kita")
            .with_properties(vec![
                FeatureSchema::new("id", SchemaType::String).with_source_path("id"),
                secret,
                FeatureSchema::new("kontakt", SchemaType::Object).with_properties(vec![hidden]),
                FeatureSchema::new("tags", SchemaType::ValueArray)
                    .with_source_path("[id=kita_id]tags/tag"),
            ])
    }

    #[test]
    fn test_apply_scope() {
        let scoped = apply_scope(&schema(), Scope::Returnable);
        let names: Vec<_> = scoped.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "tags"]);

        let receivable = apply_scope(&schema(), Scope::Receivable);
        assert_eq!(receivable.properties.len(), 4);
    }

    #[test]
    fn test_value_paths() {
        let schema = schema();
        let queryables: Vec<_> = value_paths(&schema, Scope::Queryable)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert_eq!(queryables, vec!["id", "secret", "kontakt.hidden", "tags"]);

        let sortables: Vec<_> = value_paths(&schema, Scope::Sortable)
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        assert!(!sortables.contains(&"tags".to_string()));
    }
}
