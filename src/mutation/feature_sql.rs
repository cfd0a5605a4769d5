use serde_json::{Map, Value as JsonValue};

/// Written for properties explicitly set to null in a partial update, so
/// they can be told apart from omitted ones
pub const PATCH_NULL_VALUE: &str = "###NULL###";

/// Mutable feature representation the mutation statements are built from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSql {
    pub properties: Map<String, JsonValue>,
}

impl FeatureSql {
    pub fn new(properties: Map<String, JsonValue>) -> Self {
        FeatureSql { properties }
    }

    /// `None` unless `value` is a JSON object
    pub fn from_json(value: JsonValue) -> Option<Self> {
        match value {
            JsonValue::Object(properties) => Some(FeatureSql { properties }),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, path: &[String]) -> Option<&JsonValue> {
        lookup(&self.properties, path)
    }

    /// Values of `patch` win, nested objects are merged member by member
    pub fn patch_with(mut self, patch: FeatureSql) -> FeatureSql {
        merge_objects(&mut self.properties, patch.properties);
        self
    }
}

pub fn is_patch_null(value: &JsonValue) -> bool {
    value.as_str() == Some(PATCH_NULL_VALUE)
}

pub(crate) fn lookup<'a>(object: &'a Map<String, JsonValue>, path: &[String]) -> Option<&'a JsonValue> {
    let (first, rest) = path.split_first()?;
    let value = object.get(first)?;
    if rest.is_empty() {
        return Some(value);
    }
    lookup(value.as_object()?, rest)
}

fn merge_objects(target: &mut Map<String, JsonValue>, patch: Map<String, JsonValue>) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(JsonValue::Object(existing)), JsonValue::Object(members)) => {
                merge_objects(existing, members)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Folds the partial features of one update into a single patch
pub fn reduce_patches(features: impl IntoIterator<Item = FeatureSql>) -> FeatureSql {
    features.into_iter().fold(FeatureSql::default(), |merged, next| {
        if merged.is_empty() {
            next
        } else {
            merged.patch_with(next)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(value: JsonValue) -> FeatureSql {
        FeatureSql::from_json(value).unwrap()
    }

    #[test]
    fn test_patch_null_differs_from_omitted() {
        let base = feature(json!({"name": "Sonne", "traeger": "Stadt", "kontakt": {"email": "a@b.de", "tel": "1"}}));
        let patch = feature(json!({"traeger": PATCH_NULL_VALUE, "kontakt": {"tel": "2"}}));

        let patched = base.patch_with(patch);
        assert_eq!(patched.get(&["name".into()]), Some(&json!("Sonne")));
        assert!(is_patch_null(patched.get(&["traeger".into()]).unwrap()));
        assert_eq!(
            patched.get(&["kontakt".into()]),
            Some(&json!({"email": "a@b.de", "tel": "2"}))
        );
        assert_eq!(patched.get(&["missing".into()]), None);
    }

    #[test]
    fn test_reduce_patches() {
        let merged = reduce_patches(vec![
            feature(json!({"name": "a"})),
            feature(json!({"plaetze": [{"anzahl": 3}]})),
            feature(json!({"name": "b"})),
        ]);
        assert_eq!(merged, feature(json!({"name": "b", "plaetze": [{"anzahl": 3}]})));
        assert!(reduce_patches(vec![]).is_empty());
    }
}
