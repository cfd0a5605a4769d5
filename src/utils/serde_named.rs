//! Serialize a `Vec<T>` of named items as a map keyed by name, keeping the
//! document order on the way back in.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;
use std::marker::PhantomData;

pub trait Named {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
}

pub fn serialize<S, T>(v: &[T], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + Named,
{
    let mut map = s.serialize_map(Some(v.len()))?;
    for e in v {
        map.serialize_entry(e.name(), e)?;
    }
    map.end()
}

struct NamedVisitor<T>(PhantomData<T>);

impl<'de, T> Visitor<'de> for NamedVisitor<T>
where
    T: Deserialize<'de> + Named,
{
    type Value = Vec<T>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of named entries")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, mut item)) = access.next_entry::<String, T>()? {
            item.set_name(name);
            items.push(item);
        }
        Ok(items)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(vec![])
    }
}

pub fn deserialize<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Named,
{
    d.deserialize_map(NamedVisitor(PhantomData))
}
