//! 保留 JSON 对象键顺序的反序列化容器。
//!
//! hostLevelPermissions 的匹配规则依赖配置书写顺序（后写者胜），
//! 普通 `HashMap`/`BTreeMap` 都会丢失这一信息。

use std::{fmt, marker::PhantomData};

use serde::{
    Deserialize, Deserializer,
    de::{MapAccess, Visitor},
};

/// 按出现顺序保存的键值对列表。
#[derive(Debug, Clone)]
pub(crate) struct OrderedMap<V>(pub(crate) Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub(crate) fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// 缺少该键时追加到末尾。
    pub(crate) fn insert_missing(&mut self, key: &str, value: V) {
        if self.get(key).is_none() {
            self.0.push((key.to_string(), value));
        }
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }
}

impl<'de, V> Deserialize<'de> for OrderedMap<V>
where
    V: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V> Visitor<'de> for OrderedVisitor<V>
        where
            V: Deserialize<'de>,
        {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, V)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, V>()? {
                    // 与 JSON 对象语义一致：重复键取最后一次的值，但保留首次出现的位置。
                    if let Some(slot) = entries.iter_mut().find(|(k, _)| *k == key) {
                        slot.1 = value;
                    } else {
                        entries.push((key, value));
                    }
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::OrderedMap;

    #[test]
    fn keeps_document_order() {
        let parsed: OrderedMap<u8> =
            serde_json::from_str(r#"{"z": 1, "a": 2, "m": 3}"#).expect("parse");
        assert_eq!(parsed.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(parsed.get("a"), Some(&2));
    }

    #[test]
    fn insert_missing_does_not_override() {
        let mut parsed: OrderedMap<u8> = serde_json::from_str(r#"{"*": 1}"#).expect("parse");
        parsed.insert_missing("*", 9);
        parsed.insert_missing("localhost", 7);
        assert_eq!(parsed.get("*"), Some(&1));
        assert_eq!(parsed.keys().last(), Some("localhost"));
    }
}
