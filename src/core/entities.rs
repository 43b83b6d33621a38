

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::warn;

use super::config::ContractMode;


#[derive(Error, Debug, Clone, PartialEq)]
pub enum EntityError {
    #[error("Unknown entity key: {0}")]
    UnknownEntityKey(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Text,
    Number,
    Integer,
}


#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKey {
    City,
    Country,
    HotelName,
    HotelId,
    TravellerType,
    FromCountry,
    ToCountry,
    MinRating,
    StarRating,
    MinCleanliness,
    MinComfort,
    MinValue,
    MinStaff,
    MinLocation,
    MinFacilities,
    Limit,
}

impl EntityKey {
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    pub fn kind(self) -> SlotKind {
        match self {
            EntityKey::City
            | EntityKey::Country
            | EntityKey::HotelName
            | EntityKey::HotelId
            | EntityKey::TravellerType
            | EntityKey::FromCountry
            | EntityKey::ToCountry => SlotKind::Text,
            EntityKey::MinRating
            | EntityKey::StarRating
            | EntityKey::MinCleanliness
            | EntityKey::MinComfort
            | EntityKey::MinValue
            | EntityKey::MinStaff
            | EntityKey::MinLocation
            | EntityKey::MinFacilities => SlotKind::Number,
            EntityKey::Limit => SlotKind::Integer,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl EntityValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntityValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EntityValue::Integer(i) => Some(*i as f64),
            EntityValue::Number(n) => Some(*n),
            EntityValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Coerces the value into the given slot kind, `None` when the conversion would lose meaning.
    pub fn coerce(&self, kind: SlotKind) -> Option<EntityValue> {
        match (kind, self) {
            (SlotKind::Text, EntityValue::Text(s)) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| EntityValue::Text(trimmed.to_string()))
            }
            (SlotKind::Text, EntityValue::Integer(i)) => Some(EntityValue::Text(i.to_string())),
            (SlotKind::Text, EntityValue::Number(n)) => Some(EntityValue::Text(n.to_string())),
            (SlotKind::Number, other) => other
                .as_f64()
                .filter(|n| n.is_finite())
                .map(EntityValue::Number),
            (SlotKind::Integer, EntityValue::Integer(i)) => Some(EntityValue::Integer(*i)),
            (SlotKind::Integer, other) => other
                .as_f64()
                .filter(|n| n.is_finite() && n.fract() == 0.0)
                .map(|n| EntityValue::Integer(n as i64)),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            EntityValue::Integer(i) => Value::from(*i),
            EntityValue::Number(n) => Value::from(*n),
            EntityValue::Text(s) => Value::from(s.as_str()),
        }
    }

    fn from_json(value: &Value) -> Option<EntityValue> {
        match value {
            Value::String(s) => Some(EntityValue::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(EntityValue::Integer)
                .or_else(|| n.as_f64().map(EntityValue::Number)),
            Value::Bool(b) => Some(EntityValue::Text(b.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityValue::Integer(i) => write!(f, "{}", i),
            EntityValue::Number(n) => write!(f, "{}", n),
            EntityValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for EntityValue {
    fn from(value: &str) -> Self {
        EntityValue::Text(value.to_string())
    }
}

impl From<String> for EntityValue {
    fn from(value: String) -> Self {
        EntityValue::Text(value)
    }
}

impl From<f64> for EntityValue {
    fn from(value: f64) -> Self {
        EntityValue::Number(value)
    }
}

impl From<i64> for EntityValue {
    fn from(value: i64) -> Self {
        EntityValue::Integer(value)
    }
}


/// Facts extracted from one query. Absent key means "not mentioned".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityBag {
    entries: BTreeMap<EntityKey, EntityValue>,
}

impl EntityBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> EntityBagBuilder {
        EntityBagBuilder::default()
    }

    pub fn get(&self, key: EntityKey) -> Option<&EntityValue> {
        self.entries.get(&key)
    }

    pub fn text(&self, key: EntityKey) -> Option<&str> {
        self.entries.get(&key).and_then(EntityValue::as_text)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &EntityValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds a bag from loosely typed extractor output.
    ///
    /// Null and empty values are skipped. Keys outside the vocabulary and values that
    /// cannot be typed are errors in strict mode and are logged and dropped otherwise.
    pub fn from_raw<'a, I>(raw: I, mode: ContractMode) -> Result<EntityBag, EntityError>
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let mut builder = EntityBag::builder();

        for (name, value) in raw {
            if value.is_null() || value.as_str().is_some_and(|s| s.trim().is_empty()) {
                continue;
            }

            let key = match EntityKey::from_str(name.trim()) {
                Ok(key) => key,
                Err(_) => {
                    let err = EntityError::UnknownEntityKey(name.clone());
                    match mode {
                        ContractMode::Strict => return Err(err),
                        ContractMode::Lenient => {
                            warn!("Dropping entity: {}", err);
                            continue;
                        }
                    }
                }
            };

            let typed = EntityValue::from_json(value).and_then(|v| v.coerce(key.kind()));
            match typed {
                Some(v) => builder.insert(key, v),
                None => {
                    let err = EntityError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("expected {:?}, got {}", key.kind(), value),
                    };
                    match mode {
                        ContractMode::Strict => return Err(err),
                        ContractMode::Lenient => warn!("Dropping entity: {}", err),
                    }
                }
            }
        }

        Ok(builder.build())
    }
}


#[derive(Debug, Default)]
pub struct EntityBagBuilder {
    entries: BTreeMap<EntityKey, EntityValue>,
}

impl EntityBagBuilder {
    pub fn with(mut self, key: EntityKey, value: impl Into<EntityValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: EntityKey, value: impl Into<EntityValue>) {
        self.entries.insert(key, value.into());
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn build(self) -> EntityBag {
        EntityBag {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_from_raw_types_values() {
        let map = raw(json!({
            "city": " Paris ",
            "min_cleanliness": "8.5",
            "limit": 5.0,
            "country": null,
            "hotel_name": ""
        }));
        let bag = EntityBag::from_raw(&map, ContractMode::Strict).unwrap();

        assert_eq!(bag.text(EntityKey::City), Some("Paris"));
        assert_eq!(bag.get(EntityKey::MinCleanliness), Some(&EntityValue::Number(8.5)));
        assert_eq!(bag.get(EntityKey::Limit), Some(&EntityValue::Integer(5)));
        assert!(!bag.contains(EntityKey::Country));
        assert!(!bag.contains(EntityKey::HotelName));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_unknown_key_strict_fails() {
        let map = raw(json!({"city": "Rome", "mood": "happy"}));
        let err = EntityBag::from_raw(&map, ContractMode::Strict).unwrap_err();
        assert_eq!(err, EntityError::UnknownEntityKey("mood".to_string()));
    }

    #[test]
    fn test_unknown_key_lenient_drops() {
        let map = raw(json!({"city": "Rome", "mood": "happy"}));
        let bag = EntityBag::from_raw(&map, ContractMode::Lenient).unwrap();
        assert_eq!(bag.len(), 1);
        assert_eq!(bag.text(EntityKey::City), Some("Rome"));
    }

    #[test]
    fn test_untyped_value_lenient_drops() {
        let map = raw(json!({"min_rating": "excellent", "limit": 2.5}));
        assert!(EntityBag::from_raw(&map, ContractMode::Strict).is_err());
        let bag = EntityBag::from_raw(&map, ContractMode::Lenient).unwrap();
        assert!(bag.is_empty());
    }

    #[test]
    fn test_bag_serializes_as_map() {
        let bag = EntityBag::builder()
            .with(EntityKey::TravellerType, "Solo")
            .with(EntityKey::MinStaff, 9.0)
            .build();
        let json = serde_json::to_value(&bag).unwrap();
        assert_eq!(json, json!({"traveller_type": "Solo", "min_staff": 9.0}));

        let back: EntityBag = serde_json::from_value(json).unwrap();
        assert_eq!(back, bag);
    }
}
