use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

use crate::error::{CyclingError, Result};

/// A single setting value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean flag
    Bool(bool),
    /// Integer or float
    Number(f64),
    /// Free text or a select option
    Text(String),
}

impl SettingValue {
    /// Numeric value, if this is a number
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean value, if this is a flag
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Text value, if this is text
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<f64> for SettingValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
        }
    }
}

/// Type of a configurable mode property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    /// Whole number
    Integer,
    /// Real number
    Float,
    /// On/off
    Boolean,
    /// Free text
    String,
    /// One of the declared options
    SingleSelect,
}

/// Declarative metadata for one mode setting, used to build configuration UIs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CyclingModeProperty {
    /// Settings key
    pub key: String,
    /// Display name
    pub name: String,
    /// Help text
    pub description: String,
    /// Value type
    #[serde(rename = "type")]
    pub kind: PropertyType,
    /// Lower bound for numeric properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound for numeric properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Value used when nothing is stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SettingValue>,
    /// Allowed values for select properties
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl CyclingModeProperty {
    /// Numeric property with bounds and default
    #[must_use]
    pub fn number(
        key: &str,
        name: &str,
        description: &str,
        kind: PropertyType,
        range: (f64, f64),
        default: f64,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
            min: Some(range.0),
            max: Some(range.1),
            default: Some(SettingValue::Number(default)),
            options: Vec::new(),
        }
    }

    /// Select property with its options
    #[must_use]
    pub fn select(key: &str, name: &str, description: &str, options: &[&str], default: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            kind: PropertyType::SingleSelect,
            min: None,
            max: None,
            default: Some(SettingValue::from(default)),
            options: options.iter().map(ToString::to_string).collect(),
        }
    }

    /// Check a value against type, bounds and options
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::InvalidSetting`] describing the mismatch.
    pub fn validate(&self, value: &SettingValue) -> Result<()> {
        let invalid = |reason: String| CyclingError::InvalidSetting {
            key: self.key.clone(),
            reason,
        };

        match (self.kind, value) {
            (PropertyType::Integer | PropertyType::Float, SettingValue::Number(number)) => {
                if !number.is_finite() {
                    return Err(invalid(format!("{number} is not a finite number")));
                }
                if self.kind == PropertyType::Integer && number.fract() != 0.0 {
                    return Err(invalid(format!("{number} is not an integer")));
                }
                if let Some(min) = self.min.filter(|min| number < min) {
                    return Err(invalid(format!("{number} is below minimum {min}")));
                }
                if let Some(max) = self.max.filter(|max| number > max) {
                    return Err(invalid(format!("{number} is above maximum {max}")));
                }
                Ok(())
            }
            (PropertyType::Boolean, SettingValue::Bool(_))
            | (PropertyType::String, SettingValue::Text(_)) => Ok(()),
            (PropertyType::SingleSelect, SettingValue::Text(text)) => {
                if self.options.iter().any(|option| option == text) {
                    Ok(())
                } else {
                    Err(invalid(format!("'{text}' is not one of {:?}", self.options)))
                }
            }
            (kind, value) => Err(invalid(format!("{value} does not match type {kind:?}"))),
        }
    }
}

/// Flat key to value store of mode settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(BTreeMap<String, SettingValue>);

impl Settings {
    /// Empty settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored value for `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    /// Store a value without validation
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SettingValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Iterate stored entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &SettingValue)> {
        self.0.iter()
    }

    /// Number of stored entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No entries stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<SettingValue>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Settings bound to the properties that declare them
///
/// Lookups fall back to the property default, so a declared default is never
/// reported as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsStore {
    properties: Vec<CyclingModeProperty>,
    values: Settings,
}

impl SettingsStore {
    /// Store for the given property declarations
    #[must_use]
    pub const fn new(properties: Vec<CyclingModeProperty>) -> Self {
        Self {
            properties,
            values: Settings(BTreeMap::new()),
        }
    }

    /// Declared properties
    #[must_use]
    pub fn properties(&self) -> &[CyclingModeProperty] {
        &self.properties
    }

    /// Declared property for `key`
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&CyclingModeProperty> {
        self.properties.iter().find(|property| property.key == key)
    }

    /// Stored value, or the declared default
    #[must_use]
    pub fn get(&self, key: &str) -> Option<SettingValue> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| self.property(key).and_then(|property| property.default.clone()))
    }

    /// Numeric value, or the declared default
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).as_ref().and_then(SettingValue::as_f64)
    }

    /// Text value, or the declared default
    #[must_use]
    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).as_ref().and_then(SettingValue::as_str).map(str::to_string)
    }

    /// Validate and store one value
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::UnknownSetting`] if no property declares `key`,
    /// or [`CyclingError::InvalidSetting`] if the value does not fit it.
    pub fn set(&mut self, key: &str, value: SettingValue) -> Result<()> {
        let property = self
            .property(key)
            .ok_or_else(|| CyclingError::UnknownSetting(key.to_string()))?;
        property.validate(&value)?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Validate and store every entry; nothing is stored if one entry fails
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn set_all(&mut self, settings: Settings) -> Result<()> {
        for (key, value) in settings.iter() {
            self.property(key)
                .ok_or_else(|| CyclingError::UnknownSetting(key.clone()))?
                .validate(value)?;
        }
        for (key, value) in settings.0 {
            self.values.insert(key, value);
        }
        Ok(())
    }

    /// Explicitly stored values
    #[must_use]
    pub const fn values(&self) -> &Settings {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        SettingsStore::new(vec![
            CyclingModeProperty::number(
                "startPower",
                "Starting Power",
                "Initial power in watts",
                PropertyType::Integer,
                (25.0, 800.0),
                50.0,
            ),
            CyclingModeProperty::select(
                "bikeType",
                "Bike Type",
                "Drag profile",
                &["race", "triathlon", "mountain"],
                "race",
            ),
        ])
    }

    #[test]
    fn test_default_fallback() {
        let store = store();
        assert_eq!(store.number("startPower"), Some(50.0));
        assert_eq!(store.text("bikeType").as_deref(), Some("race"));
        assert!(store.get("missing").is_none());
        assert!(store.values().is_empty());
    }

    #[test]
    fn test_set_validates() {
        let mut store = store();
        store.set("startPower", SettingValue::Number(120.0)).unwrap();
        assert_eq!(store.number("startPower"), Some(120.0));

        assert!(matches!(
            store.set("startPower", SettingValue::Number(900.0)),
            Err(CyclingError::InvalidSetting { .. })
        ));
        assert!(store.set("startPower", SettingValue::Number(100.5)).is_err());
        assert!(store.set("startPower", SettingValue::from("fast")).is_err());
        assert!(store.set("bikeType", SettingValue::from("unicycle")).is_err());
        assert!(matches!(
            store.set("wheelSize", SettingValue::Number(29.0)),
            Err(CyclingError::UnknownSetting(_))
        ));
    }

    #[test]
    fn test_set_all_is_atomic() {
        let mut store = store();
        let settings: Settings = vec![
            ("startPower", SettingValue::Number(100.0)),
            ("bikeType", SettingValue::from("gravel")),
        ]
        .into_iter()
        .collect();

        assert!(store.set_all(settings).is_err());
        assert_eq!(store.number("startPower"), Some(50.0));

        let settings: Settings = vec![("bikeType", "mountain")].into_iter().collect();
        store.set_all(settings).unwrap();
        assert_eq!(store.text("bikeType").as_deref(), Some("mountain"));
    }

    #[test]
    fn test_setting_value_accessors() {
        assert_eq!(SettingValue::from(3.0).as_f64(), Some(3.0));
        assert_eq!(SettingValue::from(true).as_bool(), Some(true));
        assert_eq!(SettingValue::from("race").as_str(), Some("race"));
        assert!(SettingValue::from("race").as_f64().is_none());
    }
}
