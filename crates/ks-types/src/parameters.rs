//! Parameter spaces, parameter values and the points sampled from them.
//!
//! Both [`ParameterSpace`] and [`ParameterPoint`] serialize as JSON objects
//! whose key order is the dimension order, which is what the `parameters`
//! field of an experiment and the `job_parameters` annotation of a job hold.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::env::PARAMETER_PREFIX;
use crate::errors::ParameterError;

/// The scalar kind of a parameter value, as spelled in environment variable
/// names (`PARAMETER_<NAME>_<KIND>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    Bool,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::Str => "STR",
            Self::Bool => "BOOL",
        }
    }

    /// Parse an upper- or lower-case kind suffix.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_uppercase().as_str() {
            "INT" => Some(Self::Int),
            "FLOAT" => Some(Self::Float),
            "STR" => Some(Self::Str),
            "BOOL" => Some(Self::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single candidate or selected parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl ParameterValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    /// Resolve a JSON value into a parameter value. Integers stay integers,
    /// any other number becomes a float, and non-scalars are rejected.
    pub fn from_json(name: &str, value: serde_json::Value) -> Result<Self, ParameterError> {
        match value {
            serde_json::Value::Bool(b) => Ok(Self::Bool(b)),
            serde_json::Value::String(s) => Ok(Self::Str(s)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(ParameterError::UnsupportedValue {
                        name: name.to_string(),
                        value: n.to_string(),
                    })
                }
            }
            other => Err(ParameterError::UnsupportedValue {
                name: name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Str(v) => serde_json::Value::from(v.as_str()),
            Self::Bool(v) => serde_json::Value::from(*v),
        }
    }

    /// Text form used as an environment variable value. Booleans are
    /// `true`/`false` and finite floats always carry a fractional part.
    pub fn to_env_value(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => {
                let text = v.to_string();
                if v.is_finite() && !text.contains('.') {
                    format!("{text}.0")
                } else {
                    text
                }
            }
            Self::Str(v) => v.clone(),
            Self::Bool(v) => v.to_string(),
        }
    }

    /// Inverse of [`ParameterValue::to_env_value`] for a known kind.
    pub fn parse_env_value(kind: ValueKind, text: &str) -> Option<Self> {
        match kind {
            ValueKind::Int => text.parse().ok().map(Self::Int),
            ValueKind::Float => text.parse().ok().map(Self::Float),
            ValueKind::Str => Some(Self::Str(text.to_string())),
            ValueKind::Bool => match text {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_env_value())
    }
}

impl From<i64> for ParameterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for ParameterValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParameterValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParameterValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParameterValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl Serialize for ParameterValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Str(v) => serializer.serialize_str(v),
            Self::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

impl<'de> Deserialize<'de> for ParameterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ParameterValue::from_json("value", value).map_err(de::Error::custom)
    }
}

/// Environment variable name for one parameter:
/// `PARAMETER_<NAME>_<KIND>`, upper-cased.
pub fn parameter_env_name(name: &str, value: &ParameterValue) -> String {
    format!("{PARAMETER_PREFIX}{}_{}", name, value.kind()).to_uppercase()
}

/// Whether two parameter names render to the same environment variable.
fn same_env_name(a: &str, b: &str) -> bool {
    a == b || a.to_uppercase() == b.to_uppercase()
}

// ---------------------------------------------------------------------------
// Parameter space
// ---------------------------------------------------------------------------

/// A single named dimension and its ordered candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub name: String,
    pub values: Vec<ParameterValue>,
}

/// The full search space: an ordered list of named dimensions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSpace {
    parameters: Vec<ParameterDef>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Append a dimension. Adding a name that already exists replaces its
    /// candidates in place, keeping the original position. A name that
    /// differs from an existing one only by case is kept and then rejected
    /// by [`ParameterSpace::validate`].
    pub fn add<V, I>(mut self, name: impl Into<String>, values: I) -> Self
    where
        V: Into<ParameterValue>,
        I: IntoIterator<Item = V>,
    {
        let name = name.into();
        let values: Vec<ParameterValue> = values.into_iter().map(Into::into).collect();
        match self.parameters.iter_mut().find(|p| p.name == name) {
            Some(existing) => existing.values = values,
            None => self.parameters.push(ParameterDef { name, values }),
        }
        self
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Check that every dimension has at least one candidate and that no two
    /// names differ only by case, since both would map to one variable.
    pub fn validate(&self) -> Result<(), ParameterError> {
        for (i, param) in self.parameters.iter().enumerate() {
            if param.values.is_empty() {
                return Err(ParameterError::InvalidParameterSpace {
                    name: param.name.clone(),
                });
            }
            if self.parameters[..i]
                .iter()
                .any(|earlier| same_env_name(&earlier.name, &param.name))
            {
                return Err(ParameterError::DuplicateParameter {
                    name: param.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Total number of grid points, `None` on overflow.
    pub fn grid_size(&self) -> Option<usize> {
        self.parameters
            .iter()
            .try_fold(1usize, |total, p| total.checked_mul(p.values.len()))
    }
}

impl Serialize for ParameterSpace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.parameters.len()))?;
        for param in &self.parameters {
            map.serialize_entry(&param.name, &param.values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterSpace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpaceVisitor;

        impl<'de> Visitor<'de> for SpaceVisitor {
            type Value = ParameterSpace;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to lists of values")
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(ParameterSpace::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut parameters: Vec<ParameterDef> = Vec::new();
                while let Some((name, raw)) =
                    access.next_entry::<String, Vec<serde_json::Value>>()?
                {
                    if parameters.iter().any(|p| same_env_name(&p.name, &name)) {
                        return Err(de::Error::custom(ParameterError::DuplicateParameter {
                            name,
                        }));
                    }
                    let values = raw
                        .into_iter()
                        .map(|v| ParameterValue::from_json(&name, v))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(de::Error::custom)?;
                    parameters.push(ParameterDef { name, values });
                }
                Ok(ParameterSpace { parameters })
            }
        }

        deserializer.deserialize_any(SpaceVisitor)
    }
}

// ---------------------------------------------------------------------------
// Parameter point
// ---------------------------------------------------------------------------

/// One concrete assignment: exactly one value per parameter name, in the
/// dimension order of the space it was drawn from.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterPoint {
    entries: Vec<(String, ParameterValue)>,
}

impl ParameterPoint {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a point from ordered pairs, rejecting repeated names, including
    /// names that differ only by case.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (String, ParameterValue)>,
    {
        let mut entries: Vec<(String, ParameterValue)> = Vec::new();
        for (name, value) in pairs {
            if entries.iter().any(|(n, _)| same_env_name(n, &name)) {
                return Err(ParameterError::DuplicateParameter { name });
            }
            entries.push((name, value));
        }
        Ok(Self { entries })
    }

    /// A copy of this point with `name` set to `value`. An existing entry for
    /// `name` is replaced in place.
    pub fn extended(&self, name: &str, value: ParameterValue) -> Self {
        let mut entries = self.entries.clone();
        match entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => entries.push((name.to_string(), value)),
        }
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(PARAMETER_<NAME>_<KIND>, value)` pairs in point order.
    pub fn env_vars(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(name, value)| (parameter_env_name(name, value), value.to_env_value()))
            .collect()
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ParameterError> {
        serde_json::from_str(text).map_err(|e| ParameterError::MalformedPoint {
            message: e.to_string(),
        })
    }
}

impl Serialize for ParameterPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PointVisitor;

        impl<'de> Visitor<'de> for PointVisitor {
            type Value = ParameterPoint;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::new();
                while let Some((name, raw)) = access.next_entry::<String, serde_json::Value>()? {
                    let value = ParameterValue::from_json(&name, raw).map_err(de::Error::custom)?;
                    pairs.push((name, value));
                }
                ParameterPoint::from_pairs(pairs).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(PointVisitor)
    }
}
