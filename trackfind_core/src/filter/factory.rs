//! Name-keyed filter construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Filter;
use crate::error::ConfigError;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Value of a filter parameter in a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(value) => write!(f, "{}", value),
            ParamValue::Text(value) => write!(f, "\"{}\"", value),
        }
    }
}

/// Filter selection: a registered name plus parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,

    #[serde(default)]
    pub params: BTreeMap<String, ParamValue>,
}

impl FilterConfig {
    /// Selection without parameter overrides.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a numeric parameter override.
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), ParamValue::Number(value));
        self
    }

    /// Adds a text parameter override.
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), ParamValue::Text(value.into()));
        self
    }
}

/// Default of an exposed parameter; also fixes its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Number(f64),
    Text(&'static str),
}

/// A parameter a filter exposes to configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterDescriptor {
    pub name: &'static str,
    pub default: ParamDefault,
    pub description: &'static str,
}

impl ParameterDescriptor {
    pub const fn number(name: &'static str, default: f64, description: &'static str) -> Self {
        Self {
            name,
            default: ParamDefault::Number(default),
            description,
        }
    }

    pub const fn text(name: &'static str, default: &'static str, description: &'static str) -> Self {
        Self {
            name,
            default: ParamDefault::Text(default),
            description,
        }
    }
}

/// Resolved parameters handed to a filter constructor: defaults merged with
/// the configured overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    filter: String,
    numbers: BTreeMap<String, f64>,
    texts: BTreeMap<String, String>,
}

impl Parameters {
    /// Name of the filter being constructed.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// A numeric parameter.
    pub fn number(&self, name: &str) -> Result<f64, ConfigError> {
        self.numbers
            .get(name)
            .copied()
            .ok_or_else(|| ConfigError::UnknownParameter {
                filter: self.filter.clone(),
                param: name.to_string(),
            })
    }

    /// A numeric parameter that must be finite and not negative.
    pub fn non_negative(&self, name: &str) -> Result<f64, ConfigError> {
        let value = self.number(name)?;
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(ConfigError::invalid_parameter(
                &self.filter,
                name,
                format!("{} is not a non-negative number", value),
            ))
        }
    }

    /// A numeric parameter used as a count.
    pub fn count(&self, name: &str) -> Result<usize, ConfigError> {
        let value = self.non_negative(name)?;
        if value.fract() != 0.0 {
            return Err(ConfigError::invalid_parameter(
                &self.filter,
                name,
                format!("{} is not a whole number", value),
            ));
        }
        Ok(value as usize)
    }

    /// A text parameter.
    pub fn text(&self, name: &str) -> Result<&str, ConfigError> {
        self.texts
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::UnknownParameter {
                filter: self.filter.clone(),
                param: name.to_string(),
            })
    }

    /// Resolves overrides against the exposed parameters.
    pub fn resolve(
        filter: &str,
        descriptors: &[ParameterDescriptor],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ConfigError> {
        let mut numbers = BTreeMap::new();
        let mut texts = BTreeMap::new();
        for descriptor in descriptors {
            match descriptor.default {
                ParamDefault::Number(value) => {
                    numbers.insert(descriptor.name.to_string(), value);
                }
                ParamDefault::Text(value) => {
                    texts.insert(descriptor.name.to_string(), value.to_string());
                }
            }
        }

        for (key, value) in overrides {
            match (value, numbers.get_mut(key), texts.get_mut(key)) {
                (ParamValue::Number(v), Some(slot), _) => *slot = *v,
                (ParamValue::Text(v), _, Some(slot)) => *slot = v.clone(),
                (_, None, None) => {
                    return Err(ConfigError::UnknownParameter {
                        filter: filter.to_string(),
                        param: key.clone(),
                    })
                }
                (value, _, _) => {
                    return Err(ConfigError::invalid_parameter(
                        filter,
                        key,
                        format!("{} has the wrong type", value),
                    ))
                }
            }
        }

        Ok(Self {
            filter: filter.to_string(),
            numbers,
            texts,
        })
    }
}

// ============================================================================
// FACTORY
// ============================================================================

type Constructor<T> =
    Arc<dyn Fn(&Parameters) -> Result<Box<dyn Filter<T>>, ConfigError> + Send + Sync>;

struct Entry<T> {
    description: &'static str,
    parameters: Vec<ParameterDescriptor>,
    constructor: Constructor<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            description: self.description,
            parameters: self.parameters.clone(),
            constructor: Arc::clone(&self.constructor),
        }
    }
}

/// Constructors of the filters of one object type, keyed by name.
pub struct FilterFactory<T> {
    kind: &'static str,
    entries: BTreeMap<String, Entry<T>>,
}

impl<T> Clone for FilterFactory<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            entries: self.entries.clone(),
        }
    }
}

impl<T> fmt::Debug for FilterFactory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFactory")
            .field("kind", &self.kind)
            .field("filters", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> FilterFactory<T> {
    /// Empty factory; `kind` names the object type in error messages.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Registers a constructor, replacing any previous one of that name.
    pub fn register<F>(
        &mut self,
        name: &str,
        description: &'static str,
        parameters: Vec<ParameterDescriptor>,
        constructor: F,
    ) where
        F: Fn(&Parameters) -> Result<Box<dyn Filter<T>>, ConfigError> + Send + Sync + 'static,
    {
        self.entries.insert(
            name.to_string(),
            Entry {
                description,
                parameters,
                constructor: Arc::new(constructor),
            },
        );
    }

    /// Instantiates the configured filter.
    pub fn create(&self, config: &FilterConfig) -> Result<Box<dyn Filter<T>>, ConfigError> {
        let entry = self
            .entries
            .get(&config.name)
            .ok_or_else(|| ConfigError::UnknownFilter {
                kind: self.kind,
                name: config.name.clone(),
            })?;
        let parameters = Parameters::resolve(&config.name, &entry.parameters, &config.params)?;
        (entry.constructor)(&parameters)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, ascending.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Description of a registered filter.
    pub fn description(&self, name: &str) -> Option<&'static str> {
        self.entries.get(name).map(|e| e.description)
    }

    /// Exposed parameters of a registered filter.
    pub fn parameters(&self, name: &str) -> Option<&[ParameterDescriptor]> {
        self.entries.get(name).map(|e| e.parameters.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AllFilter, EventContext, Weight};
    use crate::hits::HitId;
    use crate::segment::HitPair;

    fn factory() -> FilterFactory<HitPair> {
        let mut factory = FilterFactory::new("hit pair");
        factory.register(
            "all",
            "Accepts everything",
            vec![ParameterDescriptor::number("weight", 1.0, "Constant weight")],
            |params: &Parameters| -> Result<Box<dyn Filter<HitPair>>, ConfigError> {
                Ok(Box::new(AllFilter::new(params.number("weight")?)))
            },
        );
        factory
    }

    fn weigh(filter: &mut Box<dyn Filter<HitPair>>) -> Weight {
        let geometry = trackfind_env::CylindricalGeometry::default();
        let store = crate::hits::HitStore::default();
        let event = EventContext::new(&store, &geometry);
        filter.weigh(&HitPair { from: HitId(0), to: HitId(1) }, &event)
    }

    #[test]
    fn test_create_with_defaults_and_overrides() {
        let factory = factory();
        let mut filter = factory.create(&FilterConfig::named("all")).unwrap();
        assert_eq!(weigh(&mut filter), 1.0);

        let config = FilterConfig::named("all").with_number("weight", 2.5);
        let mut filter = factory.create(&config).unwrap();
        assert_eq!(weigh(&mut filter), 2.5);
        assert_eq!(factory.names(), vec!["all"]);
    }

    #[test]
    fn test_unknown_name() {
        let result = factory().create(&FilterConfig::named("magic"));
        assert!(matches!(result, Err(ConfigError::UnknownFilter { kind: "hit pair", .. })));
    }

    #[test]
    fn test_unknown_parameter() {
        let config = FilterConfig::named("all").with_number("colour", 1.0);
        let result = factory().create(&config);
        assert!(matches!(result, Err(ConfigError::UnknownParameter { .. })));
    }

    #[test]
    fn test_wrong_parameter_type() {
        let config = FilterConfig::named("all").with_text("weight", "heavy");
        let result = factory().create(&config);
        assert!(matches!(result, Err(ConfigError::InvalidParameter { .. })));
    }

    #[test]
    fn test_config_from_json() {
        let config: FilterConfig =
            serde_json::from_str(r#"{"name": "mva", "params": {"cut": 0.4, "weights": "w.json"}}"#).unwrap();
        assert_eq!(config.params["cut"], ParamValue::Number(0.4));
        assert_eq!(config.params["weights"], ParamValue::Text("w.json".into()));
    }

    #[test]
    fn test_count_rejects_fractions() {
        let descriptors = [ParameterDescriptor::number("min_hits", 3.0, "")];
        let mut overrides = BTreeMap::new();
        overrides.insert("min_hits".to_string(), ParamValue::Number(2.5));
        let params = Parameters::resolve("simple", &descriptors, &overrides).unwrap();
        assert!(params.count("min_hits").is_err());
    }
}
