//! Parameter registry: named configuration values and readiness.
//!
//! Effective value resolution, highest priority first:
//!   1. environment variable named after the parameter (non-empty)
//!   2. value set by the boot handshake or programmatically
//!   3. static default
//!   4. empty string
//!
//! The extension is "ready" once every non-optional parameter resolves to a
//! non-empty value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::types::{Error, Result};

/// Looks up an external override for a parameter name.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Override lookup backed by the process environment.
pub fn process_env() -> EnvLookup {
    Arc::new(|name| std::env::var(name).ok())
}

// =============================================================================
// Parameter
// =============================================================================

/// Input widget type advertised to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParameterType {
    #[default]
    Text,
    Password,
    Textarea,
    Email,
    Search,
    Tel,
    Number,
    Url,
    Time,
    Date,
    DatetimeLocal,
    Select,
    Color,
}

impl ParameterType {
    pub const ALL: [ParameterType; 13] = [
        ParameterType::Text,
        ParameterType::Password,
        ParameterType::Textarea,
        ParameterType::Email,
        ParameterType::Search,
        ParameterType::Tel,
        ParameterType::Number,
        ParameterType::Url,
        ParameterType::Time,
        ParameterType::Date,
        ParameterType::DatetimeLocal,
        ParameterType::Select,
        ParameterType::Color,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParameterType::Text => "text",
            ParameterType::Password => "password",
            ParameterType::Textarea => "textarea",
            ParameterType::Email => "email",
            ParameterType::Search => "search",
            ParameterType::Tel => "tel",
            ParameterType::Number => "number",
            ParameterType::Url => "url",
            ParameterType::Time => "time",
            ParameterType::Date => "date",
            ParameterType::DatetimeLocal => "datetime-local",
            ParameterType::Select => "select",
            ParameterType::Color => "color",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ParameterType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = ParameterType::ALL.iter().map(|k| k.as_str()).collect();
                Error::validation(format!("type must be one of: {}", allowed.join(", ")))
            })
    }
}

/// A named configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    name: String,
    description: String,
    value: String,
    default_value: String,
    available_values: Vec<String>,
    possible_values: Vec<String>,
    optional: bool,
    kind: ParameterType,
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn non_empty_list(field: &str, values: Vec<String>) -> Result<Vec<String>> {
    if values.is_empty() {
        return Err(Error::validation(format!("{} must be a non-empty list", field)));
    }
    if values.iter().any(String::is_empty) {
        return Err(Error::validation(format!(
            "each value in {} must be a non-empty string",
            field
        )));
    }
    Ok(values)
}

impl Parameter {
    /// Create a required `text` parameter. Names must match `[A-Z0-9_]+`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::validation("name must be a non-empty string"));
        }
        if !is_valid_name(&name) {
            return Err(Error::validation(format!(
                "name must contain only uppercase letters, numbers, and underscores: {}",
                name
            )));
        }
        Ok(Self {
            name,
            description: String::new(),
            value: String::new(),
            default_value: String::new(),
            available_values: Vec::new(),
            possible_values: Vec::new(),
            optional: false,
            kind: ParameterType::Text,
        })
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_type(mut self, kind: ParameterType) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Result<Self> {
        let description = description.into();
        if description.is_empty() {
            return Err(Error::validation("description must be a non-empty string"));
        }
        self.description = description;
        Ok(self)
    }

    pub fn with_default_value(mut self, default_value: impl Into<String>) -> Result<Self> {
        let default_value = default_value.into();
        if default_value.is_empty() {
            return Err(Error::validation("defaultValue must be a non-empty string"));
        }
        self.default_value = default_value;
        Ok(self)
    }

    pub fn with_available_values(mut self, values: Vec<String>) -> Result<Self> {
        self.available_values = non_empty_list("availableValues", values)?;
        Ok(self)
    }

    pub fn with_possible_values(mut self, values: Vec<String>) -> Result<Self> {
        self.possible_values = non_empty_list("possibleValues", values)?;
        Ok(self)
    }

    /// Programmatic assignment; empty values are rejected.
    pub fn set_value(&mut self, value: impl Into<String>) -> Result<()> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::validation("value must be a non-empty string"));
        }
        self.value = value;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn default_value(&self) -> &str {
        &self.default_value
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn kind(&self) -> ParameterType {
        self.kind
    }

    /// Resolve against an optional external override.
    pub fn effective_value(&self, env_override: Option<&str>) -> String {
        if let Some(value) = env_override.filter(|v| !v.is_empty()) {
            return value.to_string();
        }
        if !self.value.is_empty() {
            return self.value.clone();
        }
        self.default_value.clone()
    }
}

/// State view of a parameter as reported to the hub.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterView<'a> {
    name: &'a str,
    description: &'a str,
    env: bool,
    default_value: &'a str,
    available_values: &'a [String],
    possible_values: &'a [String],
    optional: bool,
    #[serde(rename = "type")]
    kind: ParameterType,
}

// =============================================================================
// Registry
// =============================================================================

/// Shared registry of an extension's parameters.
///
/// Written only by the boot handler; read by the state provider and the
/// readiness check.
pub struct ParameterRegistry {
    parameters: RwLock<Vec<Parameter>>,
    env: EnvLookup,
}

impl fmt::Debug for ParameterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterRegistry")
            .field("parameters", &self.read().len())
            .finish_non_exhaustive()
    }
}

/// Coerce a boot value to the stored string form.
fn coerce(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl ParameterRegistry {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self::with_env_lookup(parameters, process_env())
    }

    pub fn with_env_lookup(parameters: Vec<Parameter>, env: EnvLookup) -> Self {
        Self {
            parameters: RwLock::new(parameters),
            env,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Parameter>> {
        self.parameters.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn env_override(&self, name: &str) -> Option<String> {
        (self.env)(name).filter(|v| !v.is_empty())
    }

    /// Store a boot-supplied value. Returns false for unknown names.
    pub fn set_value(&self, name: &str, raw: &Value) -> bool {
        let mut parameters = self.parameters.write().unwrap_or_else(PoisonError::into_inner);
        match parameters.iter_mut().find(|p| p.name == name) {
            Some(parameter) => {
                parameter.value = coerce(raw);
                true
            }
            None => {
                tracing::debug!("Ignoring value for unknown parameter {}", name);
                false
            }
        }
    }

    /// Effective value of a parameter; `None` for unknown names.
    pub fn get_value(&self, name: &str) -> Option<String> {
        let parameters = self.read();
        parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.effective_value(self.env_override(name).as_deref()))
    }

    /// True iff every required parameter resolves to a non-empty value.
    pub fn is_ready(&self) -> bool {
        self.missing().is_empty()
    }

    /// Names of required parameters that are still unresolved.
    pub fn missing(&self) -> Vec<String> {
        self.read()
            .iter()
            .filter(|p| !p.optional)
            .filter(|p| p.effective_value(self.env_override(&p.name).as_deref()).is_empty())
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// JSON array describing every parameter, in registration order.
    pub fn snapshot(&self) -> Value {
        let parameters = self.read();
        let views: Vec<ParameterView<'_>> = parameters
            .iter()
            .map(|p| ParameterView {
                name: &p.name,
                description: &p.description,
                env: self.env_override(&p.name).is_some(),
                default_value: &p.default_value,
                available_values: &p.available_values,
                possible_values: &p.possible_values,
                optional: p.optional,
                kind: p.kind,
            })
            .collect();
        serde_json::to_value(views).unwrap_or(Value::Array(Vec::new()))
    }
}
