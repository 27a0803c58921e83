//! Hub event envelope.
//!
//! Wire shapes:
//! ```text
//!   init           {type}
//!   state          {type, state}
//!   ping / pong    {type}
//!   boot           {type, parameters: {NAME: string|null}}
//!   function_call  {type, name, args, defaultArgs, output?}
//!   alarm          {type}
//!   message        {type, text}
//!   notification   {type, text}
//!   medias         {type, medias: [...]}
//!   <custom>       {type, args}
//! ```
//! The envelope keeps the raw object so a `function_call` can be republished
//! with every field the hub sent, plus `output`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::events::media::Media;
use crate::types::{Error, Result};

/// Handler argument mapping.
pub type Args = Map<String, Value>;

/// Event `type` discriminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Init,
    State,
    Ping,
    Pong,
    Boot,
    FunctionCall,
    Alarm,
    Message,
    Notification,
    Medias,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Init => "init",
            EventKind::State => "state",
            EventKind::Ping => "ping",
            EventKind::Pong => "pong",
            EventKind::Boot => "boot",
            EventKind::FunctionCall => "function_call",
            EventKind::Alarm => "alarm",
            EventKind::Message => "message",
            EventKind::Notification => "notification",
            EventKind::Medias => "medias",
            EventKind::Custom(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "init" => EventKind::Init,
            "state" => EventKind::State,
            "ping" => EventKind::Ping,
            "pong" => EventKind::Pong,
            "boot" => EventKind::Boot,
            "function_call" => EventKind::FunctionCall,
            "alarm" => EventKind::Alarm,
            "message" => EventKind::Message,
            "notification" => EventKind::Notification,
            "medias" => EventKind::Medias,
            other => EventKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hub event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub fn new(kind: EventKind) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        Self(fields)
    }

    pub fn init() -> Self {
        Self::new(EventKind::Init)
    }

    pub fn pong() -> Self {
        Self::new(EventKind::Pong)
    }

    pub fn state(state: Value) -> Self {
        Self::new(EventKind::State).with("state", state)
    }

    pub fn alarm() -> Self {
        Self::new(EventKind::Alarm)
    }

    pub fn message(text: impl Into<String>) -> Self {
        Self::new(EventKind::Message).with("text", Value::String(text.into()))
    }

    pub fn notification(text: impl Into<String>) -> Self {
        Self::new(EventKind::Notification).with("text", Value::String(text.into()))
    }

    pub fn medias(medias: &[Media]) -> Result<Self> {
        Ok(Self::new(EventKind::Medias).with("medias", serde_json::to_value(medias)?))
    }

    /// Decode one inbound payload. The payload must be a JSON object with a
    /// string `type`.
    pub fn from_payload(payload: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(payload)?;
        let Value::Object(fields) = value else {
            return Err(Error::malformed_event("payload is not a JSON object"));
        };
        if !matches!(fields.get("type"), Some(Value::String(_))) {
            return Err(Error::malformed_event("missing string field: type"));
        }
        Ok(Self(fields))
    }

    /// Encode as a single-line JSON payload.
    pub fn to_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub fn event_type(&self) -> &str {
        self.0.get("type").and_then(Value::as_str).unwrap_or("")
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Copy of an object-valued field; absent or non-object yields an empty map.
    pub fn object_field(&self, key: &str) -> Args {
        match self.0.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Args::new(),
        }
    }

    /// Handler arguments: the `args` object when present, otherwise every
    /// field except `type`.
    pub fn handler_args(&self) -> Args {
        match self.0.get("args") {
            Some(Value::Object(map)) => map.clone(),
            _ => self
                .0
                .iter()
                .filter(|(key, _)| key.as_str() != "type")
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}
