use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{CoreError, Result};

/// A single typed field value inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Field {
    Bool(bool),
    I64(i64),
    F64(f64),
    Str(String),
    List(Vec<Field>),
}

impl Field {
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Bool(_) => FieldKind::Bool,
            Field::I64(_) => FieldKind::I64,
            Field::F64(_) => FieldKind::F64,
            Field::Str(_) => FieldKind::Str,
            Field::List(_) => FieldKind::List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Field::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Field::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Bool(v) => write!(f, "{v}"),
            Field::I64(v) => write!(f, "{v}"),
            Field::F64(v) => write!(f, "{v}"),
            Field::Str(v) => write!(f, "{v:?}"),
            Field::List(v) => write!(f, "[{} items]", v.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    I64,
    F64,
    Str,
    List,
}

impl FieldKind {
    /// The zero value used when a schema field has no explicit default.
    pub fn zero(&self) -> Field {
        match self {
            FieldKind::Bool => Field::Bool(false),
            FieldKind::I64 => Field::I64(0),
            FieldKind::F64 => Field::F64(0.0),
            FieldKind::Str => Field::Str(String::new()),
            FieldKind::List => Field::List(Vec::new()),
        }
    }
}

/// A typed record identified by a globally unique schema name. Messages
/// are the unit of belief storage, goal parameterisation and action
/// request/reply payloads. They are value types; subsystems that retain
/// one share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    schema: String,
    fields: BTreeMap<String, Field>,
}

impl Message {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    /// Insert or replace a field unconditionally. Used while building a
    /// message; percept application goes through [`Message::set_field`].
    pub fn insert(&mut self, name: impl Into<String>, value: Field) -> &mut Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builder form of [`Message::insert`].
    pub fn with(mut self, name: impl Into<String>, value: Field) -> Self {
        self.insert(name, value);
        self
    }

    /// Overwrite an existing field, keeping its type. Returns false when
    /// the field does not exist or the value kind differs; the message is
    /// untouched in that case.
    pub fn set_field(&mut self, name: &str, value: Field) -> bool {
        match self.fields.get_mut(name) {
            Some(slot) if slot.kind() == value.kind() => {
                *slot = value;
                true
            }
            _ => false,
        }
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Field::as_bool)
    }

    pub fn i64_field(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Field::as_i64)
    }

    pub fn f64_field(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Field::as_f64)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Field::as_str)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.schema)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

/// One field declaration inside a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub default: Option<Field>,
}

/// The immutable description of a message type. Schema names are
/// globally unique within a model registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSchema {
    name: String,
    fields: Vec<SchemaField>,
}

impl MessageSchema {
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Build a message with every declared field set to its default (or
    /// zero value).
    pub fn instantiate(&self) -> Message {
        let mut msg = Message::new(self.name.clone());
        for field in &self.fields {
            let value = field
                .default
                .clone()
                .unwrap_or_else(|| field.kind.zero());
            msg.insert(field.name.clone(), value);
        }
        msg
    }

    /// Check a message against this schema: same schema name, every
    /// declared field present with the declared kind, no undeclared
    /// fields.
    pub fn verify(&self, msg: &Message) -> Result<()> {
        if msg.schema() != self.name {
            return Err(CoreError::SchemaMismatch {
                schema: self.name.clone(),
                reason: format!("message carries schema '{}'", msg.schema()),
            });
        }

        for field in &self.fields {
            match msg.field(&field.name) {
                None => {
                    return Err(CoreError::SchemaMismatch {
                        schema: self.name.clone(),
                        reason: format!("missing field '{}'", field.name),
                    })
                }
                Some(value) if value.kind() != field.kind => {
                    return Err(CoreError::FieldTypeMismatch {
                        schema: self.name.clone(),
                        field: field.name.clone(),
                        expected: field.kind,
                        found: value.kind(),
                    })
                }
                Some(_) => {}
            }
        }

        for (name, _) in msg.fields() {
            if !self.fields.iter().any(|f| &f.name == name) {
                return Err(CoreError::UnknownField {
                    schema: self.name.clone(),
                    field: name.clone(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_schema() -> MessageSchema {
        MessageSchema::new(
            "Ping",
            vec![
                SchemaField {
                    name: "count".into(),
                    kind: FieldKind::I64,
                    default: None,
                },
                SchemaField {
                    name: "from".into(),
                    kind: FieldKind::Str,
                    default: Some(Field::Str("nobody".into())),
                },
            ],
        )
    }

    #[test]
    fn instantiate_uses_defaults() {
        let msg = ping_schema().instantiate();
        assert_eq!(msg.i64_field("count"), Some(0));
        assert_eq!(msg.str_field("from"), Some("nobody"));
    }

    #[test]
    fn set_field_preserves_type() {
        let mut msg = ping_schema().instantiate();
        assert!(msg.set_field("count", Field::I64(3)));
        assert!(!msg.set_field("count", Field::Str("three".into())));
        assert!(!msg.set_field("missing", Field::I64(1)));
        assert_eq!(msg.i64_field("count"), Some(3));
    }

    #[test]
    fn verify_rejects_bad_messages() {
        let schema = ping_schema();
        let good = schema.instantiate();
        assert!(schema.verify(&good).is_ok());

        assert!(schema.verify(&Message::new("Pong")).is_err());

        let missing = Message::new("Ping").with("count", Field::I64(1));
        assert!(schema.verify(&missing).is_err());

        let extra = schema.instantiate().with("stray", Field::Bool(true));
        assert!(schema.verify(&extra).is_err());
    }

    #[test]
    fn json_round_trip() {
        let msg = ping_schema()
            .instantiate()
            .with("count", Field::I64(42));
        let json = msg.to_json().unwrap();
        let back = Message::from_json(&json).unwrap();
        assert_eq!(msg, back);
    }
}
