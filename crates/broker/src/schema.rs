// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Relay Contributors
//
// This file is part of Relay.
//
// Relay is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// Relay is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Relay. If not, see <https://www.gnu.org/licenses/>.

//! Schema registry: schema name → compiled payload validator.
//!
//! The built-in compiler covers the structural JSON-schema subset the broker
//! needs (`type`, `properties`, `required`, `items`, `enum`); anything richer
//! plugs in through the [`SchemaValidator`] trait.

use crate::error::{BrokerError, BrokerResult};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;

/// Compiled payload validator.
pub trait SchemaValidator: Send + Sync {
    /// Whether the payload satisfies the schema.
    fn validate(&self, payload: &Value) -> bool;
}

#[derive(Debug, Clone)]
enum SchemaNode {
    Any,
    Null,
    Boolean,
    String,
    Number,
    Integer,
    Array {
        items: Option<Box<SchemaNode>>,
    },
    Object {
        properties: HashMap<String, SchemaNode>,
        required: Vec<String>,
    },
    Enum(Vec<Value>),
}

impl SchemaNode {
    fn compile(document: &Value) -> BrokerResult<Self> {
        let Some(object) = document.as_object() else {
            return Err(BrokerError::InvalidArgument(
                "schema document must be a JSON object".to_string(),
            ));
        };

        if let Some(values) = object.get("enum") {
            let Some(values) = values.as_array() else {
                return Err(BrokerError::InvalidArgument(
                    "schema 'enum' must be an array".to_string(),
                ));
            };
            return Ok(SchemaNode::Enum(values.clone()));
        }

        let Some(ty) = object.get("type") else {
            return Ok(SchemaNode::Any);
        };
        match ty.as_str() {
            Some("null") => Ok(SchemaNode::Null),
            Some("boolean") => Ok(SchemaNode::Boolean),
            Some("string") => Ok(SchemaNode::String),
            Some("number") => Ok(SchemaNode::Number),
            Some("integer") => Ok(SchemaNode::Integer),
            Some("array") => {
                let items = match object.get("items") {
                    Some(items) => Some(Box::new(Self::compile(items)?)),
                    None => None,
                };
                Ok(SchemaNode::Array { items })
            }
            Some("object") => {
                let mut properties = HashMap::new();
                if let Some(props) = object.get("properties").and_then(Value::as_object) {
                    for (name, schema) in props {
                        properties.insert(name.clone(), Self::compile(schema)?);
                    }
                }
                let required = object
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| {
                        names
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(SchemaNode::Object {
                    properties,
                    required,
                })
            }
            _ => Err(BrokerError::InvalidArgument(format!(
                "unsupported schema type: {}",
                ty
            ))),
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaNode::Any => true,
            SchemaNode::Null => value.is_null(),
            SchemaNode::Boolean => value.is_boolean(),
            SchemaNode::String => value.is_string(),
            SchemaNode::Number => value.is_number(),
            SchemaNode::Integer => value.is_i64() || value.is_u64(),
            SchemaNode::Array { items } => match value.as_array() {
                None => false,
                Some(elements) => match items {
                    None => true,
                    Some(node) => elements.iter().all(|e| node.matches(e)),
                },
            },
            SchemaNode::Object {
                properties,
                required,
            } => match value.as_object() {
                None => false,
                Some(object) => {
                    required.iter().all(|name| object.contains_key(name))
                        && object.iter().all(|(name, v)| {
                            properties.get(name).map_or(true, |node| node.matches(v))
                        })
                }
            },
            SchemaNode::Enum(values) => values.contains(value),
        }
    }
}

/// Validator compiled from a structural JSON-schema document.
pub struct CompiledSchema {
    root: SchemaNode,
}

impl CompiledSchema {
    /// Compile a schema document.
    pub fn compile(document: &Value) -> BrokerResult<Self> {
        Ok(Self {
            root: SchemaNode::compile(document)?,
        })
    }
}

impl SchemaValidator for CompiledSchema {
    fn validate(&self, payload: &Value) -> bool {
        self.root.matches(payload)
    }
}

/// Process-shareable registry of named validators.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<dyn SchemaValidator>>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, initialized on first use.
    pub fn global() -> &'static SchemaRegistry {
        static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();
        GLOBAL.get_or_init(SchemaRegistry::new)
    }

    /// Compile and register a schema document under a name.
    pub async fn register(&self, name: impl Into<String>, document: &Value) -> BrokerResult<()> {
        let compiled = CompiledSchema::compile(document)?;
        self.schemas
            .write()
            .await
            .insert(name.into(), Arc::new(compiled));
        Ok(())
    }

    /// Register a pre-built validator.
    pub async fn register_validator(
        &self,
        name: impl Into<String>,
        validator: Arc<dyn SchemaValidator>,
    ) {
        self.schemas.write().await.insert(name.into(), validator);
    }

    /// Resolve a schema name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn SchemaValidator>> {
        self.schemas.read().await.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_object_schema() {
        let registry = SchemaRegistry::new();
        registry
            .register(
                "order",
                &json!({
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer" },
                        "tags": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["id"]
                }),
            )
            .await
            .unwrap();

        let validator = registry.get("order").await.unwrap();
        assert!(validator.validate(&json!({ "id": 1 })));
        assert!(validator.validate(&json!({ "id": 1, "tags": ["a", "b"] })));
        assert!(validator.validate(&json!({ "id": 1, "extra": true })));
        assert!(!validator.validate(&json!({ "tags": [] })));
        assert!(!validator.validate(&json!({ "id": "not-an-int" })));
        assert!(!validator.validate(&json!({ "id": 1, "tags": [7] })));
        assert!(!validator.validate(&json!([1, 2])));
    }

    #[tokio::test]
    async fn test_enum_schema() {
        let registry = SchemaRegistry::new();
        registry
            .register("color", &json!({ "enum": ["red", "blue"] }))
            .await
            .unwrap();
        let validator = registry.get("color").await.unwrap();
        assert!(validator.validate(&json!("red")));
        assert!(!validator.validate(&json!("green")));
    }

    #[tokio::test]
    async fn test_unknown_schema_and_bad_document() {
        let registry = SchemaRegistry::new();
        assert!(registry.get("missing").await.is_none());
        assert!(registry
            .register("bad", &json!({ "type": "quantum" }))
            .await
            .is_err());
        assert!(registry.register("worse", &json!(42)).await.is_err());
    }
}
