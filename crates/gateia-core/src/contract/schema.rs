//! JSON Schema backed contracts.
//!
//! Validation runs on a canonicalized copy of the candidate: declared
//! `default` values are filled in for missing properties and, when
//! `strip_unknown` is set, properties the schema does not declare are
//! dropped. The canonical copy is what a successful validation returns.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::parser::ContractError;
use super::{Contract, ContractOutcome, RootKind};
use crate::types::FieldError;

/// A contract defined by a JSON Schema document.
#[derive(Clone)]
pub struct JsonSchemaContract {
    schema: Arc<Value>,
    validator: Arc<jsonschema::Validator>,
    strip_unknown: bool,
}

impl JsonSchemaContract {
    /// Compile a schema. Fails if the schema itself is invalid.
    pub fn new(schema: Value) -> Result<Self, ContractError> {
        let validator = jsonschema::options()
            .build(&schema)
            .map_err(|e| ContractError::InvalidSchema(e.to_string()))?;

        Ok(Self {
            schema: Arc::new(schema),
            validator: Arc::new(validator),
            strip_unknown: false,
        })
    }

    /// Drop object properties the schema does not declare (only where the
    /// schema does not explicitly allow additional properties).
    pub fn strip_unknown(mut self, strip: bool) -> Self {
        self.strip_unknown = strip;
        self
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn canonicalize(&self, value: &Value) -> Value {
        canonicalize(&self.schema, value.clone(), self.strip_unknown)
    }
}

impl fmt::Debug for JsonSchemaContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaContract")
            .field("schema", &self.schema)
            .field("strip_unknown", &self.strip_unknown)
            .finish()
    }
}

impl Contract for JsonSchemaContract {
    fn validate(&self, value: &Value) -> ContractOutcome {
        let data = self.canonicalize(value);

        let errors: Vec<FieldError> = self
            .validator
            .iter_errors(&data)
            .map(|e| FieldError::new(pointer_to_path(&e.instance_path.to_string()), e.to_string()))
            .collect();

        if errors.is_empty() {
            ContractOutcome::Valid { data }
        } else {
            ContractOutcome::invalid(errors)
        }
    }

    fn root_kind(&self) -> RootKind {
        root_kind_of(&self.schema)
    }
}

/// Convert a JSON pointer (`/profile/age`) to a dotted path (`profile.age`).
pub(crate) fn pointer_to_path(pointer: &str) -> String {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Nesting limit when following `$ref` and combinator branches.
const MAX_ROOT_DEPTH: usize = 8;

fn root_kind_of(schema: &Value) -> RootKind {
    kind_at(schema, schema, 0)
}

/// Root kind of `schema`, following local `$ref`s (`#/definitions/..`,
/// `#/$defs/..`) and `allOf`/`anyOf`/`oneOf` branches against `root`.
fn kind_at(root: &Value, schema: &Value, depth: usize) -> RootKind {
    let declared: Vec<&str> = match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };

    if declared.contains(&"object") {
        return RootKind::Object;
    }
    if declared.contains(&"array") {
        return RootKind::Array;
    }
    if !declared.is_empty() {
        return RootKind::Scalar;
    }

    if schema.get("properties").is_some() || schema.get("required").is_some() {
        return RootKind::Object;
    }
    if schema.get("items").is_some() {
        return RootKind::Array;
    }
    if depth >= MAX_ROOT_DEPTH {
        return RootKind::Any;
    }

    let referenced = schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| reference.strip_prefix('#'))
        .and_then(|pointer| root.pointer(pointer));
    if let Some(target) = referenced {
        let kind = kind_at(root, target, depth + 1);
        if kind != RootKind::Any {
            return kind;
        }
    }

    let branches: Vec<RootKind> = ["allOf", "anyOf", "oneOf"]
        .iter()
        .filter_map(|key| schema.get(*key).and_then(Value::as_array))
        .flatten()
        .map(|branch| kind_at(root, branch, depth + 1))
        .collect();

    [RootKind::Object, RootKind::Array, RootKind::Scalar]
        .into_iter()
        .find(|kind| branches.contains(kind))
        .unwrap_or(RootKind::Any)
}

/// Apply schema defaults and optional unknown-field stripping.
///
/// Follows `properties` and `items` only; `$ref`, combinators and
/// conditionals are left to the validator.
fn canonicalize(schema: &Value, value: Value, strip_unknown: bool) -> Value {
    match value {
        Value::Object(object) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return Value::Object(object);
            };
            Value::Object(canonicalize_object(schema, properties, object, strip_unknown))
        }
        Value::Array(items) => match schema.get("items") {
            Some(item_schema) if item_schema.is_object() => Value::Array(
                items
                    .into_iter()
                    .map(|item| canonicalize(item_schema, item, strip_unknown))
                    .collect(),
            ),
            _ => Value::Array(items),
        },
        other => other,
    }
}

fn canonicalize_object(
    schema: &Value,
    properties: &Map<String, Value>,
    object: Map<String, Value>,
    strip_unknown: bool,
) -> Map<String, Value> {
    let keeps_additional = matches!(
        schema.get("additionalProperties"),
        Some(Value::Bool(true)) | Some(Value::Object(_))
    );

    let mut out = Map::new();
    for (key, field) in object {
        match properties.get(&key) {
            Some(field_schema) => {
                out.insert(key, canonicalize(field_schema, field, strip_unknown));
            }
            None if strip_unknown && !keeps_additional => {}
            None => {
                out.insert(key, field);
            }
        }
    }

    for (key, field_schema) in properties {
        if out.contains_key(key) {
            continue;
        }
        if let Some(default) = field_schema.get("default") {
            out.insert(key.clone(), default.clone());
        }
    }

    out
}
