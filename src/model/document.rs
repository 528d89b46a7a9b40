//! The three document shapes a merge can target.
//!
//! | Shape  | Discriminator                             | Mutation root     |
//! |--------|-------------------------------------------|-------------------|
//! | Module | `spec == "risu_module"`                   | `module` object   |
//! | Nested | `spec` is a v3 tag and `data` is object   | `data` object     |
//! | Flat   | anything else with a non-empty `name`     | the root object   |
//!
//! The mutation root is split out of the JSON root at construction time, so
//! [`Document::target_mut`] is infallible.  The slot it came from stays in
//! the root as a placeholder and is filled back in place by
//! [`Document::into_value`], which keeps the original field order.

use serde_json::{Map, Value};
use thiserror::Error;

pub const MODULE_SPEC: &str = "risu_module";
/// Accepted `spec` values for the nested shape.
pub const NESTED_SPECS: [&str; 2] = ["card_v3", "chara_card_v3"];

const MODULE_KEY:        &str = "module";
const LEGACY_MODULE_KEY: &str = "risuModule";
const DATA_KEY:          &str = "data";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Document root must be a JSON object")]
    NotAnObject,
    #[error("Module document has no `module` object")]
    MissingModule,
    #[error("Document has no name")]
    MissingName,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Module,
    Nested,
    Flat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Module { root: Map<String, Value>, module: Map<String, Value> },
    Nested { root: Map<String, Value>, data: Map<String, Value> },
    Flat(Map<String, Value>),
}

impl Document {
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        let Value::Object(mut root) = value else {
            return Err(DocumentError::NotAnObject);
        };

        let spec = root.get("spec").and_then(Value::as_str).unwrap_or_default().to_owned();

        if spec == MODULE_SPEC {
            // Older front ends stored the body under `risuModule`.
            let key = if root.get(MODULE_KEY).is_some_and(Value::is_object) {
                MODULE_KEY
            } else if root.get(LEGACY_MODULE_KEY).is_some_and(Value::is_object) {
                LEGACY_MODULE_KEY
            } else {
                return Err(DocumentError::MissingModule);
            };
            let module = take_object(&mut root, key);
            if key == LEGACY_MODULE_KEY {
                root.shift_remove(LEGACY_MODULE_KEY);
                root.insert(MODULE_KEY.to_owned(), Value::Null);
            }
            return Ok(Document::Module { root, module });
        }

        if NESTED_SPECS.contains(&spec.as_str()) && root.get(DATA_KEY).is_some_and(Value::is_object) {
            let data = take_object(&mut root, DATA_KEY);
            require_name(&data)?;
            return Ok(Document::Nested { root, data });
        }

        require_name(&root)?;
        Ok(Document::Flat(root))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Empty flat card.  Stands in for a missing companion so asset
    /// references still have somewhere to go.
    pub fn blank_card() -> Self {
        Document::Flat(Map::new())
    }

    /// Wrap a decoded module body as a Module-shape document.
    pub fn from_module(module: Value) -> Result<Self, DocumentError> {
        let Value::Object(module) = module else {
            return Err(DocumentError::MissingModule);
        };
        let mut root = Map::new();
        root.insert("spec".to_owned(), Value::String(MODULE_SPEC.to_owned()));
        root.insert(MODULE_KEY.to_owned(), Value::Null);
        Ok(Document::Module { root, module })
    }

    pub fn shape(&self) -> Shape {
        match self {
            Document::Module { .. } => Shape::Module,
            Document::Nested { .. } => Shape::Nested,
            Document::Flat(_)       => Shape::Flat,
        }
    }

    pub fn is_module(&self) -> bool {
        self.shape() == Shape::Module
    }

    /// The object every merge mutation applies to.
    pub fn target(&self) -> &Map<String, Value> {
        match self {
            Document::Module { module, .. } => module,
            Document::Nested { data, .. }   => data,
            Document::Flat(root)            => root,
        }
    }

    pub fn target_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Document::Module { module, .. } => module,
            Document::Nested { data, .. }   => data,
            Document::Flat(root)            => root,
        }
    }

    /// `name` of the mutation root, when present and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.target().get("name").and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Reassemble the full JSON document.
    pub fn into_value(self) -> Value {
        match self {
            Document::Module { mut root, module } => {
                root.insert(MODULE_KEY.to_owned(), Value::Object(module));
                Value::Object(root)
            }
            Document::Nested { mut root, data } => {
                root.insert(DATA_KEY.to_owned(), Value::Object(data));
                Value::Object(root)
            }
            Document::Flat(root) => Value::Object(root),
        }
    }

    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }

    /// The module body as a standalone value (Module shape only).
    pub fn module_value(&self) -> Option<Value> {
        match self {
            Document::Module { module, .. } => Some(Value::Object(module.clone())),
            _ => None,
        }
    }

    /// Pretty JSON with 2-space indentation, as written to `card.json`.
    pub fn to_pretty_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.get_mut(key).map(Value::take) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn require_name(map: &Map<String, Value>) -> Result<(), DocumentError> {
    match map.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(DocumentError::MissingName),
    }
}
