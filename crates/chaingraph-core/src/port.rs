//! Port model: typed I/O points on a node, their schemas, and the
//! value-write rules (versioning, deep-merge for structured ports).
//!
//! See spec §3 (Port) and §4.A.2 (typed `any` ports).

use crate::error::{CoreError, Result};
use crate::ids::{EdgeId, NodeId, PortId};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Enum,
    Stream,
    Any,
    Secret,
}

/// The schema a port carries: item/property shape for structured ports,
/// enum options, or the resolved underlying type of an `any` port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSchema {
    pub kind: PortKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Box<PortSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, PortSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Set only on a bound `Any` port; `None` means `Unbound` per the
    /// redesign note replacing reflective dynamic typing with a tagged
    /// variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underlying: Option<Box<PortSchema>>,
}

impl PortSchema {
    pub fn scalar(kind: PortKind) -> Self {
        Self {
            kind,
            item: None,
            properties: None,
            options: None,
            underlying: None,
        }
    }

    pub fn array(item: PortSchema) -> Self {
        Self {
            kind: PortKind::Array,
            item: Some(Box::new(item)),
            properties: None,
            options: None,
            underlying: None,
        }
    }

    pub fn object(properties: IndexMap<String, PortSchema>) -> Self {
        Self {
            kind: PortKind::Object,
            item: None,
            properties: Some(properties),
            options: None,
            underlying: None,
        }
    }

    pub fn enum_of(options: Vec<String>) -> Self {
        Self {
            kind: PortKind::Enum,
            item: None,
            properties: None,
            options: Some(options),
            underlying: None,
        }
    }

    pub fn any_unbound() -> Self {
        Self::scalar(PortKind::Any)
    }

    pub fn stream(item: PortSchema) -> Self {
        Self {
            kind: PortKind::Stream,
            item: Some(Box::new(item)),
            properties: None,
            options: None,
            underlying: None,
        }
    }

    /// Structural compatibility for connecting a source schema to a target
    /// schema. `Any` (unbound or bound) is compatible with everything; two
    /// resolved schemas must share a kind, and container kinds recurse.
    pub fn compatible_with(&self, other: &PortSchema) -> bool {
        if self.kind == PortKind::Any || other.kind == PortKind::Any {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            PortKind::Array => match (&self.item, &other.item) {
                (Some(a), Some(b)) => a.compatible_with(b),
                _ => true,
            },
            PortKind::Object => true,
            _ => true,
        }
    }

    fn effective(&self) -> &PortSchema {
        if self.kind == PortKind::Any {
            if let Some(u) = &self.underlying {
                return u;
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub key: String,
    pub node_id: NodeId,
    pub parent_id: Option<PortId>,
    pub direction: PortDirection,
    pub schema: PortSchema,
    pub value: serde_json::Value,
    pub version: u64,
    pub connections: Vec<EdgeId>,
}

impl Port {
    pub fn new(id: PortId, key: impl Into<String>, node_id: NodeId, direction: PortDirection, schema: PortSchema) -> Self {
        let value = default_value_for(&schema);
        Self {
            id,
            key: key.into(),
            node_id,
            parent_id: None,
            direction,
            schema,
            value,
            version: 0,
            connections: Vec::new(),
        }
    }

    /// Bump the version and, for object/array ports, deep-merge the new
    /// value by child key/index rather than replacing it wholesale.
    pub fn set_value(&mut self, new_value: serde_json::Value) -> Result<()> {
        if !value_matches_kind(&new_value, self.schema.effective().kind) {
            return Err(CoreError::TypeMismatch {
                port: self.key.clone(),
                expected: format!("{:?}", self.schema.effective().kind),
                actual: json_type_name(&new_value),
            });
        }
        match self.schema.effective().kind {
            PortKind::Object => {
                deep_merge_object(&mut self.value, &new_value);
            }
            PortKind::Array => {
                deep_merge_array(&mut self.value, &new_value);
            }
            _ => {
                self.value = new_value;
            }
        }
        self.version += 1;
        Ok(())
    }

    pub fn set_config(&mut self, schema: PortSchema) {
        self.schema = schema;
        self.version += 1;
    }

    /// Bind an `Any` port to a resolved schema (§4.A.2). Emits no event
    /// itself; callers (the flow arena) are responsible for the
    /// port-update event and propagation to downstream `any` ports.
    pub fn bind_any(&mut self, underlying: PortSchema) {
        self.schema.underlying = Some(Box::new(underlying));
        self.version += 1;
    }

    pub fn unbind_any(&mut self) {
        self.schema.underlying = None;
        self.version += 1;
    }
}

fn default_value_for(schema: &PortSchema) -> serde_json::Value {
    match schema.kind {
        PortKind::String | PortKind::Secret | PortKind::Enum => serde_json::Value::Null,
        PortKind::Number => serde_json::Value::Null,
        PortKind::Boolean => serde_json::Value::Null,
        PortKind::Object => serde_json::Value::Object(Default::default()),
        PortKind::Array | PortKind::Stream => serde_json::Value::Array(Vec::new()),
        PortKind::Any => serde_json::Value::Null,
    }
}

fn json_type_name(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_string()
}

fn value_matches_kind(v: &serde_json::Value, kind: PortKind) -> bool {
    if v.is_null() {
        // Null is always a legal "unset" write.
        return true;
    }
    match kind {
        PortKind::String | PortKind::Secret | PortKind::Enum => v.is_string(),
        PortKind::Number => v.is_number(),
        PortKind::Boolean => v.is_boolean(),
        PortKind::Object => v.is_object(),
        PortKind::Array | PortKind::Stream => v.is_array(),
        PortKind::Any => true,
    }
}

fn deep_merge_object(target: &mut serde_json::Value, incoming: &serde_json::Value) {
    if !target.is_object() {
        *target = serde_json::Value::Object(Default::default());
    }
    if let (Some(t), Some(i)) = (target.as_object_mut(), incoming.as_object()) {
        for (k, v) in i {
            match t.get_mut(k) {
                Some(existing) if existing.is_object() && v.is_object() => {
                    deep_merge_object(existing, v);
                }
                _ => {
                    t.insert(k.clone(), v.clone());
                }
            }
        }
    }
}

fn deep_merge_array(target: &mut serde_json::Value, incoming: &serde_json::Value) {
    if !target.is_array() {
        *target = serde_json::Value::Array(Vec::new());
    }
    if let (Some(t), Some(i)) = (target.as_array_mut(), incoming.as_array()) {
        for (idx, v) in i.iter().enumerate() {
            if idx < t.len() {
                if t[idx].is_object() && v.is_object() {
                    deep_merge_array_object(&mut t[idx], v);
                } else {
                    t[idx] = v.clone();
                }
            } else {
                t.push(v.clone());
            }
        }
    }
}

fn deep_merge_array_object(target: &mut serde_json::Value, incoming: &serde_json::Value) {
    deep_merge_object(target, incoming);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number_port() -> Port {
        Port::new(PortId(0), "n", NodeId(0), PortDirection::Input, PortSchema::scalar(PortKind::Number))
    }

    #[test]
    fn version_increases_on_write() {
        let mut p = number_port();
        assert_eq!(p.version, 0);
        p.set_value(serde_json::json!(5)).unwrap();
        assert_eq!(p.version, 1);
        p.set_value(serde_json::json!(6)).unwrap();
        assert_eq!(p.version, 2);
    }

    #[test]
    fn type_mismatch_rejected() {
        let mut p = number_port();
        let err = p.set_value(serde_json::json!("oops")).unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn object_ports_deep_merge_by_key() {
        let mut p = Port::new(
            PortId(0),
            "o",
            NodeId(0),
            PortDirection::Input,
            PortSchema::object(IndexMap::new()),
        );
        p.set_value(serde_json::json!({"a": 1, "b": {"x": 1}})).unwrap();
        p.set_value(serde_json::json!({"b": {"y": 2}})).unwrap();
        assert_eq!(p.value, serde_json::json!({"a": 1, "b": {"x": 1, "y": 2}}));
    }

    #[test]
    fn any_port_binds_and_unbinds() {
        let mut p = Port::new(PortId(0), "a", NodeId(0), PortDirection::Input, PortSchema::any_unbound());
        assert!(p.schema.underlying.is_none());
        p.bind_any(PortSchema::scalar(PortKind::Number));
        assert!(p.schema.underlying.is_some());
        p.unbind_any();
        assert!(p.schema.underlying.is_none());
    }
}
