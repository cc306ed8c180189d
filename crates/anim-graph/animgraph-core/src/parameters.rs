//! Named control parameters read by parameter value nodes.
//!
//! The graph declares its parameters once (name + kind); each [`GraphInstance`](crate::GraphInstance)
//! owns a [`ParameterStore`] built from that layout. Nodes address parameters by index resolved at
//! build time; hosts address them by name.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    Bool,
    Float,
    Id,
}

impl ParameterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ParameterKind::Bool => "bool",
            ParameterKind::Float => "float",
            ParameterKind::Id => "id",
        }
    }

    fn default_value(self) -> ParameterValue {
        match self {
            ParameterKind::Bool => ParameterValue::Bool(false),
            ParameterKind::Float => ParameterValue::Float(0.0),
            ParameterKind::Id => ParameterValue::Id(String::new()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Bool(bool),
    Float(f32),
    Id(String),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Id(_) => ParameterKind::Id,
        }
    }
}

/// A parameter declared by a graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,
    pub kind: ParameterKind,
}

#[derive(Clone, Debug, Default)]
pub struct ParameterStore {
    decls: Vec<ParameterDecl>,
    values: Vec<ParameterValue>,
    lookup: HashMap<String, usize>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layout(decls: &[ParameterDecl]) -> Self {
        let mut store = Self::new();
        for decl in decls {
            // Layouts come from a built graph and are already free of conflicts.
            let _ = store.declare(&decl.name, decl.kind);
        }
        store
    }

    /// Declare a parameter, returning its index. Re-declaring with the same kind is a no-op.
    pub fn declare(&mut self, name: &str, kind: ParameterKind) -> GraphResult<usize> {
        if let Some(&idx) = self.lookup.get(name) {
            let existing = self.decls[idx].kind;
            if existing != kind {
                return Err(GraphError::ParameterKindMismatch {
                    name: name.to_string(),
                    expected: kind.as_str().to_string(),
                    found: existing.as_str().to_string(),
                });
            }
            return Ok(idx);
        }
        let idx = self.decls.len();
        self.decls.push(ParameterDecl {
            name: name.to_string(),
            kind,
        });
        self.values.push(kind.default_value());
        self.lookup.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn layout(&self) -> &[ParameterDecl] {
        &self.decls
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    fn checked_index(&self, name: &str, kind: ParameterKind) -> GraphResult<usize> {
        let idx = self
            .index_of(name)
            .ok_or_else(|| GraphError::UnknownParameter {
                name: name.to_string(),
            })?;
        let found = self.decls[idx].kind;
        if found != kind {
            return Err(GraphError::ParameterKindMismatch {
                name: name.to_string(),
                expected: kind.as_str().to_string(),
                found: found.as_str().to_string(),
            });
        }
        Ok(idx)
    }

    pub fn set(&mut self, name: &str, value: ParameterValue) -> GraphResult<()> {
        let idx = self.checked_index(name, value.kind())?;
        self.values[idx] = value;
        Ok(())
    }

    pub fn set_bool(&mut self, name: &str, value: bool) -> GraphResult<()> {
        self.set(name, ParameterValue::Bool(value))
    }

    pub fn set_float(&mut self, name: &str, value: f32) -> GraphResult<()> {
        self.set(name, ParameterValue::Float(value))
    }

    pub fn set_id(&mut self, name: &str, value: impl Into<String>) -> GraphResult<()> {
        self.set(name, ParameterValue::Id(value.into()))
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.index_of(name).map(|idx| &self.values[idx])
    }

    pub fn bool(&self, name: &str) -> GraphResult<bool> {
        let idx = self.checked_index(name, ParameterKind::Bool)?;
        Ok(self.bool_at(idx))
    }

    pub fn float(&self, name: &str) -> GraphResult<f32> {
        let idx = self.checked_index(name, ParameterKind::Float)?;
        Ok(self.float_at(idx))
    }

    pub fn id(&self, name: &str) -> GraphResult<&str> {
        let idx = self.checked_index(name, ParameterKind::Id)?;
        Ok(self.id_at(idx))
    }

    #[inline]
    pub(crate) fn bool_at(&self, idx: usize) -> bool {
        matches!(self.values[idx], ParameterValue::Bool(true))
    }

    #[inline]
    pub(crate) fn float_at(&self, idx: usize) -> f32 {
        match self.values[idx] {
            ParameterValue::Float(v) => v,
            _ => 0.0,
        }
    }

    #[inline]
    pub(crate) fn id_at(&self, idx: usize) -> &str {
        match &self.values[idx] {
            ParameterValue::Id(v) => v,
            _ => "",
        }
    }
}
