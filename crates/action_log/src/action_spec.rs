//! Action specs and the schema registry.
//!
//! An action is a named, fixed-shape `f32` tensor recorded once per frame.
//! The registry keeps specs in registration order, which is also the order of
//! the store's tables and of the vectors returned on replay.

use std::collections::HashMap;

use bitcode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::log_error::{LogError, LogResult};
use crate::store::SCALAR_BYTES;

/// Name and shape of one recorded action stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct ActionSpec {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            shape: shape.to_vec(),
        }
    }

    /// Number of scalars in one row. Saturates for shapes registration
    /// rejects as too large.
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    /// Number of scalars in one row, `None` if it overflows `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// A spec is never empty once validated; provided for clippy symmetry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> LogResult<()> {
        // A row must stay addressable in bytes on disk.
        let row_bytes = self
            .checked_len()
            .and_then(|len| len.checked_mul(SCALAR_BYTES));
        if self.shape.is_empty() || self.shape.contains(&0) || row_bytes.is_none() {
            return Err(LogError::InvalidShape {
                name: self.name.clone(),
                shape: self.shape.clone(),
            });
        }
        Ok(())
    }
}

/// Ordered set of registered actions.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    specs: Vec<ActionSpec>,
    index: HashMap<String, usize>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from specs already validated elsewhere (e.g. a
    /// manifest), still rejecting duplicates and bad shapes.
    pub fn from_specs(specs: &[ActionSpec]) -> LogResult<Self> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(&spec.name, &spec.shape)?;
        }
        Ok(registry)
    }

    /// Add a new action stream.
    pub fn register(&mut self, name: &str, shape: &[usize]) -> LogResult<()> {
        if self.index.contains_key(name) {
            return Err(LogError::DuplicateAction(name.to_string()));
        }
        let spec = ActionSpec::new(name, shape);
        spec.validate()?;
        self.index.insert(spec.name.clone(), self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Shape of a registered action.
    pub fn resolve(&self, name: &str) -> LogResult<&[usize]> {
        self.spec(name).map(|spec| spec.shape.as_slice())
    }

    pub fn spec(&self, name: &str) -> LogResult<&ActionSpec> {
        self.position(name).map(|i| &self.specs[i])
    }

    /// Registration index of an action.
    pub fn position(&self, name: &str) -> LogResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| LogError::UnknownAction(name.to_string()))
    }

    pub fn specs(&self) -> &[ActionSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Order-independent comparison against another spec set.
    ///
    /// Returns a human-readable description of the first difference found.
    pub fn diff(&self, expected: &[ActionSpec]) -> Option<String> {
        let mut seen = HashMap::with_capacity(expected.len());
        for spec in expected {
            if seen.insert(spec.name.as_str(), spec).is_some() {
                return Some(format!("expected specs name '{}' twice", spec.name));
            }
            match self.spec(&spec.name) {
                Err(_) => {
                    return Some(format!(
                        "expected action '{}' is not in the store",
                        spec.name
                    ))
                }
                Ok(recorded) if recorded.shape != spec.shape => {
                    return Some(format!(
                        "action '{}' recorded with shape {:?}, expected {:?}",
                        spec.name, recorded.shape, spec.shape
                    ))
                }
                Ok(_) => {}
            }
        }
        self.specs
            .iter()
            .find(|spec| !seen.contains_key(spec.name.as_str()))
            .map(|spec| format!("store has unexpected action '{}'", spec.name))
    }
}
