//! Global aggregators.
//!
//! Each partition folds the deltas its vertices contribute during a superstep
//! into a local [`AggregateDeltas`] buffer. At the barrier the coordinator
//! merges every partition's buffer into a new [`AggregateSnapshot`], which is
//! what compute calls read during the *next* superstep.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use superstep_core::Superstep;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregatorError {
    #[error("aggregator '{0}' registered twice")]
    Duplicate(String),

    #[error("aggregator '{name}': {combine} cannot combine {kind} values")]
    Incompatible {
        name: String,
        combine: CombineFn,
        kind: ValueKind,
    },

    #[error("aggregator '{name}' expects {expected} values, got {found}")]
    TypeMismatch {
        name: String,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("unknown aggregator '{0}'")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Long,
    Double,
    Bool,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Long => "long",
            Self::Double => "double",
            Self::Bool => "bool",
        })
    }
}

/// A value held by an aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateValue {
    Long(i64),
    Double(f64),
    Bool(bool),
}

impl AggregateValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Long(_) => ValueKind::Long,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// Associative, commutative combine functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineFn {
    Sum,
    Min,
    Max,
    And,
    Or,
}

impl fmt::Display for CombineFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::And => "and",
            Self::Or => "or",
        })
    }
}

impl CombineFn {
    pub fn accepts(&self, kind: ValueKind) -> bool {
        match self {
            Self::Sum | Self::Min | Self::Max => kind != ValueKind::Bool,
            Self::And | Self::Or => kind == ValueKind::Bool,
        }
    }

    /// Combine two values of the same kind. Long sums saturate.
    pub fn apply(&self, left: AggregateValue, right: AggregateValue) -> Option<AggregateValue> {
        use AggregateValue::{Bool, Double, Long};
        let combined = match (self, left, right) {
            (Self::Sum, Long(a), Long(b)) => Long(a.saturating_add(b)),
            (Self::Sum, Double(a), Double(b)) => Double(a + b),
            (Self::Min, Long(a), Long(b)) => Long(a.min(b)),
            (Self::Min, Double(a), Double(b)) => Double(a.min(b)),
            (Self::Max, Long(a), Long(b)) => Long(a.max(b)),
            (Self::Max, Double(a), Double(b)) => Double(a.max(b)),
            (Self::And, Bool(a), Bool(b)) => Bool(a && b),
            (Self::Or, Bool(a), Bool(b)) => Bool(a || b),
            _ => return None,
        };
        Some(combined)
    }
}

/// Declaration of one named aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSpec {
    pub name: String,
    /// Starting value of every merge, and the value of a superstep in which
    /// nothing was contributed.
    pub initial: AggregateValue,
    pub combine: CombineFn,
    /// Persistent aggregators fold the previous merged value into the next
    /// merge instead of starting again from `initial`.
    #[serde(default)]
    pub persistent: bool,
}

impl AggregatorSpec {
    pub fn new(name: impl Into<String>, initial: AggregateValue, combine: CombineFn) -> Self {
        Self {
            name: name.into(),
            initial,
            combine,
            persistent: false,
        }
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// Per-partition buffer of deltas contributed in one superstep.
pub type AggregateDeltas = BTreeMap<String, AggregateValue>;

/// Merged aggregator values as of the end of a superstep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Superstep whose barrier produced these values; `None` before the
    /// first barrier.
    superstep: Option<Superstep>,
    values: BTreeMap<String, AggregateValue>,
}

impl AggregateSnapshot {
    pub fn superstep(&self) -> Option<Superstep> {
        self.superstep
    }

    pub fn get(&self, name: &str) -> Option<AggregateValue> {
        self.values.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, AggregateValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The aggregators a job declared, validated at registration.
#[derive(Debug, Clone, Default)]
pub struct AggregatorRegistry {
    specs: BTreeMap<String, AggregatorSpec>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: Vec<AggregatorSpec>) -> Result<Self, AggregatorError> {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(spec)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, spec: AggregatorSpec) -> Result<(), AggregatorError> {
        if self.specs.contains_key(&spec.name) {
            return Err(AggregatorError::Duplicate(spec.name));
        }
        let kind = spec.initial.kind();
        if !spec.combine.accepts(kind) {
            return Err(AggregatorError::Incompatible {
                name: spec.name,
                combine: spec.combine,
                kind,
            });
        }
        self.specs.insert(spec.name.clone(), spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AggregatorSpec> {
        self.specs.get(name)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Fold one vertex's contribution into a partition-local buffer.
    pub fn accumulate(
        &self,
        buffer: &mut AggregateDeltas,
        name: &str,
        delta: AggregateValue,
    ) -> Result<(), AggregatorError> {
        let spec = self
            .specs
            .get(name)
            .ok_or_else(|| AggregatorError::Unknown(name.to_string()))?;
        let expected = spec.initial.kind();
        if delta.kind() != expected {
            return Err(AggregatorError::TypeMismatch {
                name: name.to_string(),
                expected,
                found: delta.kind(),
            });
        }
        match buffer.get_mut(name) {
            Some(current) => {
                // Kinds were checked above, so `apply` cannot refuse.
                if let Some(combined) = spec.combine.apply(*current, delta) {
                    *current = combined;
                }
            }
            None => {
                buffer.insert(name.to_string(), delta);
            }
        }
        Ok(())
    }

    /// Merge every partition's buffer for `superstep` into the next snapshot.
    ///
    /// Partials are folded in the order given; with associative and
    /// commutative combines the result does not depend on it.
    pub fn merge(
        &self,
        previous: &AggregateSnapshot,
        superstep: Superstep,
        partials: &[&AggregateDeltas],
    ) -> AggregateSnapshot {
        let mut values = BTreeMap::new();
        for (name, spec) in &self.specs {
            let mut acc = if spec.persistent {
                previous.get(name).unwrap_or(spec.initial)
            } else {
                spec.initial
            };
            for partial in partials {
                let Some(delta) = partial.get(name) else {
                    continue;
                };
                match spec.combine.apply(acc, *delta) {
                    Some(combined) => acc = combined,
                    None => warn!(
                        aggregator = %name,
                        expected = %spec.initial.kind(),
                        found = %delta.kind(),
                        "dropping partial of the wrong kind"
                    ),
                }
            }
            values.insert(name.clone(), acc);
        }
        AggregateSnapshot {
            superstep: Some(superstep),
            values,
        }
    }
}
