//! Heterogeneous, typed-key context metadata attached to prompt components.
//!
//! A [`ContextMap`] maps key *types* to values. Every key declares a default,
//! so lookups never fail; merging recurses into values that know how to merge
//! themselves (role constraints, completion parameters) and otherwise
//! requires equality.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};
use crate::types::role::{CompletionKind, Role, RoleConstraint};

/// A value storable in a [`ContextMap`].
///
/// Implementors with merge semantics override [`ContextValue::merge_value`];
/// the default makes a key collision fall back to the equality requirement.
pub trait ContextValue: Any + fmt::Debug + Send + Sync {
    fn clone_boxed(&self) -> Box<dyn ContextValue>;

    fn eq_value(&self, other: &dyn ContextValue) -> bool;

    /// Attempt a recursive merge with a colliding value of the same key.
    ///
    /// `None` means this value kind has no merge semantics; `Some(Err(_))`
    /// means merging was attempted and genuinely conflicts.
    fn merge_value(&self, _other: &dyn ContextValue) -> Option<Result<Box<dyn ContextValue>>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// A statically-typed key into a [`ContextMap`].
///
/// Keys are zero-sized marker types; the key type itself is the map key, and
/// the declared default makes absence unambiguous.
pub trait ContextKey: 'static {
    type Value: ContextValue + Clone;

    fn default_value() -> Self::Value;
}

macro_rules! plain_context_value {
    ($($ty:ty),+ $(,)?) => {
        $(impl ContextValue for $ty {
            fn clone_boxed(&self) -> Box<dyn ContextValue> {
                Box::new(self.clone())
            }

            fn eq_value(&self, other: &dyn ContextValue) -> bool {
                other
                    .as_any()
                    .downcast_ref::<Self>()
                    .is_some_and(|other| self == other)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        })+
    };
}

plain_context_value!(String, bool, u32, u64, i64, f64);

impl<T> ContextValue for Option<T>
where
    T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn clone_boxed(&self) -> Box<dyn ContextValue> {
        Box::new(self.clone())
    }

    fn eq_value(&self, other: &dyn ContextValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn merge_value(&self, other: &dyn ContextValue) -> Option<Result<Box<dyn ContextValue>>> {
        // An absent side yields to the present one; two present values must
        // agree (checked by the caller through eq_value first).
        let other = other.as_any().downcast_ref::<Self>()?;
        match (self, other) {
            (None, _) => Some(Ok(Box::new(other.clone()))),
            (_, None) => Some(Ok(Box::new(self.clone()))),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ContextValue for RoleConstraint {
    fn clone_boxed(&self) -> Box<dyn ContextValue> {
        Box::new(*self)
    }

    fn eq_value(&self, other: &dyn ContextValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn merge_value(&self, other: &dyn ContextValue) -> Option<Result<Box<dyn ContextValue>>> {
        let other = other.as_any().downcast_ref::<Self>()?;
        Some(
            self.merge(*other)
                .map(|merged| Box::new(merged) as Box<dyn ContextValue>),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Provider-independent sampling parameters carried through composition.
///
/// Collaborators read these to build vendor request bodies; the core only
/// guarantees they merge correctly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

impl CompletionParams {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise merge; fields set on both sides must agree.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        fn join<T: Clone + PartialEq>(a: &Option<T>, b: &Option<T>) -> Result<Option<T>> {
            match (a, b) {
                (Some(a), Some(b)) if a != b => Err(PromptError::ContextConflict {
                    key: std::any::type_name::<CompletionParamsKey>(),
                }),
                (Some(a), _) => Ok(Some(a.clone())),
                (None, b) => Ok(b.clone()),
            }
        }

        Ok(Self {
            temperature: join(&self.temperature, &other.temperature)?,
            top_p: join(&self.top_p, &other.top_p)?,
            max_tokens: join(&self.max_tokens, &other.max_tokens)?,
            stop_sequences: join(&self.stop_sequences, &other.stop_sequences)?,
        })
    }
}

impl ContextValue for CompletionParams {
    fn clone_boxed(&self) -> Box<dyn ContextValue> {
        Box::new(self.clone())
    }

    fn eq_value(&self, other: &dyn ContextValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn merge_value(&self, other: &dyn ContextValue) -> Option<Result<Box<dyn ContextValue>>> {
        let other = other.as_any().downcast_ref::<Self>()?;
        Some(
            self.merge(other)
                .map(|merged| Box::new(merged) as Box<dyn ContextValue>),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Key: the role constraint governing a component or composition.
pub struct RoleConstraintKey;

impl ContextKey for RoleConstraintKey {
    type Value = RoleConstraint;

    fn default_value() -> Self::Value {
        RoleConstraint::any()
    }
}

/// Key: an explicit completion-kind override for conversion.
pub struct CompletionKindKey;

impl ContextKey for CompletionKindKey {
    type Value = Option<CompletionKind>;

    fn default_value() -> Self::Value {
        None
    }
}

/// Key: the target model identifier, read by vendor routing.
pub struct ModelKey;

impl ContextKey for ModelKey {
    type Value = Option<String>;

    fn default_value() -> Self::Value {
        None
    }
}

/// Key: provider-independent sampling parameters.
pub struct CompletionParamsKey;

impl ContextKey for CompletionParamsKey {
    type Value = CompletionParams;

    fn default_value() -> Self::Value {
        CompletionParams::default()
    }
}

struct Entry {
    key_name: &'static str,
    value: Box<dyn ContextValue>,
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        Self {
            key_name: self.key_name,
            value: self.value.clone_boxed(),
        }
    }
}

/// Typed-key metadata map attached to prompt components and compositions.
///
/// Pure value type: all operations either return a new map or mutate through
/// `&mut self`; lookups never fail because every key declares a default.
#[derive(Clone, Default)]
pub struct ContextMap {
    entries: BTreeMap<TypeId, Entry>,
}

impl ContextMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored value for `K`, or `K`'s declared default.
    pub fn get<K: ContextKey>(&self) -> K::Value {
        self.entries
            .get(&TypeId::of::<K>())
            .and_then(|entry| entry.value.as_any().downcast_ref::<K::Value>())
            .cloned()
            .unwrap_or_else(K::default_value)
    }

    pub fn set<K: ContextKey>(&mut self, value: K::Value) {
        self.entries.insert(
            TypeId::of::<K>(),
            Entry {
                key_name: std::any::type_name::<K>(),
                value: Box::new(value),
            },
        );
    }

    /// Builder-style [`ContextMap::set`].
    pub fn with<K: ContextKey>(mut self, value: K::Value) -> Self {
        self.set::<K>(value);
        self
    }

    pub fn contains<K: ContextKey>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<K>())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` into a copy of `self`, key by key.
    ///
    /// Colliding keys recurse into the values' own merge when one exists;
    /// otherwise the values must be equal or the merge fails.
    pub fn merge(&self, other: &Self) -> Result<Self> {
        let mut merged = self.clone();
        merged.merge_from(other)?;
        Ok(merged)
    }

    /// In-place variant of [`ContextMap::merge`].
    pub fn merge_from(&mut self, other: &Self) -> Result<()> {
        for (type_id, incoming) in &other.entries {
            match self.entries.get_mut(type_id) {
                None => {
                    self.entries.insert(*type_id, incoming.clone());
                }
                Some(existing) => {
                    if existing.value.eq_value(incoming.value.as_ref()) {
                        continue;
                    }
                    match existing.value.merge_value(incoming.value.as_ref()) {
                        Some(Ok(value)) => existing.value = value,
                        Some(Err(err)) => return Err(err),
                        None => {
                            return Err(PromptError::ContextConflict {
                                key: existing.key_name,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    // Convenience accessors for the standard keys.

    pub fn role_constraint(&self) -> RoleConstraint {
        self.get::<RoleConstraintKey>()
    }

    pub fn set_role(&mut self, role: Role) {
        self.set::<RoleConstraintKey>(RoleConstraint::selected(role));
    }

    pub fn with_role(self, role: Role) -> Self {
        self.with::<RoleConstraintKey>(RoleConstraint::selected(role))
    }

    pub fn completion_kind(&self) -> Option<CompletionKind> {
        self.get::<CompletionKindKey>()
    }

    pub fn model(&self) -> Option<String> {
        self.get::<ModelKey>()
    }

    pub fn completion_params(&self) -> CompletionParams {
        self.get::<CompletionParamsKey>()
    }
}

impl fmt::Debug for ContextMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.entries.values() {
            map.entry(&entry.key_name, &entry.value);
        }
        map.finish()
    }
}

impl PartialEq for ContextMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|(type_id, entry)| {
                other
                    .entries
                    .get(type_id)
                    .is_some_and(|theirs| entry.value.eq_value(theirs.value.as_ref()))
            })
    }
}
