//! Typed prompt components and the lazy-resolution capability.
//!
//! A [`PromptComponent`] couples one payload with its own [`ContextMap`].
//! The payload list is closed for exhaustive matching; host applications
//! inject custom resolvable content through the single opaque
//! [`Resolvable`] variant.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};
use crate::types::context::ContextMap;
use crate::types::media::ImageSource;
use crate::types::prompt::PromptValue;
use crate::types::role::Role;
use crate::types::tools::{FunctionCall, FunctionResult};

/// A capability object producing prompt content on demand.
///
/// [`Resolvable::peek`] is the best-effort synchronous path used by
/// emptiness checks; [`Resolvable::resolve`] is the authoritative async
/// resolution invoked by [`PromptValue::resolve`].
#[async_trait]
pub trait Resolvable: fmt::Debug + Send + Sync {
    /// Diagnostic name, carried by "variable unresolved" failures.
    fn name(&self) -> &str;

    /// Best-effort synchronous resolution; `None` when the value is not
    /// available without suspending.
    fn peek(&self) -> Option<PromptValue> {
        None
    }

    /// Resolve to a purely-synchronous prompt value.
    async fn resolve(&self) -> Result<PromptValue>;
}

/// A lazily-resolvable variable slot: the resolver plus its cached result.
#[derive(Clone)]
pub struct VariableSlot {
    resolver: Arc<dyn Resolvable>,
    resolved: Option<PromptValue>,
}

/// Trivial resolver backing a slot built from an already-known value.
#[derive(Debug)]
struct Resolved(PromptValue);

#[async_trait]
impl Resolvable for Resolved {
    fn name(&self) -> &str {
        "resolved"
    }

    fn peek(&self) -> Option<PromptValue> {
        Some(self.0.clone())
    }

    async fn resolve(&self) -> Result<PromptValue> {
        Ok(self.0.clone())
    }
}

impl VariableSlot {
    pub fn new(resolver: Arc<dyn Resolvable>) -> Self {
        Self {
            resolver,
            resolved: None,
        }
    }

    /// A slot that already holds its resolution, e.g. when re-wrapping
    /// degenerated variable content back into a component.
    pub fn from_value(value: PromptValue) -> Self {
        Self {
            resolver: Arc::new(Resolved(value.clone())),
            resolved: Some(value),
        }
    }

    pub fn name(&self) -> &str {
        self.resolver.name()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The cached resolution, when one exists.
    pub fn resolved(&self) -> Option<&PromptValue> {
        self.resolved.as_ref()
    }

    /// Cached resolution, falling back to the resolver's synchronous path.
    pub fn peek(&self) -> Option<PromptValue> {
        match &self.resolved {
            Some(value) => Some(value.clone()),
            None => self.resolver.peek(),
        }
    }

    /// Resolve through the capability object and cache the result.
    pub async fn resolve(&self) -> Result<Self> {
        if self.resolved.is_some() {
            return Ok(self.clone());
        }
        let value = self.resolver.resolve().await?;
        // The resolved value may itself contain nested lazy content.
        let value = value.resolve().await?;
        Ok(Self {
            resolver: Arc::clone(&self.resolver),
            resolved: Some(value),
        })
    }
}

impl fmt::Debug for VariableSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableSlot")
            .field("name", &self.resolver.name())
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl PartialEq for VariableSlot {
    fn eq(&self, other: &Self) -> bool {
        match (&self.resolved, &other.resolved) {
            (Some(a), Some(b)) => a == b,
            _ => Arc::ptr_eq(&self.resolver, &other.resolver),
        }
    }
}

/// Localizable text resolved against the host application's string tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct LocalizedText {
    /// Lookup key in the host's localization table.
    pub key: String,
    /// The localized (or fallback) rendering.
    pub text: String,
}

impl LocalizedText {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
        }
    }
}

/// The closed set of prompt component payloads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ComponentPayload {
    /// Plain text content
    Text { text: String },
    /// Localizable text content
    Localized { resource: LocalizedText },
    /// Embedded image content
    Image { source: ImageSource },
    /// A nested composable prompt
    Nested { prompt: PromptValue },
    /// A lazily-resolvable variable (not persistable)
    #[serde(skip)]
    Variable { slot: VariableSlot },
    /// A function call requested by the assistant
    #[serde(rename = "function-call")]
    FunctionCall { call: FunctionCall },
    /// A function invocation result
    #[serde(rename = "function-result")]
    FunctionResult { result: FunctionResult },
}

impl ComponentPayload {
    /// True for payloads that skip the separator during concatenation.
    pub const fn is_separator_exempt(&self) -> bool {
        matches!(
            self,
            Self::Image { .. }
                | Self::Variable { .. }
                | Self::FunctionCall { .. }
                | Self::FunctionResult { .. }
        )
    }
}

/// One entry of a composable prompt: a payload plus its own context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptComponent {
    pub payload: ComponentPayload,
    /// Composition metadata; not persisted with the payload.
    #[serde(skip, default)]
    pub context: ContextMap,
}

impl PromptComponent {
    pub fn new(payload: ComponentPayload) -> Self {
        Self {
            payload,
            context: ContextMap::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ComponentPayload::Text { text: text.into() })
    }

    pub fn localized(resource: LocalizedText) -> Self {
        Self::new(ComponentPayload::Localized { resource })
    }

    pub fn image(source: ImageSource) -> Self {
        Self::new(ComponentPayload::Image { source })
    }

    pub fn nested(prompt: PromptValue) -> Self {
        Self::new(ComponentPayload::Nested { prompt })
    }

    pub fn variable(resolver: Arc<dyn Resolvable>) -> Self {
        Self::new(ComponentPayload::Variable {
            slot: VariableSlot::new(resolver),
        })
    }

    /// A function call component; calls are always authored by the
    /// assistant, so the role is fixed at construction.
    pub fn function_call(call: FunctionCall) -> Self {
        let mut component = Self::new(ComponentPayload::FunctionCall { call });
        component.context.set_role(Role::Assistant);
        component
    }

    /// A function result component, authored by the tool role.
    pub fn function_result(result: FunctionResult) -> Self {
        let mut component = Self::new(ComponentPayload::FunctionResult { result });
        component.context.set_role(Role::Tool);
        component
    }

    /// Attach a context, validating structural preconditions.
    pub fn with_context(mut self, context: ContextMap) -> Result<Self> {
        let merged = self.context.merge(&context)?;
        Self::validate(&self.payload, &merged)?;
        self.context = merged;
        Ok(self)
    }

    pub(crate) fn validate(payload: &ComponentPayload, context: &ContextMap) -> Result<()> {
        let selection = context.role_constraint().selection();
        match payload {
            ComponentPayload::FunctionCall { .. } if selection != Some(Role::Assistant) => {
                Err(PromptError::illegal(
                    "a function call must be authored by the assistant role",
                ))
            }
            ComponentPayload::FunctionResult { .. } if selection != Some(Role::Tool) => {
                Err(PromptError::illegal(
                    "a function result must be authored by the tool role",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Best-effort synchronous emptiness; unresolvable content counts as
    /// non-empty rather than propagating a failure.
    pub fn is_effectively_empty(&self) -> bool {
        match &self.payload {
            ComponentPayload::Text { text } => text.is_empty(),
            ComponentPayload::Localized { resource } => resource.text.is_empty(),
            ComponentPayload::Image { .. } => false,
            ComponentPayload::Nested { prompt } => prompt.is_empty(),
            ComponentPayload::Variable { slot } => match slot.peek() {
                Some(value) => value.is_empty(),
                None => false,
            },
            ComponentPayload::FunctionCall { .. } | ComponentPayload::FunctionResult { .. } => {
                false
            }
        }
    }

    /// Resolve every async-resolvable payload into its synchronous form.
    pub async fn resolve(&self) -> Result<Self> {
        let payload = match &self.payload {
            ComponentPayload::Variable { slot } => ComponentPayload::Variable {
                slot: slot.resolve().await?,
            },
            ComponentPayload::Nested { prompt } => ComponentPayload::Nested {
                prompt: prompt.resolve().await?,
            },
            other => other.clone(),
        };
        Ok(Self {
            payload,
            context: self.context.clone(),
        })
    }
}

impl From<&str> for PromptComponent {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for PromptComponent {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}
