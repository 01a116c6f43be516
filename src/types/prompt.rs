//! The composable prompt value.
//!
//! A [`PromptValue`] is an ordered sequence of typed components, each with
//! its own context. Values concatenate, interpolate, resolve lazy content
//! asynchronously, and eventually degenerate into a flat segment list (see
//! [`crate::types::segment`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::component::{ComponentPayload, PromptComponent, Resolvable};
use crate::types::context::ContextMap;
use crate::types::media::ImageSource;
use crate::types::role::Role;
use crate::types::tools::{FunctionCall, FunctionResult};

/// An ordered, mergeable sequence of typed content components.
///
/// The empty sequence is the canonical empty value; equality is structural
/// over the component sequence.
///
/// # Examples
///
/// ```rust,ignore
/// use promptic::types::PromptValue;
///
/// let prompt = PromptValue::system("You are helpful.") + PromptValue::user("Hi");
/// let chat = prompt.to_prompt(None)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptValue {
    components: Vec<PromptComponent>,
}

impl PromptValue {
    /// The canonical empty value.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<PromptComponent>) -> Self {
        let mut value = Self::new();
        for component in components {
            value.push(component);
        }
        value
    }

    /// A single plain-text value with no role.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_components(vec![PromptComponent::text(text)])
    }

    /// A single text value authored by `role`.
    pub fn text_with_role(text: impl Into<String>, role: Role) -> Self {
        let mut component = PromptComponent::text(text);
        component.context.set_role(role);
        Self {
            components: vec![component],
        }
    }

    /// A system-authored text value.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text_with_role(text, Role::System)
    }

    /// A user-authored text value.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text_with_role(text, Role::User)
    }

    /// An assistant-authored text value.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text_with_role(text, Role::Assistant)
    }

    /// An image value authored by `role`.
    pub fn image(source: ImageSource, role: Role) -> Self {
        let mut component = PromptComponent::image(source);
        component.context.set_role(role);
        Self {
            components: vec![component],
        }
    }

    /// An assistant-authored function call.
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            components: vec![PromptComponent::function_call(call)],
        }
    }

    /// A tool-authored function invocation result.
    pub fn function_result(result: FunctionResult) -> Self {
        Self {
            components: vec![PromptComponent::function_result(result)],
        }
    }

    /// A lazily-resolved variable backed by a host capability object.
    pub fn variable(resolver: Arc<dyn Resolvable>) -> Self {
        Self {
            components: vec![PromptComponent::variable(resolver)],
        }
    }

    pub fn components(&self) -> &[PromptComponent] {
        &self.components
    }

    pub fn into_components(self) -> Vec<PromptComponent> {
        self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// True iff every component resolves (synchronously, best-effort) to
    /// empty content; content that fails to resolve counts as non-empty.
    pub fn is_empty(&self) -> bool {
        self.components
            .iter()
            .all(PromptComponent::is_effectively_empty)
    }

    /// Append one component, attempting a structural join first.
    ///
    /// Adjacent text components with equal contexts are joined into one;
    /// anything else is appended as a new component. Equality, not merge:
    /// a role-less component next to a role-carrying one must stay distinct
    /// so conversion can still reject it.
    pub fn push(&mut self, component: impl Into<PromptComponent>) {
        let component = component.into();
        if let Some(last) = self.components.last_mut()
            && let ComponentPayload::Text { text: existing } = &last.payload
            && let ComponentPayload::Text { text: incoming } = &component.payload
            && last.context == component.context
        {
            let mut joined = existing.clone();
            joined.push_str(incoming);
            last.payload = ComponentPayload::Text { text: joined };
            return;
        }
        self.components.push(component);
    }

    /// Append every component of `other`, joining at the seam when possible.
    pub fn append(&mut self, other: PromptValue) {
        for component in other.components {
            self.push(component);
        }
    }

    /// Build a value by interleaving `separator` between non-empty operands.
    ///
    /// The separator is skipped next to components that declare themselves
    /// separator-exempt (images, variables, function calls and results).
    /// `prefix`, when given, precedes the first non-empty operand.
    pub fn concatenate<I>(separator: Option<&str>, prefix: Option<&str>, values: I) -> Self
    where
        I: IntoIterator<Item = PromptValue>,
    {
        let mut result = Self::new();
        let mut previous_exempt = false;
        for value in values {
            if value.is_empty() {
                continue;
            }
            let first_exempt = value
                .components
                .first()
                .is_some_and(|c| c.payload.is_separator_exempt());
            if result.components.is_empty() {
                if let Some(prefix) = prefix {
                    result.push(PromptComponent::text(prefix));
                }
            } else if let Some(separator) = separator
                && !previous_exempt
                && !first_exempt
            {
                result.push(PromptComponent::text(separator));
            }
            previous_exempt = value
                .components
                .last()
                .is_some_and(|c| c.payload.is_separator_exempt());
            result.append(value);
        }
        result
    }

    /// Merge the given context into every component's own context.
    ///
    /// Used to push role constraints and routing metadata down onto children
    /// after the fact; a genuine conflict propagates.
    pub fn merge_context(&mut self, context: &ContextMap) -> Result<()> {
        for component in &mut self.components {
            let merged = component.context.merge(context)?;
            PromptComponent::validate(&component.payload, &merged)?;
            component.context = merged;
        }
        Ok(())
    }

    /// Builder-style [`PromptValue::merge_context`].
    pub fn with_context(mut self, context: &ContextMap) -> Result<Self> {
        self.merge_context(context)?;
        Ok(self)
    }

    /// Fix the authorship role of every component.
    pub fn with_role(self, role: Role) -> Result<Self> {
        self.with_context(&ContextMap::new().with_role(role))
    }

    /// Resolve every async-resolvable component into its synchronous form.
    ///
    /// Independent components resolve concurrently; the output order always
    /// matches the input order regardless of completion order.
    pub async fn resolve(&self) -> Result<Self> {
        let resolved =
            futures::future::try_join_all(self.components.iter().map(PromptComponent::resolve))
                .await?;
        Ok(Self {
            components: resolved,
        })
    }
}

impl From<&str> for PromptValue {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for PromptValue {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

impl From<PromptComponent> for PromptValue {
    fn from(component: PromptComponent) -> Self {
        Self {
            components: vec![component],
        }
    }
}

impl std::ops::Add for PromptValue {
    type Output = PromptValue;

    fn add(mut self, rhs: PromptValue) -> Self::Output {
        self.append(rhs);
        self
    }
}

impl std::ops::AddAssign for PromptValue {
    fn add_assign(&mut self, rhs: PromptValue) {
        self.append(rhs);
    }
}

impl FromIterator<PromptComponent> for PromptValue {
    fn from_iter<I: IntoIterator<Item = PromptComponent>>(iter: I) -> Self {
        Self::from_components(iter.into_iter().collect())
    }
}
