//! Messages and the partial/whole coalescing law.
//!
//! A [`Message`] is a finished authored turn. A [`MessagePartial`] is a
//! not-yet-complete message as delivered by a streaming provider; partials
//! coalesce deterministically under the identity/role/order invariants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PromptError, Result};
use crate::types::component::ComponentPayload;
use crate::types::prompt::PromptValue;
use crate::types::role::Role;

/// A single authored turn of a conversation.
///
/// The identity is stable once assigned. Content is mutated only through
/// [`Message::append`], which requires equal roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub role: Role,
    pub content: PromptValue,
}

impl Message {
    pub fn new(role: Role, content: impl Into<PromptValue>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, PromptValue::text(content))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, PromptValue::text(content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, PromptValue::text(content))
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Merge another message's content into this one.
    ///
    /// The single sanctioned mutation: roles must be equal, content is
    /// appended with the usual structural-join rules.
    pub fn append(&mut self, other: Message) -> Result<()> {
        if self.role != other.role {
            return Err(PromptError::RoleMismatch {
                left: self.role,
                right: other.role,
            });
        }
        self.content.append(other.content);
        Ok(())
    }

    /// Best-effort flattening of the text components, for display and tests.
    ///
    /// Recurses into nested prompts and resolved variables; unresolved
    /// variables and non-text payloads contribute nothing.
    pub fn text_lossy(&self) -> String {
        fn collect(value: &PromptValue, out: &mut String) {
            for component in value.components() {
                match &component.payload {
                    ComponentPayload::Text { text } => out.push_str(text),
                    ComponentPayload::Localized { resource } => out.push_str(&resource.text),
                    ComponentPayload::Nested { prompt } => collect(prompt, out),
                    ComponentPayload::Variable { slot } => {
                        if let Some(resolved) = slot.peek() {
                            collect(&resolved, out);
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut out = String::new();
        collect(&self.content, &mut out);
        out
    }
}

/// Whether a partial is an incremental delta or a complete snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialKind {
    #[default]
    Delta,
    Whole,
}

/// An in-progress, possibly incomplete message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePartial {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<PromptValue>,
    /// Source delivery index, used to detect out-of-order deltas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
    pub kind: PartialKind,
}

impl MessagePartial {
    /// An incremental delta carrying content.
    pub fn delta(content: impl Into<PromptValue>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// A complete snapshot of a message.
    pub fn whole(message: Message) -> Self {
        Self {
            id: message.id,
            role: Some(message.role),
            content: Some(message.content),
            index: None,
            kind: PartialKind::Whole,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub const fn is_whole(&self) -> bool {
        matches!(self.kind, PartialKind::Whole)
    }

    /// Coalesce `other` into `self`, producing the running "whole" value.
    ///
    /// The law, in order:
    /// 1. both identities present must be equal;
    /// 2. both roles present must be equal;
    /// 3. both indices present must be strictly increasing;
    /// 4. a later whole replaces an earlier whole verbatim; a delta extends
    ///    a whole by content concatenation;
    /// 5. missing content counts as the canonical empty value;
    /// 6. the merged partial keeps the first non-nil identity and role and
    ///    clears the index, which is no longer meaningful.
    pub fn coalesce(self, other: MessagePartial) -> Result<MessagePartial> {
        if let (Some(left), Some(right)) = (self.id, other.id)
            && left != right
        {
            return Err(PromptError::IdentityMismatch {
                left: left.to_string(),
                right: right.to_string(),
            });
        }
        if let (Some(left), Some(right)) = (self.role, other.role)
            && left != right
        {
            return Err(PromptError::RoleMismatch { left, right });
        }
        if let (Some(previous), Some(next)) = (self.index, other.index)
            && previous >= next
        {
            return Err(PromptError::NonMonotonicIndex { previous, next });
        }

        // Last whole wins, wholesale.
        if self.is_whole() && other.is_whole() {
            return Ok(other);
        }

        let kind = if self.is_whole() || other.is_whole() {
            PartialKind::Whole
        } else {
            PartialKind::Delta
        };
        let mut content = self.content.unwrap_or_default();
        content.append(other.content.unwrap_or_default());

        Ok(MessagePartial {
            id: self.id.or(other.id),
            role: self.role.or(other.role),
            content: Some(content),
            index: None,
            kind,
        })
    }

    /// In-place variant of [`MessagePartial::coalesce`].
    pub fn coalesce_in_place(&mut self, other: MessagePartial) -> Result<()> {
        let merged = std::mem::take(self).coalesce(other)?;
        *self = merged;
        Ok(())
    }

    /// Finish the partial into a message; the role must be known by now.
    pub fn into_message(self) -> Result<Message> {
        let role = self.role.ok_or(PromptError::RoleMissing)?;
        Ok(Message {
            id: self.id,
            role,
            content: self.content.unwrap_or_default(),
        })
    }
}
