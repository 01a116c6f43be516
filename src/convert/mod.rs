//! Prompt-to-message conversion.
//!
//! Consumes a degenerated segment sequence plus an optional completion-kind
//! override and produces either a single text prompt or an ordered list of
//! role-tagged chat messages.

use crate::error::{PromptError, Result};
use crate::types::completion::{ChatPrompt, Prompt, TextPrompt};
use crate::types::message::Message;
use crate::types::prompt::PromptValue;
use crate::types::role::{CompletionKind, Role};
use crate::types::segment::Segment;

impl PromptValue {
    /// Convert this composed value into a concrete request shape.
    ///
    /// The kind is taken from `kind`, else from a `CompletionKindKey`
    /// carried in component contexts, else inferred from the role
    /// constraints the components declare. Ambiguity is a hard failure.
    pub fn to_prompt(&self, kind: Option<CompletionKind>) -> Result<Prompt> {
        let segments = self.degenerate()?;
        let kind = match kind {
            Some(kind) => kind,
            None => match context_override(&segments)? {
                Some(kind) => kind,
                None => infer_kind(&segments)?,
            },
        };
        match kind {
            CompletionKind::Text => to_text_prompt(self, &segments).map(Prompt::Text),
            CompletionKind::Chat => to_chat_prompt(&segments).map(Prompt::Chat),
        }
    }

    /// Shorthand for a chat conversion.
    pub fn to_chat_prompt(&self) -> Result<ChatPrompt> {
        match self.to_prompt(Some(CompletionKind::Chat))? {
            Prompt::Chat(prompt) => Ok(prompt),
            Prompt::Text(_) => unreachable!("requested chat kind"),
        }
    }

    /// Shorthand for a text conversion.
    pub fn to_text_prompt(&self) -> Result<TextPrompt> {
        match self.to_prompt(Some(CompletionKind::Text))? {
            Prompt::Text(prompt) => Ok(prompt),
            Prompt::Chat(_) => unreachable!("requested text kind"),
        }
    }
}

/// An explicit `CompletionKindKey` carried in the composition, when the
/// carrying components agree.
fn context_override(segments: &[Segment]) -> Result<Option<CompletionKind>> {
    let mut found: Option<CompletionKind> = None;
    for segment in segments {
        if let Some(kind) = segment.context.completion_kind() {
            match found {
                None => found = Some(kind),
                Some(existing) if existing != kind => {
                    return Err(PromptError::AmbiguousCompletionKind);
                }
                Some(_) => {}
            }
        }
    }
    Ok(found)
}

/// Intersect the completion families reachable from every role-declaring
/// component; the intersection must be a single kind.
fn infer_kind(segments: &[Segment]) -> Result<CompletionKind> {
    let mut candidates = vec![CompletionKind::Text, CompletionKind::Chat];
    let mut declared = false;
    for segment in segments {
        let constraint = segment.context.role_constraint();
        if constraint.is_unconstrained() {
            continue;
        }
        declared = true;
        let kinds = constraint.completion_kinds();
        candidates.retain(|kind| kinds.contains(kind));
    }
    if !declared || candidates.len() != 1 {
        return Err(PromptError::AmbiguousCompletionKind);
    }
    Ok(candidates[0])
}

/// Text kind: every segment must resolve its role to the text family or be
/// pure whitespace. The body stays a composable value; degeneration is only
/// used here for role validation.
fn to_text_prompt(value: &PromptValue, segments: &[Segment]) -> Result<TextPrompt> {
    for segment in segments {
        if segment.is_whitespace() {
            continue;
        }
        segment
            .context
            .role_constraint()
            .resolve(CompletionKind::Text)?;
    }
    Ok(TextPrompt::new(value.clone()))
}

/// Chat kind: group consecutive same-role segments into messages.
fn to_chat_prompt(segments: &[Segment]) -> Result<ChatPrompt> {
    let sequence_has_roles = segments
        .iter()
        .any(|segment| resolved_role(segment).is_some());

    let mut messages: Vec<Message> = Vec::new();
    // Role-less whitespace seen before the first message lands in the
    // message that follows it.
    let mut pending: Vec<Segment> = Vec::new();

    for segment in segments {
        let role = match resolved_role(segment) {
            Some(role) => role,
            None if !sequence_has_roles => {
                // Whole sequence is role-less: resolved dynamic-variable
                // content reads as the assistant's, anything else as the
                // user's. Inferred from observed provider semantics; revisit.
                if segment.from_variable {
                    Role::Assistant
                } else {
                    Role::User
                }
            }
            None => {
                if !segment.is_whitespace() {
                    return Err(PromptError::RoleMissing);
                }
                match messages.last() {
                    Some(current) => current.role,
                    None => {
                        pending.push(segment.clone());
                        continue;
                    }
                }
            }
        };

        match messages.last_mut() {
            Some(current) if current.role == role => {
                current.content.push(segment.clone().into_component());
            }
            _ => {
                let mut content = PromptValue::new();
                for held in pending.drain(..) {
                    content.push(held.into_component());
                }
                content.push(segment.clone().into_component());
                messages.push(Message::new(role, content));
            }
        }
    }

    if !pending.is_empty() {
        // Nothing but role-less whitespace and no message to attach it to.
        return Err(PromptError::RoleMissing);
    }

    // Defensive re-join: independent paths above can still produce adjacent
    // messages with equal roles.
    let mut prompt = ChatPrompt::default();
    for message in messages {
        prompt.fold_in(message)?;
    }
    Ok(prompt)
}

/// The segment's role, when its constraint pins down exactly one chat role.
fn resolved_role(segment: &Segment) -> Option<Role> {
    let constraint = segment.context.role_constraint();
    if constraint.is_unconstrained() {
        return None;
    }
    constraint.resolve(CompletionKind::Chat).ok()
}
