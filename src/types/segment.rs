//! Degeneration: flattening a composed prompt into canonical segments.
//!
//! Degeneration resolves nested and lazy components, pushes parent context
//! down onto children, and collapses the component tree into a linear
//! sequence of exactly four segment kinds. The segment list is what the
//! prompt-to-message converter consumes.

use serde::{Deserialize, Serialize};

use crate::error::{PromptError, Result};
use crate::types::component::{ComponentPayload, PromptComponent, VariableSlot};
use crate::types::context::ContextMap;
use crate::types::media::ImageSource;
use crate::types::prompt::PromptValue;
use crate::types::tools::{FunctionCall, FunctionResult};

/// The four canonical flattened payload kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SegmentPayload {
    Text { text: String },
    Image { source: ImageSource },
    #[serde(rename = "function-call")]
    FunctionCall { call: FunctionCall },
    #[serde(rename = "function-result")]
    FunctionResult { result: FunctionResult },
}

/// One flattened prompt segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub payload: SegmentPayload,
    #[serde(skip, default)]
    pub context: ContextMap,
    /// Provenance: the segment was expanded from a resolved dynamic
    /// variable. Read by chat-role fallback inference.
    #[serde(skip, default)]
    pub from_variable: bool,
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
            && self.context == other.context
            && self.from_variable == other.from_variable
    }
}

impl Segment {
    pub fn text(text: impl Into<String>, context: ContextMap) -> Self {
        Self {
            payload: SegmentPayload::Text { text: text.into() },
            context,
            from_variable: false,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.payload, SegmentPayload::Text { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            SegmentPayload::Text { text } => Some(text),
            _ => None,
        }
    }

    /// True for empty or all-whitespace text segments.
    pub fn is_whitespace(&self) -> bool {
        self.as_text()
            .is_some_and(|text| text.chars().all(char::is_whitespace))
    }

    /// Rebuild a prompt component carrying this segment's payload and
    /// context, e.g. to re-wrap a degenerated sequence as a prompt value.
    ///
    /// Variable provenance survives the round trip: such segments re-wrap
    /// as an already-resolved variable slot, so re-degenerating yields the
    /// same segments back.
    pub fn into_component(self) -> PromptComponent {
        let payload = match self.payload {
            SegmentPayload::Text { text } => ComponentPayload::Text { text },
            SegmentPayload::Image { source } => ComponentPayload::Image { source },
            SegmentPayload::FunctionCall { call } => ComponentPayload::FunctionCall { call },
            SegmentPayload::FunctionResult { result } => {
                ComponentPayload::FunctionResult { result }
            }
        };
        let payload = if self.from_variable {
            ComponentPayload::Variable {
                slot: VariableSlot::from_value(PromptValue::from(PromptComponent::new(payload))),
            }
        } else {
            payload
        };
        PromptComponent {
            payload,
            context: self.context,
        }
    }
}

impl PromptValue {
    /// Flatten this value into the canonical four-kind segment sequence.
    ///
    /// Nested composables and resolved variables expand recursively with the
    /// parent context pushed down; adjacent text segments with equal
    /// contexts merge; a still-unresolved variable is a hard failure, never
    /// a silently-dropped segment.
    pub fn degenerate(&self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        walk(
            self.components(),
            &ContextMap::new(),
            false,
            &mut segments,
        )?;
        Ok(segments)
    }
}

fn walk(
    components: &[PromptComponent],
    parent: &ContextMap,
    from_variable: bool,
    out: &mut Vec<Segment>,
) -> Result<()> {
    for component in components {
        // Parent context merged with the child's own; conflict is fatal.
        let context = parent.merge(&component.context)?;
        match &component.payload {
            ComponentPayload::Text { text } => {
                push_segment(
                    out,
                    Segment {
                        payload: SegmentPayload::Text { text: text.clone() },
                        context,
                        from_variable,
                    },
                )?;
            }
            ComponentPayload::Localized { resource } => {
                push_segment(
                    out,
                    Segment {
                        payload: SegmentPayload::Text {
                            text: resource.text.clone(),
                        },
                        context,
                        from_variable,
                    },
                )?;
            }
            ComponentPayload::Image { source } => {
                push_segment(
                    out,
                    Segment {
                        payload: SegmentPayload::Image {
                            source: source.clone(),
                        },
                        context,
                        from_variable,
                    },
                )?;
            }
            ComponentPayload::Nested { prompt } => {
                walk(prompt.components(), &context, from_variable, out)?;
            }
            ComponentPayload::Variable { slot } => match slot.peek() {
                Some(resolved) => {
                    walk(resolved.components(), &context, true, out)?;
                }
                None => {
                    return Err(PromptError::UnresolvedVariable {
                        name: slot.name().to_string(),
                    });
                }
            },
            ComponentPayload::FunctionCall { call } => {
                push_segment(
                    out,
                    Segment {
                        payload: SegmentPayload::FunctionCall { call: call.clone() },
                        context,
                        from_variable,
                    },
                )?;
            }
            ComponentPayload::FunctionResult { result } => {
                push_segment(
                    out,
                    Segment {
                        payload: SegmentPayload::FunctionResult {
                            result: result.clone(),
                        },
                        context,
                        from_variable,
                    },
                )?;
            }
        }
    }
    Ok(())
}

fn push_segment(out: &mut Vec<Segment>, segment: Segment) -> Result<()> {
    if let Some(last) = out.last_mut()
        && last.context == segment.context
    {
        match (&mut last.payload, &segment.payload) {
            // Provenance must match too: text expanded from a resolved
            // variable stays a distinct segment for role inference.
            (SegmentPayload::Text { text: existing }, SegmentPayload::Text { text: incoming })
                if last.from_variable == segment.from_variable =>
            {
                tracing::debug!(len = incoming.len(), "merging adjacent text segments");
                existing.push_str(incoming);
                return Ok(());
            }
            (SegmentPayload::FunctionCall { .. }, SegmentPayload::FunctionCall { .. }) => {
                return Err(PromptError::DuplicateFunctionCall("call"));
            }
            (SegmentPayload::FunctionResult { .. }, SegmentPayload::FunctionResult { .. }) => {
                return Err(PromptError::DuplicateFunctionCall("result"));
            }
            _ => {}
        }
    }
    out.push(segment);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::component::Resolvable;
    use crate::types::role::Role;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Unresolvable;

    #[async_trait]
    impl Resolvable for Unresolvable {
        fn name(&self) -> &str {
            "weather"
        }

        async fn resolve(&self) -> Result<PromptValue> {
            Ok(PromptValue::new())
        }
    }

    #[derive(Debug)]
    struct Immediate(&'static str);

    #[async_trait]
    impl Resolvable for Immediate {
        fn name(&self) -> &str {
            "immediate"
        }

        fn peek(&self) -> Option<PromptValue> {
            Some(PromptValue::from(self.0))
        }

        async fn resolve(&self) -> Result<PromptValue> {
            Ok(PromptValue::from(self.0))
        }
    }

    #[test]
    fn same_role_text_merges_into_one_segment() {
        let prompt = PromptValue::user("Hello ") + PromptValue::user("world");
        let segments = prompt.degenerate().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].as_text(), Some("Hello world"));
    }

    #[test]
    fn different_role_text_stays_separate() {
        let prompt = PromptValue::system("a") + PromptValue::user("b");
        let segments = prompt.degenerate().unwrap();
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn nested_prompts_inherit_the_parent_context() {
        let inner = PromptValue::text("inner");
        let mut outer = PromptValue::from(PromptComponent::nested(inner));
        outer
            .merge_context(&ContextMap::new().with_role(Role::User))
            .unwrap();

        let segments = outer.degenerate().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(
            segments[0].context.role_constraint().selection(),
            Some(Role::User)
        );
    }

    #[test]
    fn nested_context_conflict_is_fatal() {
        let inner = PromptValue::system("inner");
        let mut outer = PromptValue::from(PromptComponent::nested(inner));
        outer
            .merge_context(&ContextMap::new().with_role(Role::User))
            .unwrap();
        assert!(outer.degenerate().is_err());
    }

    #[test]
    fn unresolved_variable_fails_with_its_name() {
        let prompt = PromptValue::variable(Arc::new(Unresolvable));
        let err = prompt.degenerate().unwrap_err();
        let PromptError::UnresolvedVariable { name } = err else {
            panic!("expected an unresolved-variable failure");
        };
        assert_eq!(name, "weather");
    }

    #[test]
    fn sync_resolvable_variable_expands_and_marks_provenance() {
        let prompt = PromptValue::variable(Arc::new(Immediate("now")));
        let segments = prompt.degenerate().unwrap();
        assert_eq!(segments.len(), 1);
        assert!(segments[0].from_variable);
        assert_eq!(segments[0].as_text(), Some("now"));
    }

    #[test]
    fn adjacent_function_calls_with_equal_context_are_illegal() {
        let call = FunctionCall::new("search", serde_json::json!({}));
        let prompt =
            PromptValue::function_call(call.clone()) + PromptValue::function_call(call);
        assert!(matches!(
            prompt.degenerate(),
            Err(PromptError::DuplicateFunctionCall("call"))
        ));
    }

    #[test]
    fn idempotence_holds_for_variable_text_next_to_plain_text() {
        let prompt = PromptValue::text("a") + PromptValue::variable(Arc::new(Immediate("b")));
        let first = prompt.degenerate().unwrap();
        // Provenance blocks the text merge; the boundary must survive
        // re-wrapping and re-degeneration.
        assert_eq!(first.len(), 2);
        assert!(!first[0].from_variable);
        assert!(first[1].from_variable);

        let rewrapped: PromptValue = first
            .iter()
            .cloned()
            .map(Segment::into_component)
            .collect();
        let second = rewrapped.degenerate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn degeneration_is_idempotent() {
        let prompt = PromptValue::system("You are helpful.")
            + PromptValue::user("Hi ")
            + PromptValue::user("there");
        let first = prompt.degenerate().unwrap();
        let rewrapped: PromptValue = first
            .iter()
            .cloned()
            .map(Segment::into_component)
            .collect();
        let second = rewrapped.degenerate().unwrap();
        assert_eq!(first, second);
    }
}
