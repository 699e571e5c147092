//! Delta accumulation and consolidation.
//!
//! Providers stream a model turn as a series of partial [`Message`]s.  The
//! accumulator folds each delta into the turn built so far, merging tool-call
//! fragments by `call_id`, and [`consolidate`] collapses the repeated text
//! and thinking fragments once the stream is over.
//!
//! ```text
//! delta 1: [Text("Hel"), Call{id: c1, name: "search", args: {}}]
//! delta 2: [Text("lo"),  Call{id: c1, name: "",       args: {q: "rust"}}]
//!
//! accumulated:  [Text("Hel"), Call{c1, search, {q: rust}}, Text("lo")]
//! consolidated: [Text("Hello"), Call{c1, search, {q: rust}}]
//! ```

use crate::message::{Message, Part, ToolCall, ToolPart};

/// Strategy for folding streamed deltas into one message.
///
/// The default methods implement the stock merge rules.  Provider
/// integrations whose fragments need different treatment (e.g. index-keyed
/// tool calls) can override either step.
pub trait MessageAccumulator: Send + Sync {
    /// Fold `delta` into `current`, returning the new accumulated message.
    fn accumulate(&self, current: &Message, delta: &Message) -> Message {
        accumulate(current, delta)
    }

    /// Collapse an accumulated message into its canonical form.
    fn consolidate(&self, message: &Message) -> Message {
        consolidate(message)
    }
}

/// The stock accumulator used by the orchestrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageAccumulator;

impl MessageAccumulator for DefaultMessageAccumulator {}

/// Fold one streamed delta into the message accumulated so far.
///
/// - The first fragment (empty `current`) is returned unchanged.
/// - A tool call whose non-empty `call_id` matches an earlier call replaces
///   that call in place.  The delta's name and arguments win when present,
///   otherwise the earlier values are kept.
/// - Every other part, including calls without an id, is appended.
/// - Metadata is merged key by key, the delta's values winning.
pub fn accumulate(current: &Message, delta: &Message) -> Message {
    if current.parts.is_empty() {
        return delta.clone();
    }

    let mut parts = current.parts.clone();
    for part in &delta.parts {
        match part {
            Part::Tool(ToolPart::Call(fragment)) => merge_call(&mut parts, fragment),
            Part::Text(_)
            | Part::Thinking(_)
            | Part::Data { .. }
            | Part::Link { .. }
            | Part::Tool(ToolPart::Result(_)) => parts.push(part.clone()),
        }
    }

    let mut metadata = current.metadata.clone();
    for (key, value) in &delta.metadata {
        metadata.insert(key.clone(), value.clone());
    }

    Message {
        role: current.role,
        parts,
        metadata,
    }
}

/// Merge a tool-call fragment into `parts`, or append it when it has no
/// mergeable identity.
fn merge_call(parts: &mut Vec<Part>, fragment: &ToolCall) {
    if fragment.call_id.is_empty() {
        tracing::debug!(
            tool = %fragment.tool_name,
            "tool call fragment without call id, appending as new part"
        );
        parts.push(Part::call(fragment.clone()));
        return;
    }

    let existing = parts.iter_mut().find_map(|p| match p {
        Part::Tool(ToolPart::Call(call)) if call.call_id == fragment.call_id => Some(call),
        _ => None,
    });

    match existing {
        Some(call) => {
            if !fragment.tool_name.is_empty() {
                call.tool_name.clone_from(&fragment.tool_name);
            }
            if !fragment.arguments.is_empty() {
                call.arguments.clone_from(&fragment.arguments);
            }
        }
        None => parts.push(Part::call(fragment.clone())),
    }
}

/// Collapse repeated text and thinking fragments.
///
/// All text parts are joined into a single text part and all thinking parts
/// into a single thinking part (each omitted when empty).  The output order
/// is text, thinking, then every other part in its original relative order.
/// Applying this twice gives the same message as applying it once.
pub fn consolidate(message: &Message) -> Message {
    let mut text = String::new();
    let mut thinking = String::new();
    let mut others = Vec::new();

    for part in &message.parts {
        match part {
            Part::Text(t) => text.push_str(t),
            Part::Thinking(t) => thinking.push_str(t),
            Part::Data { .. } | Part::Link { .. } | Part::Tool(_) => others.push(part.clone()),
        }
    }

    let mut parts = Vec::with_capacity(others.len() + 2);
    if !text.is_empty() {
        parts.push(Part::Text(text));
    }
    if !thinking.is_empty() {
        parts.push(Part::Thinking(thinking));
    }
    parts.extend(others);

    Message {
        role: message.role,
        parts,
        metadata: message.metadata.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
