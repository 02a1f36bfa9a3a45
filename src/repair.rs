//! History repair before resubmission to the model.
//!
//! Model APIs reject a request whose history contains a tool call without its
//! result, or a result without its call. [`repair`] removes both: an assistant
//! message keeps its tool calls only when the message right after it is a tool
//! message covering every one of its call ids. Unpaired exchanges are lost;
//! [`repair_with_report`] counts what was dropped so callers can surface it.
//!
//! Consecutive tool messages are treated as one tool message, since the
//! reducer records one result per message while the model expects all results
//! of a turn together.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{Content, Message, Part, Role};

/// What a repair pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub dropped_tool_calls: usize,
    pub dropped_tool_results: usize,
    pub dropped_messages: usize,
}

impl RepairReport {
    /// Whether the pass removed anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl std::ops::AddAssign for RepairReport {
    fn add_assign(&mut self, other: Self) {
        self.dropped_tool_calls += other.dropped_tool_calls;
        self.dropped_tool_results += other.dropped_tool_results;
        self.dropped_messages += other.dropped_messages;
    }
}

/// Repair `history` so that every tool call is immediately followed by its result.
pub fn repair(history: &[Message]) -> Vec<Message> {
    repair_with_report(history).0
}

/// Repair `history` and report what was dropped.
pub fn repair_with_report(history: &[Message]) -> (Vec<Message>, RepairReport) {
    let grouped = group_tool_messages(history);
    let mut report = RepairReport::default();
    let mut out: Vec<Message> = Vec::with_capacity(grouped.len());

    let mut i = 0usize;
    while i < grouped.len() {
        let msg = &grouped[i];
        match msg.role {
            Role::User | Role::System => {
                out.push(msg.clone());
                i += 1;
            }
            Role::Tool => {
                // Reached only when no valid call message consumed it.
                report.dropped_tool_results += msg.tool_results().len();
                report.dropped_messages += 1;
                i += 1;
            }
            Role::Assistant => {
                let call_ids: HashSet<&str> = msg
                    .tool_calls()
                    .iter()
                    .map(|call| call.tool_call_id.as_str())
                    .collect();
                if call_ids.is_empty() {
                    out.push(msg.clone());
                    i += 1;
                    continue;
                }

                let paired = grouped
                    .get(i + 1)
                    .filter(|next| next.role == Role::Tool)
                    .filter(|next| covers(next, &call_ids));

                match paired {
                    Some(results) => {
                        let (results, extra) = keep_results_for(results, &call_ids);
                        report.dropped_tool_results += extra;
                        out.push(msg.clone());
                        out.push(results);
                        i += 2;
                    }
                    None => {
                        report.dropped_tool_calls += call_ids.len();
                        match strip_tool_calls(msg) {
                            Some(stripped) => out.push(stripped),
                            None => report.dropped_messages += 1,
                        }
                        i += 1;
                    }
                }
            }
        }
    }

    if !report.is_empty() {
        tracing::warn!(
            dropped_tool_calls = report.dropped_tool_calls,
            dropped_tool_results = report.dropped_tool_results,
            dropped_messages = report.dropped_messages,
            "repaired tool call pairing in history"
        );
    }

    (out, report)
}

fn covers(tool_message: &Message, call_ids: &HashSet<&str>) -> bool {
    let result_ids: HashSet<&str> = tool_message
        .tool_results()
        .iter()
        .map(|result| result.tool_call_id.as_str())
        .collect();
    call_ids.iter().all(|id| result_ids.contains(id))
}

/// Merge runs of consecutive tool messages into the first of the run.
fn group_tool_messages(history: &[Message]) -> Vec<Message> {
    let mut grouped: Vec<Message> = Vec::with_capacity(history.len());
    for message in history {
        match grouped.last_mut() {
            Some(previous) if previous.role == Role::Tool && message.role == Role::Tool => {
                for part in message.content.parts() {
                    previous.content.push_part(part.clone());
                }
            }
            _ => grouped.push(message.clone()),
        }
    }
    grouped
}

/// Keep only the first result for each call id. Returns the count dropped.
fn keep_results_for(tool_message: &Message, call_ids: &HashSet<&str>) -> (Message, usize) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    for part in tool_message.content.parts() {
        match part {
            Part::ToolResult(result)
                if call_ids.contains(result.tool_call_id.as_str())
                    && seen.insert(result.tool_call_id.as_str()) =>
            {
                kept.push(part.clone());
            }
            Part::ToolResult(_) => dropped += 1,
            // Tool messages carry results only.
            Part::Text { .. } | Part::ToolCall(_) => dropped += 1,
        }
    }
    let mut next = tool_message.clone();
    next.content = Content::Parts(kept);
    (next, dropped)
}

/// Remove tool calls from an assistant message, keeping its text.
fn strip_tool_calls(message: &Message) -> Option<Message> {
    let parts: Vec<Part> = message
        .content
        .parts()
        .iter()
        .filter(|part| !matches!(part, Part::ToolCall(_)))
        .filter(|part| !matches!(part, Part::Text { text } if text.is_empty()))
        .cloned()
        .collect();
    if parts.is_empty() {
        return None;
    }
    let mut next = message.clone();
    next.content = Content::Parts(parts);
    Some(next)
}
