//! Conversation context
//!
//! The rolling, role-tagged message history handed to the LLM adapter each
//! turn. Eliding under a token budget never removes the system message and
//! never splits a tool-call from its matching tool-result — an unresolved
//! pair is kept or dropped together.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub role: Role,
    pub text: String,
    /// Set on an `Assistant` entry that issued a tool call, and on the
    /// matching `Tool` entry that answered it. `None` elsewhere.
    pub tool_call_id: Option<String>,
}

impl Entry {
    pub fn system(text: impl Into<String>) -> Self {
        Entry { role: Role::System, text: text.into(), tool_call_id: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Entry { role: Role::User, text: text.into(), tool_call_id: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Entry { role: Role::Assistant, text: text.into(), tool_call_id: None }
    }

    pub fn assistant_tool_call(text: impl Into<String>, call_id: impl Into<String>) -> Self {
        Entry { role: Role::Assistant, text: text.into(), tool_call_id: Some(call_id.into()) }
    }

    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Entry { role: Role::Tool, text: text.into(), tool_call_id: Some(call_id.into()) }
    }

    /// Rough token estimate; good enough for budget-based eliding without
    /// depending on a specific tokenizer.
    fn approx_tokens(&self) -> usize {
        (self.text.len() / 4).max(1)
    }
}

/// Ordered conversation history for one session. `system` is kept outside
/// the elidable `turns` list so it can never be dropped.
#[derive(Debug, Clone)]
pub struct Context {
    system: Option<Entry>,
    turns: Vec<Entry>,
    token_budget: usize,
}

impl Context {
    pub fn new(token_budget: usize) -> Self {
        Self { system: None, turns: Vec::new(), token_budget }
    }

    pub fn set_system(&mut self, text: impl Into<String>) {
        self.system = Some(Entry::system(text));
    }

    pub fn push(&mut self, entry: Entry) {
        self.turns.push(entry);
        self.elide();
    }

    /// Entries in prompt order: system first (if set), then history.
    pub fn entries(&self) -> Vec<&Entry> {
        self.system.iter().chain(self.turns.iter()).collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drops the oldest whole "unit" — a single non-tool entry, or an
    /// assistant/tool tool-call pair kept together — until the remaining
    /// history fits the token budget.
    fn elide(&mut self) {
        loop {
            let system_tokens = self.system.as_ref().map(Entry::approx_tokens).unwrap_or(0);
            let turns_tokens: usize = self.turns.iter().map(Entry::approx_tokens).sum();
            if system_tokens + turns_tokens <= self.token_budget || self.turns.is_empty() {
                return;
            }
            self.drop_oldest_unit();
        }
    }

    fn drop_oldest_unit(&mut self) {
        if self.turns.is_empty() {
            return;
        }
        let head = self.turns.remove(0);
        if head.role == Role::Assistant && head.tool_call_id.is_some() {
            if let Some(pos) = self.turns.iter().position(|e| {
                e.role == Role::Tool && e.tool_call_id == head.tool_call_id
            }) {
                self.turns.remove(pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_message_survives_aggressive_eliding() {
        let mut ctx = Context::new(20);
        ctx.set_system("you are a helpful robot assistant with a long preamble");
        for i in 0..20 {
            ctx.push(Entry::user(format!("message number {i} with some padding text")));
        }
        let entries = ctx.entries();
        assert_eq!(entries[0].role, Role::System);
    }

    #[test]
    fn tool_call_and_result_are_dropped_together() {
        let mut ctx = Context::new(1000);
        ctx.push(Entry::assistant_tool_call("let me check", "call-1"));
        ctx.push(Entry::tool_result("call-1", "42"));
        ctx.push(Entry::user("thanks"));
        // Force eliding by shrinking the budget directly.
        ctx.token_budget = 2;
        ctx.elide();
        let remaining = ctx.entries();
        let has_call = remaining.iter().any(|e| e.tool_call_id.as_deref() == Some("call-1") && e.role == Role::Assistant);
        let has_result = remaining.iter().any(|e| e.tool_call_id.as_deref() == Some("call-1") && e.role == Role::Tool);
        assert_eq!(has_call, has_result);
    }

    #[test]
    fn push_respects_budget_over_many_turns() {
        let mut ctx = Context::new(50);
        for i in 0..50 {
            ctx.push(Entry::user(format!("turn {i}")));
        }
        let total: usize = ctx.entries().iter().map(|e| e.approx_tokens()).sum();
        assert!(total <= 50);
    }
}
