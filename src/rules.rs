//! Reflection Rules
//!
//! The persisted ruleset and the helpers generators use to read it.
//!
//! Rules are stored as `{"ruleset": ["rule", ...]}`. Older records hold a
//! single free-text rules prompt under `{"prompt": "..."}`; those are split
//! into one rule per line when read, and rewritten in list form on the next
//! save.

use crate::store::{RuleStore, StoreLocation};
use crate::types::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Rendering of an empty ruleset
pub const NO_RULES_SENTINEL: &str = "No prompt rules have been created yet.";
pub const RULESET_FIELD: &str = "ruleset";
pub const PROMPT_FIELD: &str = "prompt";

pub const REFLECTIONS_PROMPT: &str = "You have also been provided with a handful of reflections based on previous requests the user has made. Be sure to follow these rules when writing this new post so the user does not need to repeat their requests:
<reflections>
{reflections}
</reflections>";

pub const THREAD_REFLECTIONS_PROMPT: &str = "<reflections-context>
You have also been provided with a list of reflections generated from previous requests the user has made to change the posts in the thread.
Use these when writing or updating the thread posts to ensure the user's requests are met.
</reflections-context>

<reflection-items>
{reflections}
</reflection-items>";

/// Ordered list of writing rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<String>,
}

impl RuleSet {
    /// Build from raw rules; entries are trimmed and blanks dropped
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rules: rules
                .into_iter()
                .map(Into::into)
                .map(|rule| rule.trim().to_string())
                .filter(|rule| !rule.is_empty())
                .collect(),
        }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }

    pub fn into_rules(self) -> Vec<String> {
        self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a free-text rules prompt, one rule per non-empty line.
    /// List markers (`-`, `*`, `•`, `1.`, `1)`) are stripped.
    pub fn from_prompt_text(text: &str) -> Self {
        if text.trim() == NO_RULES_SENTINEL {
            return Self::default();
        }
        Self::new(text.lines().map(strip_list_marker))
    }

    /// Normalize any stored shape into a ruleset
    pub fn from_value(value: &Value) -> Self {
        if let Some(rules) = value.get(RULESET_FIELD).and_then(Value::as_array) {
            return Self::new(rules.iter().filter_map(Value::as_str));
        }
        if let Some(prompt) = value.get(PROMPT_FIELD).and_then(Value::as_str) {
            return Self::from_prompt_text(prompt);
        }
        // bare forms written by hand
        match value {
            Value::Array(rules) => Self::new(rules.iter().filter_map(Value::as_str)),
            Value::String(prompt) => Self::from_prompt_text(prompt),
            _ => Self::default(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "ruleset": self.rules })
    }

    /// Bullet list of the rules, or the sentinel when there are none
    pub fn to_prompt_text(&self) -> String {
        if self.rules.is_empty() {
            return NO_RULES_SENTINEL.to_string();
        }
        self.rules
            .iter()
            .map(|rule| format!("- {}", rule))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();
    for marker in ["- ", "* ", "• "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return rest.trim();
        }
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim();
        }
    }
    line
}

/// Read the ruleset at `location`; an absent record is the empty ruleset
pub async fn load_rules(store: &dyn RuleStore, location: &StoreLocation) -> AppResult<RuleSet> {
    let rules = match store.get(location).await? {
        Some(item) => RuleSet::from_value(&item.value),
        None => RuleSet::default(),
    };
    debug!(%location, rule_count = rules.len(), "Loaded reflection rules");
    Ok(rules)
}

/// Overwrite the ruleset at `location`
pub async fn save_rules(
    store: &dyn RuleStore,
    location: &StoreLocation,
    rules: &RuleSet,
) -> AppResult<()> {
    store.put(location, rules.to_value()).await?;
    debug!(%location, rule_count = rules.len(), "Saved reflection rules");
    Ok(())
}

/// The `<reflections>` block a post generator adds to its prompt
pub fn render_reflections_prompt(rules: &RuleSet) -> String {
    REFLECTIONS_PROMPT.replace("{reflections}", &rules.to_prompt_text())
}

/// Thread variant; `None` when there is nothing to tell the generator
pub fn render_thread_reflections_prompt(rules: &RuleSet) -> Option<String> {
    if rules.is_empty() {
        return None;
    }
    Some(THREAD_REFLECTIONS_PROMPT.replace("{reflections}", &rules.to_prompt_text()))
}
