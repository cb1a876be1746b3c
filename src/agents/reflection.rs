//! Reflection Agent
//!
//! Turns user feedback on a generated post into updated writing rules.
//! Reads the current ruleset, asks the model to revise it, and writes the
//! result back to the same store location.
//!
//! Two update strategies are supported:
//!
//! - **Regenerate**: the model returns the complete revised ruleset in one call.
//! - **ProposeAndMerge**: the model proposes at most one new rule; when rules
//!   already exist a second call merges it into the full list.

use crate::agents::{Node, NodeContext};
use crate::config::Config;
use crate::llm::provider::{LLMProviderConfig, LLM};
use crate::models::{FeedbackSession, StateUpdate};
use crate::rules::{load_rules, save_rules, RuleSet};
use crate::store::StoreLocation;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const UPDATE_RULESET_TOOL: &str = "update_ruleset";
pub const PROPOSE_RULE_TOOL: &str = "propose_new_rule";
const UPDATED_RULESET_ARG: &str = "updatedRuleset";
const NEW_RULE_ARG: &str = "newRule";

const DEFAULT_MAX_TOKENS: u32 = 2048;

const UPDATE_INSTRUCTIONS: &str = r#"Analyze the following to determine if rules updates are needed:
1. Current rules (current_rules)
2. Generated social media post (session)
3. User feedback on the post (feedback)

If the user's feedback explicitly requests changes:
1. Create or update rules that directly address the feedback
2. Keep each rule clear, specific, and concise
3. If a new rule conflicts with an existing one, use the new rule
4. Only add rules that are explicitly mentioned in the user's feedback

Guidelines for updates:
- Do not infer or assume rules beyond what's explicitly stated
- Do not add rules based on implicit feedback
- Do not overgeneralize the feedback
- Combine existing rules if it improves clarity without losing specificity"#;

/// How feedback is folded into the ruleset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// One call returning the full revised ruleset
    #[default]
    Regenerate,
    /// Propose a single rule, then merge it into the existing rules
    ProposeAndMerge,
}

impl std::fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStrategy::Regenerate => write!(f, "regenerate"),
            UpdateStrategy::ProposeAndMerge => write!(f, "propose_and_merge"),
        }
    }
}

impl std::str::FromStr for UpdateStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "regenerate" | "full" => Ok(UpdateStrategy::Regenerate),
            "propose" | "propose_and_merge" | "incremental" => Ok(UpdateStrategy::ProposeAndMerge),
            other => Err(AppError::Config(format!("Unknown reflection strategy: {}", other))),
        }
    }
}

/// What the model actually returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionOutcome {
    /// A complete replacement ruleset
    FullRuleset(Vec<String>),
    /// One new rule that still has to be merged
    ProposedRule(String),
    /// The model declined to change anything
    NoChange,
}

impl ReflectionOutcome {
    /// Interpret a response to an update or merge request.
    ///
    /// Only an `update_ruleset` tool call is accepted; a reply without one
    /// is malformed.
    pub fn from_update_response(response: &LLMResponse) -> AppResult<Self> {
        if let Some(call) = response.tool_call(UPDATE_RULESET_TOOL) {
            let rules = call
                .arguments
                .get(UPDATED_RULESET_ARG)
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    AppError::MalformedModelOutput(format!(
                        "{} call is missing the {} array",
                        UPDATE_RULESET_TOOL, UPDATED_RULESET_ARG
                    ))
                })?;
            let rules = rules
                .iter()
                .map(|rule| {
                    rule.as_str().map(str::to_string).ok_or_else(|| {
                        AppError::MalformedModelOutput(format!(
                            "{} contains a non-string rule: {}",
                            UPDATED_RULESET_ARG, rule
                        ))
                    })
                })
                .collect::<AppResult<Vec<_>>>()?;
            return Ok(ReflectionOutcome::FullRuleset(rules));
        }

        // text without the tool call is never read as rules
        let preview: String = response.content.trim().chars().take(80).collect();
        Err(AppError::MalformedModelOutput(format!(
            "model did not call {} (finish_reason: {}, text: {:?})",
            UPDATE_RULESET_TOOL, response.finish_reason, preview
        )))
    }

    /// Interpret a response to a propose-rule request. No tool call, or a
    /// call without `newRule`, means the model declined.
    pub fn from_proposal_response(response: &LLMResponse) -> AppResult<Self> {
        let Some(call) = response.tool_call(PROPOSE_RULE_TOOL) else {
            return Ok(ReflectionOutcome::NoChange);
        };
        match call.arguments.get(NEW_RULE_ARG) {
            None | Some(Value::Null) => Ok(ReflectionOutcome::NoChange),
            Some(Value::String(rule)) if rule.trim().is_empty() => Ok(ReflectionOutcome::NoChange),
            Some(Value::String(rule)) => Ok(ReflectionOutcome::ProposedRule(rule.trim().to_string())),
            Some(other) => Err(AppError::MalformedModelOutput(format!(
                "{} must be a string, got {}",
                NEW_RULE_ARG, other
            ))),
        }
    }
}

pub struct ReflectionAgent {
    llm: LLM,
    model: String,
    max_tokens: u32,
    strategy: UpdateStrategy,
    location: StoreLocation,
}

impl ReflectionAgent {
    pub fn new(llm: LLM, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            strategy: UpdateStrategy::default(),
            location: StoreLocation::reflections(),
        }
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        let llm = LLM::new(LLMProviderConfig::from_config(&config.llm)?)?;
        Ok(Self::new(llm, config.llm.model.clone())
            .with_max_tokens(config.llm.max_tokens)
            .with_strategy(config.reflection.strategy)
            .with_location(config.reflection.location()))
    }

    pub fn with_strategy(mut self, strategy: UpdateStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_location(mut self, location: StoreLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn strategy(&self) -> UpdateStrategy {
        self.strategy
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Update the stored rules from one piece of feedback and return what
    /// was written.
    pub async fn reflect(&self, session: &FeedbackSession, ctx: &NodeContext) -> AppResult<RuleSet> {
        let store = ctx.store()?;
        let run_id = Uuid::new_v4();

        let current = load_rules(store, &self.location).await?;
        info!(
            %run_id,
            strategy = %self.strategy,
            location = %self.location,
            rule_count = current.len(),
            provider = self.llm.provider_name(),
            "Starting reflection"
        );

        let updated = match self.strategy {
            UpdateStrategy::Regenerate => self.regenerate(session, &current).await?,
            UpdateStrategy::ProposeAndMerge => self.propose_and_merge(session, &current).await?,
        };

        save_rules(store, &self.location, &updated).await?;
        info!(
            %run_id,
            previous_count = current.len(),
            rule_count = updated.len(),
            "Reflection rules updated"
        );
        Ok(updated)
    }

    async fn regenerate(&self, session: &FeedbackSession, current: &RuleSet) -> AppResult<RuleSet> {
        let request = self.tool_request(
            Self::create_update_prompt(current),
            Self::create_feedback_message(session),
            Self::update_ruleset_tool(),
        );
        let response = self.llm.create_chat_completion(&request).await?;
        let outcome = ReflectionOutcome::from_update_response(&response)?;
        self.apply(outcome, current).await
    }

    async fn propose_and_merge(
        &self,
        session: &FeedbackSession,
        current: &RuleSet,
    ) -> AppResult<RuleSet> {
        let request = self.tool_request(
            Self::create_propose_prompt(current),
            Self::create_feedback_message(session),
            Self::propose_rule_tool(),
        );
        let response = self.llm.create_chat_completion(&request).await?;
        let outcome = ReflectionOutcome::from_proposal_response(&response)?;
        self.apply(outcome, current).await
    }

    async fn apply(&self, outcome: ReflectionOutcome, current: &RuleSet) -> AppResult<RuleSet> {
        match outcome {
            ReflectionOutcome::FullRuleset(rules) => Ok(RuleSet::new(rules)),
            ReflectionOutcome::NoChange => {
                debug!("Model proposed no rule change");
                Ok(current.clone())
            }
            ReflectionOutcome::ProposedRule(rule) if current.is_empty() => {
                debug!(rule = %rule, "First rule, skipping merge");
                Ok(RuleSet::new([rule]))
            }
            ReflectionOutcome::ProposedRule(rule) => self.merge(current, &rule).await,
        }
    }

    async fn merge(&self, current: &RuleSet, new_rule: &str) -> AppResult<RuleSet> {
        debug!(rule = %new_rule, existing = current.len(), "Merging proposed rule");
        let request = self.tool_request(
            Self::create_merge_prompt(current, new_rule),
            LLMMessage::user(format!("New rule to merge:\n{}", new_rule)),
            Self::update_ruleset_tool(),
        );
        let response = self.llm.create_chat_completion(&request).await?;

        match ReflectionOutcome::from_update_response(&response)? {
            ReflectionOutcome::FullRuleset(rules) => Ok(RuleSet::new(rules)),
            other => {
                warn!(outcome = ?other, "Merge call did not return a ruleset");
                Err(AppError::MalformedModelOutput(
                    "merge call did not return the updated ruleset".to_string(),
                ))
            }
        }
    }

    fn tool_request(&self, system: String, message: LLMMessage, tool: ToolDefinition) -> LLMRequest {
        let tool_choice = Some(tool.name.clone());
        LLMRequest {
            model: self.model.clone(),
            messages: vec![message],
            max_tokens: Some(self.max_tokens),
            temperature: Some(0.0),
            system_instruction: Some(system),
            tools: vec![tool],
            tool_choice,
        }
    }

    fn update_ruleset_tool() -> ToolDefinition {
        ToolDefinition::new(
            UPDATE_RULESET_TOOL,
            "Return the complete, updated list of writing rules.",
            json!({
                "type": "object",
                "properties": {
                    UPDATED_RULESET_ARG: {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Every rule that should apply from now on, one rule per entry"
                    }
                },
                "required": [UPDATED_RULESET_ARG]
            }),
        )
    }

    fn propose_rule_tool() -> ToolDefinition {
        ToolDefinition::new(
            PROPOSE_RULE_TOOL,
            "Propose a single new writing rule based on the user's feedback.",
            json!({
                "type": "object",
                "properties": {
                    NEW_RULE_ARG: {
                        "type": "string",
                        "description": "The new rule. Omit when the feedback does not call for a new rule."
                    }
                }
            }),
        )
    }

    /// System prompt for the full-regeneration call
    fn create_update_prompt(current: &RuleSet) -> String {
        format!(
            r#"You maintain the rules that guide how social media posts are written for this user.

<current_rules>
{current_rules}
</current_rules>

{instructions}

Call the `{tool}` tool with the complete updated list of rules. If no update is needed, return the current rules unchanged. Do not include any additional context or instructions in the rules."#,
            current_rules = current.to_prompt_text(),
            instructions = UPDATE_INSTRUCTIONS,
            tool = UPDATE_RULESET_TOOL,
        )
    }

    /// System prompt for the propose-one-rule call
    fn create_propose_prompt(current: &RuleSet) -> String {
        format!(
            r#"You maintain the rules that guide how social media posts are written for this user.

<current_rules>
{current_rules}
</current_rules>

{instructions}

Call the `{tool}` tool with at most one new rule that captures the user's feedback. If the feedback does not explicitly ask for a change, or an existing rule already covers it, call the tool without a rule."#,
            current_rules = current.to_prompt_text(),
            instructions = UPDATE_INSTRUCTIONS,
            tool = PROPOSE_RULE_TOOL,
        )
    }

    /// System prompt for merging a proposed rule into existing rules
    fn create_merge_prompt(current: &RuleSet, new_rule: &str) -> String {
        format!(
            r#"You maintain the rules that guide how social media posts are written for this user.

<current_rules>
{current_rules}
</current_rules>

<new_rule>
{new_rule}
</new_rule>

Merge the new rule into the current rules:
- Keep every existing rule unless the new rule conflicts with it
- If the new rule conflicts with an existing one, keep the new rule
- Combine rules only if it improves clarity without losing specificity

Call the `{tool}` tool with the complete updated list of rules."#,
            current_rules = current.to_prompt_text(),
            new_rule = new_rule,
            tool = UPDATE_RULESET_TOOL,
        )
    }

    /// User turn carrying the session and the verbatim feedback
    fn create_feedback_message(session: &FeedbackSession) -> LLMMessage {
        LLMMessage::user(format!(
            "{session}\n\n<feedback>\n{feedback}\n</feedback>",
            session = session.render_session(),
            feedback = session.user_feedback,
        ))
    }
}

#[async_trait]
impl Node for ReflectionAgent {
    type State = FeedbackSession;

    fn name(&self) -> &'static str {
        "reflection"
    }

    async fn invoke(&self, state: &FeedbackSession, ctx: &NodeContext) -> AppResult<StateUpdate> {
        self.reflect(state, ctx).await?;
        Ok(StateUpdate::default())
    }
}
