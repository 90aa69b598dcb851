use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use crate::agent_engine::decision::{Decision, DecisionProvider};
use crate::agent_engine::state::ActionClass;
use crate::config::AppConfig;
use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::executor::action::Action;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart};
use crate::perception::types::{Observation, ScreenshotMeta};

const SYSTEM_PROMPT: &str = r#"You operate a desktop computer on behalf of the user.
Each turn you receive the task, the history of your previous reflections and plans, and a
screenshot of the current screen. Decide the single next action.

Reply with exactly one JSON object and nothing else:
{"reflection": "<what changed since the last step and whether it worked>",
 "executor_plan": "<what you will do now and why>",
 "actions": ["<action code>"]}

Action codes (coordinates are pixels of the screenshot you were given):
  click(x, y)                      optional: button="left"|"right"|"middle", clicks=1..3
  move_to(x, y)
  drag(x1, y1, x2, y2)
  type("text")                     escape \" and \\ inside the string
  scroll(dx, dy)                   positive dy scrolls down, positive dx scrolls right
  hotkey("ctrl", "c")              keys are pressed in order and released in reverse
Control words:
  DONE   the task is complete
  FAIL   the task cannot be completed
  WAIT   nothing to do until the screen changes
  NEXT   skip this step without acting
Only the first entry of "actions" is performed."#;

const ELISION: &str = "\n\n[... earlier steps omitted ...]";

#[derive(Debug, Deserialize)]
struct ModelReply {
    #[serde(default)]
    reflection: Option<String>,
    #[serde(default)]
    executor_plan: Option<String>,
    actions: Vec<String>,
}

/// Decision provider backed by a vision-capable chat model.
pub struct LlmDecisionProvider {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    context_char_limit: usize,
}

impl LlmDecisionProvider {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig) -> Self {
        Self {
            provider,
            call,
            context_char_limit: 0,
        }
    }

    /// Cap the history sent per call. 0 keeps everything.
    pub fn with_context_limit(mut self, limit: usize) -> Self {
        self.context_char_limit = limit;
        self
    }

    /// Build from the active `[llm.providers.<id>]` entry.
    pub fn from_config(config: &AppConfig) -> ScreenPilotResult<Self> {
        let (id, entry) = config.llm.active_entry()?;
        let api_key = entry.resolve_api_key(id);
        if api_key.is_empty() {
            tracing::warn!(provider = id, "no API key configured; sending unauthenticated requests");
        }
        let provider = OpenAiCompatibleProvider::new(id.to_string(), entry.api_base.clone(), api_key);
        let call = CallConfig {
            model: entry.model.clone(),
            stream: entry.stream,
            temperature: entry.temperature,
        };
        tracing::info!(provider = id, model = %call.model, stream = call.stream, "decision model configured");
        Ok(Self::new(Arc::new(provider), call).with_context_limit(config.agent.context_char_limit))
    }

    fn build_messages(&self, instruction: &str, observation: &Observation, context: &str) -> Vec<ChatMessage> {
        let context = trim_context(context, self.context_char_limit);
        let meta = &observation.meta;
        let mut parts = vec![ContentPart::text(format!(
            "Task: {instruction}\n\nHistory:\n{context}\n\nThe screenshot is {}x{} pixels.",
            meta.image_width, meta.image_height
        ))];
        if let Some(tree) = &observation.accessibility_tree {
            parts.push(ContentPart::text(format!("Accessibility tree:\n{tree}")));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&observation.screenshot_png);
        parts.push(ContentPart::png_base64(&encoded));

        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user_parts(parts)]
    }
}

#[async_trait]
impl DecisionProvider for LlmDecisionProvider {
    async fn predict(
        &self,
        instruction: &str,
        observation: &Observation,
        context: &str,
    ) -> ScreenPilotResult<Decision> {
        let messages = self.build_messages(instruction, observation, context);
        let response = self.provider.chat(messages, &self.call).await?;
        tracing::debug!(provider = self.provider.name(), reply = %response.content, "model reply");
        parse_reply(&response.content, &observation.meta)
    }
}

/// Turn the model's reply into a decision whose executable actions are in physical
/// screen coordinates.
pub fn parse_reply(content: &str, meta: &ScreenshotMeta) -> ScreenPilotResult<Decision> {
    let json = extract_json_object(content)
        .ok_or_else(|| ScreenPilotError::Decision("reply contains no JSON object".into()))?;
    let reply: ModelReply = serde_json::from_str(json)
        .map_err(|e| ScreenPilotError::Decision(format!("malformed reply: {e}")))?;
    if reply.actions.is_empty() {
        return Err(ScreenPilotError::Decision("reply carries no actions".into()));
    }

    // Only the first proposal drives the step; the rest is context and stays as sent.
    let mut actions = reply.actions;
    actions[0] = ground(actions[0].trim(), meta)?;
    if actions.len() > 1 {
        tracing::debug!(ignored = actions.len() - 1, "trailing proposed actions left ungrounded");
    }

    Ok(Decision {
        actions,
        reflection: reply.reflection,
        executor_plan: reply.executor_plan,
    })
}

/// Control words pass through untouched; anything else must parse as an action.
fn ground(code: &str, meta: &ScreenshotMeta) -> ScreenPilotResult<String> {
    if ActionClass::classify(code) != ActionClass::Execute {
        return Ok(code.to_string());
    }
    let action = Action::parse(code).map_err(|e| ScreenPilotError::Decision(e.to_string()))?;
    Ok(action.to_physical(meta).to_string())
}

/// First `{` to last `}`, which also strips markdown code fences.
fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}

/// Keep the `Task:` header and as much of the most recent history as fits in `limit`
/// bytes. A limit of 0 disables trimming.
pub fn trim_context(context: &str, limit: usize) -> Cow<'_, str> {
    if limit == 0 || context.len() <= limit {
        return Cow::Borrowed(context);
    }
    let header_end = context.find("\n\nReflection:").unwrap_or(context.len());
    let budget = limit.saturating_sub(header_end);
    let mut start = (context.len() - budget).max(header_end);
    while !context.is_char_boundary(start) {
        start += 1;
    }
    Cow::Owned(format!("{}{ELISION}{}", &context[..header_end], &context[start..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{LlmResponse, MessageContent};
    use std::sync::Mutex;

    const META: ScreenshotMeta = ScreenshotMeta {
        physical_width: 3840,
        physical_height: 2160,
        image_width: 1920,
        image_height: 1080,
    };

    struct CannedLlm {
        reply: String,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn name(&self) -> &str {
            "canned"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> ScreenPilotResult<LlmResponse> {
            self.seen.lock().expect("lock").push(messages);
            Ok(LlmResponse {
                content: self.reply.clone(),
                reasoning: String::new(),
            })
        }
    }

    fn observation() -> Observation {
        Observation {
            screenshot_png: vec![1, 2, 3],
            meta: META,
            accessibility_tree: None,
        }
    }

    fn call() -> CallConfig {
        CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.1,
        }
    }

    #[test]
    fn fenced_reply_is_grounded_to_physical_pixels() {
        let reply = "```json\n{\"reflection\": \"ok\", \"executor_plan\": \"open it\", \
                     \"actions\": [\"click(100, 50, clicks=2)\"]}\n```";
        let decision = parse_reply(reply, &META).expect("parse");
        assert_eq!(decision.actions, vec!["click(200, 100, clicks=2)".to_string()]);
        assert_eq!(decision.reflection.as_deref(), Some("ok"));
        assert_eq!(decision.executor_plan.as_deref(), Some("open it"));
    }

    #[test]
    fn only_the_first_action_is_grounded() {
        let reply = r#"{"actions": ["click(1, 2)", "then verify the dialog", "click(10, 10)"]}"#;
        let decision = parse_reply(reply, &META).expect("parse");
        assert_eq!(
            decision.actions,
            vec![
                "click(2, 4)".to_string(),
                "then verify the dialog".to_string(),
                "click(10, 10)".to_string(),
            ]
        );
    }

    #[test]
    fn control_words_pass_through() {
        let decision = parse_reply(r#"{"actions": ["DONE"]}"#, &META).expect("parse");
        assert_eq!(decision.first_action(), Some("DONE"));
        assert_eq!(decision.reflection, None);
    }

    #[test]
    fn bad_replies_are_decision_errors() {
        for reply in [
            "I think we are done",
            r#"{"reflection": "r"}"#,
            r#"{"actions": []}"#,
            r#"{"actions": ["teleport(1, 2)"]}"#,
        ] {
            assert!(
                matches!(parse_reply(reply, &META), Err(ScreenPilotError::Decision(_))),
                "{reply}"
            );
        }
    }

    #[test]
    fn trim_keeps_header_and_latest_tail() {
        let mut context = String::from("Task:\nopen settings");
        for i in 0..50 {
            context.push_str(&format!("\n\nReflection:\nr{i}\n\n----------------------\n\nPlan:\np{i}"));
        }
        let trimmed = trim_context(&context, 200);
        assert!(trimmed.starts_with("Task:\nopen settings\n\n[... earlier steps omitted ...]"));
        assert!(trimmed.ends_with("Plan:\np49"));
        assert!(!trimmed.contains("r0\n"));

        assert_eq!(trim_context(&context, 0), context.as_str());
        assert_eq!(trim_context("Task:\nx", 100), "Task:\nx");
    }

    #[tokio::test]
    async fn predict_sends_instruction_history_and_image() {
        let llm = Arc::new(CannedLlm {
            reply: r#"{"reflection": "r", "executor_plan": "p", "actions": ["scroll(0, 3)"]}"#.into(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = LlmDecisionProvider::new(llm.clone(), call());

        let decision = provider
            .predict("find the file", &observation(), "Task:\nfind the file")
            .await
            .expect("predict");
        assert_eq!(decision.first_action(), Some("scroll(0, 3)"));

        let seen = llm.seen.lock().expect("lock");
        let messages = &seen[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        let MessageContent::Parts(parts) = &messages[1].content else {
            panic!("user message should carry parts");
        };
        match &parts[0] {
            ContentPart::Text { text } => {
                assert!(text.contains("Task: find the file"));
                assert!(text.contains("1920x1080"));
            }
            other => panic!("expected text part, got {other:?}"),
        }
        match parts.last() {
            Some(ContentPart::ImageUrl { image_url }) => assert_eq!(image_url.url, "data:image/png;base64,AQID"),
            other => panic!("expected image part, got {other:?}"),
        }
    }
}
