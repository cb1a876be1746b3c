use serde::{Deserialize, Serialize};

/// Input state handed to the reflection node by the workflow engine.
///
/// Field aliases accept the camelCase names the post-generation graph
/// emits (`originalPost`, `newPost`, `userResponse`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSession {
    /// The post before the user asked for edits
    #[serde(alias = "originalPost")]
    pub original_post: String,
    /// The post after the edits, when the caller has it
    #[serde(default, alias = "newPost", alias = "revisedPost")]
    pub revised_post: Option<String>,
    /// The user's free-text response that triggered the reflection
    #[serde(alias = "userResponse", alias = "user_response")]
    pub user_feedback: String,
}

impl FeedbackSession {
    pub fn new(original_post: impl Into<String>, user_feedback: impl Into<String>) -> Self {
        Self {
            original_post: original_post.into(),
            revised_post: None,
            user_feedback: user_feedback.into(),
        }
    }

    pub fn with_revised_post(mut self, revised_post: impl Into<String>) -> Self {
        self.revised_post = Some(revised_post.into());
        self
    }

    /// Render the posts as the `<session>` block shown to the model
    pub fn render_session(&self) -> String {
        let mut session = format!(
            "<original_post>\n{}\n</original_post>",
            self.original_post.trim()
        );
        if let Some(revised) = self.revised_post.as_deref().filter(|p| !p.trim().is_empty()) {
            session.push_str(&format!("\n<revised_post>\n{}\n</revised_post>", revised.trim()));
        }
        format!("<session>\n{}\n</session>", session)
    }
}

/// State delta returned by a node. The reflection node never changes
/// workflow state, so this carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdate {}

impl StateUpdate {
    pub fn is_empty(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_graph_state_names() {
        let session: FeedbackSession = serde_json::from_str(
            r#"{"originalPost":"Launch day!","newPost":"Launch day.","userResponse":"no exclamation marks"}"#,
        )
        .unwrap();

        assert_eq!(session.original_post, "Launch day!");
        assert_eq!(session.revised_post.as_deref(), Some("Launch day."));
        assert_eq!(session.user_feedback, "no exclamation marks");
    }

    #[test]
    fn test_revised_post_is_optional() {
        let session: FeedbackSession =
            serde_json::from_str(r#"{"original_post":"Hello","user_response":"shorter"}"#).unwrap();
        assert_eq!(session.revised_post, None);
        assert!(!session.render_session().contains("<revised_post>"));
    }

    #[test]
    fn test_render_session_includes_revision() {
        let rendered = FeedbackSession::new("First draft", "tone it down")
            .with_revised_post("Second draft")
            .render_session();

        assert!(rendered.starts_with("<session>"));
        assert!(rendered.contains("<original_post>\nFirst draft\n</original_post>"));
        assert!(rendered.contains("<revised_post>\nSecond draft\n</revised_post>"));
    }
}
