//! Conversational fine-tuning of a generated card.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

pub const GREETING: &str =
    "Your card is ready! Describe UI tweaks here, for example: \"make the title red\".";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct FineTuner {
    html: String,
    messages: Vec<Message>,
    delay: Duration,
}

impl FineTuner {
    pub fn new(initial_html: impl Into<String>, delay: Duration) -> Self {
        Self {
            html: initial_html.into(),
            messages: vec![Message {
                sender: Sender::Bot,
                text: GREETING.to_string(),
            }],
            delay,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_html(self) -> String {
        self.html
    }

    /// Apply one tuning instruction. Returns `None` for a blank prompt,
    /// otherwise the bot's reply; the updated HTML is in [`FineTuner::html`].
    pub async fn tune(&mut self, prompt: &str) -> Option<String> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return None;
        }
        self.messages.push(Message {
            sender: Sender::User,
            text: prompt.to_string(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.html = apply_tuning_comment(&self.html, prompt);
        let reply = format!(
            "Adjusted according to \"{}\". Check the preview.",
            prompt
        );
        self.messages.push(Message {
            sender: Sender::Bot,
            text: reply.clone(),
        });
        info!(turns = self.messages.len(), "card tuned");
        Some(reply)
    }
}

/// Append the tuning marker; `--` is escaped so the comment cannot close early.
pub fn apply_tuning_comment(html: &str, prompt: &str) -> String {
    let safe = html_escape::encode_text(prompt).replace("--", "&#45;&#45;");
    format!(
        "{}\n<!-- AI-Tuning based on prompt: \"{}\" -->",
        html, safe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tune_appends_comment_and_records_dialogue() {
        let mut tuner = FineTuner::new("<p>card</p>", Duration::ZERO);
        assert_eq!(tuner.messages().len(), 1);

        let reply = tuner.tune("make the title red").await.unwrap();
        assert!(reply.contains("make the title red"));
        assert_eq!(
            tuner.html(),
            "<p>card</p>\n<!-- AI-Tuning based on prompt: \"make the title red\" -->"
        );
        let senders: Vec<Sender> = tuner.messages().iter().map(|m| m.sender).collect();
        assert_eq!(senders, vec![Sender::Bot, Sender::User, Sender::Bot]);
    }

    #[tokio::test]
    async fn blank_prompt_is_ignored() {
        let mut tuner = FineTuner::new("<p>card</p>", Duration::ZERO);
        assert!(tuner.tune("   ").await.is_none());
        assert_eq!(tuner.html(), "<p>card</p>");
        assert_eq!(tuner.messages().len(), 1);
    }

    #[test]
    fn comment_cannot_be_closed_by_prompt() {
        let out = apply_tuning_comment("", "x --> <script>");
        assert_eq!(out.matches("-->").count(), 1);
        assert!(!out.contains("<script>"));
    }

    #[tokio::test(start_paused = true)]
    async fn tune_waits_for_delay() {
        let mut tuner = FineTuner::new("", Duration::from_millis(1500));
        let started = tokio::time::Instant::now();
        tuner.tune("bigger font").await;
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
