use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::QueryAgent;
use crate::error::{AssistantError, Stage};
use crate::model::ModelClient;
use crate::prompts::Prompts;
use crate::session::{ConversationSession, Role};
use crate::store::{ChatTurn, ConversationStore};

/// Number of persisted turns fed back as context.
pub const HISTORY_WINDOW: usize = 5;

/// What the shell shows for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Answered { text: String },
    Failed { text: String, diagnostic: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Answered { text } | Reply::Failed { text, .. } => text,
        }
    }

    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Reply::Answered { .. } => None,
            Reply::Failed { diagnostic, .. } => Some(diagnostic),
        }
    }
}

/// Runs one external call and tags its failure with the pipeline stage.
pub async fn call_external<T, F>(stage: Stage, call: F) -> Result<T, AssistantError>
where
    F: Future<Output = Result<T, Error>>,
{
    call.await.map_err(|e| stage.wrap(e))
}

/// Turns a user message into a cleaned answer: history lookup, delegation
/// to the query agent, cleanup by the model, then persistence.
///
/// Dependencies are built once at startup and only read afterwards. Saves
/// run in the background so a slow insert never holds back an answer.
pub struct Orchestrator {
    agent: Arc<dyn QueryAgent>,
    model: Arc<dyn ModelClient>,
    store: Arc<dyn ConversationStore>,
    prompts: Prompts,
    saves: Mutex<JoinSet<bool>>,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn QueryAgent>,
        model: Arc<dyn ModelClient>,
        store: Arc<dyn ConversationStore>,
        prompts: Prompts,
    ) -> Self {
        Orchestrator {
            agent,
            model,
            store,
            prompts,
            saves: Mutex::new(JoinSet::new()),
        }
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    /// Handles one message. The user's entry is recorded before any external
    /// call; a save is started only when every stage succeeded, and the reply
    /// is returned without waiting for it.
    pub async fn handle(&self, session: &mut ConversationSession, query: &str) -> Reply {
        session.push(Role::User, query);

        match self.answer(query).await {
            Ok(answer) => {
                session.push(Role::Assistant, answer.clone());
                self.save_in_background(query, &answer);
                Reply::Answered { text: answer }
            }
            Err(e) => {
                debug!(error = %e, "message cycle failed");
                session.push(Role::Assistant, self.prompts.apology.clone());
                Reply::Failed {
                    text: self.prompts.apology.clone(),
                    diagnostic: e.to_string(),
                }
            }
        }
    }

    /// Waits for every save started so far. Returns how many of them failed.
    pub async fn flush(&self) -> usize {
        let mut saves = std::mem::take(&mut *self.saves.lock().unwrap_or_else(PoisonError::into_inner));

        let mut failed = 0;
        while let Some(result) = saves.join_next().await {
            if !matches!(result, Ok(true)) {
                failed += 1;
            }
        }
        failed
    }

    fn save_in_background(&self, query: &str, answer: &str) {
        let store = Arc::clone(&self.store);
        let query = query.to_string();
        let answer = answer.to_string();

        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                match call_external(Stage::Persistence, store.store(&query, &answer)).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "answer shown but not saved");
                        false
                    }
                }
            });
    }

    async fn answer(&self, query: &str) -> Result<String, AssistantError> {
        let history =
            call_external(Stage::History, self.store.fetch_last_n(HISTORY_WINDOW)).await?;
        info!(turns = history.len(), "loaded chat history");

        let instruction = contextual_instruction(&self.prompts.context_preamble, &history, query);
        let raw = call_external(Stage::Delegation, self.agent.invoke(&instruction)).await?;
        info!(chars = raw.output.len(), "agent answered");

        let prompt = cleanup_prompt(&self.prompts.cleanup_instruction, query, &raw.output);
        let answer = call_external(Stage::Cleanup, self.model.invoke(&prompt)).await?;
        info!(prompts = %self.prompts.version, "answer cleaned");

        Ok(answer)
    }
}

pub fn context_block(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}\n", turn.user_message, turn.ai_response))
        .collect()
}

pub fn contextual_instruction(preamble: &str, history: &[ChatTurn], query: &str) -> String {
    format!(
        "{}\n\n{}\nCurrent User Query: {}\n",
        preamble,
        context_block(history),
        query
    )
}

pub fn cleanup_prompt(instruction: &str, query: &str, raw_output: &str) -> String {
    format!(
        "User Query: {}\n\nResponse: {}\n\n{}",
        query, raw_output, instruction
    )
}
