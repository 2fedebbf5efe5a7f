//! In-memory stand-ins for the external seams, shared by unit tests.

use std::sync::Mutex;

use anyhow::{anyhow, Error};
use async_trait::async_trait;
use chrono::Utc;

use crate::agent::{AgentOutput, QueryAgent};
use crate::model::ModelClient;
use crate::store::{ChatTurn, ConversationStore};

pub fn turn(user: &str, ai: &str) -> ChatTurn {
    ChatTurn {
        user_message: user.to_string(),
        ai_response: ai.to_string(),
        created_at: Utc::now(),
    }
}

#[derive(Default)]
pub struct MemoryStore {
    pub turns: Mutex<Vec<ChatTurn>>,
    pub store_calls: Mutex<usize>,
    pub fail_fetch: bool,
    pub fail_store: bool,
    pub stall_store: bool,
}

impl MemoryStore {
    pub fn with_turns(count: usize) -> Self {
        let store = MemoryStore::default();
        {
            let mut turns = store.turns.lock().unwrap();
            for i in 1..=count {
                turns.push(turn(&format!("Q{}?", i), &format!("A{}.", i)));
            }
        }
        store
    }

    pub fn saved(&self) -> Vec<(String, String)> {
        self.turns
            .lock()
            .unwrap()
            .iter()
            .map(|t| (t.user_message.clone(), t.ai_response.clone()))
            .collect()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn fetch_last_n(&self, n: usize) -> Result<Vec<ChatTurn>, Error> {
        if self.fail_fetch {
            return Err(anyhow!("connection refused"));
        }
        let turns = self.turns.lock().unwrap();
        let start = turns.len().saturating_sub(n);
        Ok(turns[start..].to_vec())
    }

    async fn store(&self, user_message: &str, ai_response: &str) -> Result<(), Error> {
        *self.store_calls.lock().unwrap() += 1;
        if self.stall_store {
            std::future::pending::<()>().await;
        }
        if self.fail_store {
            return Err(anyhow!("disk full"));
        }
        self.turns
            .lock()
            .unwrap()
            .push(turn(user_message, ai_response));
        Ok(())
    }
}

pub struct ScriptedAgent {
    reply: Result<String, String>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn answering(output: &str) -> Self {
        ScriptedAgent {
            reply: Ok(output.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        ScriptedAgent {
            reply: Err(reason.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl QueryAgent for ScriptedAgent {
    async fn invoke(&self, instruction: &str) -> Result<AgentOutput, Error> {
        self.seen.lock().unwrap().push(instruction.to_string());
        match &self.reply {
            Ok(output) => Ok(AgentOutput {
                output: output.clone(),
            }),
            Err(reason) => Err(anyhow!("{}", reason)),
        }
    }
}

pub struct ScriptedModel {
    reply: Result<String, String>,
    pub seen: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn answering(text: &str) -> Self {
        ScriptedModel {
            reply: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        ScriptedModel {
            reply: Err(reason.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, prompt: &str) -> Result<String, Error> {
        self.seen.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(reason) => Err(anyhow!("{}", reason)),
        }
    }
}
