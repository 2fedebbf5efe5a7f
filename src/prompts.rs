use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Error};

pub const GREETING: &str =
    "Hi! I'm your personal care assistant. Ask me anything about our products!";

pub const APOLOGY: &str = "Sorry, something went wrong.";

pub const CONTEXT_PREAMBLE: &str = "Below is the chat history between the user and the assistant.\n\
Use it as context to answer the next question naturally and accurately.";

pub const CLEANUP_INSTRUCTION: &str = "You are a helpful and detailed conversational assistant. \
I will provide you with a User Query and a Raw LLM Response. \
Your task is to fully synthesize a complete, detailed, and polite final response that directly answers the User Query. \
Use the Raw LLM Response as your primary source of fact, but expand upon it using clear, easy-to-understand language. \
Your final output must be completely clean: remove any internal tags, SQL statements, tool traces, system messages, or unwanted symbols like **, *, or #. \
The final response should be a complete, grammatically correct, and human-readable paragraph.";

pub const AGENT_PREFIX: &str = "You are an intelligent Text-to-SQL and knowledge agent for a personal care products company.
You have access to a PostgreSQL database that stores structured product information like name, category, price, and availability.

Rules:
1. Use the database only for factual, structured data such as price, category or stock availability.
2. Questions about benefits, uses, effects or product advice are answered from general knowledge, without SQL.
3. Never use INSERT, UPDATE, DELETE, DROP or any other statement that changes data.
4. Never say that you lack information or cannot answer. Always be polite, conversational and confident.";

/// Fixed natural-language strings used by the pipeline. They are data:
/// swapping them never requires touching the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub version: String,
    pub greeting: String,
    pub apology: String,
    pub context_preamble: String,
    pub cleanup_instruction: String,
    pub agent_prefix: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Prompts {
            version: "v1".to_string(),
            greeting: GREETING.to_string(),
            apology: APOLOGY.to_string(),
            context_preamble: CONTEXT_PREAMBLE.to_string(),
            cleanup_instruction: CLEANUP_INSTRUCTION.to_string(),
            agent_prefix: AGENT_PREFIX.to_string(),
        }
    }
}

impl Prompts {
    /// Replaces the cleanup instruction with the contents of `path`.
    pub fn with_cleanup_file(mut self, path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading cleanup prompt {}", path.display()))?;
        let text = text.trim();
        if text.is_empty() {
            bail!("cleanup prompt {} is empty", path.display());
        }

        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.cleanup_instruction = text.to_string();
        self.version = format!("custom:{}", label);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_v1() {
        let prompts = Prompts::default();
        assert_eq!(prompts.version, "v1");
        assert_eq!(prompts.apology, APOLOGY);
        assert!(prompts.cleanup_instruction.contains("User Query"));
    }

    #[test]
    fn cleanup_file_overrides_instruction() {
        let path = std::env::temp_dir().join(format!("cleanup-{}.txt", std::process::id()));
        fs::write(&path, "  Rewrite the response as one short sentence.\n").unwrap();

        let prompts = Prompts::default().with_cleanup_file(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(
            prompts.cleanup_instruction,
            "Rewrite the response as one short sentence."
        );
        assert!(prompts.version.starts_with("custom:cleanup-"));
        assert_eq!(prompts.apology, APOLOGY);
    }

    #[test]
    fn empty_or_missing_cleanup_file_is_an_error() {
        let missing = std::env::temp_dir().join("no-such-cleanup-prompt.txt");
        assert!(Prompts::default().with_cleanup_file(&missing).is_err());

        let path = std::env::temp_dir().join(format!("empty-cleanup-{}.txt", std::process::id()));
        fs::write(&path, "\n \n").unwrap();
        let result = Prompts::default().with_cleanup_file(&path);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
