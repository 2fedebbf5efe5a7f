use std::sync::Arc;

use anyhow::{bail, Context, Error};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, info};

use crate::model::ModelClient;
use crate::store::CHAT_TABLE;

/// Upper bound on rows returned by any agent query.
pub const MAX_ROWS: usize = 10;

const NO_SQL: &str = "NO_SQL";

const FORBIDDEN: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    pub output: String,
}

/// Answers a natural-language instruction, deciding on its own whether to
/// consult the database.
#[async_trait]
pub trait QueryAgent: Send + Sync {
    async fn invoke(&self, instruction: &str) -> Result<AgentOutput, Error>;
}

#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Sql(String),
    GeneralKnowledge,
}

pub struct SqlAgent {
    model: Arc<dyn ModelClient>,
    db: PgPool,
    prefix: String,
}

#[async_trait]
impl QueryAgent for SqlAgent {
    async fn invoke(&self, instruction: &str) -> Result<AgentOutput, Error> {
        let prompt = self.construct_prompt(instruction).await?;
        let reply = self.model.invoke(&prompt).await?;

        let sql = match parse_plan(&reply) {
            Plan::GeneralKnowledge => {
                info!("no structured lookup needed, answering from general knowledge");
                return self.general_answer(instruction).await;
            }
            Plan::Sql(sql) => sql,
        };

        info!(sql = %sql, "generated sql");
        check_read_only(&sql)?;

        let rows = self.query(&sql).await?;
        if rows.is_empty() {
            info!("query returned no rows, answering from general knowledge");
            return self.general_answer(instruction).await;
        }

        Ok(AgentOutput {
            output: format!(
                "SQL: {}\nResult ({} rows):\n{}",
                sql,
                rows.len(),
                rows.join("\n")
            ),
        })
    }
}

impl SqlAgent {
    pub fn new(model: Arc<dyn ModelClient>, db: PgPool, prefix: impl Into<String>) -> Self {
        SqlAgent {
            model,
            db,
            prefix: prefix.into(),
        }
    }

    async fn construct_prompt(&self, instruction: &str) -> Result<String, Error> {
        let db_info = self
            .get_db_info()
            .await
            .context("reading database schema")?;

        Ok(format!(
            "{}\n\nProvided this schema: {}\n\n{}\n\n\
             If the current user query needs structured product data, reply with one executable \
             PostgreSQL SELECT query that answers it and nothing else. \
             Otherwise reply with exactly {}.",
            self.prefix, db_info, instruction, NO_SQL
        ))
    }

    async fn get_db_info(&self) -> Result<String, Error> {
        let tables_query = "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_name <> $1 ORDER BY table_name";
        let rows = sqlx::query(tables_query)
            .bind(CHAT_TABLE)
            .fetch_all(&self.db)
            .await?;

        let columns_query = "SELECT column_name::text AS column_name, data_type::text AS data_type \
             FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position";

        let mut tables_info = Vec::new();

        for row in rows {
            let table_name: String = row.try_get("table_name")?;
            let columns_rows = sqlx::query(columns_query)
                .bind(&table_name)
                .fetch_all(&self.db)
                .await?;

            let mut columns = Vec::with_capacity(columns_rows.len());
            for col_row in columns_rows {
                let name: String = col_row.try_get("column_name")?;
                let data_type: String = col_row.try_get("data_type")?;
                columns.push(format!("{} {}", name, data_type));
            }

            tables_info.push(format!("Table: {}, Columns: [{}]", table_name, columns.join(", ")));
        }

        Ok(tables_info.join("; "))
    }

    /// Runs the statement inside a read-only transaction, capped at
    /// `MAX_ROWS`. Each row comes back as a JSON object.
    async fn query(&self, sql: &str) -> Result<Vec<String>, Error> {
        let capped = format!(
            "SELECT row_to_json(capped)::text AS row FROM ({}) AS capped LIMIT {}",
            sql, MAX_ROWS
        );

        let mut tx = self.db.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(&capped).fetch_all(&mut *tx).await;
        tx.rollback().await?;

        let rows = result.context("executing generated sql")?;
        debug!(rows = rows.len(), "query finished");

        rows.iter()
            .map(|row| row.try_get::<String, _>("row").map_err(Error::from))
            .collect()
    }

    async fn general_answer(&self, instruction: &str) -> Result<AgentOutput, Error> {
        let prompt = format!(
            "{}\n\nAnswer the current user query from your general knowledge. Do not write SQL.\n\n{}",
            self.prefix, instruction
        );
        let output = self.model.invoke(&prompt).await?;
        Ok(AgentOutput { output })
    }
}

/// Pulls the SQL out of a model reply. The reply may wrap the statement in a
/// fenced block or surround it with prose; only the first statement is kept.
fn parse_plan(reply: &str) -> Plan {
    let body = fenced_block(reply).unwrap_or(reply).trim();

    let starts_with_no_sql = body
        .get(..NO_SQL.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(NO_SQL));
    if body.is_empty() || starts_with_no_sql {
        return Plan::GeneralKnowledge;
    }

    let Some(start) = statement_start(body) else {
        return Plan::GeneralKnowledge;
    };

    let statement = &body[start..];
    let masked = mask_quoted(statement);
    let end = [masked.find(';'), masked.find("\n\n")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(statement.len());

    Plan::Sql(statement[..end].trim().to_string())
}

/// Contents of the first ``` block, minus its language tag.
fn fenced_block(reply: &str) -> Option<&str> {
    let open = reply.find("```")?;
    let after = &reply[open + 3..];

    let tag_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = if is_statement_keyword(&after[..tag_len]) {
        after
    } else {
        &after[tag_len..]
    };

    let close = body.find("```").unwrap_or(body.len());
    Some(&body[..close])
}

/// Byte offset of the first statement keyword, preferring one that opens a
/// line over one in the middle of a sentence.
fn statement_start(text: &str) -> Option<usize> {
    let masked = mask_quoted(text);
    let words = words(&masked);

    let starts: Vec<usize> = words
        .iter()
        .enumerate()
        .filter(|(i, (_, word))| {
            if word.eq_ignore_ascii_case("WITH") {
                let next = |n: usize| words.get(i + n).map(|(_, w)| *w).unwrap_or("");
                next(1).eq_ignore_ascii_case("RECURSIVE") || next(2).eq_ignore_ascii_case("AS")
            } else {
                is_statement_keyword(word)
            }
        })
        .map(|(_, (offset, _))| *offset)
        .collect();

    starts
        .iter()
        .copied()
        .find(|&offset| {
            masked[..offset]
                .rsplit('\n')
                .next()
                .map_or(true, |before| before.trim().is_empty())
        })
        .or_else(|| starts.first().copied())
}

fn is_statement_keyword(word: &str) -> bool {
    word.eq_ignore_ascii_case("SELECT")
        || word.eq_ignore_ascii_case("WITH")
        || FORBIDDEN.iter().any(|k| word.eq_ignore_ascii_case(k))
}

fn words(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        let in_word = c.is_ascii_alphanumeric() || c == '_';
        match (in_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push((s, &text[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, &text[s..]));
    }

    words
}

/// Blanks out string literals, quoted identifiers and dollar-quoted bodies,
/// keeping byte offsets aligned with the input. An unterminated quote runs
/// to the end of the text.
fn mask_quoted(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut rest = sql;

    while let Some(pos) = rest.find(|c: char| matches!(c, '\'' | '"' | '$')) {
        masked.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let delimiter = match tail.as_bytes()[0] {
            b'$' => match dollar_tag(tail) {
                Some(tag) => tag,
                None => {
                    masked.push('$');
                    rest = &tail[1..];
                    continue;
                }
            },
            _ => &tail[..1],
        };

        let body = &tail[delimiter.len()..];
        let quoted_len = match body.find(delimiter) {
            Some(end) => delimiter.len() + end + delimiter.len(),
            None => tail.len(),
        };

        masked.extend(std::iter::repeat(' ').take(quoted_len));
        rest = &tail[quoted_len..];
    }

    masked.push_str(rest);
    masked
}

/// `$tag$` or `$$` at the start of `text`. `$1` style parameters are not tags.
fn dollar_tag(text: &str) -> Option<&str> {
    let after = &text[1..];
    let len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(after.len());

    if after[..len].starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    after[len..].starts_with('$').then(|| &text[..len + 2])
}

fn check_read_only(sql: &str) -> Result<(), Error> {
    let masked = mask_quoted(sql);

    if masked.contains(';') {
        bail!("refusing to run multiple statements");
    }

    let words: Vec<String> = words(&masked)
        .into_iter()
        .map(|(_, w)| w.to_ascii_uppercase())
        .collect();

    match words.first().map(String::as_str) {
        Some("SELECT") | Some("WITH") => {}
        _ => bail!("refusing to run a statement that is not a SELECT"),
    }

    if let Some(word) = words.iter().find(|w| FORBIDDEN.contains(&w.as_str())) {
        bail!("refusing to run a statement containing {}", word);
    }

    Ok(())
}
