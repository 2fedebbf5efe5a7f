use std::io::{self, BufRead, Write};

use crate::orchestrator::{Orchestrator, Reply};
use crate::session::ConversationSession;

const TITLE: &str = "Personal Care Product Chatbot";
const FOOTER: &str = "Personal Care Assistant. All rights reserved.";
const STATUS: &str = "Analyzing your question...";

#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Exit,
    History,
    Message(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/history" => Input::History,
        message => Input::Message(message),
    }
}

/// Terminal front end. Reads one line per message and renders whatever the
/// orchestrator returns; diagnostics go to the error stream.
pub struct Shell<R, W, E> {
    input: R,
    out: W,
    err: E,
}

impl<R: BufRead, W: Write, E: Write> Shell<R, W, E> {
    pub fn new(input: R, out: W, err: E) -> Self {
        Shell { input, out, err }
    }

    pub async fn run(
        &mut self,
        orchestrator: &Orchestrator,
        session: &mut ConversationSession,
    ) -> io::Result<()> {
        writeln!(self.out, "{}", TITLE)?;
        writeln!(self.out, "Type /history to show the conversation, /exit to leave.\n")?;
        self.render_history(session)?;

        let mut line = String::new();
        loop {
            write!(self.out, "You: ")?;
            self.out.flush()?;

            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                writeln!(self.out)?;
                break;
            }

            match parse_input(&line) {
                Input::Empty => continue,
                Input::Exit => break,
                Input::History => self.render_history(session)?,
                Input::Message(query) => {
                    writeln!(self.out, "{}", STATUS)?;
                    let reply = orchestrator.handle(session, query).await;
                    self.render_reply(&reply)?;
                }
            }
        }

        orchestrator.flush().await;
        writeln!(self.out, "---\n{}", FOOTER)?;
        self.out.flush()
    }

    fn render_history(&mut self, session: &ConversationSession) -> io::Result<()> {
        for message in session.messages() {
            writeln!(self.out, "{}: {}", message.role, message.content)?;
        }
        Ok(())
    }

    fn render_reply(&mut self, reply: &Reply) -> io::Result<()> {
        writeln!(self.out, "Assistant: {}", reply.text())?;
        if let Some(diagnostic) = reply.diagnostic() {
            writeln!(self.err, "Error: {}", diagnostic)?;
        }
        Ok(())
    }
}
