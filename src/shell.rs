//! Line-based interactive session over a [`HealthRag`].

use std::io::{BufRead, Write};

use anyhow::Result;
use tracing::error;

use crate::embeddings::Embedder;
use crate::llm::LanguageModel;
use crate::rag::HealthRag;

const RULE: &str = "============================================================";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Exit,
    SetK(usize),
    Question(String),
    Empty,
    Malformed,
}

pub fn parse_command(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }

    let lower = trimmed.to_lowercase();
    if matches!(lower.as_str(), "salir" | "exit" | "quit") {
        return Command::Exit;
    }

    let mut words = lower.split_whitespace();
    if words.next() == Some("docs") {
        return match (words.next().map(str::parse::<usize>), words.next()) {
            (Some(Ok(k)), None) if k > 0 => Command::SetK(k),
            _ => Command::Malformed,
        };
    }

    Command::Question(trimmed.to_string())
}

pub struct Shell<'a, E, L> {
    rag: &'a HealthRag<E, L>,
    k: usize,
}

impl<'a, E: Embedder, L: LanguageModel> Shell<'a, E, L> {
    pub fn new(rag: &'a HealthRag<E, L>, k: usize) -> Self {
        Self { rag, k }
    }

    /// Current retrieval breadth for this session.
    pub fn k(&self) -> usize {
        self.k
    }

    pub async fn run<R: BufRead, W: Write>(&mut self, mut input: R, mut out: W) -> Result<()> {
        writeln!(out, "\nInteractive mode.")?;
        writeln!(out, "Type 'salir' or 'exit' to quit.")?;
        writeln!(
            out,
            "Type 'docs N' to change how many documents are consulted (e.g. 'docs 6')."
        )?;

        loop {
            write!(out, "\nYour question: ")?;
            out.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(out, "\nGoodbye!")?;
                break;
            }

            match parse_command(&line) {
                Command::Empty => continue,
                Command::Exit => {
                    writeln!(out, "\nGoodbye!")?;
                    break;
                }
                Command::SetK(k) => {
                    self.k = k;
                    writeln!(out, "Number of documents set to {k}")?;
                }
                Command::Malformed => {
                    writeln!(out, "Invalid format. Use: 'docs N' (e.g. 'docs 6')")?;
                }
                Command::Question(question) => self.answer(&question, &mut out).await?,
            }
        }
        Ok(())
    }

    async fn answer<W: Write>(&self, question: &str, out: &mut W) -> Result<()> {
        writeln!(out, "\nSearching for relevant information...")?;

        let answer = match self.rag.ask_with_sources(question, Some(self.k)).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Question failed: {}", e);
                writeln!(out, "\nError: {e}")?;
                return Ok(());
            }
        };

        writeln!(out, "\n{RULE}\nANSWER:\n{RULE}")?;
        writeln!(out, "{}", answer.text)?;
        writeln!(out, "{RULE}")?;

        writeln!(out, "\nDocuments consulted ({}):", answer.sources.len())?;
        for (i, chunk) in answer.sources.iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, chunk.metadata.source)?;
        }
        Ok(())
    }
}
