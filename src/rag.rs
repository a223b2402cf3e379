//! Answer generation: retrieve, format, render, complete.

use tracing::{debug, info};

use crate::embeddings::Embedder;
use crate::error::Result;
use crate::llm::LanguageModel;
use crate::prompts::PromptTemplate;
use crate::retriever::Retriever;
use crate::splitter::Chunk;

pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<Chunk>,
}

/// `[Source: name]` header per chunk, joined in retrieval order.
pub fn format_documents(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[Source: {}]\n{}", chunk.metadata.source, chunk.text))
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
}

pub struct HealthRag<E, L> {
    retriever: Retriever<E>,
    llm: L,
    template: PromptTemplate,
    temperature: f32,
}

impl<E: Embedder, L: LanguageModel> HealthRag<E, L> {
    pub fn new(retriever: Retriever<E>, llm: L, template: PromptTemplate, temperature: f32) -> Self {
        Self {
            retriever,
            llm,
            template,
            temperature,
        }
    }

    pub fn default_k(&self) -> usize {
        self.retriever.default_k()
    }

    pub fn retriever(&self) -> &Retriever<E> {
        &self.retriever
    }

    pub async fn ask(&self, question: &str, k: Option<usize>) -> Result<String> {
        Ok(self.ask_with_sources(question, k).await?.text)
    }

    /// Like [`Self::ask`], also returning the chunks the answer was built from.
    pub async fn ask_with_sources(&self, question: &str, k: Option<usize>) -> Result<Answer> {
        info!("Answering question with k = {}", self.retriever.effective_k(k));

        let sources = self.get_relevant_documents(question, k).await?;
        let documents = format_documents(&sources);
        let prompt = self.template.render(question, &documents);
        debug!("Prompt is {} chars from {} chunks", prompt.len(), sources.len());

        let text = self.llm.complete(&prompt, self.temperature).await?;
        Ok(Answer { text, sources })
    }

    /// Retrieval only; no model call.
    pub async fn get_relevant_documents(&self, question: &str, k: Option<usize>) -> Result<Vec<Chunk>> {
        let k = self.retriever.effective_k(k);
        let mut chunks = self.retriever.retrieve_chunks(question, Some(k)).await?;
        chunks.truncate(k);
        Ok(chunks)
    }
}
