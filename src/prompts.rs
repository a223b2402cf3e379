//! Prompt templates for the answer generator.
//!
//! The response rules below are instructions to the model only; nothing
//! checks the completion against them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    /// Short, structured habit advice in Spanish.
    #[default]
    HealthAdvice,
    /// Longer evidence-based analysis.
    Detailed,
}

impl PromptTemplate {
    pub fn render(&self, question: &str, documents: &str) -> String {
        match self {
            PromptTemplate::HealthAdvice => health_advice_prompt(question, documents),
            PromptTemplate::Detailed => detailed_prompt(question, documents),
        }
    }
}

fn health_advice_prompt(question: &str, documents: &str) -> String {
    format!(
        r#"You are an expert assistant in health and well-being.
Your job is to recommend the best habits using the template given below.
Answer only in Spanish.

GOAL:
- Give clear, practical, evidence-based recommendations.
- Propose example habits using a simple, consistent structure.
- Keep a professional, friendly and concise tone.

STRICT RULES:
1. Use ONLY the information contained in the documents. If information is missing, say so explicitly.
2. If the information is ambiguous or contradictory, mention both sides.
3. ALWAYS include:
   a) One main recommendation based on the evidence in the documents.
   b) 1-2 example habits following this structure:
      - Objective: <what should improve>
      - Daily action: <a concrete behaviour>
      - Frequency: <when or how many times>
4. Keep the answer to at most 5-6 sentences.
5. Do not use markdown. Do not invent information.

User question:
{question}

Relevant documents:
{documents}

Answer (plain text only, no markdown):"#
    )
}

fn detailed_prompt(question: &str, documents: &str) -> String {
    format!(
        r#"You are a health expert analysing detailed information from scientific and health documents.

Analyse the following question and answer it using ONLY the documents provided.

Question: {question}

Relevant information from the documents:
{documents}

Give a detailed, well-founded answer:"#
    )
}
