//! IDMS ERP knowledge base injected into the chat system prompt

use std::fmt::Write;
use std::path::Path;

use serde::Deserialize;

use crate::Result;

/// Embedded IDMS knowledge document
const EMBEDDED_DOCUMENT: &str = include_str!("../knowledge/idms.md");

/// Embedded GST FAQ table
const EMBEDDED_FAQS: &str = include_str!("../knowledge/gst_faqs.toml");

/// A GST question with its canonical answer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Faq {
    /// Question as users usually phrase it
    pub question: String,
    /// Canonical answer
    pub answer: String,
}

#[derive(Deserialize)]
struct FaqFile {
    #[serde(default)]
    faq: Vec<Faq>,
}

/// Read-only domain knowledge, loaded once at startup
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    document: String,
    faqs: Vec<Faq>,
}

impl KnowledgeBase {
    /// Knowledge base compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if the embedded FAQ table is malformed
    pub fn embedded() -> Result<Self> {
        Ok(Self {
            document: EMBEDDED_DOCUMENT.trim().to_string(),
            faqs: parse_faqs(EMBEDDED_FAQS)?,
        })
    }

    /// Knowledge base with the document read from `path` and the embedded FAQs
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read
    pub fn from_path(path: &Path) -> Result<Self> {
        let document = std::fs::read_to_string(path)?;
        tracing::info!(path = %path.display(), bytes = document.len(), "loaded knowledge document");
        Ok(Self {
            document: document.trim().to_string(),
            faqs: parse_faqs(EMBEDDED_FAQS)?,
        })
    }

    /// Build from raw parts
    #[must_use]
    pub fn new(document: impl Into<String>, faqs: Vec<Faq>) -> Self {
        Self {
            document: document.into(),
            faqs,
        }
    }

    /// The knowledge document
    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    /// All GST FAQs
    #[must_use]
    pub fn faqs(&self) -> &[Faq] {
        &self.faqs
    }

    /// Canonical answer for a question, matched case-insensitively
    #[must_use]
    pub fn faq(&self, question: &str) -> Option<&str> {
        let wanted = question.trim();
        self.faqs
            .iter()
            .find(|f| f.question.eq_ignore_ascii_case(wanted))
            .map(|f| f.answer.as_str())
    }

    /// Document followed by the FAQ section, as injected into the prompt
    #[must_use]
    pub fn context(&self) -> String {
        let mut out = self.document.clone();
        if !self.faqs.is_empty() {
            out.push_str("\n\n## GST FAQs\n");
            for faq in &self.faqs {
                let _ = write!(out, "\nQ: {}\nA: {}\n", faq.question, faq.answer);
            }
        }
        out
    }
}

fn parse_faqs(content: &str) -> Result<Vec<Faq>> {
    let file: FaqFile = toml::from_str(content)?;
    Ok(file.faq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_knowledge_loads() {
        let kb = KnowledgeBase::embedded().unwrap();
        assert!(kb.document().starts_with("# IDMS ERP System Knowledge Base"));
        assert!(kb.faqs().len() >= 8);
    }

    #[test]
    fn test_faq_lookup_ignores_case() {
        let kb = KnowledgeBase::embedded().unwrap();
        let answer = kb.faq("what is gst?").unwrap();
        assert!(answer.contains("Goods and Services Tax"));
        assert!(kb.faq("What is VAT?").is_none());
    }

    #[test]
    fn test_context_includes_faqs() {
        let kb = KnowledgeBase::new(
            "doc",
            vec![Faq {
                question: "Q1?".to_string(),
                answer: "A1".to_string(),
            }],
        );
        let ctx = kb.context();
        assert!(ctx.starts_with("doc"));
        assert!(ctx.contains("## GST FAQs"));
        assert!(ctx.contains("Q: Q1?\nA: A1"));
    }
}
