//! Answer synthesis: render retrieved chunks into a prompt and ask the model.

use std::sync::Arc;

use tracing::debug;

use crate::error::GenerationFailure;
use crate::generation::Generator;
use crate::models::{Query, RetrievedChunk};
use crate::prompt::PromptTemplate;

const UNKNOWN: &str = "unknown";

/// Formats chunks as numbered context blocks separated by a blank line:
///
/// ```text
/// Document 1 (from https://github.com/acme/widgets/docs/retry.md):
/// Retries use exponential backoff...
/// ```
///
/// Missing `repo_url` or `file_path` render as `unknown`. No chunks gives
/// an empty string.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "Document {} (from {}/{}):\n{}",
                i + 1,
                chunk.repo_url().unwrap_or(UNKNOWN),
                chunk.file_path().unwrap_or(UNKNOWN),
                chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct Synthesizer {
    generator: Arc<dyn Generator>,
    template: PromptTemplate,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>, template: PromptTemplate) -> Self {
        Self {
            generator,
            template,
        }
    }

    pub fn prompt(&self, query: &Query, chunks: &[RetrievedChunk]) -> String {
        self.template.render(&build_context(chunks), query.as_str())
    }

    /// Makes exactly one model call.
    pub async fn synthesize(
        &self,
        query: &Query,
        chunks: &[RetrievedChunk],
    ) -> Result<String, GenerationFailure> {
        let prompt = self.prompt(query, chunks);
        debug!(
            model = self.generator.model_name(),
            chunks = chunks.len(),
            prompt_chars = prompt.len(),
            "invoking model"
        );
        let reply = self
            .generator
            .complete(&prompt)
            .await
            .map_err(GenerationFailure::Model)?;
        Ok(reply.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::ModelReply;
    use crate::validate::validate_str;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records prompts and answers with a canned reply.
    struct Recorder {
        reply: ModelReply,
        prompts: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(reply: ModelReply) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for Recorder {
        fn model_name(&self) -> &str {
            "recorder"
        }
        async fn complete(&self, prompt: &str) -> Result<ModelReply> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl Generator for Failing {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn complete(&self, _prompt: &str) -> Result<ModelReply> {
            Err(anyhow!("model overloaded"))
        }
    }

    fn chunks() -> Vec<RetrievedChunk> {
        vec![
            RetrievedChunk::new("Retries back off exponentially.")
                .with_source("https://github.com/acme/widgets", "docs/retry.md"),
            RetrievedChunk::new("Timeouts default to 30 seconds.")
                .with_source("https://github.com/acme/gadgets", "README.md"),
            RetrievedChunk::new("Orphaned text."),
        ]
    }

    #[test]
    fn test_context_block_format() {
        let context = build_context(&chunks()[..2]);
        assert_eq!(
            context,
            "Document 1 (from https://github.com/acme/widgets/docs/retry.md):\n\
             Retries back off exponentially.\n\n\
             Document 2 (from https://github.com/acme/gadgets/README.md):\n\
             Timeouts default to 30 seconds."
        );
    }

    #[test]
    fn test_missing_metadata_renders_unknown() {
        let context = build_context(&chunks()[2..]);
        assert_eq!(context, "Document 1 (from unknown/unknown):\nOrphaned text.");
    }

    #[test]
    fn test_context_includes_every_chunk_in_order() {
        let chunks: Vec<RetrievedChunk> = (0..8)
            .map(|i| {
                RetrievedChunk::new(format!("text-{i}"))
                    .with_source(format!("repo-{i}"), format!("path-{i}.md"))
            })
            .collect();
        for n in 0..=chunks.len() {
            let context = build_context(&chunks[..n]);
            let mut cursor = 0;
            for chunk in &chunks[..n] {
                for needle in [
                    chunk.repo_url().unwrap(),
                    chunk.file_path().unwrap(),
                    chunk.text.as_str(),
                ] {
                    let found = context[cursor..].find(needle).expect(needle);
                    cursor += found + needle.len();
                }
            }
        }
    }

    #[test]
    fn test_empty_context_prompt_still_has_question() {
        let synth = Synthesizer::new(
            Arc::new(Recorder::new(ModelReply::Text(String::new()))),
            PromptTemplate::default(),
        );
        let query = validate_str("Is there a changelog?").unwrap();
        let prompt = synth.prompt(&query, &[]);
        assert!(!prompt.is_empty());
        assert!(prompt.contains("Is there a changelog?"));
    }

    #[tokio::test]
    async fn test_single_model_call_with_rendered_prompt() {
        let recorder = Arc::new(Recorder::new(ModelReply::Text("Backoff.".into())));
        let template = PromptTemplate::parse("CTX[{context}] Q[{question}]").unwrap();
        let synth = Synthesizer::new(recorder.clone(), template);
        let query = validate_str("How do retries work?").unwrap();

        let answer = synth.synthesize(&query, &chunks()[..1]).await.unwrap();
        assert_eq!(answer, "Backoff.");

        let prompts = recorder.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(
            prompts[0],
            "CTX[Document 1 (from https://github.com/acme/widgets/docs/retry.md):\n\
             Retries back off exponentially.] Q[How do retries work?]"
        );
    }

    #[tokio::test]
    async fn test_raw_reply_is_coerced() {
        let synth = Synthesizer::new(
            Arc::new(Recorder::new(ModelReply::Raw(json!({"text": "odd"})))),
            PromptTemplate::default(),
        );
        let query = validate_str("q").unwrap();
        let answer = synth.synthesize(&query, &[]).await.unwrap();
        assert_eq!(answer, r#"{"text":"odd"}"#);
    }

    #[tokio::test]
    async fn test_model_failure() {
        let synth = Synthesizer::new(Arc::new(Failing), PromptTemplate::default());
        let query = validate_str("q").unwrap();
        match synth.synthesize(&query, &chunks()).await {
            Err(GenerationFailure::Model(e)) => assert_eq!(e.to_string(), "model overloaded"),
            Ok(answer) => panic!("unexpected answer {answer}"),
        }
    }
}
