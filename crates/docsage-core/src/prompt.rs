//! Prompt templates with `{context}` and `{question}` slots.
//!
//! A template is parsed once into literal and slot segments, so rendering
//! is a single pass and braces inside the inserted text are never
//! interpreted. Literal braces are written `{{` and `}}`.

use thiserror::Error;

/// Default instructions sent to the model.
pub const DEFAULT_TEMPLATE: &str = "You are a documentation assistant for a software project. \
Answer the question using only the documentation excerpts below. \
If the excerpts do not contain the answer, say that the documentation does not cover it \
instead of guessing. Mention the file an answer comes from when it helps the reader.

Documentation:
{context}

Question: {question}

Answer:";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}} in prompt template")]
    UnknownSlot(String),
    #[error("unclosed '{{' at byte {0} in prompt template")]
    Unclosed(usize),
    #[error("unmatched '}}' at byte {0} in prompt template")]
    Unmatched(usize),
    #[error("prompt template must contain {{{0}}}")]
    MissingSlot(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Context,
    Question,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::Unmatched(pos)),
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(pos));
                    }
                    let slot = match name.trim() {
                        "context" => Slot::Context,
                        "question" => Slot::Question,
                        _ => return Err(TemplateError::UnknownSlot(name)),
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Slot(slot));
                }
                _ => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, name) in [(Slot::Context, "context"), (Slot::Question, "question")] {
            if !segments.contains(&Segment::Slot(slot)) {
                return Err(TemplateError::MissingSlot(name));
            }
        }
        Ok(Self { segments })
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(
            self.segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(text) => text.len(),
                    Segment::Slot(Slot::Context) => context.len(),
                    Segment::Slot(Slot::Question) => question.len(),
                })
                .sum(),
        );
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(Slot::Context) => out.push_str(context),
                Segment::Slot(Slot::Question) => out.push_str(question),
            }
        }
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        // The built-in template is covered by tests; fall back to a bare
        // layout rather than panic if it is ever edited into an invalid one.
        Self::parse(DEFAULT_TEMPLATE).unwrap_or_else(|_| Self {
            segments: vec![
                Segment::Slot(Slot::Context),
                Segment::Literal("\n\nQuestion: ".to_string()),
                Segment::Slot(Slot::Question),
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_parses() {
        assert!(PromptTemplate::parse(DEFAULT_TEMPLATE).is_ok());
        let rendered = PromptTemplate::default().render("CTX", "Q?");
        assert!(rendered.contains("CTX"));
        assert!(rendered.contains("Question: Q?"));
    }

    #[test]
    fn test_render_is_single_pass() {
        let template = PromptTemplate::parse("C={context} Q={question}").unwrap();
        let rendered = template.render("uses {question} literally", "why {context}?");
        assert_eq!(rendered, "C=uses {question} literally Q=why {context}?");
    }

    #[test]
    fn test_escaped_braces() {
        let template = PromptTemplate::parse("{{json}} {context}|{question}").unwrap();
        assert_eq!(template.render("a", "b"), "{json} a|b");
    }

    #[test]
    fn test_repeated_slots() {
        let template = PromptTemplate::parse("{question}\n{context}\n{question}").unwrap();
        assert_eq!(template.render("c", "q"), "q\nc\nq");
    }

    #[test]
    fn test_rejects_bad_templates() {
        assert_eq!(
            PromptTemplate::parse("{context}"),
            Err(TemplateError::MissingSlot("question"))
        );
        assert_eq!(
            PromptTemplate::parse("{question}"),
            Err(TemplateError::MissingSlot("context"))
        );
        assert_eq!(
            PromptTemplate::parse("{context} {question} {history}"),
            Err(TemplateError::UnknownSlot("history".to_string()))
        );
        assert_eq!(
            PromptTemplate::parse("{context} {question"),
            Err(TemplateError::Unclosed(10))
        );
        assert_eq!(
            PromptTemplate::parse("{context} } {question}"),
            Err(TemplateError::Unmatched(10))
        );
    }
}
