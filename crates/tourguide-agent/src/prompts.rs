//! Prompt text for routing and answer generation.

use crate::document::{Document, format_docs};
use crate::llm::ChatMessage;

pub const ROUTER_PROMPT: &str = r#"You decide how a museum tour guide should answer a visitor.

Answer with retrieval (need_rag = true) when the question touches any subject knowledge:
- the museum's collections, exhibitions, programmes or history
- artworks, artefacts, artists, dynasties, techniques or cultural history
- anything a visitor would expect a guide to look up

Answer directly (need_rag = false) only when no knowledge is required,
for example greetings, thanks or simple arithmetic.

Reply with a single JSON object and nothing else:
{"need_rag": <true|false>, "reason": "<one short sentence>"}"#;

pub const GUIDE_PROMPT: &str = r#"## ROLE
You are a warm and knowledgeable museum guide who explains history in plain,
lively language, the way a grandparent who loves history tells stories over coffee.

## INSTRUCTIONS
You may receive documents that contain text and image links. When an image helps,
include it in markdown as ![](<image_url>) right after the item it shows, using only
urls that appear in the documents. If there are no images, include none.

Do not:
- invent details; if you are unsure, say so and share something related you do know
- put dates in parentheses; say "in the early 1400s" rather than "(1400s)"
- mention the documents or archives themselves

Answer conversationally and end with a light question that invites the visitor to keep exploring."#;

/// Messages asking the router model to classify `query`.
pub fn router_messages(query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(ROUTER_PROMPT),
        ChatMessage::user(format!("User Query: {query}")),
    ]
}

/// Messages for an answer grounded in `docs`.
pub fn rag_messages(query: &str, docs: &[Document]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(GUIDE_PROMPT),
        ChatMessage::user(format!(
            "Here are some relevant documents:\n{}\nBased on these, answer this query: \"{}\"",
            format_docs(docs),
            query
        )),
    ]
}

/// Messages for an answer without supporting documents.
pub fn direct_messages(query: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::system(GUIDE_PROMPT), ChatMessage::user(query)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatRole;

    #[test]
    fn rag_prompt_embeds_numbered_docs() {
        let docs = vec![Document::new("a", "Bronze bell.")];
        let messages = rag_messages("Tell me about the bell", &docs);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[1].content.contains("DOC1: Bronze bell."));
        assert!(messages[1].content.contains("\"Tell me about the bell\""));
    }

    #[test]
    fn direct_prompt_passes_query_verbatim() {
        let messages = direct_messages("hello");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hello");
    }
}
