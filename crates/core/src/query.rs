use crate::prompt::build_rewrite_prompt;
use crate::traits::CompletionProvider;
use crate::ConversationTurn;
use std::sync::Arc;
use tracing::{debug, warn};

/// Rewrites follow-up questions into standalone search queries.
pub struct QueryTransformer<C: ?Sized> {
    completion: Arc<C>,
}

impl<C> QueryTransformer<C>
where
    C: CompletionProvider + ?Sized,
{
    pub fn new(completion: Arc<C>) -> Self {
        Self { completion }
    }

    /// Never fails: without history, or when the provider errors or returns
    /// nothing, the original query comes back unchanged.
    pub async fn transform(&self, query: &str, history: &[ConversationTurn]) -> String {
        if history.is_empty() {
            return query.to_string();
        }

        let prompt = build_rewrite_prompt(query, history);
        match self.completion.complete(&prompt).await {
            Ok(rewritten) => {
                let rewritten = rewritten.trim();
                if rewritten.is_empty() {
                    return query.to_string();
                }
                debug!(original = query, rewritten, "query rewritten from history");
                rewritten.to_string()
            }
            Err(error) => {
                warn!(%error, "query rewrite failed, using the original query");
                query.to_string()
            }
        }
    }
}
