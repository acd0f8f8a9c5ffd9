//! Conversational retrieval over one session's index
//!
//! Lifecycle: construct, `load_retriever` to bind a persisted session index
//! with MMR parameters, then `invoke` once per user message. History is
//! supplied by the caller and appended by the caller after the answer
//! returns; `invoke` mutates no session state and is safe to retry.

use std::sync::Arc;

use crate::index::{Candidate, IndexError, SessionIndex, VectorIndexManager};
use crate::llm::{GenerationRequest, LlmProvider};
use crate::retrieval::prompts;
use crate::retrieval::{mmr_select, MmrParams, RetrievalError};
use crate::session::ChatMessage;

/// Returned when the model produces an empty answer
const NO_ANSWER: &str = "no answer generated.";

/// Bounds applied while assembling the answer prompt
#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    /// Maximum characters of chunk text included as context
    pub max_context_chars: usize,
    /// Number of most recent history messages passed to the model
    pub history_window: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_context_chars: 8000,
            history_window: 8,
        }
    }
}

struct BoundRetriever {
    index: SessionIndex,
    params: MmrParams,
}

/// Conversational retrieval orchestrator
pub struct ConversationalRetriever {
    manager: Arc<VectorIndexManager>,
    llm: Arc<dyn LlmProvider>,
    limits: ContextLimits,
    bound: Option<BoundRetriever>,
}

impl ConversationalRetriever {
    pub fn new(
        manager: Arc<VectorIndexManager>,
        llm: Arc<dyn LlmProvider>,
        limits: ContextLimits,
    ) -> Self {
        Self {
            manager,
            llm,
            limits,
            bound: None,
        }
    }

    /// Load the session's persisted index and bind it with MMR parameters.
    ///
    /// Fails with [`RetrievalError::SessionNotFound`] when no index was ever
    /// persisted for the session, and with
    /// [`RetrievalError::InvalidParameter`] on bad MMR parameters.
    pub fn load_retriever(
        &mut self,
        session_id: &str,
        params: MmrParams,
    ) -> Result<(), RetrievalError> {
        params.validate()?;

        let index = self.manager.load(session_id).map_err(|e| match e {
            IndexError::NotFound { session_id, .. } => {
                RetrievalError::SessionNotFound { id: session_id }
            }
            other => RetrievalError::Index(other),
        })?;

        tracing::info!(
            session_id,
            entries = index.len(),
            k = params.k,
            fetch_k = params.fetch_k,
            lambda_mult = params.lambda_mult,
            "retriever loaded"
        );
        self.bound = Some(BoundRetriever { index, params });
        Ok(())
    }

    /// Whether `load_retriever` has succeeded on this instance
    pub fn is_loaded(&self) -> bool {
        self.bound.is_some()
    }

    /// Answer a user message against the bound session index.
    ///
    /// With non-empty history the message is first condensed into a
    /// standalone query; retrieval always runs against the standalone form.
    pub fn invoke(
        &self,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<String, RetrievalError> {
        let bound = self.bound.as_ref().ok_or(RetrievalError::NotInitialized)?;

        let recent = recent_history(history, self.limits.history_window);
        let standalone = self.standalone_query(message, recent)?;

        let query_vector = self
            .manager
            .embedder()
            .embed_query(&standalone)
            .map_err(|e| RetrievalError::Generation {
                stage: "query embedding",
                source: Box::new(e),
            })?;

        let pool = self
            .manager
            .search(&bound.index, &query_vector, bound.params.fetch_k)?;
        let picks = mmr_select(&pool, bound.params.k, bound.params.lambda_mult);
        let context = assemble_context(&pool, &picks, self.limits.max_context_chars);

        tracing::debug!(
            session_id = %bound.index.session_id(),
            pool = pool.len(),
            selected = picks.len(),
            context_chars = context.len(),
            "context assembled"
        );

        let request = GenerationRequest {
            system: prompts::context_qa(&context),
            history: recent.to_vec(),
            user: standalone,
        };
        let answer = self
            .llm
            .generate(&request)
            .map_err(|e| RetrievalError::Generation {
                stage: "answer synthesis",
                source: Box::new(e),
            })?;

        let answer = answer.trim();
        if answer.is_empty() {
            tracing::warn!(session_id = %bound.index.session_id(), "model returned empty answer");
            return Ok(NO_ANSWER.to_string());
        }
        Ok(answer.to_string())
    }

    /// Condense a follow-up message into a history-independent query. With
    /// empty history the message already stands alone.
    fn standalone_query(
        &self,
        message: &str,
        recent: &[ChatMessage],
    ) -> Result<String, RetrievalError> {
        if recent.is_empty() {
            return Ok(message.to_string());
        }

        let request = GenerationRequest {
            system: prompts::CONTEXTUALIZE_QUESTION.to_string(),
            history: recent.to_vec(),
            user: message.to_string(),
        };
        let rewritten = self
            .llm
            .generate(&request)
            .map_err(|e| RetrievalError::Generation {
                stage: "query reformulation",
                source: Box::new(e),
            })?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            Ok(message.to_string())
        } else {
            Ok(rewritten.to_string())
        }
    }
}

fn recent_history(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

/// Join selected chunk texts in MMR order, stopping once the character
/// budget is exceeded. The first selected chunk is always included.
fn assemble_context(pool: &[Candidate], picks: &[usize], max_chars: usize) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(picks.len());
    let mut total = 0usize;

    for &pick in picks {
        let text = pool[pick].chunk.text.as_str();
        let cost = text.len() + 2;
        if total + cost > max_chars && !parts.is_empty() {
            break;
        }
        parts.push(text);
        total += cost;
    }

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::Chunk;

    fn candidate(text: &str, score: f32) -> Candidate {
        Candidate {
            chunk: Chunk::new(text, "doc", 0, 0),
            vector: vec![1.0, 0.0],
            score,
        }
    }

    #[test]
    fn test_assemble_context_in_pick_order() {
        let pool = vec![
            candidate("first chunk", 0.9),
            candidate("second chunk", 0.8),
            candidate("third chunk", 0.7),
        ];
        let context = assemble_context(&pool, &[2, 0], 1000);
        assert_eq!(context, "third chunk\n\nfirst chunk");
    }

    #[test]
    fn test_assemble_context_respects_budget() {
        let pool = vec![
            candidate("aaaaaaaaaa", 0.9),
            candidate("bbbbbbbbbb", 0.8),
            candidate("cccccccccc", 0.7),
        ];
        let context = assemble_context(&pool, &[0, 1, 2], 25);
        assert_eq!(context, "aaaaaaaaaa\n\nbbbbbbbbbb");
    }

    #[test]
    fn test_assemble_context_always_includes_first() {
        let pool = vec![candidate("a chunk longer than the tiny budget", 0.9)];
        let context = assemble_context(&pool, &[0], 5);
        assert_eq!(context, "a chunk longer than the tiny budget");
    }

    #[test]
    fn test_recent_history_window() {
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::user(format!("message {}", i)))
            .collect();
        let recent = recent_history(&history, 4);
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].content, "message 6");

        assert_eq!(recent_history(&history, 20).len(), 10);
        assert!(recent_history(&[], 4).is_empty());
    }
}
