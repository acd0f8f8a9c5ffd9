//! Prompt text for reformulation and grounded answering

/// System instruction for condensing a follow-up message into a standalone
/// query. The model must not answer, only rewrite.
pub const CONTEXTUALIZE_QUESTION: &str = "Given a conversation history and the most recent user \
query, rewrite the query as a standalone question that makes sense without relying on the \
previous context. Do not provide an answer; only reformulate the question if necessary, \
otherwise return it unchanged.";

/// System instruction for answering from retrieved context.
pub fn context_qa(context: &str) -> String {
    format!(
        "You are an assistant that answers questions using the provided context. Rely only on \
         the retrieved information to form your response. If the answer is not found in the \
         context, respond with \"I don't know.\" Keep your answer concise, three sentences at \
         most.\n\n{}",
        context
    )
}
