//! Prompts for answer generation, query rewriting and judging.

/// Collection of prompt templates. Placeholders are `{name}` and are
/// substituted with `str::replace`.
pub struct Prompts;

impl Prompts {
    /// Default QA prompt. Placeholders: `{context}`, `{question}`.
    pub fn qa_answer() -> &'static str {
        r#"Answer the question using only the information in the passages below.
If the passages do not contain the answer, say that you do not know.
Answer as briefly as possible.

Passages:
{context}

Question: {question}

Answer:"#
    }

    /// Ask for sentences that could contain the answer, with the answer masked.
    /// Placeholders: `{count}`, `{question}`.
    pub fn query_rewrite() -> &'static str {
        r#"You will receive a question. Come up with {count} different ways the sentence that contains the answer might look like.
You don't have to come up with an answer, and you can replace it with the word 'MASK' in each of the sentences.
Separate the sentences with a semicolon.

Example:
Q: Who was driving the vehicle?
A: MASK was driving the vehicle; The person behind the wheel was MASK; The person in the driver's seat was MASK; The car was driven by MASK; They were MASK's passengers;

Q: {question}
A:"#
    }

    /// Grade a produced answer against the accepted answers.
    /// Placeholders: `{question}`, `{ground_truths}`, `{answer}`.
    pub fn judge_answer() -> &'static str {
        r#"You are an expert judge grading an answer to a question about a document.

Question: {question}

Accepted answers:
{ground_truths}

Answer to grade:
{answer}

Rate how well the answer matches the accepted answers (1=wrong or unrelated, 5=fully correct).

Respond in JSON format:
{
    "score": <1-5>,
    "explanation": "<brief explanation>"
}

Respond with only the JSON, no other text."#
    }

    /// System prompt for the answering models.
    pub fn system_reader() -> &'static str {
        "You are a careful reader. You answer questions about documents using only the text you are given."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_carry_placeholders() {
        assert!(Prompts::qa_answer().contains("{context}"));
        assert!(Prompts::qa_answer().contains("{question}"));
        assert!(Prompts::query_rewrite().contains("{count}"));
        assert!(Prompts::judge_answer().contains("{ground_truths}"));
        assert!(!Prompts::system_reader().is_empty());
    }
}
