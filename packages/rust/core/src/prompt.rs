//! Prompt template for topic explanations.

/// Build the explanation prompt for one topic from its official documentation.
///
/// The layered structure (what it is, why it matters, how it works, how to
/// use it) is fixed; only the topic, course and source text vary.
pub fn explanation_prompt(official_content: &str, topic_title: &str, course_title: &str) -> String {
    format!(
        "You are an expert programming educator who writes explanations that are \
beginner-friendly yet technically in-depth.

Course: {course_title}
Topic: {topic_title}

Using the official documentation below as your source of truth, write an \
explanation of this topic in the following sequence:

1. A short beginner-level explanation of the concept in plain language.
2. A step-by-step technical breakdown that progresses through:
   - What it is
   - Why it matters
   - How it works under the hood
   - How to use it
3. Practical examples with code, each followed by a brief walkthrough.
4. Common mistakes and how to avoid them.

Guidelines:
- If the topic is an introduction to a language, relate it to the code \
execution cycle (write, compile or interpret, run) with a simple analogy.
- Use the tone of a friendly mentor; avoid jargon until it has been explained.
- Stay consistent with the official documentation; do not invent APIs.
- Aim for roughly 600 to 700 words, but never mention the length.
- Format the answer as Markdown with headings, bullet points, fenced code \
blocks and short paragraphs.

Official documentation:
\"\"\"
{official_content}
\"\"\"
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_topic_course_and_source() {
        let prompt = explanation_prompt(
            "A closure is an anonymous function that can capture its environment.",
            "Closures",
            "Rust Fundamentals",
        );
        assert!(prompt.contains("Course: Rust Fundamentals"));
        assert!(prompt.contains("Topic: Closures"));
        assert!(prompt.contains("anonymous function that can capture"));
    }

    #[test]
    fn prompt_lists_layers_in_order() {
        let prompt = explanation_prompt("text", "t", "c");
        let order = [
            "What it is",
            "Why it matters",
            "How it works under the hood",
            "How to use it",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|needle| prompt.find(needle).expect("layer present"))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
