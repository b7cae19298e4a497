//! CLI text for answers, errors and the interactive banner.

use crate::retrieval::AnswerSource;

const SEPARATOR_WIDTH: usize = 60;

fn separator() -> String {
    "=".repeat(SEPARATOR_WIDTH)
}

/// Frame an answer with a header naming where it came from.
pub fn format_response(text: &str, source: AnswerSource, score: Option<f32>) -> String {
    let separator = separator();
    let header = header(source, score);
    [
        separator.as_str(),
        header.as_str(),
        separator.as_str(),
        "",
        text,
        "",
        separator.as_str(),
    ]
    .join("\n")
}

fn header(source: AnswerSource, score: Option<f32>) -> String {
    let score = score
        .map(|s| format!(" (relevance: {s:.2})"))
        .unwrap_or_default();

    match source {
        AnswerSource::Dense => format!("Recipe from your collection{score}"),
        AnswerSource::Sparse => format!("Recipe from your collection (sparse search){score}"),
        AnswerSource::Generated => "Generated recipe (no match found in your collection)".to_string(),
    }
}

pub fn format_error(message: &str) -> String {
    let separator = separator();
    format!("\n{separator}\nError: {message}\n{separator}\n")
}

pub fn format_welcome() -> String {
    let rule = "=".repeat(80);
    format!(
        "\n{rule}\n{:^80}\n{rule}\n\n\
         Ask me about recipes! I'll search your personal recipe collection first.\n\
         If no good match is found, I'll generate a recipe for you.\n\n\
         Examples:\n  \
         - \"Give me a good seafood recipe for a weeknight\"\n  \
         - \"Easy chicken dinner under 30 minutes\"\n  \
         - \"Vegetarian soup recipe\"\n\n\
         Type 'quit' or 'exit' to stop.\n{rule}\n",
        "Recipe Chatbot"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_response_dense_source() {
        let out = format_response("Try the shrimp.", AnswerSource::Dense, Some(0.853));
        assert!(out.contains("Recipe from your collection (relevance: 0.85)"));
        assert!(out.contains("Try the shrimp."));
        assert!(out.starts_with(&"=".repeat(60)));
    }

    #[test]
    fn test_format_response_dense_without_score() {
        let out = format_response("x", AnswerSource::Dense, None);
        assert!(out.contains("Recipe from your collection\n"));
        assert!(!out.contains("relevance"));
    }

    #[test]
    fn test_format_response_sparse_source() {
        let out = format_response("x", AnswerSource::Sparse, Some(0.2));
        assert!(out.contains("Recipe from your collection (sparse search) (relevance: 0.20)"));
    }

    #[test]
    fn test_format_response_generated_source() {
        let out = format_response("New recipe", AnswerSource::Generated, None);
        assert!(out.contains("Generated recipe (no match found in your collection)"));
    }

    #[test]
    fn test_format_error() {
        let out = format_error("index unreachable");
        assert!(out.contains("Error: index unreachable"));
    }

    #[test]
    fn test_format_welcome() {
        let out = format_welcome();
        assert!(out.contains("Recipe Chatbot"));
        assert!(out.contains("'quit'"));
    }
}
