//! Prompts sent to the chat model.

use crate::retrieval::RetrievalHit;

/// Hits included in the answer prompt
pub const MAX_PROMPT_RECIPES: usize = 3;

pub const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful recipe assistant. The user has a personal recipe collection,
and you help them find recipes that match their requests.

When presenting a recipe:
1. Start with a brief introduction explaining why this recipe matches their request
2. Present the full recipe with ingredients and instructions
3. If the recipe has a rating, mention it
4. Keep your response focused and practical

Do not add recipes or ingredients that aren't in the provided data.";

pub const GENERATE_SYSTEM_PROMPT: &str = "You are a helpful recipe assistant. When the user's personal recipe collection
doesn't have a suitable match, you generate a new recipe for them.

When generating a recipe:
1. Create a practical, easy-to-follow recipe that matches the user's request
2. Use common ingredients that are easy to find
3. Format with clear sections: Title, Ingredients (bulleted), Instructions (numbered)
4. Include approximate prep/cook time
5. Keep it realistic - don't suggest overly complex techniques

Be creative but practical.";

pub fn answer_user_prompt(query: &str, hits: &[RetrievalHit]) -> String {
    format!(
        "The user asked: \"{query}\"\n\n\
         Here are the matching recipes from their collection:\n\n\
         {}\n\n\
         Please present the best matching recipe to the user in a helpful way.",
        format_recipes(hits, MAX_PROMPT_RECIPES)
    )
}

pub fn generate_user_prompt(query: &str) -> String {
    format!(
        "The user asked: \"{query}\"\n\n\
         Unfortunately, their personal recipe collection doesn't have a suitable match.\n\
         Please generate a recipe that matches their request."
    )
}

/// Render the first `max_recipes` hits as prompt context.
///
/// Title falls back to the hit id; rating and content are skipped when absent.
pub fn format_recipes(hits: &[RetrievalHit], max_recipes: usize) -> String {
    hits.iter()
        .take(max_recipes)
        .enumerate()
        .map(|(i, hit)| {
            let mut block = format!(
                "--- Recipe {} (relevance score: {:.2}) ---\n",
                i + 1,
                hit.score()
            );

            let title = hit.field_str("title").unwrap_or(&hit.id);
            block.push_str(&format!("Title: {title}\n"));

            if let Some(rating) = hit.field_text("rating") {
                block.push_str(&format!("Rating: {rating}/10\n"));
            }

            if let Some(content) = hit.field_str("content") {
                block.push_str(&format!("\n{content}\n"));
            }

            block
        })
        .collect::<Vec<_>>()
        .join("\n")
}
