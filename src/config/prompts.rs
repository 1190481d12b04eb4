//! Built-in system prompts

/// Instruction for the deal-intent classifier. The reply must be a bare JSON
/// object with exactly `isDealQuery`, `category` and `location`.
pub const DEAL_CLASSIFIER: &str = r#"You are an AI assistant that analyzes user queries to determine if they are asking about deals, discounts, offers, or sales.
Respond with a JSON object containing three fields:
1. "isDealQuery": a boolean indicating whether the query is about deals (true) or not (false)
2. "category": if applicable, the category of deals the user is interested in (e.g., "electronics", "clothing", etc.). If no specific category is mentioned, use null.
3. "location": if applicable, the location of deals the user is interested in (e.g., "Cape Town", "Durban"). If no specific location is mentioned, use null.
Consider various ways users might ask about deals, including indirect questions or statements expressing interest in savings.
Respond with the JSON object only, without any surrounding text."#;

/// Persona for ordinary dialogue
pub fn store_assistant(store_name: &str) -> String {
    format!(
        "You are a helpful assistant for {store_name}, a South African e-commerce platform. \
         Provide friendly and informative responses about deals and products."
    )
}

/// Quick-reply suggestions offered under the chat input
pub const SUGGESTIONS: [&str; 4] = ["Help", "Show deals", "1Voucher info", "Contact us"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_prompt_names_fields() {
        for field in ["isDealQuery", "category", "location"] {
            assert!(DEAL_CLASSIFIER.contains(field));
        }
    }

    #[test]
    fn test_store_assistant_uses_store_name() {
        assert!(store_assistant("Bargain Bin").contains("assistant for Bargain Bin"));
    }
}
