//! LLM provider client and chat types.
//!
//! Two configured models are reachable through one client: the planning
//! model (next-action decisions) and the execution model (query writing,
//! answer extraction). See [`types::ModelRole`].

mod client;
mod types;

pub use client::LlmClient;
pub use types::{ChatRequest, ChatResponse, Choice, ChoiceMessage, Message, MessageRole, ModelRole, ResponseFormat, Usage};

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Try parsing as raw JSON first (fast path)
/// 2. Extract from ```json ... ``` code blocks
/// 3. Extract from ``` ... ``` code blocks
/// 4. Return error if none work
pub(crate) fn extract_json_from_completion(completion: &str) -> Result<&str, String> {
    // Fast path: raw JSON
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    // Try ```json ... ``` blocks
    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    // Try ``` ... ``` blocks
    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Strip markdown code fences from a completion that should be a bare query.
///
/// Models often wrap generated Cypher/SPARQL in ```cypher ... ``` fences;
/// the backends reject the fence characters.
pub(crate) fn strip_code_fences(completion: &str) -> String {
    let trimmed = completion.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw_object() {
        let result = extract_json_from_completion(r#"{"key": "value"}"#);
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_raw_array() {
        let result = extract_json_from_completion(r#"[1, 2, 3]"#);
        assert_eq!(result.unwrap(), r#"[1, 2, 3]"#);
    }

    #[test]
    fn test_extract_json_with_whitespace() {
        let result = extract_json_from_completion("  \n  {\"key\": \"value\"}  \n  ");
        assert_eq!(result.unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_from_json_code_block() {
        let input = "Here is the response:\n```json\n{\"result\": true}\n```\nDone.";
        let result = extract_json_from_completion(input);
        assert_eq!(result.unwrap(), r#"{"result": true}"#);
    }

    #[test]
    fn test_extract_json_from_plain_code_block() {
        let input = "Response:\n```\n{\"data\": 123}\n```";
        let result = extract_json_from_completion(input);
        assert_eq!(result.unwrap(), r#"{"data": 123}"#);
    }

    #[test]
    fn test_extract_json_empty_json_block() {
        let input = "```json\n\n```";
        let result = extract_json_from_completion(input);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("empty or malformed"));
    }

    #[test]
    fn test_extract_json_no_json_found() {
        let input = "This is just plain text without any JSON.";
        let result = extract_json_from_completion(input);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("No JSON found"));
    }

    #[test]
    fn test_strip_code_fences_bare_query() {
        assert_eq!(
            strip_code_fences("MATCH (n) RETURN n"),
            "MATCH (n) RETURN n"
        );
    }

    #[test]
    fn test_strip_code_fences_cypher_block() {
        let input = "```cypher\nMATCH (n)\nRETURN n\n```";
        assert_eq!(strip_code_fences(input), "MATCH (n)\nRETURN n");
    }

    #[test]
    fn test_strip_code_fences_plain_block() {
        let input = "```\nSELECT ?s WHERE { ?s ?p ?o }\n```";
        assert_eq!(strip_code_fences(input), "SELECT ?s WHERE { ?s ?p ?o }");
    }
}
