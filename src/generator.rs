//! Remote generation through a chat-completion API.
//!
//! Sends one request to an OpenAI-compatible `chat/completions` endpoint
//! with a fixed system instruction and returns the Terraform code found in
//! the reply.
//!
//! # Failure handling
//!
//! Every failure is reported as a [`GenerateError`] so the caller can fall
//! back to a local template:
//! - no API key → [`GenerateError::MissingApiKey`], without any network I/O
//! - transport error → [`GenerateError::Transport`]
//! - non-2xx status → [`GenerateError::Status`]
//! - unexpected JSON shape → [`GenerateError::MalformedResponse`]
//! - reply without HCL blocks → [`GenerateError::NoCode`]
//!
//! There are no retries. A transient failure is handled exactly like a
//! permanent one.

use serde_json::Value;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::GenerateError;
use crate::hcl::Document;
use crate::tags::strip_fences;

/// System instruction sent with every request.
pub const SYSTEM_PROMPT: &str = r#"You are a Terraform expert. Generate AWS infrastructure code from a natural-language request.

REQUIREMENTS:
1. Return ONLY valid Terraform HCL code. No explanations, no markdown.
2. Use the AWS provider, version "~> 5.0", inside a terraform { required_providers { ... } } block.
3. Give every resource a tags map containing:
   - Name        = a short descriptive name
   - ManagedBy   = "promptinfra"
   - CreatedAt   = the current date (YYYY-MM-DD)
   - Environment = "development"
4. Prefer small, low-cost instance types and sizes.
5. Follow Terraform best practices."#;

/// Ask the completion service for Terraform matching `request`.
pub fn generate(
    request: &str,
    api_key: Option<&str>,
    config: &GeneratorConfig,
) -> Result<String, GenerateError> {
    let api_key = api_key.ok_or(GenerateError::MissingApiKey)?;

    let body = serde_json::json!({
        "model": config.model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": format!("Generate Terraform for: {}", request) },
        ],
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
    });

    debug!(endpoint = %config.endpoint, model = %config.model, "requesting completion");

    let client = reqwest::blocking::Client::new();
    let response = client
        .post(&config.endpoint)
        .bearer_auth(api_key)
        .json(&body)
        .send()?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        return Err(GenerateError::Status {
            status: status.as_u16(),
            body,
        });
    }

    let json: Value = response
        .json()
        .map_err(|e| GenerateError::MalformedResponse(e.to_string()))?;
    let content = parse_completion(&json)?;
    extract_code(content)
}

/// Pull `choices[0].message.content` out of a completion response.
fn parse_completion(json: &Value) -> Result<&str, GenerateError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            GenerateError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

/// Reduce a model reply to its Terraform code.
///
/// Fenced replies keep only the fenced content. Unfenced replies are cut to
/// the span between the first and last top-level block, which drops any
/// prose around the code.
pub fn extract_code(content: &str) -> Result<String, GenerateError> {
    let fenced = content.contains("```");
    let code = strip_fences(content);
    let doc = Document::parse(&code);
    let extent = doc.block_extent().ok_or(GenerateError::NoCode)?;
    if fenced {
        Ok(code)
    } else {
        Ok(code[extent].trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_fails_before_network() {
        let config = GeneratorConfig {
            // Nothing listens here; reaching the network would be a
            // transport error, not MissingApiKey.
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            ..GeneratorConfig::default()
        };
        let err = generate("Create a VPC", None, &config).unwrap_err();
        assert!(matches!(err, GenerateError::MissingApiKey));
    }

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "resource \"a\" \"b\" {}" } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "resource \"a\" \"b\" {}");

        let empty = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_completion(&empty),
            Err(GenerateError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_extract_fenced() {
        let reply = "Here you go:\n```hcl\n# network\nresource \"aws_vpc\" \"v\" {\n}\n```\nLet me know!";
        assert_eq!(
            extract_code(reply).unwrap(),
            "# network\nresource \"aws_vpc\" \"v\" {\n}"
        );
    }

    #[test]
    fn test_extract_unfenced_drops_prose() {
        let reply = "Sure, here is the configuration:\n\nresource \"aws_vpc\" \"v\" {\n  cidr_block = \"10.0.0.0/16\"\n}\n\nThis creates a VPC.";
        assert_eq!(
            extract_code(reply).unwrap(),
            "resource \"aws_vpc\" \"v\" {\n  cidr_block = \"10.0.0.0/16\"\n}"
        );
    }

    #[test]
    fn test_extract_refusal_is_no_code() {
        assert!(matches!(
            extract_code("I'm sorry, I can't help with that."),
            Err(GenerateError::NoCode)
        ));
        assert!(matches!(extract_code("```\n```"), Err(GenerateError::NoCode)));
    }
}
