//! Probe command - runs a connection test against one provider

use clap::Args;

use crate::domain::LlmProvider;

#[derive(Args, Clone, Debug)]
pub struct ProbeArgs {
    /// Provider id from the configuration
    pub provider_id: String,
}

/// Print the connection test result as JSON
pub async fn run(args: ProbeArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let provider = super::provider(&config, &args.provider_id)?;

    let (json, success) = probe(provider.as_ref()).await?;
    println!("{}", json);

    if !success {
        anyhow::bail!("Connection test failed for provider '{}'", args.provider_id);
    }

    Ok(())
}

async fn probe(provider: &dyn LlmProvider) -> anyhow::Result<(String, bool)> {
    let result = provider.test_connection().await;
    Ok((serde_json::to_string_pretty(&result)?, result.success))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::MockLlmProvider;
    use crate::domain::{ChatResponse, LlmError};

    #[tokio::test]
    async fn test_probe_success_json() {
        let provider =
            MockLlmProvider::default().with_response(ChatResponse::new("Hi", "gpt-4", "Mock"));

        let (json, success) = probe(&provider).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(success);
        assert_eq!(value["success"], true);
        assert_eq!(value["message"], "Connection successful");
        assert_eq!(value["model"], "gpt-4");
    }

    #[tokio::test]
    async fn test_probe_failure_json() {
        let provider = MockLlmProvider::default()
            .with_error(LlmError::quota_exceeded("Mock", "Rate limit exceeded: slow down"));

        let (json, success) = probe(&provider).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(!success);
        assert_eq!(value["error_type"], "LLMQuotaExceededError");
        assert!(value.get("model").is_none());
    }
}
