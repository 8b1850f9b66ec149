//! Providers command - lists configured providers

use crate::config::AppConfig;
use crate::domain::ProviderConfig;

/// Print one line per configured provider
pub async fn run() -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    for line in render(&config) {
        println!("{}", line);
    }

    Ok(())
}

fn render(config: &AppConfig) -> Vec<String> {
    if config.providers.is_empty() {
        return vec!["No providers configured".to_string()];
    }

    config.providers.iter().map(describe).collect()
}

fn describe(provider: &ProviderConfig) -> String {
    let key = provider
        .api_key
        .as_ref()
        .map(|k| k.masked())
        .unwrap_or_else(|| "<none>".to_string());

    format!(
        "{}\t{} ({})\tmodel={}\tkey={}\tcost_tracking={}",
        provider.id,
        provider.display_name(),
        provider.kind,
        provider.default_model(),
        key,
        if provider.has_cost_tracking() { "yes" } else { "no" },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CostTable, ProviderKind};

    #[test]
    fn test_describe_masks_key() {
        let provider = ProviderConfig::new("main", ProviderKind::OpenAi)
            .with_api_key("sk-abcdefghijklmnop")
            .with_cost(CostTable::new(0.01, 0.03));

        let line = describe(&provider);

        assert!(line.starts_with("main\tOpenAI (openai)"));
        assert!(line.contains("model=gpt-4"));
        assert!(line.contains("cost_tracking=yes"));
        assert!(!line.contains("sk-abcdefghijklmnop"));
    }

    #[test]
    fn test_render_without_providers() {
        assert_eq!(render(&AppConfig::default()), vec!["No providers configured"]);
    }

    #[test]
    fn test_describe_without_key() {
        let provider = ProviderConfig::new("gemini", ProviderKind::Google);
        let line = describe(&provider);

        assert!(line.contains("key=<none>"));
        assert!(line.contains("cost_tracking=no"));
    }
}
