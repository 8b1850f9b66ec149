//! CLI module for LLM Dock
//!
//! Operator subcommands over the providers listed in the application
//! configuration:
//! - `providers`: list configured providers
//! - `probe`: send a connection test request
//! - `models`: list the models a provider offers
//! - `chat`: send a unary or streaming chat request
//! - `estimate`: pre-flight cost estimate

pub mod chat;
pub mod estimate;
pub mod models;
pub mod probe;
pub mod providers;

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::domain::LlmProvider;
use crate::infrastructure::llm::LlmProviderFactory;
use crate::infrastructure::logging;

/// LLM Dock - one chat contract over OpenAI, Anthropic and Google Gemini
#[derive(Parser)]
#[command(name = "llm-dock")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List configured providers
    Providers,

    /// Run a connection test against a provider
    Probe(probe::ProbeArgs),

    /// List the models a provider offers
    Models(models::ModelsArgs),

    /// Send a chat request
    Chat(chat::ChatArgs),

    /// Estimate the cost of a request without sending it
    Estimate(estimate::EstimateArgs),
}

/// Load `.env`, the application configuration and the log subscriber
fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging);

    Ok(config)
}

/// Build the provider configured under `id`
fn provider(config: &AppConfig, id: &str) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let provider_config = config
        .provider(id)
        .with_context(|| format!("No provider configured with id '{}'", id))?;

    Ok(LlmProviderFactory::create(provider_config)?)
}

fn format_cost(cost: Option<f64>) -> String {
    match cost {
        Some(cost) => format!("${:.6}", cost),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_command() {
        let cli = Cli::try_parse_from([
            "llm-dock",
            "chat",
            "openai-main",
            "--message",
            "Hi",
            "--system",
            "Be brief",
            "--max-tokens",
            "50",
            "--stream",
        ])
        .unwrap();

        match cli.command {
            Command::Chat(args) => {
                assert_eq!(args.provider_id, "openai-main");
                assert_eq!(args.message, "Hi");
                assert_eq!(args.system.as_deref(), Some("Be brief"));
                assert_eq!(args.max_tokens, Some(50));
                assert!(args.stream);
            }
            _ => panic!("expected chat command"),
        }
    }

    #[test]
    fn test_chat_requires_message() {
        assert!(Cli::try_parse_from(["llm-dock", "chat", "openai-main"]).is_err());
    }

    #[test]
    fn test_unknown_provider_id() {
        let err = provider(&AppConfig::default(), "missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_format_cost() {
        assert_eq!(format_cost(Some(0.0015)), "$0.001500");
        assert_eq!(format_cost(None), "n/a");
    }
}
