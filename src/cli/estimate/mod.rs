//! Estimate command - pre-flight cost estimate for a single message

use clap::Args;

use crate::domain::{ChatRequest, LlmProvider};

#[derive(Args, Clone, Debug)]
pub struct EstimateArgs {
    /// Provider id from the configuration
    pub provider_id: String,

    /// User message to estimate
    #[arg(short, long)]
    pub message: String,

    /// Output budget (falls back to the provider configuration)
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

pub async fn run(args: EstimateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let provider = super::provider(&config, &args.provider_id)?;

    println!("{}", estimate(provider.as_ref(), &args));

    Ok(())
}

fn estimate(provider: &dyn LlmProvider, args: &EstimateArgs) -> String {
    let mut builder = ChatRequest::builder().user(args.message.as_str());
    if let Some(max_tokens) = args.max_tokens {
        builder = builder.max_tokens(max_tokens);
    }
    let request = builder.build();

    match provider.estimate_cost(&request) {
        Some(cost) => format!(
            "Estimated cost: {} (~{} input tokens)",
            super::format_cost(Some(cost)),
            request.estimate_tokens()
        ),
        None => format!(
            "Cost tracking is not configured for provider '{}'",
            provider.config().id
        ),
    }
}
