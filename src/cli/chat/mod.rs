//! Chat command - sends a unary or streaming chat request

use std::io::Write;

use clap::Args;
use futures::StreamExt;

use crate::domain::{ChatRequest, LlmProvider, Usage};

#[derive(Args, Clone, Debug)]
pub struct ChatArgs {
    /// Provider id from the configuration
    pub provider_id: String,

    /// User message
    #[arg(short, long)]
    pub message: String,

    /// Optional system prompt
    #[arg(long)]
    pub system: Option<String>,

    /// Model override
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f64>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print the response incrementally as it arrives
    #[arg(long)]
    pub stream: bool,
}

impl ChatArgs {
    fn to_request(&self) -> ChatRequest {
        let mut builder = ChatRequest::builder();

        if let Some(system) = &self.system {
            builder = builder.system(system.as_str());
        }
        builder = builder.user(self.message.as_str());

        if let Some(model) = &self.model {
            builder = builder.model(model.as_str());
        }
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.build()
    }
}

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let provider = super::provider(&config, &args.provider_id)?;

    let mut stdout = std::io::stdout();
    execute(provider.as_ref(), &args, &mut stdout).await
}

async fn execute<W: Write>(
    provider: &dyn LlmProvider,
    args: &ChatArgs,
    out: &mut W,
) -> anyhow::Result<()> {
    let request = args.to_request();

    if !args.stream {
        let response = provider.send_chat_request(&request).await?;
        writeln!(out, "{}", response.content)?;
        writeln!(
            out,
            "{}",
            summary(&response.model, &response.usage, response.cost, response.response_time_ms)
        )?;
        return Ok(());
    }

    let mut stream = provider.stream_chat_request(&request).await?;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;

        if chunk.is_final {
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                summary(
                    &chunk.model,
                    &chunk.usage.unwrap_or_default(),
                    chunk.cost,
                    chunk.response_time_ms.unwrap_or_default(),
                )
            )?;
        } else {
            write!(out, "{}", chunk.content)?;
            out.flush()?;
        }
    }

    Ok(())
}

fn summary(model: &str, usage: &Usage, cost: Option<f64>, response_time_ms: u64) -> String {
    format!(
        "--- model: {} | tokens: {} in / {} out ({} total) | cost: {} | {} ms",
        model,
        usage.input_tokens,
        usage.output_tokens,
        usage.total_tokens,
        super::format_cost(cost),
        response_time_ms
    )
}
