//! Models command - lists the models a provider offers

use clap::Args;

#[derive(Args, Clone, Debug)]
pub struct ModelsArgs {
    /// Provider id from the configuration
    pub provider_id: String,
}

pub async fn run(args: ModelsArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let provider = super::provider(&config, &args.provider_id)?;

    for model in provider.get_available_models().await? {
        println!("{}", model);
    }

    Ok(())
}
