//! PhishGuard - Main Entry Point

use clap::Parser;
use phishguard::cli::{
    cmd_info, cmd_predict, cmd_predict_url, cmd_schema, cmd_train, cmd_validate, load_config, Cli, Commands,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishguard=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Train { data, train, test, artifact_dir, expected_accuracy, n_jobs, no_tracking } => {
            cmd_train(config, data, train, test, artifact_dir, expected_accuracy, n_jobs, no_tracking)?;
        }
        Commands::Validate { train, test, output } => {
            cmd_validate(config, &train, &test, &output)?;
        }
        Commands::Predict { data, model, output } => {
            cmd_predict(config, &data, model.as_deref(), &output)?;
        }
        Commands::PredictUrl { urls, features, model, threshold } => {
            cmd_predict_url(config, urls.as_deref(), &features, model.as_deref(), threshold)?;
        }
        Commands::Schema { output } => {
            cmd_schema(config, output.as_deref())?;
        }
        Commands::Info { data } => {
            cmd_info(config, &data)?;
        }
    }

    Ok(())
}
