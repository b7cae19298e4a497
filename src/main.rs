use clap::Parser;
use inquire::error::InquireError;
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod config;
mod corpus;
mod format;
mod prompt;
mod providers;
mod retrieval;
#[cfg(test)]
mod tests;

use cli::{Command, RetrievalArgs};
use config::Config;
use format::{format_error, format_welcome};

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn chat(app: &app::App, retrieval: &retrieval::RetrievalConfig) -> anyhow::Result<()> {
    println!("{}", format_welcome());

    loop {
        let input = match inquire::Text::new("You:").prompt() {
            Ok(input) => input,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                println!("\nGoodbye!");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let query = input.trim();
        if query.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
            println!("\nGoodbye!");
            return Ok(());
        }

        match app.answer(query, retrieval) {
            Ok(answer) => println!("\n{answer}\n"),
            Err(err) => {
                log::error!("query failed: {err:#}");
                println!("{}", format_error(&format!("{err:#}")));
            }
        }
    }
}

fn retrieval_config(config: &Config, args: &RetrievalArgs) -> anyhow::Result<retrieval::RetrievalConfig> {
    args.apply(config.retrieval_config())
}

fn main() -> anyhow::Result<()> {
    init_logging();

    let args = cli::Args::parse();
    let config = Config::load_with(&Config::default_base_path()?)?;

    match args.command {
        Command::Ask { query, retrieval } => {
            let retrieval = retrieval_config(&config, &retrieval)?;
            let app = app::App::new(config)?;
            println!("{}", app.answer(&query, &retrieval)?);
        }

        Command::Chat { retrieval } => {
            let retrieval = retrieval_config(&config, &retrieval)?;
            let app = app::App::new(config)?;
            chat(&app, &retrieval)?;
        }

        Command::Upsert {} => {
            let upserted = app::upsert(&config)?;
            println!("{upserted} records upserted");
        }

        Command::Migrate { execute } => {
            app::migrate(&config, execute)?;
        }

        Command::Encode { text } => {
            let (encoder, _) = app::load_encoder(&config)?;
            let sparse = encoder.encode(&text);
            println!("{}", serde_json::to_string_pretty(&sparse)?);
        }
    }

    Ok(())
}
