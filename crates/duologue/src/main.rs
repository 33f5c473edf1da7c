//! duologue - let two AI models talk to each other
//!
//! Subcommands:
//! - `duologue` / `duologue run` - ask for consent, run the conversation, write the summary
//! - `duologue models` - list the models the configured credential can use
//! - `duologue config` - print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;

use duochat::{Speaker, TranscriptWriter};
use duoconf::DuoConfig;
use duologue::{
    backend_from_config, check_model_access, telemetry, Conversation, ConversationOutcome, Progress,
    Summarizer,
};

#[derive(Parser)]
#[command(name = "duologue")]
#[command(about = "Let two AI models talk to each other and keep the transcript")]
#[command(version)]
struct Cli {
    /// Config file to load instead of ./duologue.toml
    #[arg(short, long, global = true, env = "DUOLOGUE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the conversation (default)
    Run(RunArgs),

    /// List models the configured credential can use
    Models {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Override conversation.rounds
    #[arg(short, long)]
    rounds: Option<u32>,

    /// Skip the consent question
    #[arg(long)]
    no_consent: bool,

    /// Skip the final summary
    #[arg(long)]
    no_summary: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = DuoConfig::load_from(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Config => {
            print!("{}", config.to_toml());
            Ok(())
        }
        Commands::Models { json } => {
            let _telemetry = telemetry::init(&config.telemetry)?;
            models(&config, json).await
        }
        Commands::Run(args) => {
            let _telemetry = telemetry::init(&config.telemetry)?;
            run(config, args).await
        }
    }
}

async fn run(mut config: DuoConfig, args: RunArgs) -> Result<()> {
    if let Some(rounds) = args.rounds {
        config.conversation.rounds = rounds;
    }
    if args.no_consent {
        config.consent.enabled = false;
    }
    if args.no_summary {
        config.summary.enabled = false;
    }
    config.validate()?;

    let backend = backend_from_config(&config.backend)?;
    let label_a = config.conversation.speaker_a.label.clone();
    let label_b = config.conversation.speaker_b.label.clone();
    let writer = TranscriptWriter::new(config.output.log_path(), label_a.clone(), label_b.clone());

    println!(
        "{} {} rounds on {} ({})",
        "duologue:".bold(),
        config.conversation.rounds,
        config.backend.default_model.bright_yellow(),
        backend.name()
    );

    let mut conversation = Conversation::new(backend.clone(), &config).with_progress(move |event| {
        let label = |speaker: Speaker| match speaker {
            Speaker::A => label_a.as_str(),
            Speaker::B => label_b.as_str(),
        };
        match event {
            Progress::ConsentGiven { speaker } => {
                println!("{} agreed to the conversation", label(speaker).bright_green());
            }
            Progress::RoundStarted { round, total } => {
                println!("\n{}", format!("--- Round {}/{} ---", round, total).bright_blue());
            }
            Progress::TurnRecorded { turn, label } => {
                println!("{}\n{}\n", label.bold().cyan(), turn.text.trim());
            }
            Progress::ReplyFailed { speaker, error } => {
                println!("{} failed to reply: {}", label(speaker).bright_red(), error);
            }
        }
    });

    match conversation.run(&writer).await? {
        ConversationOutcome::Declined { speaker, reply } => {
            let label = match speaker {
                Speaker::A => &config.conversation.speaker_a.label,
                Speaker::B => &config.conversation.speaker_b.label,
            };
            println!("{} declined, nothing was recorded.", label.yellow());
            println!("  {}", reply.trim().dimmed());
            return Ok(());
        }
        ConversationOutcome::Completed {
            transcript,
            rounds_completed,
            stopped_early,
        } => {
            let ending = if stopped_early { " (stop phrase reached)" } else { "" };
            println!(
                "Conversation finished after {} rounds, {} turns{}.",
                rounds_completed,
                transcript.len(),
                ending
            );
            println!("Transcript saved to {}", writer.path().display().green());
        }
    }

    if config.summary.enabled {
        println!("Generating summary...");
        let summarizer = Summarizer::new(backend, &config);
        let path = summarizer
            .summarize(writer.path(), &config.output.summary_path())
            .await?;
        println!("Summary saved to {}", path.display().green());
    }

    Ok(())
}

async fn models(config: &DuoConfig, json: bool) -> Result<()> {
    let backend = backend_from_config(&config.backend)?;
    let report = check_model_access(backend.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} models visible to the {} backend ({} support generation):",
        report.models.len(),
        report.backend,
        report.generation_models().count()
    );
    for model in &report.models {
        let marker = if model.supports_generation {
            "+".green().to_string()
        } else {
            "-".dimmed().to_string()
        };
        match &model.display_name {
            Some(name) => println!("  {} {} {}", marker, model.id, format!("({})", name).dimmed()),
            None => println!("  {} {}", marker, model.id),
        }
    }

    match &report.suggested {
        Some(id) => println!(
            "\nSuggested: default_model = \"{}\" under [backend]",
            id.bright_yellow()
        ),
        None => println!("\n{}", "No model that supports generation was found.".yellow()),
    }

    Ok(())
}
