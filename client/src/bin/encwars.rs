//! Operator CLI for encrypted wars.
//!
//! Usage:
//!   encwars --config player.yaml start
//!   encwars --config player.yaml play --card 1
//!   encwars --config player.yaml cards

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commonware_utils::hex;
use encwars_client::{
    config::{Config, ValidatedConfig},
    Client, Decryptor, Game, HttpOracle, LocalCredential, Reveal, RetryPolicy,
};
use encwars_types::Event;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(author, version, about = "Play encrypted wars against a ledger")]
struct Args {
    /// Path to the YAML config file.
    #[arg(short, long)]
    config: PathBuf,

    /// Overrides `ledger_url` from the config file.
    #[arg(long)]
    ledger_url: Option<String>,

    /// Overrides `oracle_url` from the config file.
    #[arg(long)]
    oracle_url: Option<String>,

    /// Overrides `log_level` from the config file.
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Print the ledger address.
    Address,
    /// Start (or restart) a game.
    Start,
    /// Play one of your cards.
    Play {
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
        card: u8,
    },
    /// Reveal your cards.
    Cards,
    /// Reveal the system card of a played round.
    System {
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
        round: u8,
    },
    /// Reveal your score.
    Score,
    /// Print rounds played, used cards and whether a game is running.
    Meta,
}

fn load_config(args: &Args) -> Result<ValidatedConfig> {
    let contents = std::fs::read_to_string(&args.config)
        .with_context(|| format!("Could not read config file {}", args.config.display()))?;
    let mut config: Config =
        serde_yaml::from_str(&contents).context("Could not parse config file")?;
    if let Some(ledger_url) = &args.ledger_url {
        config.ledger_url = ledger_url.clone();
    }
    if let Some(oracle_url) = &args.oracle_url {
        config.oracle_url = Some(oracle_url.clone());
    }
    if let Some(log_level) = &args.log_level {
        config.log_level = log_level.clone();
    }
    debug!(config = ?config.redacted_debug(), "loaded config");
    Ok(config.validate()?)
}

fn describe(reveal: &Reveal) -> String {
    match reveal {
        Reveal::Unset => "unavailable (start a game first)".to_string(),
        Reveal::Value { handle, cleartext } => format!("{cleartext} (handle {handle})"),
    }
}

fn print_events(events: &[Event]) {
    for event in events {
        match event {
            Event::GameStarted { owner } => println!("game started for {}", hex(owner.as_ref())),
            Event::RoundPlayed {
                index,
                rounds_played,
                ..
            } => println!("played card {index} (round {rounds_played} of 3)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let retry_policy = RetryPolicy {
        max_attempts: config.max_attempts,
        ..RetryPolicy::default()
    };
    let client = Client::new(&config.ledger_url)?.with_retry_policy(retry_policy.clone());
    if args.command == Command::Address {
        println!("{}", hex(client.address().await?.as_ref()));
        return Ok(());
    }

    let contract = client.address().await?;
    let oracle = HttpOracle::new(&config.oracle_url)?;
    let decryptor = Decryptor::new(LocalCredential::new(config.signer), oracle, contract)
        .with_timeout(config.oracle_timeout)
        .with_retry_policy(retry_policy);
    let game = Game::new(client, decryptor);

    match args.command {
        Command::Address => {}
        Command::Start => {
            let events = game.start().await?;
            print_events(&events);
            println!("game ready: play a card with `play --card <0-2>`");
        }
        Command::Play { card } => {
            let outcome = game.play(card).await?;
            print_events(&outcome.events);
            match &outcome.score {
                Ok(reveal) => println!("score: {}", describe(reveal)),
                Err(err) => println!("score: unavailable ({err}); run `score` to retry"),
            }
            println!("reveal the system card with `system --round {card}`");
        }
        Command::Cards => {
            for (index, reveal) in game.cards().await?.iter().enumerate() {
                println!("card {index}: {}", describe(reveal));
            }
        }
        Command::System { round } => {
            let reveal = game.system_card(round).await?;
            match reveal {
                Reveal::Unset => println!("system card {round}: not drawn yet (play round {round})"),
                reveal => println!("system card {round}: {}", describe(&reveal)),
            }
        }
        Command::Score => {
            let reveal = game.score().await?;
            println!("score: {}", describe(&reveal));
        }
        Command::Meta => {
            let meta = game.meta().await?;
            println!(
                "rounds played: {}, used cards: {:?}, initialized: {}",
                meta.rounds_played, meta.used_cards, meta.initialized
            );
        }
    }
    Ok(())
}
