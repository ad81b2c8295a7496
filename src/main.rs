use facevote::{
    common::{Config, DevMode},
    core::{AuthOutcome, VotingBooth},
    service::{digest_password, generate_key, AdminAuthenticator, Frame, HmacAdminAuthenticator, SourceOutcome},
    storage::{LedgerStore, VotingLedger},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "facevote")]
#[command(about = "Face-gated single-vote election ledger")]
struct Cli {
    /// Enable development mode (keeps the ledger and config under ./dev_data)
    #[arg(long, global = true)]
    dev: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage candidates
    Candidate {
        #[command(subcommand)]
        command: CandidateCommands,
    },
    /// Manage voters
    Voter {
        #[command(subcommand)]
        command: VoterCommands,
    },
    /// Register a voter from a face image
    Register {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Check which voter a face image belongs to
    Authenticate {
        #[arg(short, long)]
        image: PathBuf,
        /// Print the similarity to every registered voter
        #[arg(long)]
        show_scores: bool,
    },
    /// Authenticate with a face image and cast a vote
    Vote {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(short, long)]
        candidate: String,
    },
    /// Show tallies and percentages
    Results {
        #[arg(long)]
        json: bool,
    },
    /// Show registration and turnout counts
    Stats,
    /// Remove every candidate, voter and vote
    Clear {
        #[arg(long)]
        admin_password: Option<String>,
    },
    /// Print admin config lines for a password
    HashPassword {
        password: String,
    },
}

#[derive(Subcommand)]
enum CandidateCommands {
    Add {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        party: String,
        #[arg(long)]
        admin_password: Option<String>,
    },
    Remove {
        #[arg(long)]
        id: String,
        #[arg(long)]
        admin_password: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum VoterCommands {
    Remove {
        #[arg(long)]
        id: String,
        #[arg(long)]
        admin_password: Option<String>,
    },
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config_path = cli.config.clone().unwrap_or_else(|| dev_mode.config_file());
    let config = Config::load_or_default(&config_path)?;

    let store = LedgerStore::new_with_dev_mode(&dev_mode, &config)?;
    let fresh = !store.path().exists();
    let ledger = Arc::new(store.load().context("Failed to load ledger")?);
    if fresh {
        ledger.set_election_name(&config.election.name)?;
    }
    let booth = VotingBooth::from_config(&config, Arc::clone(&ledger));

    match cli.command {
        Commands::Candidate { command } => match command {
            CandidateCommands::Add { name, party, admin_password } => {
                require_admin(&config, admin_password.as_deref())?;
                let candidate = ledger.add_candidate(&name, &party)?;
                println!("Added candidate {}: {} ({})", candidate.id, candidate.name, candidate.party);
                store.save(&ledger)?;
            }
            CandidateCommands::Remove { id, admin_password } => {
                require_admin(&config, admin_password.as_deref())?;
                let removed = ledger.remove_candidate(&id)?;
                println!("Removed candidate {} and {} vote(s)",
                         removed.candidate.name, removed.removed_votes.len());
                for voter in &removed.reverted_voters {
                    println!("  voter {} may vote again", voter);
                }
                store.save(&ledger)?;
            }
            CandidateCommands::List => {
                for candidate in ledger.candidates()? {
                    println!("{:>4}  {:<24} {:<20} {}", candidate.id, candidate.name, candidate.party, candidate.vote_count);
                }
            }
        },
        Commands::Voter { command } => match command {
            VoterCommands::Remove { id, admin_password } => {
                require_admin(&config, admin_password.as_deref())?;
                let voter = ledger.remove_voter(&id)?;
                println!("Removed voter {} ({})", voter.id, voter.name);
                store.save(&ledger)?;
            }
            VoterCommands::List => {
                for voter in ledger.voters()? {
                    println!("{:>5}  {:<24} {:<32} {}",
                             voter.id, voter.name, voter.email,
                             if voter.has_voted { "voted" } else { "-" });
                }
            }
        },
        Commands::Register { name, email, image } => {
            let frame = load_frame(&image)?;
            let voter = booth.enroll(&name, &email, &frame)?;
            println!("Registered {} as voter {}", voter.name, voter.id);
            store.save(&ledger)?;
        }
        Commands::Authenticate { image, show_scores } => {
            let frame = load_frame(&image)?;
            if show_scores {
                for score in booth.scores(&frame)? {
                    println!("  {:>5}  {:.3}", score.identity, score.similarity);
                }
            }
            match booth.authenticate(&frame)? {
                AuthOutcome::Authenticated(session) => {
                    println!("Authenticated: {} ({}), similarity {:.3}",
                             session.name, session.voter_id, session.similarity);
                }
                AuthOutcome::NoMatch => println!("Authentication: FAILED"),
                AuthOutcome::Unavailable(reason) => println!("Authentication unavailable: {}", reason),
            }
        }
        Commands::Vote { image, candidate } => {
            let frame = load_frame(&image)?;
            let session = match booth.authenticate(&frame)? {
                AuthOutcome::Authenticated(session) => session,
                AuthOutcome::NoMatch => bail!("Face not recognised; no vote recorded"),
                AuthOutcome::Unavailable(reason) => bail!("Cannot authenticate: {}", reason),
            };
            let vote = booth.cast(&session, &candidate)?;
            println!("✓ Vote {} recorded for {}", vote.id, session.name);
            store.save(&ledger)?;
        }
        Commands::Results { json } => print_results(&ledger, json)?,
        Commands::Stats => {
            let stats = ledger.stats()?;
            println!("Registered: {}", stats.registered);
            println!("Voted:      {}", stats.voted);
            println!("Remaining:  {}", stats.remaining);
        }
        Commands::Clear { admin_password } => {
            require_admin(&config, admin_password.as_deref())?;
            ledger.clear()?;
            println!("Cleared all election data");
            store.save(&ledger)?;
        }
        Commands::HashPassword { password } => {
            let key = if config.admin.key.is_empty() { generate_key() } else { config.admin.key.clone() };
            println!("[admin]");
            println!("key = \"{}\"", key);
            println!("password_digest = \"{}\"", digest_password(&key, &password)?);
        }
    }

    Ok(())
}

fn load_frame(path: &Path) -> Result<Frame> {
    let image = image::open(path).with_context(|| format!("Failed to open image {}", path.display()))?;
    Ok(Frame::from_image(&image))
}

fn require_admin(config: &Config, password: Option<&str>) -> Result<()> {
    let auth = HmacAdminAuthenticator::from_config(&config.admin)?;
    match auth.verify(password.unwrap_or_default()) {
        SourceOutcome::Ready(true) => Ok(()),
        SourceOutcome::Ready(false) => bail!("Admin password rejected"),
        SourceOutcome::Unavailable(reason) => {
            tracing::warn!("Admin check skipped: {}", reason);
            Ok(())
        }
    }
}

fn print_results(ledger: &VotingLedger, json: bool) -> Result<()> {
    let results = ledger.get_results()?;
    let total = ledger.get_total_votes()?;
    let leader = ledger.leader()?;

    if json {
        let report = serde_json::json!({
            "election": ledger.election_name()?,
            "total_votes": total,
            "leader": leader.as_ref().map(|l| &l.id),
            "results": results,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", ledger.election_name()?);
    println!("Total votes: {}", total);
    for result in &results {
        println!("{:>4}  {:<24} {:<20} {:>5}  {:>5.1}%",
                 result.id, result.name, result.party, result.vote_count, result.percentage);
    }
    if let Some(leader) = leader {
        println!("Leading: {} ({:.1}%)", leader.name, leader.percentage);
    }
    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }
}
