mod ai;
mod config;
mod db;
mod discord;
mod leetcode;
mod models;
mod pipeline;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::ai::ExtractionClient;
use crate::config::Config;
use crate::db::Database;
use crate::discord::DiscordSender;
use crate::leetcode::LeetCodeClient;
use crate::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "roundz")]
#[command(about = "Interview experience ingestion - discover, extract, and publish candidate reports")]
struct Cli {
    /// Path to a JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Run the scraper on its fixed schedule
    Run {
        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,

        /// Override the number of pages per sweep
        #[arg(long)]
        pages: Option<usize>,

        /// Override the page size
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Fetch one post's detail page and print the extracted text
    Scrape {
        /// Post URL or numeric topic id
        target: String,
    },

    /// List recently persisted interviews
    List {
        /// Number of interviews to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            let db = Database::open(config.database_path.as_deref())?;
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Run {
            once,
            pages,
            page_size,
        } => {
            if let Some(pages) = pages {
                config.leetcode.max_pages = pages;
            }
            if let Some(page_size) = page_size {
                config.leetcode.page_size = page_size;
            }
            run_scheduler(&config, once)?;
        }

        Commands::Scrape { target } => {
            let client = LeetCodeClient::new(&config.leetcode)?;
            let url = match target.parse::<i64>() {
                Ok(topic_id) => LeetCodeClient::post_url(topic_id),
                Err(_) => target,
            };
            println!("Scraping {}", url);
            let text = client.fetch_url_content(&url);
            if text.is_empty() {
                println!("No content extracted.");
            } else {
                println!("\n{}", text);
            }
        }

        Commands::List { limit } => {
            let db = Database::open(config.database_path.as_deref())?;
            db.ensure_initialized()?;
            let interviews = db.recent_interviews(limit)?;
            if interviews.is_empty() {
                println!("No interviews found.");
            } else {
                println!(
                    "{:<10} {:<20} {:<34} {:<8} {:<9} {:>6} {:>6}",
                    "ID", "COMPANY", "TITLE", "DIFF", "STATUS", "ROUNDS", "RATING"
                );
                println!("{}", "-".repeat(99));
                for interview in interviews {
                    println!(
                        "{:<10} {:<20} {:<34} {:<8} {:<9} {:>6} {:>6.1}",
                        truncate(&interview.id, 8),
                        truncate(&interview.company_name, 18),
                        truncate(&interview.title, 32),
                        interview.difficulty,
                        interview.offer_status,
                        interview.no_of_rounds,
                        interview.overall_rating
                    );
                }
            }
        }
    }

    Ok(())
}

/// Supervisor loop: one bounded sweep, log its outcome, then always the same
/// fixed-interval wait. A failed sweep never takes the process down.
fn run_scheduler(config: &Config, once: bool) -> Result<()> {
    let db = Database::open(config.database_path.as_deref())?;
    db.ensure_initialized()?;

    let source = LeetCodeClient::new(&config.leetcode)?;
    let extractor = ExtractionClient::new(&config.anthropic)?;
    let notifier = DiscordSender::new(&config.discord)?;
    let pipeline = Pipeline::new(config, &db, &source, &extractor, &notifier);

    loop {
        info!("starting sweep");
        match pipeline.run_sweep() {
            Ok(stats) => info!(
                persisted = stats.persisted,
                skipped = stats.skipped,
                retried = stats.retried,
                "sweep complete"
            ),
            Err(e) => error!("sweep failed: {e:#}"),
        }

        if once {
            break;
        }

        info!(hours = config.scrape_interval_hours, "sleeping until next sweep");
        thread::sleep(Duration::from_secs(config.scrape_interval_hours * 3600));
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("exactly8", 8), "exactly8");
        assert_eq!(truncate("much longer string", 8), "much ...");
    }
}
