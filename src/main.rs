//! slack-export-enrich: add emails and profile pictures to a Slack export archive

use clap::{ArgAction, Parser, Subcommand};
use slack_export_enrich::config::{ArchiveConfig, ProfilePictureConfig, UsersApiConfig};
use slack_export_enrich::{Error, PictureFetcher, Result, RewriteSummary, UsersClient};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "slack-export-enrich")]
#[command(about = "Enrich a Slack export archive with user emails or profile pictures")]
#[command(version)]
struct Cli {
    /// Slack export archive to read
    #[arg(short, long = "input-archive", global = true)]
    input: Option<PathBuf>,

    /// Archive to write
    #[arg(short, long = "output-archive", global = true)]
    output: Option<PathBuf>,

    /// Log progress, retries and pacing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every user's email from the Slack API and add it to users.json
    FetchEmails {
        /// Slack API token. Can be obtained here: https://api.slack.com/docs/oauth-test-tokens
        #[arg(long, env = "SLACK_API_TOKEN", hide_env_values = true)]
        api_token: String,

        /// users.list page size (recommended 200, max 999)
        #[arg(long, default_value_t = 999, allow_negative_numbers = true)]
        users_limit: i64,

        /// Pace users.list requests to ~1 request/second to avoid rate limits
        #[arg(
            long = "users-pace-1rps",
            default_value_t = true,
            action = ArgAction::Set,
            num_args = 0..=1,
            default_missing_value = "true"
        )]
        users_pace_1rps: bool,
    },

    /// Download profile pictures and link them to user profiles
    FetchProfilePictures,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,slack_export_enrich=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn required_path(path: Option<PathBuf>, flag: &str) -> Result<PathBuf> {
    path.ok_or_else(|| Error::Config {
        message: format!("--{} is required", flag),
        key: Some(flag.replace('-', "_")),
    })
}

async fn run(cli: Cli) -> Result<RewriteSummary> {
    let archive = ArchiveConfig::new(
        required_path(cli.input, "input-archive")?,
        required_path(cli.output, "output-archive")?,
    );

    match cli.command {
        Command::FetchEmails {
            api_token,
            users_limit,
            users_pace_1rps,
        } => {
            let mut api = UsersApiConfig::with_token(api_token);
            api.page_size = users_limit;
            api.pace_requests = users_pace_1rps;
            let client = UsersClient::new(api)?;
            slack_export_enrich::fetch_emails(archive, &client).await
        }
        Command::FetchProfilePictures => {
            let fetcher = PictureFetcher::new(ProfilePictureConfig::default())?;
            slack_export_enrich::fetch_profile_pictures(archive, fetcher).await
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(summary) => {
            tracing::debug!(?summary, "done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
