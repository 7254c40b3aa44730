use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use itertools::Itertools;
use tracing::{info, warn};

use qr_attendance::client::AttendanceClient;
use qr_attendance::config::Config;
use qr_attendance::init_tracing::{init_tracing, shutdown_tracing};
use qr_attendance::response::{summarize, ScanResponse};
use qr_attendance::roster::{day_key, entries_for_day, today, AttendanceSummary};
use qr_attendance::settings::SettingsStore;
use qr_attendance::state::AppState;
use qr_attendance::{export, normalize, ScanPayload};

#[derive(Parser)]
#[command(name = "qr-attendance")]
#[command(about = "Mark attendance from QR codes against an attendance server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the attendance server
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },

    /// Upload a photo of a QR code for the server to decode
    Scan {
        /// Path to the image file
        image: Utf8PathBuf,
    },

    /// Mark attendance from the decoded text of a QR code
    Mark {
        /// Decoded QR text: JSON, or regno,name,designation,department,year
        text: String,
    },

    /// Print the payload a QR text would be sent as, without contacting the server
    Normalize {
        /// Decoded QR text
        text: String,
    },

    /// Print how many people are marked for a day
    #[command(alias = "refresh")]
    Count {
        /// Day to count (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// List who is marked for a day
    Roster {
        /// Day to list (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Download a day's attendance as CSV
    Export {
        /// Day to export (YYYY-MM-DD), defaults to the server's today
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Directory to save into, defaults to the configured cache directory
        #[arg(short, long)]
        out: Option<Utf8PathBuf>,
    },
}

#[derive(Subcommand)]
enum ServerAction {
    /// Print the server in use
    Show,
    /// Save a new server base url
    Set { url: String },
    /// Forget the saved url and use the configured default
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose).context("Setting up logging")?;

    let result = run(cli.command).await;

    shutdown_tracing();
    result
}

async fn run(command: Commands) -> Result<()> {
    let config = Config::read().context("Loading configuration")?;

    match command {
        Commands::Normalize { text } => {
            let payload = normalize(&text);
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::Server { action } => {
            let mut state = load_state(&config).await?;
            let url = match action {
                ServerAction::Show => state.server_url(),
                ServerAction::Set { url } => state
                    .set_server_url(&url)
                    .await
                    .context("Could not save server URL")?,
                ServerAction::Reset => state
                    .reset_server_url(&config.server)
                    .await
                    .context("Could not reset server URL")?,
            };
            println!("{}", url);
        }
        Commands::Scan { image } => {
            let mut state = load_state(&config).await?;
            let client = client(&config, &state)?;
            let ticket = state.begin_request();
            let response = client.scan_image(&image).await?;
            state.finish_request(ticket, response);
            report(&client, state.last_result()).await;
        }
        Commands::Mark { text } => {
            let mut state = load_state(&config).await?;
            let client = client(&config, &state)?;
            let payload = normalize(&text);
            match &payload {
                ScanPayload::Structured(record) => info!("Marking {}", record),
                other => info!("Marking {} payload", other.kind()),
            }

            let ticket = state.begin_request();
            let response = client.mark_attendance(&payload).await?;
            state.finish_request(ticket, response);
            report(&client, state.last_result()).await;
        }
        Commands::Count { date } => {
            let state = load_state(&config).await?;
            let client = client(&config, &state)?;
            let summary = refresh_count(&client, date.unwrap_or_else(today)).await?;
            println!("{}", summary);
        }
        Commands::Roster { date } => {
            let state = load_state(&config).await?;
            let client = client(&config, &state)?;
            let day = day_key(date.unwrap_or_else(today));
            let payload = client
                .check_attendance()
                .await
                .context("Fetching attendance")?;

            let entries = entries_for_day(&payload, &day);
            println!("{}: {} present", day, entries.len());
            if !entries.is_empty() {
                println!("{}", entries.iter().map(|e| format!("  {}", e)).join("\n"));
            }
        }
        Commands::Export { date, out } => {
            let state = load_state(&config).await?;
            let client = client(&config, &state)?;
            let download = client.export_csv(date).await.context("Export failed")?;
            let dir = out.unwrap_or_else(|| config.export.cache_dir.clone());
            let file_name = export::local_file_name(&download, date.unwrap_or_else(today));
            let path = export::save_csv(&dir, &file_name, &download.csv).await?;
            println!("CSV saved to {}", path);
        }
    }

    Ok(())
}

async fn load_state(config: &Config) -> Result<AppState> {
    let store = SettingsStore::open(&config.storage)
        .await
        .context("Opening settings store")?;
    Ok(AppState::load(store, &config.server).await)
}

fn client(config: &Config, state: &AppState) -> Result<AttendanceClient> {
    AttendanceClient::new(&config.server, state.server_url().clone())
        .context("Building HTTP client")
}

async fn refresh_count(client: &AttendanceClient, date: NaiveDate) -> Result<AttendanceSummary> {
    let payload = client
        .check_attendance()
        .await
        .context("Fetching attendance")?;
    Ok(AttendanceSummary::from_payload(&payload, &day_key(date)))
}

async fn report(client: &AttendanceClient, response: Option<&ScanResponse>) {
    let Some(response) = response else {
        return;
    };

    println!("{}", summarize(response));
    if let Some(error) = &response.error {
        eprintln!("{}", error);
    }

    if response.is_success() {
        match refresh_count(client, today()).await {
            Ok(summary) => println!("{}", summary),
            Err(e) => warn!("Failed to refresh attendance count: {:#}", e),
        }
    }
}
