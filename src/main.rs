#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use codebuddy::auth::{GoogleOAuth, RedirectCapture, TokenStore};
use codebuddy::backends::BackendRegistry;
use codebuddy::config::Config;
use codebuddy::console::{Relay, RunState, TerminalSurface};
use codebuddy::documents::TabSet;
use codebuddy::languages::Language;
use codebuddy::storage::{self, DriveClient, LocalStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

/// `codebuddy` - a beginner-friendly code runner.
#[derive(Parser, Debug)]
#[command(name = "codebuddy")]
#[command(version)]
#[command(about = "Run beginner programs with an interactive console, store them locally or on Google Drive.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a source file with an interactive console
    Run {
        /// Source file to run
        file: PathBuf,
        /// Language id (detected from the extension when omitted)
        #[arg(short, long)]
        language: Option<Language>,
    },

    /// Create a new file from the language template
    New {
        /// Language id (javascript, typescript, python, c, cpp, html, css, json, markdown)
        language: Language,
        /// File name (defaults to untitled-N with the language extension)
        #[arg(short, long)]
        name: Option<String>,
        /// Directory to create the file in (defaults to the workspace)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// List supported languages
    Languages,

    /// List documents saved in the workspace
    Files {
        /// Directory to list (defaults to the workspace)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Check interpreters, the compile API and the Drive session
    Doctor,

    /// Google Drive storage
    Drive {
        #[command(subcommand)]
        drive_command: DriveCommands,
    },
}

#[derive(Subcommand, Debug)]
enum DriveCommands {
    /// Sign in with Google
    Login {
        /// Paste the redirect URL instead of listening on localhost
        #[arg(long)]
        no_browser: bool,
    },
    /// Revoke and forget the stored Google token
    Logout,
    /// Show the signed-in account
    Whoami,
    /// List documents in the Drive folder
    List,
    /// Upload a local file to the Drive folder
    Push {
        file: PathBuf,
    },
    /// Download a Drive document into the workspace
    Pull {
        /// Drive file id (see `drive list`)
        file_id: String,
        /// Output path (defaults to the workspace, using the Drive file name)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Delete a document from Drive
    Delete {
        file_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so program output stays clean; RUST_LOG overrides.
    let subscriber = fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::load_or_init()?;

    match cli.command {
        Commands::Run { file, language } => run_file(&config, &file, language).await,
        Commands::New {
            language,
            name,
            dir,
        } => new_file(&config, language, name, dir),
        Commands::Languages => {
            print_languages();
            Ok(())
        }
        Commands::Files { dir } => list_files(&config, dir),
        Commands::Doctor => {
            let registry = BackendRegistry::new(&config)?;
            let result = codebuddy::doctor::run(&config, &registry).await;
            registry.shutdown();
            result
        }
        Commands::Drive { drive_command } => handle_drive(&config, drive_command).await,
    }
}

// ── run ─────────────────────────────────────────────────────────────

async fn run_file(config: &Config, file: &Path, language: Option<Language>) -> Result<()> {
    let loaded = storage::local::open(file)?;
    let mut tabs = TabSet::new();
    let id = tabs.open(loaded.name, loaded.content, None);
    let mut document = tabs.get(id).context("opened document missing")?.clone();
    match language {
        Some(language) => document.language = language,
        None if Language::from_file_name(&document.name).is_none() => bail!(
            "Cannot detect the language of {}. Pass --language (supported: {})",
            file.display(),
            Language::ALL.map(Language::id).join(", ")
        ),
        None => {}
    }

    let registry = BackendRegistry::new(config)?;
    let surface = Arc::new(TerminalSurface::stdio());
    let input_wanted = surface.input_wanted();
    let relay = Relay::new(surface);

    let handle = relay.start(
        document.content,
        document.language,
        registry.backend_for(document.language),
    );
    let session = handle.session_id();
    tracing::debug!(%session, file = %file.display(), "cli.run");

    // Terminal lines are read on a plain thread so a pending read never
    // holds up shutdown.
    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let value = line.trim_end_matches(['\r', '\n']).to_string();
                    if line_tx.send(value).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let feeder_relay = relay.clone();
    let feeder = tokio::spawn(async move {
        while let Some(value) = line_rx.recv().await {
            loop {
                if feeder_relay.is_waiting_for_input() {
                    feeder_relay.submit_input(value);
                    break;
                }
                if feeder_relay.snapshot().state == RunState::Completed {
                    return;
                }
                tokio::select! {
                    () = input_wanted.notified() => {}
                    () = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        }
    });

    tokio::select! {
        () = handle.finished() => {}
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted");
            registry.shutdown();
        }
    }
    feeder.abort();
    registry.shutdown();
    println!();
    Ok(())
}

// ── new / languages ─────────────────────────────────────────────────

fn new_file(
    config: &Config,
    language: Language,
    name: Option<String>,
    dir: Option<PathBuf>,
) -> Result<()> {
    let mut tabs = TabSet::new();
    let id = tabs.create_with_language(language);
    if let Some(name) = name {
        tabs.rename(id, name);
    }
    let document = tabs.get(id).context("new document missing")?;

    let store = LocalStore::new(dir.unwrap_or_else(|| config.workspace_dir.clone()));
    let path = store.path_for(document);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    store.save(document)?;
    println!("Created {}", path.display());
    Ok(())
}

fn list_files(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let store = LocalStore::new(dir.unwrap_or_else(|| config.workspace_dir.clone()));
    let paths = store.list()?;
    if paths.is_empty() {
        println!("No documents in {}", store.root().display());
        return Ok(());
    }

    println!("{}", store.root().display());
    let mut tabs = TabSet::new();
    for path in paths {
        // Binary or unreadable files are not documents; skip them.
        let Ok(loaded) = storage::local::open(&path) else {
            continue;
        };
        let id = tabs.open(loaded.name, loaded.content, None);
        if let Some(document) = tabs.get(id) {
            println!(
                "  {:<32} {:<12} {:>6} lines {:>8} chars",
                document.name,
                document.language.label(),
                document.line_count(),
                document.char_count()
            );
        }
    }
    Ok(())
}

fn print_languages() {
    println!("{:<12} {:<12} {:<6} RUNS ON", "ID", "LABEL", "EXT");
    for language in Language::ALL {
        let runner = match language {
            Language::JavaScript | Language::TypeScript => "embedded QuickJS",
            Language::Python => "local interpreter",
            Language::C | Language::Cpp => "Judge0 (remote)",
            _ => "-",
        };
        println!(
            "{:<12} {:<12} {:<6} {runner}",
            language.id(),
            language.label(),
            language.extension()
        );
    }
}

// ── drive ───────────────────────────────────────────────────────────

fn signed_in_client(config: &Config) -> Result<(DriveClient, TokenStore)> {
    let store = TokenStore::new(config.token_path());
    let Some(token) = store.load_valid()? else {
        bail!("Not signed in to Google. Run `codebuddy drive login` first");
    };
    let client = DriveClient::new(
        &config.drive.api_base,
        &token.access_token,
        &config.drive.folder_name,
    )?
    .with_folder_cache(config.drive_state_path());
    Ok((client, store))
}

/// Drop the token when Drive rejected it, then pass the error on.
fn forget_rejected_token<T>(store: &TokenStore, result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        if storage::is_unauthorized(err) {
            store.clear()?;
        }
    }
    result
}

async fn handle_drive(config: &Config, command: DriveCommands) -> Result<()> {
    match command {
        DriveCommands::Login { no_browser } => {
            let oauth = GoogleOAuth::new(&config.drive)?;
            let store = TokenStore::new(config.token_path());
            let capture = if no_browser {
                RedirectCapture::Paste
            } else {
                RedirectCapture::Loopback
            };
            let token = oauth.sign_in(&store, capture).await?;
            println!("  Signed in. Token valid for {}s.", token.remaining_secs());
            Ok(())
        }
        DriveCommands::Logout => {
            let oauth = GoogleOAuth::new(&config.drive)?;
            let store = TokenStore::new(config.token_path());
            if oauth.sign_out(&store).await? {
                println!("Signed out.");
            } else {
                println!("Not signed in.");
            }
            Ok(())
        }
        DriveCommands::Whoami => {
            let (client, store) = signed_in_client(config)?;
            let info = forget_rejected_token(&store, client.user_info().await)?;
            println!(
                "{} <{}>",
                info.name.as_deref().unwrap_or("(no name)"),
                info.email.as_deref().unwrap_or("no email")
            );
            Ok(())
        }
        DriveCommands::List => {
            let (client, store) = signed_in_client(config)?;
            let files = forget_rejected_token(&store, client.list_files().await)?;
            if files.is_empty() {
                println!("No documents in the {} folder.", config.drive.folder_name);
            }
            for file in files {
                println!("{}  {}", file.id, file.name);
            }
            Ok(())
        }
        DriveCommands::Push { file } => {
            let (client, store) = signed_in_client(config)?;
            let loaded = storage::local::open(&file)?;
            let mut tabs = TabSet::new();
            let id = tabs.open(loaded.name, loaded.content, None);
            let document = tabs.get(id).context("opened document missing")?;
            let file_name = document.file_name();

            let uploaded = forget_rejected_token(
                &store,
                client.upload(&file_name, &document.content).await,
            )?;
            tabs.mark_saved(id, Some(uploaded.id.clone()));
            println!(
                "Saved \"{}\" to Google Drive",
                uploaded.name.as_deref().unwrap_or(&file_name)
            );
            println!("  File ID: {}", uploaded.id);
            if let Some(link) = uploaded.web_view_link {
                println!("  View: {link}");
            }
            Ok(())
        }
        DriveCommands::Pull { file_id, out } => {
            let (client, store) = signed_in_client(config)?;
            let content = forget_rejected_token(&store, client.download(&file_id).await)?;

            let name = forget_rejected_token(&store, client.list_files().await)?
                .into_iter()
                .find(|f| f.id == file_id)
                .map(|f| f.name)
                .unwrap_or_else(|| format!("{file_id}.txt"));

            let mut tabs = TabSet::new();
            let id = tabs.open(name, content, Some(file_id));
            let document = tabs.get(id).context("downloaded document missing")?;
            let path = match out {
                Some(path) => {
                    storage::local::save_to(&path, document)?;
                    path
                }
                None => LocalStore::new(config.workspace_dir.clone()).save(document)?,
            };
            println!("Downloaded to {} ({})", path.display(), document.language.label());
            Ok(())
        }
        DriveCommands::Delete { file_id } => {
            let (client, store) = signed_in_client(config)?;
            forget_rejected_token(&store, client.delete(&file_id).await)?;
            println!("File deleted from Drive.");
            Ok(())
        }
    }
}
