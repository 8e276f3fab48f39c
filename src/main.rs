use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

mod avatar;
mod chat;
mod conversation;
mod credential;
mod emotion;
mod error;
mod markdown;
mod models;
mod persona;
mod repl;
mod session;
mod settings;
mod shell;
mod surface;

use avatar::{render, terminal_face, to_svg, AvatarInput, PointerOffset, PointerTracker, AVATAR_BOX};
use chat::ChatController;
use credential::{is_valid_key_format, CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use emotion::Emotion;
use models::GeminiConnector;
use repl::Repl;
use session::SessionClient;
use settings::{deploy_default_credential, resolve_effective_settings, EffectiveSettings, SettingsLayer};
use shell::{share_or_copy, InstallFlow, LauncherPrompt, SharePanel, TerminalShareTarget, DEPLOY_GUIDE};
use surface::TerminalSurface;

#[derive(Debug, Parser)]
#[command(name = "tien_nhan")]
#[command(about = "Đàm đạo cùng Ông Lão Tiên Nhân (Gemini)", long_about = None)]
struct Cli {
    /// SQLite URL of the credential store
    #[arg(long, global = true)]
    database_url: Option<String>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Public URL used by the share panel
    #[arg(long, global = true)]
    app_url: Option<String>,
    /// Keep the API key in memory only; nothing is written to disk
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Interactive chat (default)
    Chat,
    /// Manage the saved API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Print the share link and QR code URL
    Share,
    /// Print deployment instructions
    Deploy,
    /// Draw the avatar for a given state
    Avatar {
        #[arg(long, default_value = "neutral")]
        emotion: Emotion,
        #[arg(long)]
        loading: bool,
        #[arg(long)]
        streaming: bool,
        /// Pointer position in drawing units, e.g. `160,40`
        #[arg(long, value_parser = parse_point)]
        look_at: Option<(f32, f32)>,
        /// Frames to animate while the head turns toward the pointer
        #[arg(long, default_value_t = 1)]
        frames: u32,
        #[arg(long)]
        svg: bool,
    },
}

#[derive(Debug, Subcommand)]
enum KeyAction {
    /// Save a key; read from stdin when omitted
    Set { key: Option<String> },
    Remove,
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cli_layer = SettingsLayer {
        model: cli.model,
        base_url: cli.base_url,
        app_url: cli.app_url,
        database_url: cli.database_url,
    };
    let settings = resolve_effective_settings(&SettingsLayer::from_env(), &cli_layer);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(settings, cli.ephemeral).await?,
        Commands::Key { action } => run_key(settings, action).await?,
        Commands::Share => {
            let panel = SharePanel::new(&settings.app_url)?;
            println!("{}", panel.render());
            share_or_copy(&mut TerminalShareTarget::new(std::io::stdout()), &panel);
        }
        Commands::Deploy => println!("{DEPLOY_GUIDE}"),
        Commands::Avatar { emotion, loading, streaming, look_at, frames, svg } => {
            let target = look_at
                .map(|(x, y)| PointerOffset::from_client(x, y, AVATAR_BOX))
                .unwrap_or_default();
            let frames = frames.max(1);
            let mut tracker = PointerTracker::default();
            let pose_at = |pointer| render(&AvatarInput { emotion, loading, streaming, pointer, blinking: false });
            for frame in 1..frames {
                let pose = pose_at(tracker.update(target));
                if !svg {
                    println!("{frame:>3} {} pitch {:+.1} yaw {:+.1}", terminal_face(&pose), pose.head.rotate_x, pose.head.rotate_y);
                }
            }
            if frames == 1 {
                tracker.settle(target);
            } else {
                tracker.update(target);
            }
            let pose = pose_at(tracker.current());
            if svg {
                print!("{}", to_svg(&pose));
            } else {
                println!("{}", terminal_face(&pose));
                println!("{}", serde_json::to_string_pretty(&pose)?);
            }
        }
    }
    Ok(())
}

async fn run_chat(settings: EffectiveSettings, ephemeral: bool) -> anyhow::Result<()> {
    let store: Arc<dyn CredentialStore> = if ephemeral {
        Arc::new(MemoryCredentialStore::default())
    } else {
        Arc::new(SqliteCredentialStore::initialize(settings.database_url.clone()).await?)
    };
    let connector = Arc::new(GeminiConnector { base_url: settings.base_url.clone() });
    let sessions = SessionClient::new(
        connector,
        store.clone(),
        deploy_default_credential(),
        settings.model.clone(),
        persona::SYSTEM_INSTRUCTION,
        settings.model_params.clone(),
    );
    tracing::info!(model = %settings.model, base_url = %settings.base_url, "starting chat");

    let ansi = std::io::stdout().is_terminal();
    let echo_user = !std::io::stdin().is_terminal();
    let controller = ChatController::new(sessions, store, TerminalSurface::new(std::io::stdout(), ansi, echo_user));

    let mut install = InstallFlow::new(std::env::consts::OS);
    if let Some(prompt) = LauncherPrompt::detect() {
        install.capture(Box::new(prompt));
    }
    let share = SharePanel::new(&settings.app_url)?;

    let mut repl = Repl::new(controller, install, share, std::io::stdout());
    repl.run(BufReader::new(tokio::io::stdin())).await
}

async fn run_key(settings: EffectiveSettings, action: KeyAction) -> anyhow::Result<()> {
    let store = SqliteCredentialStore::initialize(settings.database_url).await?;
    match action {
        KeyAction::Set { key } => {
            let key = match key {
                Some(k) => k,
                None => BufReader::new(tokio::io::stdin()).lines().next_line().await?.unwrap_or_default(),
            };
            if !is_valid_key_format(&key) {
                anyhow::bail!("key must start with AIza and be longer than 20 characters");
            }
            store.save(&key).await?;
            tracing::info!("credential saved");
            println!("Đã lưu Linh Phù.");
        }
        KeyAction::Remove => {
            if store.remove().await? {
                tracing::info!("credential removed");
                println!("Đã xóa Linh Phù.");
            } else {
                println!("Không có Linh Phù nào để xóa.");
            }
        }
        KeyAction::Status => match store.load().await? {
            Some(key) => println!("Linh Phù đã lưu: {}", mask(&key)),
            None if deploy_default_credential().is_some() => println!("Dùng Linh Phù của bản deploy."),
            None => println!("Chưa có Linh Phù."),
        },
    }
    Ok(())
}

fn parse_point(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got `{s}`"))?;
    let num = |v: &str| v.trim().parse::<f32>().map_err(|e| format!("`{v}`: {e}"));
    Ok((num(x)?, num(y)?))
}

fn mask(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("AIza…{tail}")
}
