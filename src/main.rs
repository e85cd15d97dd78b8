use std::sync::Arc;

use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use firechat::common::Identity;
use firechat::config::{self, AppConfig};
use firechat::network::{
    AvatarLoader, ChatClient, FirestoreStore, GoogleSession, MemorySession, MemoryStore,
    MessageStore, SessionProvider,
};
use firechat::ui::ChatApp;
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "firechat", version, about = "Real-time chat room on Firebase")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,

    /// Where sessions and messages live
    #[arg(long, value_enum, default_value_t = Backend::Firebase)]
    backend: Backend,

    /// Message poll interval in milliseconds (overrides the config file)
    #[arg(long, value_name = "MS")]
    poll_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Firebase Authentication + Cloud Firestore
    Firebase,
    /// In-process store with a single local user, for demos
    Local,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut app_config = config::load_config(&cli.config);
    app_config.apply_env();
    if let Some(poll_ms) = cli.poll_ms {
        app_config.poll_interval_ms = poll_ms;
    }

    let (session, store, avatars) = build_backend(cli.backend, &app_config)?;
    run_client(session, store, avatars).await?;
    Ok(())
}

type Services = (
    Arc<dyn SessionProvider>,
    Arc<dyn MessageStore>,
    Option<AvatarLoader>,
);

fn build_backend(backend: Backend, app_config: &AppConfig) -> Result<Services, config::ConfigError> {
    match backend {
        Backend::Firebase => {
            app_config.firebase.validate()?;
            let http = reqwest::Client::new();
            let session: Arc<dyn SessionProvider> =
                Arc::new(GoogleSession::new(http.clone(), app_config.firebase.clone()));
            let store: Arc<dyn MessageStore> = Arc::new(FirestoreStore::new(
                http.clone(),
                Arc::clone(&session),
                &app_config.firebase.project_id,
                app_config.poll_interval(),
            ));
            log::info!("Using Firebase project {}", app_config.firebase.project_id);
            Ok((session, store, Some(AvatarLoader::new(http))))
        }
        Backend::Local => {
            let identity = Identity {
                uid: "local".to_string(),
                display_name: Some(app_config.local_user.clone()),
                photo_url: None,
            };
            log::info!("Using in-process backend");
            let session: Arc<dyn SessionProvider> = Arc::new(MemorySession::new(identity));
            let store: Arc<dyn MessageStore> = Arc::new(MemoryStore::new());
            Ok((session, store, None))
        }
    }
}

async fn run_client(
    session: Arc<dyn SessionProvider>,
    store: Arc<dyn MessageStore>,
    avatars: Option<AvatarLoader>,
) -> Result<(), eframe::Error> {
    // UI -> backend
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // backend -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut client = ChatClient::new(session, store, event_tx, cmd_rx);
        if let Some(avatars) = avatars {
            client = client.with_avatars(avatars);
        }
        client.run().await;
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Firechat")
            .with_inner_size([900.0, 700.0]),
        ..Default::default()
    };
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Firechat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");
            Ok(Box::new(ChatApp::new(cc, cmd_tx.clone(), event_receiver)))
        }),
    )
}
