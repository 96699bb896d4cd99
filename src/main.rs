use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use gallerist::client::{
    CredentialStore, Credentials, GallerySession, ImageLoader, MemorySettingsStore,
    ScrollViewport, SlotState, SqliteSettingsStore, TransportClient,
};
use gallerist::config::{ClientConfig, ServerConfig};
use gallerist::error::ClientError;

#[derive(Debug, Parser)]
#[command(name = "gallerist", version, about = "Browse folders of images over HTTP")]
struct Cli {
    /// Settings database holding the saved endpoint and secret
    #[arg(long, global = true, env = "GALLERIST_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve a directory of folders
    Serve(ServerConfig),

    /// Check an endpoint and secret, then save them
    Connect {
        #[arg(long)]
        endpoint: String,
        #[arg(long, env = "GALLERIST_SECRET", hide_env_values = true)]
        secret: String,
    },

    /// List folders on the saved endpoint
    Folders {
        #[arg(long)]
        json: bool,
    },

    /// List one page of a folder
    Images {
        folder: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        page_size: Option<u32>,
        /// Download and decode every image on the page
        #[arg(long)]
        check: bool,
        #[arg(long)]
        json: bool,
    },

    /// Download and decode one image of a page, by position
    Open {
        folder: String,
        index: usize,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },

    /// Save one image to disk
    Download {
        folder: String,
        image: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gallerist=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::default();

    match cli.command {
        Command::Serve(server) => gallerist::server::serve(server).await,
        Command::Connect { endpoint, secret } => {
            connect(cli.settings.as_deref(), &endpoint, &secret, &config).await
        }
        Command::Folders { json } => {
            let mut session = open_session(cli.settings.as_deref(), config)?;
            let folders = session.refresh_folders().await.map_err(user_facing)?;
            if json {
                println!("{}", serde_json::json!({ "folders": folders }));
            } else {
                for folder in folders {
                    println!("{}", folder);
                }
            }
            Ok(())
        }
        Command::Images {
            folder,
            page,
            page_size,
            check,
            json,
        } => {
            let config = ClientConfig {
                page_size: page_size.unwrap_or(config.page_size).max(1),
                ..config
            };
            list_images(cli.settings.as_deref(), config, &folder, page, check, json).await
        }
        Command::Open {
            folder,
            index,
            page,
        } => {
            let mut session = open_session(cli.settings.as_deref(), config)?;
            session
                .load_page(&folder, page.max(1))
                .await
                .map_err(user_facing)?;
            match session.open_image(index).await.map_err(user_facing)? {
                Some(selected) => {
                    let (w, h) = selected.image.size();
                    println!("#{} {}x{}", selected.index, w, h);
                    Ok(())
                }
                None => bail!("No image #{} on page {} of {}", index, page, folder),
            }
        }
        Command::Download { folder, image, out } => {
            download(cli.settings.as_deref(), config, &folder, &image, &out).await
        }
    }
}

fn open_store(settings: Option<&Path>) -> Result<CredentialStore> {
    let backend = match settings {
        Some(path) => SqliteSettingsStore::open(path)?,
        None => SqliteSettingsStore::open_default()?,
    };
    Ok(CredentialStore::load(Box::new(backend))?)
}

fn open_session(settings: Option<&Path>, config: ClientConfig) -> Result<GallerySession> {
    let store = open_store(settings)?;
    if !store.is_configured() {
        bail!("No endpoint saved. Run `gallerist connect` first.");
    }
    let transport = TransportClient::new(store, &config)?;
    Ok(GallerySession::new(transport, config))
}

fn user_facing(err: ClientError) -> anyhow::Error {
    let message = err.kind().user_message();
    anyhow::Error::new(err).context(message)
}

async fn connect(
    settings: Option<&Path>,
    endpoint: &str,
    secret: &str,
    config: &ClientConfig,
) -> Result<()> {
    let candidate = Credentials::new(endpoint.trim(), secret);
    if !candidate.is_configured() {
        bail!("Both an endpoint and a secret are required");
    }

    let mut trial_store = CredentialStore::load(Box::new(MemorySettingsStore::new()))?;
    trial_store.update(&candidate)?;
    let trial = TransportClient::new(trial_store, config)?;
    if !trial.test_connection().await {
        bail!(
            "Could not connect to {}. Check the address and secret.",
            candidate.endpoint
        );
    }

    let transport = TransportClient::new(open_store(settings)?, config)?;
    let mut session = GallerySession::new(transport, config.clone());
    session.update_credentials(&candidate)?;
    info!(endpoint = %candidate.endpoint, "Saved credentials");
    println!("Connected to {}", candidate.endpoint);
    Ok(())
}

async fn list_images(
    settings: Option<&Path>,
    config: ClientConfig,
    folder: &str,
    page: u32,
    check: bool,
    json: bool,
) -> Result<()> {
    let max_downloads = config.max_downloads;
    let mut session = open_session(settings, config)?;
    session
        .load_page(folder, page.max(1))
        .await
        .map_err(user_facing)?;
    let Some(view) = session.view().cloned() else {
        return Ok(());
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "folderName": view.folder,
                "images": view.images,
                "pagination": view.pagination,
            })
        );
    } else {
        for url in &view.images {
            println!("{}", url);
        }
        if let Some(status) = session.status_line() {
            println!("{}", status);
        }
        println!(
            "Page {} of {}",
            view.pagination.page,
            view.pagination.total_pages.max(1)
        );
    }

    if check {
        check_page(&mut session, max_downloads).await;
    }
    Ok(())
}

/// Loads every slot of the current page and reports how many decoded.
async fn check_page(session: &mut GallerySession, max_downloads: usize) {
    let loader = ImageLoader::new(session.transport().clone(), max_downloads);
    let height = session.scheduler().content_height().max(1.0);
    let viewport = ScrollViewport::new(f32::MAX, height);

    let started = session.poll_viewport(&viewport, &loader);
    for _ in 0..started {
        let Some(outcome) = loader.next_result().await else {
            break;
        };
        session.apply_load(&outcome);
    }

    let [_, _, loaded, failed] = session.scheduler().counts();
    for slot in session.scheduler().slots() {
        match slot.state {
            SlotState::VisibleLoaded => {
                let (w, h) = slot.image_size.unwrap_or_default();
                println!("#{} ok {}x{}", slot.index, w, h);
            }
            SlotState::Failed => println!("#{} failed", slot.index),
            _ => {}
        }
    }
    println!("{} loaded, {} failed", loaded, failed);
}

async fn download(
    settings: Option<&Path>,
    config: ClientConfig,
    folder: &str,
    image: &str,
    out: &Path,
) -> Result<()> {
    let Some(file_name) = Path::new(image).file_name() else {
        bail!("Invalid image name: {}", image);
    };
    let mut session = open_session(settings, config)?;
    let url = session
        .transport()
        .image_url(folder, image)
        .map_err(user_facing)?;
    let bytes = session.download(&url).await.map_err(user_facing)?;

    tokio::fs::create_dir_all(out)
        .await
        .with_context(|| format!("Failed to create {:?}", out))?;
    let target = out.join(file_name);
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {:?}", target))?;
    println!("Saved {} bytes to {}", bytes.len(), target.display());
    Ok(())
}
