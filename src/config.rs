//! Runtime configuration for the server and the client.
//!
//! Server settings come from command-line flags with `GALLERIST_*`
//! environment fallbacks. Client settings are plain defaults that callers
//! may override field by field.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::models::page::DEFAULT_PAGE_SIZE;

/// Look-ahead margin in pixels before a placeholder starts loading.
pub const DEFAULT_LOOKAHEAD_PX: f32 = 100.0;

/// How long an error banner stays visible.
pub const DEFAULT_BANNER_DURATION: Duration = Duration::from_secs(3);

/// Server settings.
#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    /// Directory whose subdirectories are served as folders
    #[arg(long, env = "GALLERIST_ROOT", default_value = "folders")]
    pub root: PathBuf,

    /// Address to listen on
    #[arg(long, env = "GALLERIST_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Shared secret accepted for the `user` account
    #[arg(long, env = "GALLERIST_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Page size used when a request does not specify one
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: u32,
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,
    /// Images requested per page.
    pub page_size: u32,
    /// How long a failure banner is shown.
    pub banner_duration: Duration,
    /// Viewport expansion along the scroll axis for lazy loading.
    pub lookahead_px: f32,
    /// Upper bound on concurrent image downloads.
    pub max_downloads: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            page_size: DEFAULT_PAGE_SIZE,
            banner_duration: DEFAULT_BANNER_DURATION,
            lookahead_px: DEFAULT_LOOKAHEAD_PX,
            max_downloads: 6,
        }
    }
}
