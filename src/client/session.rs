//! Client-side gallery state: current folder and page, the folder cache, the
//! render scheduler and the transient error banner.
//!
//! Listing loads are split into [`GallerySession::begin_load`],
//! [`GallerySession::fetch`] and [`GallerySession::apply`] so the network call
//! can run while the session keeps handling input. Every load bumps a
//! generation counter; a response is applied only if its ticket is still the
//! latest and the session has not been torn down.

use std::future::Future;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::credentials::Credentials;
use super::folder_cache::FolderCache;
use super::image_loader::{self, DecodedImage, ImageLoader, LoadOutcome};
use super::render::{GridLayout, RenderScheduler, ViewportProbe};
use super::transport::TransportClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorKind, StoreError};
use crate::models::{FolderPage, Pagination};

/// Identifies one listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub folder: String,
    pub page: u32,
    pub generation: u64,
}

/// Page currently on screen.
#[derive(Debug, Clone)]
pub struct FolderView {
    pub folder: String,
    /// Self-authenticating image URLs.
    pub images: Vec<String>,
    pub pagination: Pagination,
    /// Served from the folder cache without a network round trip.
    pub from_cache: bool,
}

/// Full-size image opened from the current page.
#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub index: usize,
    pub url: String,
    pub image: DecodedImage,
}

/// Failure message that hides itself after a fixed duration.
#[derive(Debug, Clone)]
pub struct ErrorBanner {
    pub kind: ErrorKind,
    pub message: &'static str,
    pub expires_at: Instant,
}

impl ErrorBanner {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

pub struct GallerySession {
    transport: TransportClient,
    config: ClientConfig,
    cache: FolderCache,
    scheduler: RenderScheduler,
    folders: Vec<String>,
    view: Option<FolderView>,
    selected: Option<SelectedImage>,
    generation: u64,
    mounted: bool,
    banner: Option<ErrorBanner>,
}

impl GallerySession {
    pub fn new(transport: TransportClient, config: ClientConfig) -> Self {
        let scheduler = RenderScheduler::with_margin(GridLayout::default(), config.lookahead_px);
        Self {
            transport,
            config,
            cache: FolderCache::new(),
            scheduler,
            folders: Vec::new(),
            view: None,
            selected: None,
            generation: 0,
            mounted: true,
            banner: None,
        }
    }

    pub fn with_layout(mut self, layout: GridLayout) -> Self {
        self.scheduler = RenderScheduler::with_margin(layout, self.config.lookahead_px);
        self
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    pub fn view(&self) -> Option<&FolderView> {
        self.view.as_ref()
    }

    pub fn selected(&self) -> Option<&SelectedImage> {
        self.selected.as_ref()
    }

    pub fn cache(&self) -> &FolderCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Persists new credentials. Cached pages carry URLs signed with the
    /// old secret, so the cache is emptied and listings in flight go stale.
    pub fn update_credentials(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        self.transport.update_credentials(credentials)?;
        self.cache.clear();
        self.generation = self.generation.wrapping_add(1);
        info!(endpoint = %credentials.endpoint, "Credentials updated");
        Ok(())
    }

    pub async fn refresh_folders(&mut self) -> Result<&[String], ClientError> {
        match self.transport.list_folders().await {
            Ok(folders) => {
                info!(count = folders.len(), "Loaded folders");
                self.folders = folders;
                Ok(&self.folders)
            }
            Err(e) => {
                self.show_error(&e);
                Err(e)
            }
        }
    }

    /// Shows the landing page of `folder`, from the cache when possible.
    pub async fn open_folder(&mut self, folder: &str) -> Result<(), ClientError> {
        if let Some(entry) = self.cache.get(folder).cloned() {
            debug!(folder, "Folder served from cache");
            // Invalidate any listing still in flight.
            self.generation = self.generation.wrapping_add(1);
            self.show(entry.folder_name, entry.images, entry.pagination, true);
            return Ok(());
        }
        self.load_page(folder, 1).await
    }

    /// Advances one page. Returns false if already on the last page.
    pub async fn next_page(&mut self) -> Result<bool, ClientError> {
        let Some(view) = &self.view else {
            return Ok(false);
        };
        if !view.pagination.has_next() {
            return Ok(false);
        }
        let (folder, page) = (view.folder.clone(), view.pagination.page + 1);
        self.load_page(&folder, page).await.map(|_| true)
    }

    /// Goes back one page. Returns false if already on the first page.
    pub async fn previous_page(&mut self) -> Result<bool, ClientError> {
        let Some(view) = &self.view else {
            return Ok(false);
        };
        if !view.pagination.has_previous() {
            return Ok(false);
        }
        let (folder, page) = (view.folder.clone(), view.pagination.page - 1);
        self.load_page(&folder, page).await.map(|_| true)
    }

    pub async fn load_page(&mut self, folder: &str, page: u32) -> Result<(), ClientError> {
        let ticket = self.begin_load(folder, page);
        let result = self.fetch(&ticket).await;
        self.apply(ticket, result).map(|_| ())
    }

    /// Starts a listing load. Any earlier ticket becomes stale.
    pub fn begin_load(&mut self, folder: &str, page: u32) -> LoadTicket {
        self.generation = self.generation.wrapping_add(1);
        LoadTicket {
            folder: folder.to_string(),
            page,
            generation: self.generation,
        }
    }

    /// Network half of a load. Borrows nothing from the session.
    pub fn fetch(
        &self,
        ticket: &LoadTicket,
    ) -> impl Future<Output = Result<FolderPage, ClientError>> + Send + 'static {
        let transport = self.transport.clone();
        let folder = ticket.folder.clone();
        let page = ticket.page;
        let page_size = self.config.page_size;
        async move { transport.list_images(&folder, page, page_size).await }
    }

    /// Applies a finished load. `Ok(false)` means the ticket was stale and
    /// the result was dropped; errors of current tickets raise the banner.
    pub fn apply(
        &mut self,
        ticket: LoadTicket,
        result: Result<FolderPage, ClientError>,
    ) -> Result<bool, ClientError> {
        if !self.mounted || ticket.generation != self.generation {
            debug!(
                folder = %ticket.folder,
                page = ticket.page,
                "Dropped stale listing"
            );
            return Ok(false);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                self.show_error(&e);
                return Err(e);
            }
        };

        let urls = page
            .images
            .iter()
            .map(|name| self.transport.image_url(&ticket.folder, name))
            .collect::<Result<Vec<_>, _>>();
        let urls = match urls {
            Ok(urls) => urls,
            Err(e) => {
                self.show_error(&e);
                return Err(e);
            }
        };

        if ticket.page == 1 {
            self.cache.put(&ticket.folder, urls.clone(), page.pagination);
        }
        self.show(ticket.folder, urls, page.pagination, false);
        Ok(true)
    }

    fn show(&mut self, folder: String, images: Vec<String>, pagination: Pagination, from_cache: bool) {
        self.scheduler.set_page(images.clone());
        debug!(
            folder = %folder,
            page = pagination.page,
            images = images.len(),
            from_cache,
            "Showing page"
        );
        self.view = Some(FolderView {
            folder,
            images,
            pagination,
            from_cache,
        });
    }

    /// `"{total} image(s) - Showing {shown} of {total}"` for the current page.
    pub fn status_line(&self) -> Option<String> {
        let pagination = &self.view.as_ref()?.pagination;
        Some(format!(
            "{} image(s) - Showing {} of {}",
            pagination.total_images,
            pagination.showing(),
            pagination.total_images
        ))
    }

    /// Hands slots near the viewport to `loader`. Returns how many started.
    pub fn poll_viewport(&mut self, probe: &impl ViewportProbe, loader: &ImageLoader) -> usize {
        if !self.mounted {
            return 0;
        }
        loader.request_batch(self.scheduler.poll(probe))
    }

    /// Applies every completion `loader` has ready. Returns how many applied.
    pub fn drain_loads(&mut self, loader: &ImageLoader) -> usize {
        loader
            .poll_results()
            .into_iter()
            .filter(|outcome| self.apply_load(outcome))
            .count()
    }

    pub fn apply_load(&mut self, outcome: &LoadOutcome) -> bool {
        if !self.mounted {
            return false;
        }
        match &outcome.result {
            Ok(image) => self
                .scheduler
                .mark_loaded(outcome.generation, outcome.index, image.size()),
            Err(_) => self.scheduler.mark_failed(outcome.generation, outcome.index),
        }
    }

    /// Fetches the bytes behind an image URL. On failure the banner is shown
    /// and the gallery is left as it was.
    pub async fn download(&mut self, url: &str) -> Result<Vec<u8>, ClientError> {
        match self.transport.fetch_image(url).await {
            Ok(bytes) => {
                info!(len = bytes.len(), "Downloaded image");
                Ok(bytes)
            }
            Err(e) => {
                self.show_error(&e);
                Err(e)
            }
        }
    }

    /// Opens the image at `index` of the current page full-size. `Ok(None)`
    /// if the page has no such image. On failure the banner is shown and both
    /// the grid and any earlier selection stay as they were.
    pub async fn open_image(
        &mut self,
        index: usize,
    ) -> Result<Option<&SelectedImage>, ClientError> {
        let Some(url) = self.view.as_ref().and_then(|v| v.images.get(index)).cloned() else {
            return Ok(None);
        };
        match image_loader::load(&self.transport, &url).await {
            Ok(image) => {
                debug!(index, width = image.width, height = image.height, "Opened image");
                self.selected = Some(SelectedImage { index, url, image });
                Ok(self.selected.as_ref())
            }
            Err(e) => {
                self.show_error(&e);
                Err(e)
            }
        }
    }

    pub fn close_image(&mut self) {
        self.selected = None;
    }

    pub fn show_error(&mut self, err: &ClientError) {
        let kind = err.kind();
        warn!(?kind, error = %err, "Gallery action failed");
        self.banner = Some(ErrorBanner {
            kind,
            message: kind.user_message(),
            expires_at: Instant::now() + self.config.banner_duration,
        });
    }

    /// The visible banner, if any has not expired yet.
    pub fn banner(&mut self) -> Option<&ErrorBanner> {
        self.banner_at(Instant::now())
    }

    pub fn banner_at(&mut self, now: Instant) -> Option<&ErrorBanner> {
        if self.banner.as_ref().is_some_and(|b| b.is_expired(now)) {
            self.banner = None;
        }
        self.banner.as_ref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    /// Stops applying any further results.
    pub fn teardown(&mut self) {
        self.mounted = false;
        self.scheduler.clear();
        self.selected = None;
        self.banner = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::DynamicImage;
    use reqwest::StatusCode;

    use super::*;
    use crate::client::credentials::{CredentialStore, Credentials};
    use crate::client::image_loader::DecodedImage;
    use crate::client::render::{ScrollViewport, SlotState};
    use crate::client::settings_store::MemorySettingsStore;
    use crate::auth::{encode_token, USERNAME};
    use crate::models::PageRequest;

    fn session() -> GallerySession {
        let mut store = CredentialStore::load(Box::new(MemorySettingsStore::new())).unwrap();
        // Nothing listens on the discard port; tests never hit the network.
        store
            .update(&Credentials::new("http://127.0.0.1:9", "olimpic_carrot"))
            .unwrap();
        let config = ClientConfig {
            page_size: 2,
            ..ClientConfig::default()
        };
        let transport = TransportClient::new(store, &config).unwrap();
        GallerySession::new(transport, config)
    }

    fn listing(folder: &str, page: u32, names: &[&str], total: usize) -> FolderPage {
        FolderPage {
            folder_name: folder.to_string(),
            images: names.iter().map(|n| n.to_string()).collect(),
            pagination: Pagination::new(PageRequest::new(page, 2), total),
        }
    }

    fn unauthorized() -> ClientError {
        ClientError::Status {
            status: StatusCode::UNAUTHORIZED,
        }
    }

    #[test]
    fn test_stale_listing_is_dropped() {
        let mut s = session();
        let first = s.begin_load("A", 1);
        let second = s.begin_load("B", 1);

        let applied = s.apply(first, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        assert!(!applied);
        assert!(s.view().is_none());

        assert!(s.apply(second, Ok(listing("B", 1, &["b.jpg"], 1))).unwrap());
        assert_eq!(s.view().unwrap().folder, "B");
    }

    #[test]
    fn test_stale_error_raises_no_banner() {
        let mut s = session();
        let first = s.begin_load("A", 1);
        let _second = s.begin_load("A", 2);
        assert!(!s.apply(first, Err(unauthorized())).unwrap());
        assert!(s.banner().is_none());
    }

    #[test]
    fn test_applied_page_resolves_urls() {
        let mut s = session();
        let ticket = s.begin_load("thegrill", 1);
        s.apply(ticket, Ok(listing("thegrill", 1, &["a.jpg", "b.png"], 3)))
            .unwrap();

        let view = s.view().unwrap();
        assert!(view.images[0].starts_with("http://127.0.0.1:9/api/images/thegrill/a.jpg?auth="));
        assert_eq!(s.scheduler().slots().len(), 2);
        assert_eq!(
            s.status_line().as_deref(),
            Some("3 image(s) - Showing 2 of 3")
        );
    }

    #[test]
    fn test_only_landing_page_is_cached() {
        let mut s = session();
        let ticket = s.begin_load("A", 2);
        s.apply(ticket, Ok(listing("A", 2, &["c.jpg"], 3))).unwrap();
        assert!(!s.cache().contains("A"));

        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg", "b.jpg"], 3)))
            .unwrap();
        let entry = s.cache().get("A").unwrap();
        assert_eq!(entry.images.len(), 2);
        assert_eq!(entry.pagination.total_pages, 2);
    }

    #[tokio::test]
    async fn test_open_folder_uses_cache() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        let ticket = s.begin_load("B", 1);
        s.apply(ticket, Ok(listing("B", 1, &["b.jpg"], 1))).unwrap();

        // Would fail with a connectivity error if it went to the network.
        s.open_folder("A").await.unwrap();
        let view = s.view().unwrap();
        assert_eq!(view.folder, "A");
        assert!(view.from_cache);
    }

    #[tokio::test]
    async fn test_page_navigation_bounds() {
        let mut s = session();
        assert!(!s.next_page().await.unwrap());

        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        assert!(!s.next_page().await.unwrap());
        assert!(!s.previous_page().await.unwrap());
    }

    #[test]
    fn test_error_keeps_view_and_banner_expires() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();

        let ticket = s.begin_load("A", 2);
        let err = s.apply(ticket, Err(unauthorized())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthFailure);
        assert_eq!(s.view().unwrap().pagination.page, 1);

        let now = Instant::now();
        assert_eq!(s.banner_at(now).unwrap().kind, ErrorKind::AuthFailure);
        assert!(s.banner_at(now + Duration::from_secs(4)).is_none());
        assert!(s.banner().is_none());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_state() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        let url = s.view().unwrap().images[0].clone();

        let err = s.download(&url).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(s.banner().is_some());
        assert_eq!(s.view().unwrap().images, vec![url]);
    }

    fn auth_param(url: &str) -> String {
        let url = reqwest::Url::parse(url).unwrap();
        url.query_pairs()
            .find(|(key, _)| key == "auth")
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_credential_change_drops_cached_urls() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        let old_url = s.cache().get("A").unwrap().images[0].clone();
        assert_eq!(auth_param(&old_url), encode_token(USERNAME, "olimpic_carrot"));

        let in_flight = s.begin_load("A", 1);
        s.update_credentials(&Credentials::new("http://127.0.0.1:9", "new_secret"))
            .unwrap();
        assert!(s.cache().is_empty());
        assert!(!s.apply(in_flight, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap());

        // No cache hit: the landing page is fetched again.
        let err = s.open_folder("A").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap();
        s.open_folder("A").await.unwrap();
        let url = &s.view().unwrap().images[0];
        assert_eq!(auth_param(url), encode_token(USERNAME, "new_secret"));
        assert_eq!(s.transport().credentials().secret, "new_secret");
    }

    #[tokio::test]
    async fn test_failed_open_image_leaves_state() {
        let mut s = session();
        assert!(s.open_image(0).await.unwrap().is_none());

        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg", "b.jpg"], 2)))
            .unwrap();
        s.scheduler.poll(&ScrollViewport::new(1000.0, 500.0));
        let states: Vec<_> = s.scheduler().slots().iter().map(|slot| slot.state).collect();

        assert!(s.open_image(5).await.unwrap().is_none());
        assert!(s.banner().is_none());

        let err = s.open_image(1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert_eq!(s.banner().unwrap().kind, ErrorKind::Connectivity);
        assert!(s.selected().is_none());
        assert_eq!(s.view().unwrap().images.len(), 2);
        let after: Vec<_> = s.scheduler().slots().iter().map(|slot| slot.state).collect();
        assert_eq!(after, states);
    }

    #[test]
    fn test_teardown_stops_updates() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.teardown();
        assert!(!s.apply(ticket, Ok(listing("A", 1, &["a.jpg"], 1))).unwrap());
        assert!(s.view().is_none());
        assert!(!s.is_mounted());
    }

    #[test]
    fn test_load_outcomes_follow_page_generation() {
        let mut s = session();
        let ticket = s.begin_load("A", 1);
        s.apply(ticket, Ok(listing("A", 1, &["a.jpg", "b.jpg"], 2)))
            .unwrap();
        let old_generation = s.scheduler().generation();
        s.scheduler.poll(&ScrollViewport::new(1000.0, 500.0));

        let decoded = DecodedImage {
            width: 2,
            height: 2,
            image: DynamicImage::new_rgb8(2, 2),
        };
        let ok = LoadOutcome {
            generation: old_generation,
            index: 0,
            result: Ok(decoded),
        };
        let failed = LoadOutcome {
            generation: old_generation,
            index: 1,
            result: Err(unauthorized()),
        };
        assert!(s.apply_load(&ok));
        assert!(s.apply_load(&failed));
        assert_eq!(s.scheduler().slot(0).unwrap().state, SlotState::VisibleLoaded);
        assert_eq!(s.scheduler().slot(1).unwrap().state, SlotState::Failed);

        let ticket = s.begin_load("A", 2);
        s.apply(ticket, Ok(listing("A", 2, &["c.jpg"], 3))).unwrap();
        assert!(!s.apply_load(&ok));
    }
}
