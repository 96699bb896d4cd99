//! Background image downloads for triggered render slots.
//!
//! Each request runs as its own tokio task. A semaphore caps how many
//! downloads are in flight; decoding happens on the blocking pool. Finished
//! loads come back over a flume channel that the interaction thread drains
//! with [`ImageLoader::poll_results`]. Completion order is not guaranteed.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use flume::{Receiver, Sender};
use image::codecs::gif::GifDecoder;
use image::error::{DecodingError, ImageFormatHint};
use image::{AnimationDecoder, DynamicImage, ImageError, ImageFormat};
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use super::render::LoadRequest;
use super::transport::TransportClient;
use crate::error::ClientError;

/// A decoded image ready for display.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
}

impl DecodedImage {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Completion of one [`LoadRequest`].
#[derive(Debug)]
pub struct LoadOutcome {
    pub generation: u64,
    pub index: usize,
    pub result: Result<DecodedImage, ClientError>,
}

pub struct ImageLoader {
    transport: TransportClient,
    permits: Arc<Semaphore>,
    result_tx: Sender<LoadOutcome>,
    result_rx: Receiver<LoadOutcome>,
    in_flight: Arc<AtomicUsize>,
}

impl ImageLoader {
    /// `max_downloads` is raised to 1 if zero.
    pub fn new(transport: TransportClient, max_downloads: usize) -> Self {
        let (result_tx, result_rx) = flume::unbounded();
        Self {
            transport,
            permits: Arc::new(Semaphore::new(max_downloads.max(1))),
            result_tx,
            result_rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Starts downloading and decoding `req` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn request(&self, req: LoadRequest) {
        let transport = self.transport.clone();
        let permits = Arc::clone(&self.permits);
        let result_tx = self.result_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        in_flight.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => load(&transport, &req.url).await,
                Err(_) => {
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    return;
                }
            };
            if let Err(e) = &result {
                warn!(index = req.index, error = %e, "Image load failed");
            }
            let _ = result_tx.send(LoadOutcome {
                generation: req.generation,
                index: req.index,
                result,
            });
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn request_batch(&self, requests: Vec<LoadRequest>) -> usize {
        let count = requests.len();
        for req in requests {
            self.request(req);
        }
        count
    }

    /// Drains every completion available right now.
    pub fn poll_results(&self) -> Vec<LoadOutcome> {
        self.result_rx.try_iter().collect()
    }

    /// Waits for the next completion.
    pub async fn next_result(&self) -> Option<LoadOutcome> {
        self.result_rx.recv_async().await.ok()
    }

    /// Number of requests not yet reported back.
    pub fn pending_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.pending_count() > 0
    }
}

/// Downloads and decodes one image.
pub(crate) async fn load(transport: &TransportClient, url: &str) -> Result<DecodedImage, ClientError> {
    let bytes = transport.fetch_image(url).await?;
    let image = tokio::task::spawn_blocking(move || decode_image(&bytes)).await??;
    trace!(width = image.width(), height = image.height(), "Decoded image");
    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        image,
    })
}

/// Decodes image bytes. Animated GIFs yield their first frame.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let format = image::guess_format(bytes).ok();

    if format == Some(ImageFormat::Gif) {
        let decoder = GifDecoder::new(Cursor::new(bytes))?;
        return match decoder.into_frames().next() {
            Some(frame) => Ok(DynamicImage::ImageRgba8(frame?.into_buffer())),
            None => {
                debug!("GIF has no frames");
                Err(ImageError::Decoding(DecodingError::new(
                    ImageFormatHint::Exact(ImageFormat::Gif),
                    "GIF has no frames",
                )))
            }
        };
    }

    match format {
        Some(fmt) => image::load_from_memory_with_format(bytes, fmt),
        None => image::load_from_memory(bytes),
    }
}
