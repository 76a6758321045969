//! Decoded sprite frames keyed by the digest of their encoded blob
//!
//! A blob is decoded at most once: either ahead of time by the background
//! loader when an avatar arrives, or on first use at draw time. Decode
//! failures are remembered too, so a broken frame is skipped rather than
//! retried every render.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;
use log::{debug, error};
use shared::{AvatarDefinition, BlobKey, ImageBlob};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("decode task ended without a result")]
    Abandoned,
}

/// Decoded RGBA pixels plus the key they were decoded from. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SpriteImage {
    key: BlobKey,
    pixels: Arc<RgbaImage>,
}

impl SpriteImage {
    pub fn new(key: BlobKey, pixels: RgbaImage) -> Self {
        Self {
            key,
            pixels: Arc::new(pixels),
        }
    }

    /// Loads an image file, keyed by its path.
    pub fn open(path: &Path) -> Result<Self, SpriteError> {
        let pixels = image::open(path)?.to_rgba8();
        let key = BlobKey::digest(path.to_string_lossy().as_bytes());
        Ok(Self::new(key, pixels))
    }

    pub fn key(&self) -> BlobKey {
        self.key
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

pub fn decode_blob(blob: &ImageBlob) -> Result<SpriteImage, SpriteError> {
    let bytes = STANDARD.decode(blob.payload())?;
    let pixels = image::load_from_memory(&bytes)?.to_rgba8();
    Ok(SpriteImage::new(blob.key(), pixels))
}

enum Slot {
    Pending,
    Ready(SpriteImage),
    Failed,
}

type Decoded = (BlobKey, Result<SpriteImage, SpriteError>);

/// Reports exactly one result per queued decode. Dropped unsent (the task
/// panicked, or the runtime discarded it) it reports `Abandoned`.
struct DecodeReply {
    key: BlobKey,
    done_tx: Option<mpsc::UnboundedSender<Decoded>>,
}

impl DecodeReply {
    fn new(key: BlobKey, done_tx: mpsc::UnboundedSender<Decoded>) -> Self {
        Self {
            key,
            done_tx: Some(done_tx),
        }
    }

    fn send(mut self, result: Result<SpriteImage, SpriteError>) {
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send((self.key, result));
        }
    }
}

impl Drop for DecodeReply {
    fn drop(&mut self) {
        if let Some(done_tx) = self.done_tx.take() {
            let _ = done_tx.send((self.key, Err(SpriteError::Abandoned)));
        }
    }
}

struct SpriteLoader {
    runtime: Handle,
    done_tx: mpsc::UnboundedSender<Decoded>,
    done_rx: mpsc::UnboundedReceiver<Decoded>,
}

impl SpriteLoader {
    fn spawn(&self, blob: ImageBlob) {
        let reply = DecodeReply::new(blob.key(), self.done_tx.clone());
        self.runtime.spawn_blocking(move || {
            let result = decode_blob(&blob);
            reply.send(result);
        });
    }
}

#[derive(Default)]
pub struct SpriteCache {
    slots: HashMap<BlobKey, Slot>,
    loader: Option<SpriteLoader>,
}

impl SpriteCache {
    /// A cache that only decodes lazily, on the calling thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that can also decode ahead of time on `runtime`'s blocking pool.
    pub fn with_loader(runtime: Handle) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        Self {
            slots: HashMap::new(),
            loader: Some(SpriteLoader {
                runtime,
                done_tx,
                done_rx,
            }),
        }
    }

    /// Queues every frame of `avatar` not seen before. Returns how many
    /// decodes were started.
    pub fn prefetch(&mut self, avatar: &AvatarDefinition) -> usize {
        let Some(loader) = &self.loader else {
            return 0;
        };

        let mut started = 0;
        for blob in avatar.blobs() {
            if self.slots.contains_key(&blob.key()) {
                continue;
            }
            self.slots.insert(blob.key(), Slot::Pending);
            loader.spawn(blob.clone());
            started += 1;
        }

        if started > 0 {
            debug!("Prefetching {} frames for avatar {}", started, avatar.name);
        }
        started
    }

    /// Stores decodes finished since the last call. Returns how many landed.
    pub fn poll_loaded(&mut self) -> usize {
        let Some(loader) = &mut self.loader else {
            return 0;
        };

        let mut landed = 0;
        while let Ok((key, result)) = loader.done_rx.try_recv() {
            let slot = match result {
                Ok(image) => Slot::Ready(image),
                Err(e) => {
                    error!("Sprite {:?} failed to decode: {}", key, e);
                    Slot::Failed
                }
            };
            self.slots.insert(key, slot);
            landed += 1;
        }
        landed
    }

    /// The decoded frame for `blob`, decoding it now if nobody has tried yet.
    /// `None` while a prefetch is in flight or after a failed decode.
    pub fn resolve(&mut self, blob: &ImageBlob) -> Option<SpriteImage> {
        match self.slots.get(&blob.key()) {
            Some(Slot::Ready(image)) => return Some(image.clone()),
            Some(Slot::Pending) | Some(Slot::Failed) => return None,
            None => {}
        }

        match decode_blob(blob) {
            Ok(image) => {
                self.slots.insert(blob.key(), Slot::Ready(image.clone()));
                Some(image)
            }
            Err(e) => {
                error!("Sprite {:?} failed to decode: {}", blob.key(), e);
                self.slots.insert(blob.key(), Slot::Failed);
                None
            }
        }
    }

    pub fn is_ready(&self, key: BlobKey) -> bool {
        matches!(self.slots.get(&key), Some(Slot::Ready(_)))
    }

    pub fn is_pending(&self, key: BlobKey) -> bool {
        matches!(self.slots.get(&key), Some(Slot::Pending))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
