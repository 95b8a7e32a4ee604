//! Services the repository consumes but does not implement itself.
//!
//! The host supplies an [`ImageCodec`] to turn camera or signature captures
//! into storable bytes and a [`NotificationScheduler`] to deliver reminders.
//! Both are injected into [`Repository::open`](crate::Repository::open).

use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, ImageReader};

use crate::error::{StoreError, StoreResult};
use crate::model::ReminderId;

/// Encodes captured images into the formats stored on disk.
pub trait ImageCodec: Send + Sync {
    /// Re-encodes `image` as JPEG at `quality` (1 to 100).
    ///
    /// # Errors
    ///
    /// Returns `Encode` if `image` cannot be decoded or re-encoded.
    fn encode_jpeg(&self, image: &[u8], quality: u8) -> StoreResult<Vec<u8>>;

    /// Re-encodes `image` as lossless PNG.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if `image` cannot be decoded or re-encoded.
    fn encode_png(&self, image: &[u8]) -> StoreResult<Vec<u8>>;

    /// Width and height in pixels of an encoded image.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if the header cannot be read.
    fn dimensions(&self, image: &[u8]) -> StoreResult<(u32, u32)>;
}

/// [`ImageCodec`] built on the `image` crate. Accepts any JPEG or PNG input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCodec;

impl RasterCodec {
    fn decode(image: &[u8]) -> StoreResult<DynamicImage> {
        image::load_from_memory(image)
            .map_err(|e| StoreError::encode(format!("decoding image: {e}")))
    }
}

impl ImageCodec for RasterCodec {
    fn encode_jpeg(&self, image: &[u8], quality: u8) -> StoreResult<Vec<u8>> {
        // JPEG has no alpha channel.
        let rgb = Self::decode(image)?.into_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode_image(&rgb)
            .map_err(|e| StoreError::encode(format!("encoding JPEG: {e}")))?;
        Ok(out)
    }

    fn encode_png(&self, image: &[u8]) -> StoreResult<Vec<u8>> {
        let decoded = Self::decode(image)?;
        let mut out = Cursor::new(Vec::new());
        decoded
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| StoreError::encode(format!("encoding PNG: {e}")))?;
        Ok(out.into_inner())
    }

    fn dimensions(&self, image: &[u8]) -> StoreResult<(u32, u32)> {
        ImageReader::new(Cursor::new(image))
            .with_guessed_format()
            .map_err(|e| StoreError::encode(format!("sniffing image format: {e}")))?
            .into_dimensions()
            .map_err(|e| StoreError::encode(format!("reading image header: {e}")))
    }
}

/// Delivers local notifications for reminders.
///
/// Delivery is fire-and-forget: implementations report their own failures.
pub trait NotificationScheduler: Send + Sync {
    /// Schedules a notification identified by `id` to fire after `delay`.
    /// `fire_date` is the originally requested time, which may be in the past.
    fn schedule(
        &self,
        id: ReminderId,
        fire_date: DateTime<Utc>,
        delay: Duration,
        title: &str,
        body: &str,
    );

    /// Cancels the pending notification `id`, if any.
    fn cancel(&self, id: ReminderId);
}

/// Scheduler that drops every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotificationScheduler for NoopNotifier {
    fn schedule(&self, id: ReminderId, _: DateTime<Utc>, delay: Duration, _: &str, _: &str) {
        log::debug!("dropping notification {id} due in {delay:?}");
    }

    fn cancel(&self, _id: ReminderId) {}
}

/// A request observed by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierCall {
    /// A `schedule` call.
    Schedule {
        /// Notification identifier.
        id: ReminderId,
        /// Requested fire date.
        fire_date: DateTime<Utc>,
        /// Delay passed to the platform.
        delay: Duration,
        /// Notification title.
        title: String,
        /// Notification body.
        body: String,
    },
    /// A `cancel` call.
    Cancel {
        /// Notification identifier.
        id: ReminderId,
    },
}

/// Scheduler that records every call, for tests and headless hosts.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<NotifierCall>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls observed so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<NotifierCall> {
        self.calls
            .lock()
            .map_or_else(|poisoned| poisoned.into_inner().clone(), |calls| calls.clone())
    }

    fn push(&self, call: NotifierCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }
}

impl NotificationScheduler for RecordingNotifier {
    fn schedule(
        &self,
        id: ReminderId,
        fire_date: DateTime<Utc>,
        delay: Duration,
        title: &str,
        body: &str,
    ) {
        self.push(NotifierCall::Schedule {
            id,
            fire_date,
            delay,
            title: title.to_owned(),
            body: body.to_owned(),
        });
    }

    fn cancel(&self, id: ReminderId) {
        self.push(NotifierCall::Cancel { id });
    }
}
