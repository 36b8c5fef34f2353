//! camwall - multi-stream capture and health-monitoring engine.
//!
//! This crate is the engine behind a multi-camera monitoring wall. It runs
//! one acquisition loop per configured video source and continuously exposes
//! the most recent frame and connection health for each source, so a
//! presentation layer never blocks on a slow or dead stream.
//!
//! # Module Structure
//!
//! - `capture`: stream decoding behind the `Grabber` seam (synthetic
//!   `stub://` sources, optional GStreamer RTSP)
//! - `placeholder`: synthetic "NO SIGNAL" frames for sources without signal
//! - `annotate`: timestamp / recording overlays stamped onto every frame
//! - `store`: per-source latest-frame and status registry
//! - `engine`: lifecycle manager (start/stop per source and in bulk)
//! - `encode`: PNG export facade for the presentation layer
//!
//! A failing source degrades to `Status::Disconnected` plus a labeled
//! placeholder frame. It never stops other sources and never stops the
//! engine; the only way an acquisition loop exits is an explicit stop.

use chrono::{DateTime, Local};
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub mod annotate;
pub mod capture;
pub mod config;
pub mod encode;
pub mod engine;
pub mod placeholder;
pub mod store;

pub use capture::{AddressGrabberFactory, Grabber, GrabberFactory, SyntheticGrabber};
pub use config::EngineConfig;
pub use encode::{encode_png, png_data_uri};
pub use engine::{Engine, StopOutcome};
pub use placeholder::placeholder_frame;
pub use store::StreamStore;

/// Connection health of one source, as last observed by its acquisition loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// No acquisition iteration has classified this source yet.
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl Status {
    pub fn is_connected(self) -> bool {
        matches!(self, Status::Connected)
    }
}

/// A decoded raster frame plus its capture time.
///
/// Frames are exclusively owned by the store slot they are published to;
/// readers always receive a clone, never a mutable alias.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One configured video source: a stable index and a connection address.
///
/// The index-to-address binding is fixed once the engine is built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Source {
    pub index: usize,
    pub address: String,
}

impl Source {
    pub fn new(index: usize, address: impl Into<String>) -> Self {
        Self {
            index,
            address: address.into(),
        }
    }

    /// Human-readable label used on placeholder frames.
    pub fn label(&self) -> String {
        format!("Camera {}", self.index + 1)
    }
}
