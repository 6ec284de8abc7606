//! Media collaborator interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;

/// What to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Audio,
    Video,
}

/// A capture track
pub trait MediaTrack: Send + Sync {
    fn id(&self) -> String;
    fn kind(&self) -> TrackKind;
    /// Release the device. Idempotent.
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// The tracks of the current local capture
#[derive(Clone, Default)]
pub struct LocalStream {
    tracks: Vec<Arc<dyn MediaTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<Arc<dyn MediaTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn MediaTrack>] {
        &self.tracks
    }

    /// Stop every track; returns how many were still live
    pub fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for track in &self.tracks {
            if !track.is_stopped() {
                debug!("Stopping {:?} track {}", track.kind(), track.id());
                track.stop();
                stopped += 1;
            }
        }
        stopped
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("tracks", &self.tracks.iter().map(|t| t.id()).collect::<Vec<_>>())
            .finish()
    }
}

/// Local capture devices
#[async_trait]
pub trait MediaManager: Send + Sync {
    /// Open capture devices matching `constraints`
    async fn get_user_media(&self, constraints: MediaConstraints) -> Result<()>;

    /// The stream opened by the last successful [`get_user_media`](Self::get_user_media)
    fn local_stream(&self) -> Option<LocalStream>;
}
