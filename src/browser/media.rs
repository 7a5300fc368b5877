//! Media playback capture injected before a reload.
//!
//! The capture routine stores one [`MediaState`] per `<video>`/`<audio>`
//! element in the page's `sessionStorage`; the content script restores and
//! deletes it after the reload. The engine only needs to know whether the
//! capture ran, so the snapshot is parsed leniently.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Constants
// ============================================================================

/// `sessionStorage` key shared with the content script.
pub const MEDIA_STATE_KEY: &str = "refreshEmAllMediaState";

/// Script injected into live tabs right before they are reloaded.
///
/// Evaluates to the stored snapshot object.
pub const CAPTURE_SCRIPT: &str = r#"(() => {
  const states = {};
  const visible = document.visibilityState === 'visible';
  const youTube = /(^|\.)youtube\.com$/.test(location.hostname);
  const capture = (kind) => {
    document.querySelectorAll(kind).forEach((el, index) => {
      states[`${kind}_${index}`] = {
        currentTime: el.currentTime,
        paused: el.paused,
        muted: el.muted,
        volume: el.volume,
        playbackRate: el.playbackRate,
        src: el.currentSrc || el.src,
        isYouTube: youTube,
        isVisible: visible
      };
    });
  };
  capture('video');
  capture('audio');
  sessionStorage.setItem('refreshEmAllMediaState', JSON.stringify(states));
  return states;
})()"#;

// ============================================================================
// MediaState
// ============================================================================

/// Playback state of one media element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    /// Playback position in seconds.
    #[serde(default)]
    pub current_time: f64,
    /// Paused flag.
    #[serde(default)]
    pub paused: bool,
    /// Muted flag.
    #[serde(default)]
    pub muted: bool,
    /// Volume, `0.0..=1.0`.
    #[serde(default = "full_volume")]
    pub volume: f64,
    /// Playback rate.
    #[serde(default = "normal_rate")]
    pub playback_rate: f64,
    /// Media source URL.
    #[serde(default)]
    pub src: String,
    /// Page is a YouTube page.
    #[serde(default, rename = "isYouTube")]
    pub is_youtube: bool,
    /// Page was visible when captured.
    #[serde(default)]
    pub is_visible: bool,
}

fn full_volume() -> f64 {
    1.0
}

fn normal_rate() -> f64 {
    1.0
}

// ============================================================================
// MediaSnapshot
// ============================================================================

/// Captured states keyed by `video_<n>` / `audio_<n>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaSnapshot(pub BTreeMap<String, MediaState>);

impl MediaSnapshot {
    /// Parses the capture routine's result, treating anything else as empty.
    #[must_use]
    pub fn from_script_result(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Number of captured elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the page had no media elements.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of captured elements that were playing.
    #[must_use]
    pub fn playing(&self) -> usize {
        self.0.values().filter(|state| !state.paused).count()
    }
}

// ============================================================================
// Tests
// ============================================================================
