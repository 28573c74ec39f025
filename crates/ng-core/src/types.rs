//! Core type definitions for NavGuard
//!
//! These types flow between the event source, the verdict engine and the
//! badge / page collaborators.

use serde::{Deserialize, Serialize};

/// Browser tab identifier.
pub type TabId = i32;

/// Per-tab navigation generation.
pub type Generation = u64;

// =============================================================================
// Navigation Events
// =============================================================================

/// Load status reported by the browser for a tab update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Complete,
}

impl LoadStatus {
    /// Parse from the browser status string. Unknown values map to `Loading`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "complete" => Self::Complete,
            _ => Self::Loading,
        }
    }
}

/// A tab update delivered by the navigation event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationEvent {
    pub tab_id: TabId,
    pub url: String,
    pub status: LoadStatus,
}

impl NavigationEvent {
    /// Completed load for `url` in `tab_id`.
    pub fn complete(tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            url: url.into(),
            status: LoadStatus::Complete,
        }
    }
}

// =============================================================================
// Scheme Masks
// =============================================================================

bitflags::bitflags! {
    /// URL scheme mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchemeMask: u8 {
        const HTTP = 1 << 0;
        const HTTPS = 1 << 1;
        const WS = 1 << 2;
        const WSS = 1 << 3;
        const FTP = 1 << 4;
    }
}

// =============================================================================
// Suspicion Flags
// =============================================================================

bitflags::bitflags! {
    /// Summary of the heuristics that fired for one navigation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Suspicion: u8 {
        /// URL embeds an `@` (userinfo obfuscation)
        const CREDENTIALS = 1 << 0;
        /// URL was loaded over plain http
        const INSECURE_SCHEME = 1 << 1;
        /// Host does not end in a recognised suffix
        const UNRECOGNISED_TLD = 1 << 2;
        /// Host ends in no known suffix at all
        const UNKNOWN_TLD = 1 << 3;
        /// Host ends in a whitelisted commercial suffix
        const WHITELISTED_TLD = 1 << 4;
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Final classification for one navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe { message: String },
}

impl Verdict {
    #[inline]
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Safe)
    }

    /// Badge the verdict renders as.
    pub fn badge(&self, tab_id: TabId) -> BadgeState {
        match self {
            Self::Safe => BadgeState::new(tab_id, BadgeColor::Green),
            Self::Unsafe { .. } => BadgeState::new(tab_id, BadgeColor::Red),
        }
    }
}

// =============================================================================
// Badge
// =============================================================================

/// Badge background colours the core writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeColor {
    Green,
    Red,
}

impl BadgeColor {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Red => "red",
        }
    }

    /// Badge text paired with this colour.
    pub fn text(self) -> &'static str {
        match self {
            Self::Green => "100",
            Self::Red => "0",
        }
    }
}

/// Desired badge for a tab. Rendering is owned by the badge surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeState {
    pub tab_id: TabId,
    pub text: String,
    pub color: BadgeColor,
}

impl BadgeState {
    pub fn new(tab_id: TabId, color: BadgeColor) -> Self {
        Self {
            tab_id,
            text: color.text().to_string(),
            color,
        }
    }
}
