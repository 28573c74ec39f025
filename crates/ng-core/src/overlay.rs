//! Page lock overlay model
//!
//! The background side sends a [`PageCommand`] to the tab; the content side
//! turns it into a [`BannerSpec`] and installs capture-phase input traps whose
//! decisions come from [`TrapPolicy`]. DOM work lives in the wasm crate.

use serde::{Deserialize, Serialize};

/// Id of the banner container. Input inside this subtree is never trapped.
pub const BANNER_ID: &str = "navguard-lock-banner";
/// Id of the banner text element.
pub const BANNER_TEXT_ID: &str = "phishing-warning-banner";
/// Id of the in-depth check link.
pub const CHECK_LINK_ID: &str = "navguard-check-link";

pub const BANNER_STYLE: &str = "position: fixed; top: 0; left: 0; width: 100%; background: white; \
color: black; text-align: center; z-index: 2147483647; padding: 10px; font-size: 16px; \
border-bottom: 2px solid black; display: flex; align-items: center; justify-content: center; gap: 10px;";
pub const BANNER_IMAGE_STYLE: &str = "width: 48px; height: 48px;";
pub const BANNER_IMAGE_ALT: &str = "Warning Icon";
pub const CHECK_LINK_LABEL: &str = "Request an in-depth check";

// =============================================================================
// Page Commands
// =============================================================================

/// Interactive link offered in the banner.
///
/// On click the overlay must suppress the default navigation, request
/// `lookup_url` out of band, and then reload the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckLink {
    pub label: String,
    pub lookup_url: String,
}

/// Commands sent from the verdict engine to a tab's page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageCommand {
    WarnUser {
        /// Banner text, may embed HTML
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        check_link: Option<CheckLink>,
    },
}

impl PageCommand {
    /// Warning with an optional in-depth check against `lookup_url`.
    pub fn warning(message: &str, lookup_url: Option<String>) -> Self {
        Self::WarnUser {
            message: message.to_string(),
            check_link: lookup_url.map(|lookup_url| CheckLink {
                label: CHECK_LINK_LABEL.to_string(),
                lookup_url,
            }),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// =============================================================================
// Banner
// =============================================================================

/// What the overlay renders at the top of the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerSpec {
    pub image_src: String,
    pub message_html: String,
    pub check_link: Option<CheckLink>,
}

/// Lock state of one document.
///
/// A document is locked once both its input traps and its banner are in
/// place. The two steps are tracked separately so a failed banner insert
/// (no `body` yet) can be retried by a later command without installing the
/// traps twice. Traps are never removed; a fresh navigation brings a fresh
/// document and a fresh `PageLock`.
#[derive(Debug, Default)]
pub struct PageLock {
    traps: bool,
    banner: bool,
}

/// Remaining work to lock a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPlan {
    pub install_traps: bool,
    pub banner: Option<BannerSpec>,
}

impl PageLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.traps && self.banner
    }

    pub fn traps_installed(&self) -> bool {
        self.traps
    }

    /// Work still needed to apply `command`, or `None` if the document is
    /// already locked. Nothing is marked until the caller reports success.
    pub fn plan(&self, command: &PageCommand, image_src: &str) -> Option<LockPlan> {
        if self.is_locked() {
            return None;
        }
        match command {
            PageCommand::WarnUser { message, check_link } => Some(LockPlan {
                install_traps: !self.traps,
                banner: (!self.banner).then(|| BannerSpec {
                    image_src: image_src.to_string(),
                    message_html: message.clone(),
                    check_link: check_link.clone(),
                }),
            }),
        }
    }

    pub fn mark_traps_installed(&mut self) {
        self.traps = true;
    }

    pub fn mark_banner_installed(&mut self) {
        self.banner = true;
    }
}

// =============================================================================
// Input Traps
// =============================================================================

/// Capture-phase listeners installed on a locked document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapKind {
    Click,
    KeyDown,
    ContextMenu,
}

impl TrapKind {
    pub const ALL: [TrapKind; 3] = [Self::Click, Self::KeyDown, Self::ContextMenu];

    pub fn event_name(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::KeyDown => "keydown",
            Self::ContextMenu => "contextmenu",
        }
    }
}

/// Input observed by a trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInput<'a> {
    Click { inside_banner: bool },
    KeyDown { key: &'a str, inside_banner: bool },
    ContextMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapDecision {
    Allow,
    /// preventDefault + stopPropagation
    Block,
}

/// Decides which inputs a locked page swallows.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapPolicy;

impl TrapPolicy {
    pub fn decide(&self, input: PageInput<'_>) -> TrapDecision {
        match input {
            PageInput::Click { inside_banner: true } => TrapDecision::Allow,
            PageInput::Click { inside_banner: false } => TrapDecision::Block,
            PageInput::KeyDown { key: "Enter", inside_banner: false } => TrapDecision::Block,
            PageInput::KeyDown { .. } => TrapDecision::Allow,
            PageInput::ContextMenu => TrapDecision::Block,
        }
    }
}
