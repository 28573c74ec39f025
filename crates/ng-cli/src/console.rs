//! Terminal stand-ins for the extension badge and the tab messenger.

use ng_core::types::{BadgeState, TabId};
use ng_core::{BadgeSurface, PageCommand, PageMessenger};

pub fn format_badge(badge: &BadgeState) -> String {
    format!("[tab {}] badge {} ({})", badge.tab_id, badge.text, badge.color.as_str())
}

pub fn format_command(tab_id: TabId, command: &PageCommand) -> String {
    match command {
        PageCommand::WarnUser { message, check_link } => {
            let mut line = format!("[tab {}] warn_user: {}", tab_id, message.trim());
            if let Some(link) = check_link {
                line.push_str(&format!(" [{} -> {}]", link.label, link.lookup_url));
            }
            line
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleBadge;

impl BadgeSurface for ConsoleBadge {
    fn set_badge(&self, badge: &BadgeState) {
        println!("{}", format_badge(badge));
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleMessenger;

impl PageMessenger for ConsoleMessenger {
    fn send(&self, tab_id: TabId, command: &PageCommand) {
        println!("{}", format_command(tab_id, command));
    }
}
