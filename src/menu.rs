use std::str::FromStr;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::tips::Tips;

pub const WELCOME_TEXT: &str = "🛡️ *Welcome to Security Guard Bot!*\n\n\
     I provide daily security tips and answer your cybersecurity questions.\n\n\
     Try these options:";

pub const ASK_QUESTION_TEXT: &str = "📝 Type your security question now!\nExamples:\n\
     • _Is this email safe?_\n\
     • _How to secure my Wi-Fi?_";

pub const PREMIUM_TEXT: &str = "✨ Premium features coming soon!";

/// Actions reachable from the start menu's inline keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    DailyTip,
    AskQuestion,
    Premium,
}

/// How a menu action is delivered back to the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuReply {
    /// Post a new message.
    Send(String),
    /// Replace the text of the message carrying the keyboard.
    Edit(String),
}

impl MenuReply {
    pub fn text(&self) -> &str {
        match self {
            MenuReply::Send(t) | MenuReply::Edit(t) => t,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown menu action: {0:?}")]
pub struct UnknownAction(pub String);

impl FromStr for MenuAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily_tip" => Ok(MenuAction::DailyTip),
            "ask_question" => Ok(MenuAction::AskQuestion),
            "premium" => Ok(MenuAction::Premium),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl MenuAction {
    pub const ALL: [MenuAction; 3] = [
        MenuAction::DailyTip,
        MenuAction::AskQuestion,
        MenuAction::Premium,
    ];

    pub fn callback_data(self) -> &'static str {
        match self {
            MenuAction::DailyTip => "daily_tip",
            MenuAction::AskQuestion => "ask_question",
            MenuAction::Premium => "premium",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MenuAction::DailyTip => "Get Daily Tip",
            MenuAction::AskQuestion => "Ask Security Question",
            MenuAction::Premium => "Premium Features",
        }
    }

    pub fn respond(self, tips: &Tips) -> MenuReply {
        match self {
            MenuAction::DailyTip => MenuReply::Send(random_tip_text(tips.random())),
            MenuAction::AskQuestion => MenuReply::Edit(ASK_QUESTION_TEXT.to_string()),
            MenuAction::Premium => MenuReply::Edit(PREMIUM_TEXT.to_string()),
        }
    }
}

pub fn random_tip_text(tip: &str) -> String {
    format!("🔒 *Security Tip of the Day:*\n\n{}", tip)
}

/// One button per row, in `MenuAction::ALL` order.
pub fn main_menu() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        MenuAction::ALL
            .iter()
            .map(|a| vec![InlineKeyboardButton::callback(a.label(), a.callback_data())]),
    )
}
