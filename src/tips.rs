use rand::seq::SliceRandom;
use serde::Deserialize;

pub const DEFAULT_TIPS: [&str; 5] = [
    "🔐 Always enable 2-factor authentication on important accounts",
    "🛡️ Use a password manager to generate and store strong passwords",
    "📧 Never click links in unsolicited emails - hover to check URLs first",
    "🌐 Keep your router firmware updated and change default admin credentials",
    "📲 Enable biometric locks on all mobile devices",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tips list must contain at least one entry")]
pub struct EmptyTips;

/// Read-only, ordered list of security tips. Never empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "Vec<String>")]
pub struct Tips {
    entries: Vec<String>,
}

impl Default for Tips {
    fn default() -> Self {
        Self {
            entries: DEFAULT_TIPS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for Tips {
    type Error = EmptyTips;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        if entries.is_empty() {
            Err(EmptyTips)
        } else {
            Ok(Self { entries })
        }
    }
}

impl Tips {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn random(&self) -> &str {
        self.entries
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Deterministic tip for the scheduled broadcast: `tips[day % len]`.
    pub fn select_daily_tip(&self, day_of_month: u32) -> &str {
        &self.entries[day_of_month as usize % self.entries.len()]
    }
}
