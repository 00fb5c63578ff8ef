use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::llm::QueryAnalyzer;

pub const WIFI_CHECKLIST: &str = "📶 *Securing Your Wi-Fi:*\n\n\
     1. Change default router admin password\n\
     2. Use WPA3 encryption (or WPA2)\n\
     3. Disable WPS feature\n\
     4. Hide your SSID\n\
     5. Enable firewall\n\n\
     _(Need router-specific steps? Consider premium support)_";

pub const ANALYSIS_UNAVAILABLE: &str =
    "⚠️ Sorry, I couldn't analyze that right now. Please try again later.";

/// Which canned behaviour applies to an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Wifi,
    Email,
    General,
}

impl Topic {
    /// Expects already lower-cased text. Wi-Fi wins over email.
    pub fn classify(lowered: &str) -> Self {
        if lowered.contains("wifi") || lowered.contains("wi-fi") {
            Topic::Wifi
        } else if lowered.contains("email") || lowered.contains("phishing") {
            Topic::Email
        } else {
            Topic::General
        }
    }
}

pub fn email_reply(advice: &str) -> String {
    format!(
        "📧 *Email Safety Analysis:*\n\n{}\n\n_AI-powered analysis | Accuracy: 92%_",
        advice
    )
}

pub fn general_reply(advice: &str) -> String {
    format!(
        "🔍 *Security Analysis:*\n\n{}\n\n_AI-powered response | For expert review: /premium_",
        advice
    )
}

/// Decides the reply text for a single free-text message.
pub struct Responder {
    analyzer: Arc<dyn QueryAnalyzer>,
}

impl Responder {
    pub fn new(analyzer: Arc<dyn QueryAnalyzer>) -> Self {
        Self { analyzer }
    }

    /// Fails only when the analysis capability fails; the Wi-Fi path never does.
    pub async fn classify_and_reply(&self, text: &str) -> Result<String> {
        let lowered = text.to_lowercase();
        let topic = Topic::classify(&lowered);
        debug!("Classified message as {:?}", topic);

        match topic {
            Topic::Wifi => Ok(WIFI_CHECKLIST.to_string()),
            Topic::Email => {
                let advice = self.analyzer.analyze(&lowered).await?;
                Ok(email_reply(&advice))
            }
            Topic::General => {
                let advice = self.analyzer.analyze(&lowered).await?;
                Ok(general_reply(&advice))
            }
        }
    }
}
