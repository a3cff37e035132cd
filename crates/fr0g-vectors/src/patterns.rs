//! Compiled pattern dictionaries. Each processor compiles its catalogue once
//! at start-up and reuses it for every event.

use regex::Regex;

use crate::error::Result;

/// Short-URL hosts treated as phishing/spam signals on text channels.
pub const SHORTENER_HOSTS: &[&str] = &["bit.ly", "tinyurl", "t.co", "goo.gl", "short.link"];

/// Sender localparts commonly forged in phishing mail.
pub const SPOOFED_LOCALPARTS: &[&str] = &["noreply", "support", "security", "admin"];

/// Phrases that mark an automated/robocall voice script.
pub const ROBOCALL_PHRASES: &[&str] = &[
    "press 1",
    "press 9",
    "recorded message",
    "automated message",
];

/// Crypto-scam vocabulary for Discord and e-mail.
pub const CRYPTO_KEYWORDS: &[&str] = &["bitcoin", "ethereum", "airdrop", "giveaway", "seed phrase"];

/// Compiled regex catalogue shared across channels; each processor holds one.
pub struct ThreatPatterns {
    /// Short-URL host followed by a path.
    pub phishing_url: Regex,
    /// 13–19 digits in the standard 4-group form.
    pub credit_card: Regex,
    /// `free nitro` / `nitro gift` phrasing.
    pub nitro_phrase: Regex,
    /// A Discord invite link.
    pub discord_invite: Regex,
    /// Any http(s) URL, used for generic link extraction.
    pub any_url: Regex,
}

impl ThreatPatterns {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            phishing_url: Regex::new(
                r"(?i)\b(?:bit\.ly|tinyurl(?:\.com)?|t\.co|goo\.gl|short\.link)/[\w\-./]+",
            )?,
            credit_card: Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{1,7}\b")?,
            nitro_phrase: Regex::new(r"(?i)\b(?:free\s+nitro|nitro\s+gift)\b")?,
            discord_invite: Regex::new(r"(?i)\bdiscord(?:\.gg|\.com/invite)/[\w-]+")?,
            any_url: Regex::new(r"(?i)\bhttps?://[^\s<>]+")?,
        })
    }

    /// True when the text carries a shortened URL.
    pub fn has_shortened_url(&self, text: &str) -> bool {
        self.phishing_url.is_match(text)
    }

    /// True when the sender's localpart is a commonly spoofed role account.
    pub fn has_spoofed_localpart(&self, from: &str) -> bool {
        let localpart = from.split('@').next().unwrap_or("").to_lowercase();
        SPOOFED_LOCALPARTS.contains(&localpart.as_str())
    }
}
