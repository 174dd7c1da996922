//! Heuristic channel classifier.
//!
//! Evaluates ordered pattern groups against the lower-cased content and
//! returns the channel of the first group with a matching pattern. The group
//! order EMAIL → WHATSAPP → SMS is a correctness contract: a message carrying
//! both an email address and a phone number classifies as email. When nothing
//! matches, the fallback is SMS.
//!
//! Classification is best-effort routing metadata, not a security or
//! correctness boundary.

use regex::Regex;

use crate::message::ChannelType;

/// A pattern group with compiled regexes, tried in declaration order.
struct PatternGroup {
    channel: ChannelType,
    patterns: Vec<Regex>,
}

pub struct Classifier {
    groups: Vec<PatternGroup>,
}

impl Classifier {
    /// Builds the classifier with the default pattern groups.
    pub fn new() -> Self {
        let email = PatternGroup {
            channel: ChannelType::Email,
            patterns: vec![
                // Embedded email address
                Regex::new(r"[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap(),
                // Subject line
                Regex::new(r"subject:|subject |re:").unwrap(),
                // Greeting at the start of the content
                Regex::new(r"^(dear|hi|hello)\b").unwrap(),
                // Attachment and report markers
                Regex::new(r"find attached|please find|attached|report").unwrap(),
            ],
        };

        let whatsapp = PatternGroup {
            channel: ChannelType::Whatsapp,
            patterns: vec![
                Regex::new(r"whatsapp:|wa:").unwrap(),
                Regex::new(r"sent via whatsapp").unwrap(),
                Regex::new(r"message me on").unwrap(),
                Regex::new(r"chat.*with").unwrap(),
            ],
        };

        let sms = PatternGroup {
            channel: ChannelType::Sms,
            patterns: vec![
                // International phone number at the start
                Regex::new(r"^\+\d{10,}").unwrap(),
                Regex::new(r"sms:|txt:").unwrap(),
                // Bare OTP-shaped code
                Regex::new(r"^\d{6}$").unwrap(),
                Regex::new(r"text.*to").unwrap(),
            ],
        };

        Self {
            groups: vec![email, whatsapp, sms],
        }
    }

    /// Infers the channel for a piece of content. Total: every input yields
    /// exactly one channel.
    pub fn classify(&self, content: &str) -> ChannelType {
        let content = content.to_lowercase();

        for group in &self.groups {
            if group.patterns.iter().any(|p| p.is_match(&content)) {
                return group.channel;
            }
        }

        ChannelType::Sms
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}
