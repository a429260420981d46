//! Outgoing message synthesis: content selection and destination address
//! generation, driven by a server entry's `message.send` block.

pub mod url;

use std::fs;
use std::sync::Mutex;

use rand::Rng;
use tracing::warn;

use crate::config::{AddrStrategy, ContentMode, SendConfig};
use crate::smpp::text;
use crate::smpp::OutboundMessage;

/// Placeholder substituted with a synthesized URL in random content.
const URL_PLACEHOLDER: &str = "{random url}";

const FALLBACK_CONTENT: &str = "default message content";

/// Builds [`OutboundMessage`] values for submission.
///
/// Thread-safe; one generator is shared by all sessions of a server entry
/// so the sequential destination counter is global across them.
pub struct MessageGenerator {
    conf: SendConfig,
    stop: u64,
    texts: Vec<String>,
    urls: Vec<String>,
    force_random: bool,
    cursor: Mutex<u64>,
}

impl MessageGenerator {
    /// Load corpora and prime the destination counter. An unreadable
    /// corpus file degrades the content mode to random with a warning
    /// rather than failing startup.
    pub fn new(conf: &SendConfig) -> MessageGenerator {
        let texts = load_corpus(&conf.text_file);
        let urls = load_corpus(&conf.url_file);
        let force_random = texts.is_none() || urls.is_none();

        MessageGenerator {
            stop: conf.dst.daddr.effective_stop(),
            cursor: Mutex::new(conf.dst.daddr.start),
            texts: texts.unwrap_or_default(),
            urls: urls.unwrap_or_default(),
            force_random,
            conf: conf.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_corpora(conf: &SendConfig, texts: Vec<String>, urls: Vec<String>) -> MessageGenerator {
        let mut generator = MessageGenerator::new(conf);
        generator.force_random = false;
        generator.texts = texts;
        generator.urls = urls;
        generator
    }

    /// Build one complete outbound message.
    pub fn generate(&self) -> OutboundMessage {
        let content = self.content();
        OutboundMessage {
            source_addr: self.conf.src.oaddr.clone(),
            source_ton: self.conf.src.ton,
            source_npi: self.conf.src.npi,
            dest_addr: self.next_daddr(),
            dest_ton: self.conf.dst.ton,
            dest_npi: self.conf.dst.npi,
            data_coding: self.conf.dcs,
            registered_delivery: self.conf.require_sr,
            payload: text::encode(self.conf.dcs, &content),
        }
    }

    /// Select message text for the configured content mode.
    pub fn content(&self) -> String {
        let mode = if self.force_random {
            ContentMode::Random
        } else {
            self.conf.content_mode
        };
        match mode {
            ContentMode::Random => self.random_content(),
            ContentMode::PreDefined => self.predefined_content(),
            ContentMode::Mixed => {
                if rand::thread_rng().gen_bool(self.conf.pre_defined_content_ratio) {
                    self.predefined_content()
                } else {
                    self.random_content()
                }
            }
        }
    }

    // Random mode is the configured template, with at most one placeholder
    // replaced by a freshly synthesized URL.
    fn random_content(&self) -> String {
        let template = &self.conf.content;
        if template.contains(URL_PLACEHOLDER) {
            template.replacen(URL_PLACEHOLDER, &url::random_url(), 1)
        } else {
            template.clone()
        }
    }

    // Pre-defined mode joins one corpus line with one corpus URL. Either
    // corpus being empty yields the fixed fallback.
    fn predefined_content(&self) -> String {
        if self.texts.is_empty() || self.urls.is_empty() {
            return FALLBACK_CONTENT.to_string();
        }
        let mut rng = rand::thread_rng();
        let text = &self.texts[rng.gen_range(0..self.texts.len())];
        let link = &self.urls[rng.gen_range(0..self.urls.len())];
        format!("{text} {link}")
    }

    /// Next destination address per the configured strategy.
    pub fn next_daddr(&self) -> String {
        let spec = &self.conf.dst.daddr;
        let width = spec.generate_len as usize;
        let value = match spec.strategy {
            AddrStrategy::Sequence => {
                let mut cursor = self.cursor.lock().expect("daddr cursor mutex poisoned");
                let value = *cursor;
                *cursor = if value >= self.stop { spec.start } else { value + 1 };
                value
            }
            AddrStrategy::Random => {
                // An unset range draws from the full width of the address.
                let stop = if spec.stop <= spec.start {
                    spec.start + 10u64.saturating_pow(spec.generate_len).saturating_sub(1)
                } else {
                    spec.stop
                };
                rand::thread_rng().gen_range(spec.start..=stop)
            }
        };
        format!("{}{:0width$}{}", spec.prefix, value, spec.suffix)
    }
}

// `None` means the corpus is unavailable and content generation must fall
// back to random mode.
fn load_corpus(path: &str) -> Option<Vec<String>> {
    if path.is_empty() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(raw) => Some(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        ),
        Err(e) => {
            warn!(file = %path, error = %e, "corpus unreadable, using random content");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AddrSpec, DestSpec, SourceSpec};

    fn send_conf() -> SendConfig {
        SendConfig {
            text_file: String::new(),
            url_file: String::new(),
            content_mode: ContentMode::Random,
            pre_defined_content_ratio: 0.5,
            src: SourceSpec::default(),
            dst: DestSpec::default(),
            require_sr: false,
            content: "hello".to_string(),
            dcs: 3,
        }
    }

    #[test]
    fn sequence_addresses_wrap_at_stop() {
        let mut conf = send_conf();
        conf.dst.daddr = AddrSpec {
            prefix: String::new(),
            suffix: String::new(),
            generate_len: 5,
            strategy: AddrStrategy::Sequence,
            start: 88000,
            stop: 88002,
        };
        let generator = MessageGenerator::new(&conf);
        assert_eq!(generator.next_daddr(), "88000");
        assert_eq!(generator.next_daddr(), "88001");
        assert_eq!(generator.next_daddr(), "88002");
        assert_eq!(generator.next_daddr(), "88000");
    }

    #[test]
    fn sequence_addresses_carry_prefix_suffix_and_padding() {
        let mut conf = send_conf();
        conf.dst.daddr = AddrSpec {
            prefix: "86".to_string(),
            suffix: "9".to_string(),
            generate_len: 4,
            strategy: AddrStrategy::Sequence,
            start: 7,
            stop: 8,
        };
        let generator = MessageGenerator::new(&conf);
        assert_eq!(generator.next_daddr(), "8600079");
        assert_eq!(generator.next_daddr(), "8600089");
    }

    #[test]
    fn random_addresses_stay_in_range() {
        let mut conf = send_conf();
        conf.dst.daddr = AddrSpec {
            prefix: String::new(),
            suffix: String::new(),
            generate_len: 6,
            strategy: AddrStrategy::Random,
            start: 1000,
            stop: 2000,
        };
        let generator = MessageGenerator::new(&conf);
        for _ in 0..1000 {
            let addr = generator.next_daddr();
            let value: u64 = addr.parse().expect("numeric address");
            assert!((1000..=2000).contains(&value), "out of range: {addr}");
        }
    }

    #[test]
    fn predefined_mode_joins_text_and_url() {
        let mut conf = send_conf();
        conf.content_mode = ContentMode::PreDefined;
        let generator = MessageGenerator::with_corpora(
            &conf,
            vec!["alpha".to_string(), "beta".to_string()],
            vec!["https://e.com/x".to_string()],
        );
        for _ in 0..50 {
            let content = generator.content();
            assert!(
                content == "alpha https://e.com/x" || content == "beta https://e.com/x",
                "unexpected content: {content}"
            );
        }
    }

    #[test]
    fn predefined_mode_with_empty_corpus_uses_fallback() {
        let mut conf = send_conf();
        conf.content_mode = ContentMode::PreDefined;
        let generator = MessageGenerator::with_corpora(&conf, Vec::new(), Vec::new());
        assert_eq!(generator.content(), FALLBACK_CONTENT);
    }

    #[test]
    fn unreadable_corpus_forces_random_mode() {
        let mut conf = send_conf();
        conf.content_mode = ContentMode::PreDefined;
        conf.text_file = "/nonexistent/content.txt".to_string();
        conf.url_file = "/nonexistent/urls.txt".to_string();
        conf.content = "template text".to_string();
        let generator = MessageGenerator::new(&conf);
        assert_eq!(generator.content(), "template text");
    }

    #[test]
    fn mixed_mode_respects_the_ratio() {
        let mut conf = send_conf();
        conf.content_mode = ContentMode::Mixed;
        conf.pre_defined_content_ratio = 0.3;
        conf.content = "random".to_string();
        let generator = MessageGenerator::with_corpora(
            &conf,
            vec!["fixed".to_string()],
            vec!["url".to_string()],
        );
        let trials = 10_000;
        let hits = (0..trials).filter(|_| generator.content() == "fixed url").count();
        let observed = hits as f64 / trials as f64;
        assert!((observed - 0.3).abs() < 0.05, "observed ratio {observed}");
    }

    #[test]
    fn url_placeholder_gets_a_fresh_url() {
        let mut conf = send_conf();
        conf.content = "visit {random url} now".to_string();
        let generator = MessageGenerator::with_corpora(&conf, Vec::new(), Vec::new());
        let content = generator.content();
        assert!(content.starts_with("visit http"), "{content}");
        assert!(content.contains("://"), "{content}");
        assert!(content.ends_with(" now"), "{content}");
    }

    #[test]
    fn generate_encodes_for_the_configured_dcs() {
        let mut conf = send_conf();
        conf.dcs = 8;
        conf.content = "hi".to_string();
        let generator = MessageGenerator::new(&conf);
        let message = generator.generate();
        assert_eq!(message.data_coding, 8);
        assert_eq!(message.payload, vec![0x00, 0x68, 0x00, 0x69]);
    }
}
