//! YAML configuration surface.
//!
//! One or more server entries, each carrying the endpoint, bind role,
//! parallel-session count and a message specification. Everything is
//! immutable after load; configuration errors are fatal at startup.

use serde::Deserialize;

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub smpp: Vec<ServerConfig>,
    #[serde(default)]
    pub rest: RestConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_addr")]
    pub addr: String,
    #[serde(default = "default_rest_port")]
    pub port: u16,
}

impl RestConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            addr: default_rest_addr(),
            port: default_rest_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One SMPP server entry; drives one connection manager.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server: ServerEndpoint,
    #[serde(default)]
    pub client: ClientConfig,
    pub message: MessageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEndpoint {
    #[serde(default = "default_server_addr")]
    pub addr: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl ServerEndpoint {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(rename = "bind-type", default)]
    pub role: SessionRole,
    #[serde(rename = "conn-num", default = "default_conn_num")]
    pub count: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            role: SessionRole::default(),
            count: default_conn_num(),
        }
    }
}

/// Session bind role, fixed at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    Transmitter,
    Receiver,
    Transceiver,
}

impl SessionRole {
    pub fn can_send(self) -> bool {
        matches!(self, SessionRole::Transmitter | SessionRole::Transceiver)
    }

    pub fn can_receive(self) -> bool {
        matches!(self, SessionRole::Receiver | SessionRole::Transceiver)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionRole::Transmitter => "transmitter",
            SessionRole::Receiver => "receiver",
            SessionRole::Transceiver => "transceiver",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageConfig {
    pub send: SendConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendConfig {
    #[serde(rename = "text-file", default)]
    pub text_file: String,
    #[serde(rename = "url-file", default)]
    pub url_file: String,
    #[serde(rename = "content-mode", default)]
    pub content_mode: ContentMode,
    #[serde(rename = "pre-defined-content-ratio", default = "default_content_ratio")]
    pub pre_defined_content_ratio: f64,
    #[serde(default)]
    pub src: SourceSpec,
    #[serde(default)]
    pub dst: DestSpec,
    #[serde(rename = "require-sr", default)]
    pub require_sr: bool,
    /// Literal content or template; `{random url}` is substituted in random
    /// mode.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub dcs: u8,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            text_file: String::new(),
            url_file: String::new(),
            content_mode: ContentMode::default(),
            pre_defined_content_ratio: default_content_ratio(),
            src: SourceSpec::default(),
            dst: DestSpec::default(),
            require_sr: false,
            content: String::new(),
            dcs: 0,
        }
    }
}

/// Outgoing content mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentMode {
    #[default]
    Random,
    PreDefined,
    Mixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    #[serde(default = "default_npi")]
    pub npi: u8,
    #[serde(default = "default_ton")]
    pub ton: u8,
    /// Optional override address placed in every submit.
    #[serde(default)]
    pub oaddr: String,
}

impl Default for SourceSpec {
    fn default() -> Self {
        Self {
            npi: default_npi(),
            ton: default_ton(),
            oaddr: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DestSpec {
    #[serde(default = "default_npi")]
    pub npi: u8,
    #[serde(default = "default_ton")]
    pub ton: u8,
    #[serde(default)]
    pub daddr: AddrSpec,
}

impl Default for DestSpec {
    fn default() -> Self {
        Self {
            npi: default_npi(),
            ton: default_ton(),
            daddr: AddrSpec::default(),
        }
    }
}

/// Destination address template: `prefix + zero-padded(number, width) +
/// suffix`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddrSpec {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    #[serde(rename = "generate-length", default = "default_generate_len")]
    pub generate_len: u32,
    #[serde(rename = "generate-type", default)]
    pub strategy: AddrStrategy,
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub stop: u64,
}

impl AddrSpec {
    /// The exclusive-ish upper bound: an unset or non-increasing `stop`
    /// defaults to `10^generate_len − 1`.
    pub fn effective_stop(&self) -> u64 {
        if self.stop <= self.start {
            10u64.saturating_pow(self.generate_len).saturating_sub(1)
        } else {
            self.stop
        }
    }
}

impl Default for AddrSpec {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: String::new(),
            generate_len: default_generate_len(),
            strategy: AddrStrategy::default(),
            start: 0,
            stop: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddrStrategy {
    #[default]
    Sequence,
    Random,
}

/// Load and deserialize the YAML configuration at `path`.
pub fn load(path: &str) -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::new(path, config::FileFormat::Yaml))
        .build()?
        .try_deserialize()
}

fn default_rest_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_rest_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_addr() -> String {
    "localhost".to_string()
}

fn default_server_port() -> u16 {
    5588
}

fn default_conn_num() -> u16 {
    10
}

fn default_content_ratio() -> f64 {
    0.5
}

fn default_npi() -> u8 {
    1
}

fn default_ton() -> u8 {
    1
}

fn default_generate_len() -> u32 {
    6
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let conf = parse(
            r#"
service:
  smpp:
    - server:
        username: user
        password: pass
      message:
        send:
          content: "hello"
"#,
        );
        let server = &conf.service.smpp[0];
        assert_eq!(server.server.addr, "localhost");
        assert_eq!(server.server.port, 5588);
        assert_eq!(server.client.role, SessionRole::Transmitter);
        assert_eq!(server.client.count, 10);
        assert_eq!(server.message.send.content_mode, ContentMode::Random);
        assert_eq!(server.message.send.pre_defined_content_ratio, 0.5);
        assert_eq!(server.message.send.dcs, 0);
        assert_eq!(conf.service.rest.bind_addr(), "0.0.0.0:8080");
        assert_eq!(conf.service.log.level, "info");
    }

    #[test]
    fn roles_and_modes_parse() {
        let conf = parse(
            r#"
service:
  smpp:
    - server:
        addr: smsc.example.com
        port: 2775
      client:
        bind-type: transceiver
        conn-num: 3
      message:
        send:
          content-mode: pre-defined
          require-sr: true
          dcs: 8
          dst:
            daddr:
              prefix: "88"
              generate-length: 3
              generate-type: random
              start: 10
              stop: 20
"#,
        );
        let server = &conf.service.smpp[0];
        assert_eq!(server.client.role, SessionRole::Transceiver);
        assert!(server.client.role.can_send());
        assert!(server.client.role.can_receive());
        assert_eq!(server.message.send.content_mode, ContentMode::PreDefined);
        assert!(server.message.send.require_sr);
        let daddr = &server.message.send.dst.daddr;
        assert_eq!(daddr.strategy, AddrStrategy::Random);
        assert_eq!(daddr.effective_stop(), 20);
    }

    #[test]
    fn unset_stop_defaults_to_width_bound() {
        let spec = AddrSpec {
            generate_len: 3,
            ..AddrSpec::default()
        };
        assert_eq!(spec.effective_stop(), 999);

        let spec = AddrSpec {
            start: 50,
            stop: 20,
            generate_len: 4,
            ..AddrSpec::default()
        };
        // stop <= start falls back to the width bound.
        assert_eq!(spec.effective_stop(), 9999);
    }
}
