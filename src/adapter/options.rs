//! Option structures for the protocol adapters.
//!
//! Field names serialize to the keys used by Clash-style outbound configs, so
//! a provider can forward them to a config-driven library without remapping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Canonical name of the simple-obfs plugin.
pub const OBFS_PLUGIN: &str = "obfs";

/// Map legacy simple-obfs plugin names to [`OBFS_PLUGIN`].
pub fn normalize_plugin(plugin: &str) -> &str {
    match plugin {
        "obfs-local" | "simple-obfs" => OBFS_PLUGIN,
        other => other,
    }
}

/// Parse a JSON-encoded plugin options object.
///
/// A JSON `null` yields empty options.
pub fn parse_plugin_opts(raw: &str) -> Result<Map<String, Value>> {
    let opts: Option<Map<String, Value>> = serde_json::from_str(raw)?;
    Ok(opts.unwrap_or_default())
}

fn check_endpoint(server: &str, port: u16) -> Result<()> {
    if server.is_empty() {
        return Err(Error::config("server cannot be empty"));
    }
    if port == 0 {
        return Err(Error::config("port cannot be zero"));
    }
    Ok(())
}

/// Shadowsocks outbound options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksOption {
    /// Server host
    pub server: String,
    /// Server port
    pub port: u16,
    /// Password
    pub password: String,
    /// Cipher method, e.g. `aes-256-gcm`
    pub cipher: String,
    /// SIP003 plugin name, empty for none
    #[serde(default)]
    pub plugin: String,
    /// Plugin options
    #[serde(default, rename = "plugin-opts")]
    pub plugin_opts: Map<String, Value>,
}

impl ShadowsocksOption {
    /// Options without a plugin.
    pub fn new(
        server: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        cipher: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            password: password.into(),
            cipher: cipher.into(),
            plugin: String::new(),
            plugin_opts: Map::new(),
        }
    }

    /// Attach a plugin whose options arrive as a JSON object string.
    ///
    /// Fails if `opts_json` is not a JSON object.
    pub fn with_plugin(mut self, plugin: &str, opts_json: &str) -> Result<Self> {
        self.plugin = normalize_plugin(plugin).to_string();
        self.plugin_opts = parse_plugin_opts(opts_json)?;
        Ok(self)
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        check_endpoint(&self.server, self.port)?;
        if self.cipher.is_empty() {
            return Err(Error::config("cipher cannot be empty"));
        }
        Ok(())
    }
}

/// ShadowsocksR outbound options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksROption {
    /// Server host
    pub server: String,
    /// Server port
    pub port: u16,
    /// Password
    pub password: String,
    /// Cipher method
    pub cipher: String,
    /// Obfuscation method
    pub obfs: String,
    /// Obfuscation parameter
    #[serde(default, rename = "obfs-param")]
    pub obfs_param: String,
    /// Protocol plugin
    pub protocol: String,
    /// Protocol parameter
    #[serde(default, rename = "protocol-param")]
    pub protocol_param: String,
    /// Relay UDP as well as TCP
    #[serde(default)]
    pub udp: bool,
}

impl ShadowsocksROption {
    /// Options with `plain` obfuscation and `origin` protocol.
    pub fn new(
        server: impl Into<String>,
        port: u16,
        password: impl Into<String>,
        cipher: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            password: password.into(),
            cipher: cipher.into(),
            obfs: "plain".to_string(),
            obfs_param: String::new(),
            protocol: "origin".to_string(),
            protocol_param: String::new(),
            udp: false,
        }
    }

    /// Set the obfuscation method and its parameter.
    pub fn with_obfs(mut self, obfs: impl Into<String>, param: impl Into<String>) -> Self {
        self.obfs = obfs.into();
        self.obfs_param = param.into();
        self
    }

    /// Set the protocol plugin and its parameter.
    pub fn with_protocol(mut self, protocol: impl Into<String>, param: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self.protocol_param = param.into();
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        check_endpoint(&self.server, self.port)
    }
}

/// Snell obfuscation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnellObfsOption {
    /// `http`, `tls`, or empty for none
    pub mode: String,
    /// Host presented by the obfuscation layer
    pub host: String,
}

/// Snell outbound options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnellOption {
    /// Server host
    pub server: String,
    /// Server port
    pub port: u16,
    /// Pre-shared key
    pub psk: String,
    /// Protocol version
    #[serde(default)]
    pub version: u32,
    /// Obfuscation settings
    #[serde(default, rename = "obfs-opts")]
    pub obfs_opts: SnellObfsOption,
}

impl SnellOption {
    /// Options without obfuscation.
    pub fn new(server: impl Into<String>, port: u16, psk: impl Into<String>, version: u32) -> Self {
        Self {
            server: server.into(),
            port,
            psk: psk.into(),
            version,
            obfs_opts: SnellObfsOption::default(),
        }
    }

    /// Set the obfuscation mode and host.
    pub fn with_obfs(mut self, mode: impl Into<String>, host: impl Into<String>) -> Self {
        self.obfs_opts = SnellObfsOption {
            mode: mode.into(),
            host: host.into(),
        };
        self
    }

    /// Validate the options.
    pub fn validate(&self) -> Result<()> {
        check_endpoint(&self.server, self.port)?;
        if self.psk.is_empty() {
            return Err(Error::config("psk cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_plugin() {
        assert_eq!(normalize_plugin("obfs-local"), "obfs");
        assert_eq!(normalize_plugin("simple-obfs"), "obfs");
        assert_eq!(normalize_plugin("v2ray-plugin"), "v2ray-plugin");
        assert_eq!(normalize_plugin(""), "");
    }

    #[test]
    fn test_shadowsocks_plugin() {
        let opts = ShadowsocksOption::new("ss.example.com", 8388, "secret", "aes-256-gcm")
            .with_plugin("obfs-local", r#"{"mode":"http","host":"bing.com"}"#)
            .unwrap();

        assert_eq!(opts.plugin, "obfs");
        assert_eq!(opts.plugin_opts["mode"], "http");
        assert_eq!(opts.plugin_opts["host"], "bing.com");
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_malformed_plugin_opts() {
        for raw in ["", "{", "[1,2]", "\"mode\""] {
            let result = ShadowsocksOption::new("ss.example.com", 8388, "secret", "aes-256-gcm")
                .with_plugin("simple-obfs", raw);
            assert!(
                matches!(result, Err(Error::PluginOptions(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_null_plugin_opts() {
        assert!(parse_plugin_opts("null").unwrap().is_empty());
        assert!(parse_plugin_opts("{}").unwrap().is_empty());
    }

    #[test]
    fn test_snell_obfs_nesting() {
        let opts = SnellOption::new("snell.example.com", 443, "psk", 2).with_obfs("tls", "cdn.example.com");
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["obfs-opts"]["mode"], "tls");
        assert_eq!(json["obfs-opts"]["host"], "cdn.example.com");
        assert_eq!(json["version"], 2);
    }

    #[test]
    fn test_ssr_params_verbatim() {
        let opts = ShadowsocksROption::new("ssr.example.com", 443, "pw", "chacha20-ietf")
            .with_obfs("tls1.2_ticket_auth", "a.example.com")
            .with_protocol("auth_aes128_md5", "1:abc");
        let json = serde_json::to_value(&opts).unwrap();
        assert_eq!(json["obfs-param"], "a.example.com");
        assert_eq!(json["protocol"], "auth_aes128_md5");
        assert_eq!(json["protocol-param"], "1:abc");
    }

    #[test]
    fn test_validation() {
        assert!(ShadowsocksOption::new("", 8388, "pw", "aes-128-gcm").validate().is_err());
        assert!(ShadowsocksOption::new("h", 0, "pw", "aes-128-gcm").validate().is_err());
        assert!(ShadowsocksOption::new("h", 1, "pw", "").validate().is_err());
        assert!(SnellOption::new("h", 1, "", 1).validate().is_err());
        assert!(ShadowsocksROption::new("h", 1, "pw", "rc4-md5").validate().is_ok());
    }
}
