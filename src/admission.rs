//! The admission gate: IP allowlist, token/secure-mode, and channel
//! safelist checks shared by the WebSocket upgrade path and every HTTP
//! endpoint.

use crate::auth;
use crate::config::ServerConfig;
use crate::error::AdmissionError;

/// Stateless gate built from a [`ServerConfig`] snapshot.
///
/// Holds only what it needs to check (allowlists, secure-mode flag,
/// secret, host key) so it can be cheaply cloned into handler state.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    ip_allowlist: Vec<String>,
    channel_safelist: Vec<String>,
    secure_mode: bool,
    secret: String,
    host_key: String,
}

impl AdmissionGate {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            ip_allowlist: config.ip_allowlist.clone(),
            channel_safelist: config.channel_safelist.clone(),
            secure_mode: config.secure_mode,
            secret: config.secret.clone(),
            host_key: config.host_key.clone(),
        }
    }

    /// Checks whether `remote_addr` (e.g. `"203.0.113.5:51320"`) is
    /// allowed to connect.
    ///
    /// An empty allowlist admits every address. A non-empty allowlist
    /// requires every configured entry to appear as a substring of
    /// `remote_addr` -- matching the original broker's `IpValidation`,
    /// which checks configured IPs against the full `host:port` string.
    #[must_use]
    pub fn check_ip(&self, remote_addr: &str) -> Result<(), AdmissionError> {
        if self.ip_allowlist.is_empty() {
            return Ok(());
        }
        if self.ip_allowlist.iter().all(|ip| remote_addr.contains(ip.as_str())) {
            Ok(())
        } else {
            Err(AdmissionError::IpBlocked)
        }
    }

    /// Checks the secure-mode token, if secure mode is enabled.
    ///
    /// When secure mode is off this always succeeds, even if a token was
    /// supplied -- the original broker never inspects the token field
    /// unless secure mode is active.
    #[must_use]
    pub fn check_token(&self, token: Option<&str>) -> Result<(), AdmissionError> {
        if !self.secure_mode {
            return Ok(());
        }
        match token {
            Some(t) if auth::authenticate(&self.secret, t, &self.host_key) => Ok(()),
            _ => Err(AdmissionError::SecureCheckFailed),
        }
    }

    /// Checks whether `channel` is permitted by the safelist.
    ///
    /// An empty safelist permits every channel name.
    #[must_use]
    pub fn check_safelist(&self, channel: &str) -> Result<(), AdmissionError> {
        if self.channel_safelist.is_empty() || self.channel_safelist.iter().any(|c| c == channel) {
            Ok(())
        } else {
            Err(AdmissionError::ChannelNotAllowed)
        }
    }

    /// Runs the IP and token checks together -- the shared prologue for
    /// WebSocket upgrades and every HTTP endpoint. Channel safelist
    /// checking happens later, once a channel name is known.
    #[must_use]
    pub fn check_connect(&self, remote_addr: &str, token: Option<&str>) -> Result<(), AdmissionError> {
        self.check_ip(remote_addr)?;
        self.check_token(token)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_config() -> ServerConfig {
        ServerConfig::default()
    }

    #[test]
    fn empty_allowlist_admits_any_address() {
        let gate = AdmissionGate::new(&open_config());
        assert!(gate.check_ip("203.0.113.5:51320").is_ok());
    }

    #[test]
    fn allowlist_blocks_unlisted_address() {
        let mut config = open_config();
        config.ip_allowlist = vec!["192.168.1.1".to_string()];
        let gate = AdmissionGate::new(&config);
        assert_eq!(gate.check_ip("203.0.113.5:51320"), Err(AdmissionError::IpBlocked));
    }

    #[test]
    fn allowlist_admits_listed_address() {
        let mut config = open_config();
        config.ip_allowlist = vec!["203.0.113.5".to_string()];
        let gate = AdmissionGate::new(&config);
        assert!(gate.check_ip("203.0.113.5:51320").is_ok());
    }

    #[test]
    fn token_check_skipped_when_secure_mode_off() {
        let gate = AdmissionGate::new(&open_config());
        assert!(gate.check_token(None).is_ok());
        assert!(gate.check_token(Some("anything")).is_ok());
    }

    #[test]
    fn token_check_enforced_when_secure_mode_on() {
        let mut config = open_config();
        config.secure_mode = true;
        config.secret = "s3cr3t".to_string();
        config.host_key = "host-1".to_string();
        let gate = AdmissionGate::new(&config);

        assert_eq!(gate.check_token(None), Err(AdmissionError::SecureCheckFailed));
        assert_eq!(gate.check_token(Some("@@@")), Err(AdmissionError::SecureCheckFailed));

        let token = auth::generate_token("s3cr3t", "host-1").unwrap();
        assert!(gate.check_token(Some(&token)).is_ok());
    }

    #[test]
    fn safelist_empty_permits_any_channel() {
        let gate = AdmissionGate::new(&open_config());
        assert!(gate.check_safelist("whatever").is_ok());
    }

    #[test]
    fn safelist_rejects_unlisted_channel() {
        let mut config = open_config();
        config.channel_safelist = vec!["chat".to_string()];
        let gate = AdmissionGate::new(&config);
        assert_eq!(gate.check_safelist("other"), Err(AdmissionError::ChannelNotAllowed));
    }
}
