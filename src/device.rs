//! Axis VAPIX transport
//! Device addressing and credential validation

use serde::{ Deserialize, Serialize };
use url::Url;

use crate::error::{ Result, VapixError };

/// Protocol types for camera communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn port(&self) -> u16 {
        match self {
            Protocol::Http => 80,
            Protocol::Https => 443,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// A fully resolved camera: where it is and how to log in.
///
/// Supplied per call by the caller and never stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Host name or IP address, optionally with `:port`
    pub address: String,
    pub user: String,
    pub password: String,
    #[serde(default)]
    pub protocol: Protocol,
}

impl Device {
    pub fn new(
        address: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        protocol: Protocol
    ) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            password: password.into(),
            protocol,
        }
    }

    /// Reject devices missing any of address, user or password
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() || self.user.is_empty() || self.password.is_empty() {
            return Err(VapixError::invalid_input("Missing address, user or password"));
        }
        Ok(())
    }

    /// Absolute URL for a device path such as `/axis-cgi/param.cgi?action=list`
    pub fn url(&self, path: &str) -> Result<Url> {
        if !path.starts_with('/') {
            return Err(VapixError::invalid_input(format!("Path must start with '/': {}", path)));
        }
        let raw = format!("{}://{}{}", self.protocol.scheme(), self.address.trim(), path);
        Url::parse(&raw).map_err(|e| {
            VapixError::invalid_input(format!("Invalid device URL {}: {}", raw, e))
        })
    }
}
