use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Snapshot of one capture-capable interface, taken at enumeration time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDevice {
    /// Position in the enumerated list, used for operator selection
    pub index: usize,

    /// Device system name (used for capture operations)
    pub name: String,

    /// Human-readable description
    pub description: Option<String>,

    /// Link-layer hardware address (if available)
    pub mac_address: Option<String>,

    /// Host IPv4 address bound to the interface (if available)
    pub ipv4_address: Option<Ipv4Addr>,

    /// Whether this is a loopback interface
    pub is_loopback: bool,
}

impl CaptureDevice {
    /// Create a new device entry with just the index and name
    pub fn new(index: usize, name: String) -> Self {
        Self {
            index,
            name,
            description: None,
            mac_address: None,
            ipv4_address: None,
            is_loopback: false,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Description if present, otherwise the system name
    pub fn display_name(&self) -> &str {
        match &self.description {
            Some(desc) if !desc.is_empty() => desc,
            _ => &self.name,
        }
    }

    /// Get a formatted string with interface name, IP (if available) and a loopback marker
    pub fn formatted_display(&self) -> String {
        let mut text = match self.ipv4_address {
            Some(ip) => format!("{} ({})", self.display_name(), ip),
            None => self.display_name().to_string(),
        };
        if self.is_loopback {
            text.push_str(" [loopback]");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_description_and_shows_address() {
        let mut device = CaptureDevice::new(0, "eth0".to_string()).with_description(Some("Ethernet".to_string()));
        device.ipv4_address = Some(Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(device.formatted_display(), "Ethernet (10.0.0.5)");

        device.description = Some(String::new());
        device.is_loopback = true;
        assert_eq!(device.formatted_display(), "eth0 (10.0.0.5) [loopback]");
    }
}
