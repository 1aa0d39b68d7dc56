use log::{debug, error, info};
use pcap::Device;
use std::net::{IpAddr, Ipv4Addr};

use crate::models::interface::CaptureDevice;
use crate::utils::error::SetupError;

/// Prefix of Npcap device names; the part after the last `_` is the adapter GUID
const NPF_PREFIX: &str = "\\Device\\NPF_";

/// Host-side metadata for one interface, as reported by the OS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostInterface {
    pub name: String,
    pub mac_address: Option<String>,
    pub ipv4_address: Option<Ipv4Addr>,
    pub is_loopback: bool,
}

/// Lists capture-capable interfaces
pub struct DeviceEnumerator;

impl DeviceEnumerator {
    /// Enumerate pcap devices, annotated with host addressing where known
    ///
    /// May return an empty list; that is for the caller to reject.
    pub fn list() -> Result<Vec<CaptureDevice>, SetupError> {
        info!("Fetching capture device list");
        let devices = Device::list()?;
        let host = Self::host_interfaces();
        debug!("pcap reported {} devices, host reported {} interfaces", devices.len(), host.len());

        let entries = devices
            .into_iter()
            .map(|device| {
                let pcap_ipv4 = device.addresses.iter().find_map(|address| match address.addr {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                });
                (device.name, device.desc, pcap_ipv4)
            })
            .collect::<Vec<_>>();

        Ok(correlate(entries, &host))
    }

    /// Fail setup when there is nothing to capture from
    pub fn require_any(devices: &[CaptureDevice]) -> Result<(), SetupError> {
        if devices.is_empty() {
            error!("No capture devices found");
            return Err(SetupError::NoInterfaces);
        }
        Ok(())
    }

    /// Pick the device at `index`
    pub fn select(devices: &[CaptureDevice], index: usize) -> Result<&CaptureDevice, SetupError> {
        Self::require_any(devices)?;
        devices.get(index).ok_or(SetupError::InvalidIndex {
            index,
            count: devices.len(),
        })
    }

    /// Host interface metadata from pnet_datalink
    ///
    /// Some platforms panic inside the interface query; metadata is optional,
    /// so that just yields an empty list.
    fn host_interfaces() -> Vec<HostInterface> {
        match std::panic::catch_unwind(pnet_datalink::interfaces) {
            Ok(interfaces) => interfaces
                .into_iter()
                .map(|iface| HostInterface {
                    ipv4_address: iface.ips.iter().find_map(|net| match net.ip() {
                        IpAddr::V4(ip) => Some(ip),
                        IpAddr::V6(_) => None,
                    }),
                    mac_address: iface.mac.map(|mac| mac.to_string()),
                    is_loopback: iface.is_loopback(),
                    name: iface.name,
                })
                .collect(),
            Err(_) => {
                error!("pnet_datalink panicked while listing interfaces");
                Vec::new()
            }
        }
    }
}

/// Key used to match a pcap device against host interfaces
fn match_key(name: &str) -> &str {
    match name.strip_prefix(NPF_PREFIX) {
        Some(rest) => rest.rsplit('_').next().unwrap_or(rest),
        None => name,
    }
}

/// Join pcap `(name, description, ipv4)` entries with host metadata by name
///
/// Order and indices follow the pcap listing.
pub fn correlate(devices: Vec<(String, Option<String>, Option<Ipv4Addr>)>, host: &[HostInterface]) -> Vec<CaptureDevice> {
    devices
        .into_iter()
        .enumerate()
        .map(|(index, (name, description, pcap_ipv4))| {
            let matched = host
                .iter()
                .find(|iface| iface.name == name)
                .or_else(|| host.iter().find(|iface| match_key(&iface.name) == match_key(&name)));

            let mut device = CaptureDevice::new(index, name).with_description(description);
            device.ipv4_address = matched.and_then(|iface| iface.ipv4_address).or(pcap_ipv4);
            if let Some(iface) = matched {
                device.mac_address = iface.mac_address.clone();
                device.is_loopback = iface.is_loopback;
            }
            device
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str, mac: &str, ip: [u8; 4]) -> HostInterface {
        HostInterface {
            name: name.to_string(),
            mac_address: Some(mac.to_string()),
            ipv4_address: Some(Ipv4Addr::from(ip)),
            is_loopback: false,
        }
    }

    #[test]
    fn correlates_by_exact_name() {
        let devices = vec![
            ("eth0".to_string(), None, None),
            ("any".to_string(), Some("Pseudo-device".to_string()), None),
        ];
        let listed = correlate(devices, &[host("eth0", "02:00:00:00:00:01", [10, 0, 0, 5])]);

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].index, 0);
        assert_eq!(listed[0].mac_address.as_deref(), Some("02:00:00:00:00:01"));
        assert_eq!(listed[0].ipv4_address, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(listed[1].index, 1);
        assert!(listed[1].mac_address.is_none());
        assert_eq!(listed[1].display_name(), "Pseudo-device");
    }

    #[test]
    fn correlates_npcap_names_by_guid() {
        let devices = vec![("\\Device\\NPF_{ABCD-1234}".to_string(), Some("Intel Ethernet".to_string()), None)];
        let listed = correlate(devices, &[host("{ABCD-1234}", "aa:bb:cc:dd:ee:ff", [192, 168, 0, 2])]);

        assert_eq!(listed[0].mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(listed[0].formatted_display(), "Intel Ethernet (192.168.0.2)");
    }

    #[test]
    fn falls_back_to_pcap_address() {
        let devices = vec![("wlan0".to_string(), None, Some(Ipv4Addr::new(172, 16, 0, 9)))];
        let listed = correlate(devices, &[]);

        assert_eq!(listed[0].ipv4_address, Some(Ipv4Addr::new(172, 16, 0, 9)));
        assert!(listed[0].mac_address.is_none());
    }

    #[test]
    fn select_validates_index() {
        let listed = correlate(vec![("eth0".to_string(), None, None)], &[]);

        assert_eq!(DeviceEnumerator::select(&listed, 0).unwrap().name, "eth0");
        assert!(matches!(
            DeviceEnumerator::select(&listed, 3),
            Err(SetupError::InvalidIndex { index: 3, count: 1 })
        ));
        assert!(matches!(DeviceEnumerator::select(&[], 0), Err(SetupError::NoInterfaces)));
    }

    #[test]
    fn empty_device_list_is_a_setup_error() {
        assert!(matches!(DeviceEnumerator::require_any(&[]), Err(SetupError::NoInterfaces)));

        let listed = correlate(vec![("lo".to_string(), None, None)], &[]);
        assert!(DeviceEnumerator::require_any(&listed).is_ok());
    }

    #[test]
    fn loopback_flag_comes_from_host_metadata() {
        let lo = HostInterface {
            name: "lo".to_string(),
            is_loopback: true,
            ..HostInterface::default()
        };
        let listed = correlate(
            vec![("lo".to_string(), None, None), ("eth0".to_string(), None, None)],
            &[lo, host("eth0", "02:00:00:00:00:01", [10, 0, 0, 5])],
        );
        assert!(listed[0].is_loopback);
        assert!(!listed[1].is_loopback);
        assert_eq!(listed[0].formatted_display(), "lo [loopback]");
    }
}
