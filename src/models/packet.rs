use chrono::{DateTime, Utc};
use pcap::Linktype;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// One frame as delivered by the capture device
///
/// Produced once per captured packet and consumed exactly once by the
/// decoder; nothing retains it afterwards.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// One-based capture sequence number, monotonic within a session
    pub seq: u64,

    /// Capture timestamp reported by the device
    pub timestamp: DateTime<Utc>,

    /// Link-layer type of the device the frame came from
    pub link_type: Linktype,

    /// Captured bytes (may be shorter than the wire length)
    pub data: Vec<u8>,

    /// Length of the frame on the wire
    pub orig_len: u32,
}

/// Coarsest layer a frame could be decoded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Icmp,
    /// IPv4 carrying a transport the decoder does not summarise
    Other,
    /// Ethernet frame whose payload is not IPv4
    NotIpv4,
    /// Frame that could not be decoded as Ethernet
    NotEthernet,
}

impl TransportProtocol {
    pub const ALL: [TransportProtocol; 6] = [
        TransportProtocol::Tcp,
        TransportProtocol::Udp,
        TransportProtocol::Icmp,
        TransportProtocol::Other,
        TransportProtocol::NotIpv4,
        TransportProtocol::NotEthernet,
    ];
}

impl fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Icmp => "ICMP",
            TransportProtocol::Other => "Other",
            TransportProtocol::NotIpv4 => "Not IPv4",
            TransportProtocol::NotEthernet => "Not Ethernet",
        };
        f.pad(name)
    }
}

/// Structured summary of one frame, the unit stored in the display sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRecord {
    /// Sequence number copied from the raw frame
    pub seq: u64,

    /// Capture timestamp copied from the raw frame
    pub timestamp: DateTime<Utc>,

    /// Layer 2 source (MAC address)
    pub source_mac: Option<String>,

    /// Layer 2 destination (MAC address)
    pub destination_mac: Option<String>,

    /// Source IPv4 address
    pub source_ip: Option<Ipv4Addr>,

    /// Destination IPv4 address
    pub destination_ip: Option<Ipv4Addr>,

    /// Transport tag
    pub protocol: TransportProtocol,

    /// Transport summary (ports, flags, type/code)
    pub detail: String,

    /// Length of the frame on the wire
    pub length: usize,
}

impl DecodedRecord {
    /// A record with only the frame metadata filled in
    pub fn bare(frame: &RawFrame, protocol: TransportProtocol, detail: impl Into<String>) -> Self {
        Self {
            seq: frame.seq,
            timestamp: frame.timestamp,
            source_mac: None,
            destination_mac: None,
            source_ip: None,
            destination_ip: None,
            protocol,
            detail: detail.into(),
            length: frame.orig_len as usize,
        }
    }
}
