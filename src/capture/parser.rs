use log::{log_enabled, trace, Level};
use pcap::Linktype;
use pnet::packet::{
    ethernet::{EtherTypes, EthernetPacket},
    icmp::IcmpPacket,
    ip::{IpNextHeaderProtocol, IpNextHeaderProtocols},
    ipv4::Ipv4Packet,
    tcp::{TcpFlags, TcpPacket},
    udp::UdpPacket,
    Packet as PnetPacket,
};

use crate::models::packet::{DecodedRecord, RawFrame, TransportProtocol};

const NON_ETHERNET_DETAIL: &str = "Non-Ethernet frame";
const NON_IPV4_DETAIL: &str = "Non-IPv4 payload";
const IPV4_MIN_HEADER_WORDS: u8 = 5;

/// Decodes raw frames into display records
///
/// Decoding is total: every byte sequence yields a record. A layer that
/// cannot be parsed degrades the record to the tag for that layer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PacketDecoder;

impl PacketDecoder {
    /// Create a new packet decoder
    pub fn new() -> Self {
        Self
    }

    /// Decode one frame
    pub fn decode(&self, frame: &RawFrame) -> DecodedRecord {
        if log_enabled!(Level::Trace) {
            trace!("Decoding frame #{} ({} bytes, linktype {:?})", frame.seq, frame.data.len(), frame.link_type);
        }

        if frame.link_type != Linktype::ETHERNET {
            return DecodedRecord::bare(frame, TransportProtocol::NotEthernet, NON_ETHERNET_DETAIL);
        }

        let eth_packet = match EthernetPacket::new(&frame.data) {
            Some(packet) => packet,
            None => return DecodedRecord::bare(frame, TransportProtocol::NotEthernet, NON_ETHERNET_DETAIL),
        };

        let mut record = DecodedRecord::bare(frame, TransportProtocol::NotIpv4, NON_IPV4_DETAIL);
        record.source_mac = Some(eth_packet.get_source().to_string());
        record.destination_mac = Some(eth_packet.get_destination().to_string());

        if eth_packet.get_ethertype() == EtherTypes::Ipv4 {
            self.decode_ipv4(eth_packet.payload(), &mut record);
        }

        record
    }

    /// Fill network and transport fields; leaves the NotIPv4 tag on failure
    fn decode_ipv4(&self, data: &[u8], record: &mut DecodedRecord) {
        let ipv4_packet = match Ipv4Packet::new(data) {
            Some(packet) => packet,
            None => return,
        };

        let header_words = ipv4_packet.get_header_length();
        if ipv4_packet.get_version() != 4
            || header_words < IPV4_MIN_HEADER_WORDS
            || header_words as usize * 4 > data.len()
        {
            return;
        }

        record.source_ip = Some(ipv4_packet.get_source());
        record.destination_ip = Some(ipv4_packet.get_destination());

        if log_enabled!(Level::Trace) {
            trace!("IPv4 - src: {}, dst: {}, proto: {:?}",
                   ipv4_packet.get_source(),
                   ipv4_packet.get_destination(),
                   ipv4_packet.get_next_level_protocol());
        }

        let proto = ipv4_packet.get_next_level_protocol();
        // The payload is bounded by what was captured, not by total_length
        let payload = &data[header_words as usize * 4..];
        let (protocol, detail) = decode_transport(proto, payload);
        record.protocol = protocol;
        record.detail = detail;
    }
}

/// Summarise the transport header carried by an IPv4 packet
fn decode_transport(proto: IpNextHeaderProtocol, data: &[u8]) -> (TransportProtocol, String) {
    match proto {
        IpNextHeaderProtocols::Tcp => {
            let detail = match TcpPacket::new(data) {
                Some(tcp) => format_tcp(tcp.get_source(), tcp.get_destination(), tcp.get_flags() as u16),
                None => "Truncated TCP header".to_string(),
            };
            (TransportProtocol::Tcp, detail)
        }
        IpNextHeaderProtocols::Udp => {
            let detail = match UdpPacket::new(data) {
                Some(udp) => format!("Ports: {}->{}", udp.get_source(), udp.get_destination()),
                None => "Truncated UDP header".to_string(),
            };
            (TransportProtocol::Udp, detail)
        }
        IpNextHeaderProtocols::Icmp => {
            let detail = match IcmpPacket::new(data) {
                Some(icmp) => format!("Type/Code: {}/{}", icmp.get_icmp_type().0, icmp.get_icmp_code().0),
                None => "Truncated ICMP header".to_string(),
            };
            (TransportProtocol::Icmp, detail)
        }
        other => (TransportProtocol::Other, format!("Unexpected: {}", protocol_name(other))),
    }
}

/// Port pair followed by the SYN/ACK/FIN flags that are set, in that order
fn format_tcp(source: u16, destination: u16, flags: u16) -> String {
    let mut names = Vec::with_capacity(3);
    if flags & TcpFlags::SYN as u16 != 0 {
        names.push("SYN");
    }
    if flags & TcpFlags::ACK as u16 != 0 {
        names.push("ACK");
    }
    if flags & TcpFlags::FIN as u16 != 0 {
        names.push("FIN");
    }

    format!("Ports: {}->{}, Flags: {}", source, destination, names.join(" "))
        .trim_end()
        .to_string()
}

/// IANA keyword for the common IP protocol numbers
fn protocol_name(proto: IpNextHeaderProtocol) -> String {
    let name = match proto.0 {
        0 => "HOPOPT",
        2 => "IGMP",
        4 => "IPIP",
        41 => "IPv6",
        43 => "IPv6-Route",
        44 => "IPv6-Frag",
        46 => "RSVP",
        47 => "GRE",
        50 => "ESP",
        51 => "AH",
        58 => "ICMPv6",
        89 => "OSPF",
        103 => "PIM",
        112 => "VRRP",
        115 => "L2TP",
        132 => "SCTP",
        136 => "UDPLite",
        n => return format!("IP({})", n),
    };
    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pnet::packet::ethernet::MutableEthernetPacket;
    use pnet::packet::icmp::{IcmpCode, IcmpType, MutableIcmpPacket};
    use pnet::packet::ipv4::MutableIpv4Packet;
    use pnet::packet::tcp::MutableTcpPacket;
    use pnet::packet::udp::MutableUdpPacket;
    use pnet::util::MacAddr;
    use std::net::Ipv4Addr;

    const ETH_LEN: usize = 14;
    const IP_LEN: usize = 20;

    fn frame(data: Vec<u8>, link_type: Linktype) -> RawFrame {
        RawFrame {
            seq: 7,
            timestamp: Utc::now(),
            link_type,
            orig_len: data.len() as u32,
            data,
        }
    }

    /// Ethernet + IPv4 frame carrying `transport` bytes with the given protocol
    fn ipv4_frame(proto: IpNextHeaderProtocol, transport: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; ETH_LEN + IP_LEN + transport.len()];
        {
            let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
            eth.set_source(MacAddr::new(0x02, 0, 0, 0, 0, 0x01));
            eth.set_destination(MacAddr::new(0x02, 0, 0, 0, 0, 0x02));
            eth.set_ethertype(EtherTypes::Ipv4);
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buf[ETH_LEN..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((IP_LEN + transport.len()) as u16);
            ip.set_ttl(64);
            ip.set_next_level_protocol(proto);
            ip.set_source(Ipv4Addr::new(10, 0, 0, 1));
            ip.set_destination(Ipv4Addr::new(10, 0, 0, 2));
        }
        buf[ETH_LEN + IP_LEN..].copy_from_slice(transport);
        buf
    }

    fn tcp_segment(source: u16, destination: u16, flags: u8) -> Vec<u8> {
        let mut buf = vec![0u8; 20];
        let mut tcp = MutableTcpPacket::new(&mut buf).unwrap();
        tcp.set_source(source);
        tcp.set_destination(destination);
        tcp.set_data_offset(5);
        tcp.set_flags(flags.into());
        buf
    }

    #[test]
    fn tcp_syn_ack_lists_flags_in_fixed_order() {
        let data = ipv4_frame(IpNextHeaderProtocols::Tcp, &tcp_segment(443, 51010, TcpFlags::ACK as u8 | TcpFlags::SYN as u8));
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::Tcp);
        assert_eq!(record.detail, "Ports: 443->51010, Flags: SYN ACK");
        assert_eq!(record.source_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(record.destination_ip, Some(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(record.source_mac.as_deref(), Some("02:00:00:00:00:01"));
        assert_eq!(record.seq, 7);
    }

    #[test]
    fn tcp_without_tracked_flags_trims_trailing_space() {
        let data = ipv4_frame(IpNextHeaderProtocols::Tcp, &tcp_segment(1234, 80, TcpFlags::PSH as u8));
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.detail, "Ports: 1234->80, Flags:");
    }

    #[test]
    fn udp_reports_port_pair() {
        let mut buf = vec![0u8; 8];
        {
            let mut udp = MutableUdpPacket::new(&mut buf).unwrap();
            udp.set_source(53);
            udp.set_destination(40000);
            udp.set_length(8);
        }
        let record = PacketDecoder::new().decode(&frame(ipv4_frame(IpNextHeaderProtocols::Udp, &buf), Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::Udp);
        assert_eq!(record.detail, "Ports: 53->40000");
    }

    #[test]
    fn icmp_echo_request_reports_type_and_code() {
        let mut buf = vec![0u8; 8];
        {
            let mut icmp = MutableIcmpPacket::new(&mut buf).unwrap();
            icmp.set_icmp_type(IcmpType(8));
            icmp.set_icmp_code(IcmpCode(0));
        }
        let record = PacketDecoder::new().decode(&frame(ipv4_frame(IpNextHeaderProtocols::Icmp, &buf), Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::Icmp);
        assert!(record.detail.contains("8/0"));
    }

    #[test]
    fn unexpected_transport_is_named() {
        let data = ipv4_frame(IpNextHeaderProtocols::Igmp, &[0x11, 0, 0, 0, 0, 0, 0, 0]);
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::Other);
        assert_eq!(record.detail, "Unexpected: IGMP");
    }

    #[test]
    fn non_ethernet_link_type_has_no_addresses() {
        let data = ipv4_frame(IpNextHeaderProtocols::Tcp, &tcp_segment(1, 2, 0));
        let record = PacketDecoder::new().decode(&frame(data, Linktype(113)));

        assert_eq!(record.protocol, TransportProtocol::NotEthernet);
        assert_eq!(record.detail, "Non-Ethernet frame");
        assert!(record.source_mac.is_none() && record.destination_mac.is_none());
        assert!(record.source_ip.is_none() && record.destination_ip.is_none());
    }

    #[test]
    fn arp_is_not_ipv4() {
        let mut buf = vec![0u8; 42];
        {
            let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
            eth.set_ethertype(EtherTypes::Arp);
        }
        let record = PacketDecoder::new().decode(&frame(buf, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::NotIpv4);
        assert_eq!(record.detail, "Non-IPv4 payload");
        assert!(record.source_mac.is_some());
        assert!(record.source_ip.is_none());
    }

    #[test]
    fn truncated_ipv4_header_degrades_to_not_ipv4() {
        let mut data = ipv4_frame(IpNextHeaderProtocols::Tcp, &tcp_segment(1, 2, 0));
        data.truncate(ETH_LEN + 10);
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::NotIpv4);
        assert!(record.source_ip.is_none());
    }

    #[test]
    fn bogus_header_length_degrades_to_not_ipv4() {
        let mut data = ipv4_frame(IpNextHeaderProtocols::Udp, &[0u8; 8]);
        data[ETH_LEN] = 0x4f; // IHL of 15 words, longer than the packet
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::NotIpv4);
    }

    #[test]
    fn truncated_tcp_header_keeps_tcp_tag() {
        let data = ipv4_frame(IpNextHeaderProtocols::Tcp, &[0x01, 0xbb]);
        let record = PacketDecoder::new().decode(&frame(data, Linktype::ETHERNET));

        assert_eq!(record.protocol, TransportProtocol::Tcp);
        assert_eq!(record.detail, "Truncated TCP header");
        assert!(record.source_ip.is_some());
    }

    #[test]
    fn any_prefix_of_a_frame_decodes() {
        let full = ipv4_frame(IpNextHeaderProtocols::Tcp, &tcp_segment(443, 51010, 0x12));
        let decoder = PacketDecoder::new();
        for len in 0..=full.len() {
            let record = decoder.decode(&frame(full[..len].to_vec(), Linktype::ETHERNET));
            assert!(TransportProtocol::ALL.contains(&record.protocol));
        }
    }

    #[test]
    fn empty_frame_is_not_ethernet() {
        let record = PacketDecoder::new().decode(&frame(Vec::new(), Linktype::ETHERNET));
        assert_eq!(record.protocol, TransportProtocol::NotEthernet);
    }
}
