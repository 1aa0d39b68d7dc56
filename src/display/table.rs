use chrono::Local;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::io::{self, Write};

use crate::capture::session::SessionState;
use crate::models::config::EvictionPolicy;
use crate::models::packet::DecodedRecord;
use crate::models::stats::CaptureStats;

const SEQ_WIDTH: usize = 6;
const TIME_WIDTH: usize = 12;
const MAC_WIDTH: usize = 17;
const IP_WIDTH: usize = 15;
const PROTO_WIDTH: usize = 12;
const MISSING: &str = "-";

/// Context printed above the table
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub device: String,
    pub filter: String,
    pub state: SessionState,
    pub stats: CaptureStats,
    pub max_rows: usize,
    pub eviction: EvictionPolicy,
    pub cancel_key: char,
}

impl StatusLine {
    fn render(&self) -> String {
        let filter = if self.filter.is_empty() { "<none>" } else { &self.filter };
        let eviction = match self.eviction {
            EvictionPolicy::BulkClear => "bulk-clear",
            EvictionPolicy::SlidingWindow => "sliding-window",
        };
        format!(
            "{} | filter: {} | {} | frames: {} | view: {} rows, {} | press '{}' to stop",
            self.device,
            filter,
            self.state,
            self.stats.total_packets,
            self.max_rows,
            eviction,
            self.cancel_key.to_ascii_uppercase()
        )
    }
}

/// Column header in the same layout as [`format_row`]
pub fn format_header() -> String {
    format!(
        "{:>seq$} {:<time$} {:<mac$} {:<mac$} {:<ip$} {:<ip$} {:<proto$} {}",
        "Seq",
        "Timestamp",
        "SrcMAC",
        "DstMAC",
        "SrcIP",
        "DstIP",
        "Protocol",
        "TransportDetail",
        seq = SEQ_WIDTH,
        time = TIME_WIDTH,
        mac = MAC_WIDTH,
        ip = IP_WIDTH,
        proto = PROTO_WIDTH,
    )
}

/// One table line; absent addresses render as `-`
pub fn format_row(record: &DecodedRecord) -> String {
    let or_missing = |value: Option<String>| value.unwrap_or_else(|| MISSING.to_string());

    format!(
        "{:>seq$} {:<time$} {:<mac$} {:<mac$} {:<ip$} {:<ip$} {:<proto$} {}",
        record.seq,
        record.timestamp.with_timezone(&Local).format("%H:%M:%S%.3f").to_string(),
        or_missing(record.source_mac.clone()),
        or_missing(record.destination_mac.clone()),
        or_missing(record.source_ip.map(|ip| ip.to_string())),
        or_missing(record.destination_ip.map(|ip| ip.to_string())),
        record.protocol,
        record.detail,
        seq = SEQ_WIDTH,
        time = TIME_WIDTH,
        mac = MAC_WIDTH,
        ip = IP_WIDTH,
        proto = PROTO_WIDTH,
    )
}

/// All screen lines for one frame of the display, clipped to `width` columns
pub fn render_lines(status: &StatusLine, records: &[DecodedRecord], width: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(records.len() + 3);
    lines.push(status.render());
    lines.push(format_header());
    lines.push("-".repeat(width));
    lines.extend(records.iter().map(format_row));

    for line in &mut lines {
        if let Some((cut, _)) = line.char_indices().nth(width) {
            line.truncate(cut);
        }
    }
    lines
}

/// Draws the table on the alternate screen
///
/// Creating it switches the terminal to raw mode (so single keys can be
/// read) and the alternate screen; dropping it restores the terminal even
/// on an error path.
pub struct TableRenderer<W: Write> {
    out: W,
}

impl<W: Write> TableRenderer<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        if let Err(e) = execute!(out, EnterAlternateScreen, Hide) {
            let _ = terminal::disable_raw_mode();
            return Err(e);
        }
        Ok(Self { out })
    }

    /// Redraw the whole screen
    pub fn draw(&mut self, status: &StatusLine, records: &[DecodedRecord]) -> io::Result<()> {
        let (cols, rows) = terminal::size().unwrap_or((120, 40));
        let lines = render_lines(status, records, cols as usize);

        queue!(self.out, Clear(ClearType::All))?;
        for (row, line) in lines.iter().take(rows as usize).enumerate() {
            queue!(self.out, MoveTo(0, row as u16))?;
            if row == 1 {
                queue!(self.out, SetAttribute(Attribute::Bold), Print(line), SetAttribute(Attribute::Reset))?;
            } else {
                queue!(self.out, Print(line))?;
            }
        }
        self.out.flush()
    }
}

impl<W: Write> Drop for TableRenderer<W> {
    fn drop(&mut self) {
        let _ = execute!(self.out, Show, LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::packet::TransportProtocol;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn tcp_record() -> DecodedRecord {
        DecodedRecord {
            seq: 42,
            timestamp: Utc::now(),
            source_mac: Some("02:00:00:00:00:01".to_string()),
            destination_mac: Some("02:00:00:00:00:02".to_string()),
            source_ip: Some(Ipv4Addr::new(192, 168, 1, 10)),
            destination_ip: Some(Ipv4Addr::new(93, 184, 216, 34)),
            protocol: TransportProtocol::Tcp,
            detail: "Ports: 51010->443, Flags: SYN".to_string(),
            length: 74,
        }
    }

    fn status() -> StatusLine {
        StatusLine {
            device: "eth0".to_string(),
            filter: String::new(),
            state: SessionState::Capturing,
            stats: CaptureStats::default(),
            max_rows: 20,
            eviction: EvictionPolicy::BulkClear,
            cancel_key: 'q',
        }
    }

    #[test]
    fn header_names_every_column() {
        let header = format_header();
        for column in ["Seq", "Timestamp", "SrcMAC", "DstMAC", "SrcIP", "DstIP", "Protocol", "TransportDetail"] {
            assert!(header.contains(column), "missing {}", column);
        }
    }

    #[test]
    fn row_contains_decoded_fields() {
        let row = format_row(&tcp_record());
        assert!(row.trim_start().starts_with("42 "));
        assert!(row.contains("192.168.1.10"));
        assert!(row.contains("93.184.216.34"));
        assert!(row.contains("TCP"));
        assert!(row.ends_with("Ports: 51010->443, Flags: SYN"));
    }

    #[test]
    fn missing_addresses_render_as_dash() {
        let mut record = tcp_record();
        record.source_mac = None;
        record.source_ip = None;
        record.protocol = TransportProtocol::NotEthernet;
        let row = format_row(&record);
        assert!(row.contains(" - "));
        assert!(row.contains("Not Ethernet"));
    }

    #[test]
    fn lines_are_clipped_to_width() {
        let lines = render_lines(&status(), &[tcp_record()], 40);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|line| line.chars().count() <= 40));
        assert!(lines[0].starts_with("eth0 | filter: <none>"));
    }
}
