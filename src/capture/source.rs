use chrono::{DateTime, Utc};
use log::{info, warn};
use pcap::{Active, Capture, Linktype};

use crate::capture::filter::CompiledFilter;
use crate::models::config::AppConfig;
use crate::models::interface::CaptureDevice;
use crate::utils::error::{FilterError, OpenError};

/// Callback that makes a blocked read return early; safe to call from any thread
pub type Interrupter = Box<dyn Fn() + Send + Sync>;

/// One frame as read from a source, before it gets a sequence number
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<u8>,
    pub orig_len: u32,
}

/// Result of one bounded read
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(SourceFrame),
    /// The read timeout expired with no traffic
    Timeout,
    /// The source has nothing more to deliver (or its read was interrupted)
    Finished,
}

/// Something the capture thread can pull frames from
///
/// `next_frame` must return within roughly one read timeout so the capture
/// loop can observe a stop request even on a silent link.
pub trait FrameSource: Send + 'static {
    /// Link-layer type of every frame this source produces
    fn link_type(&self) -> Linktype;

    /// Block for at most one read timeout
    fn next_frame(&mut self) -> Result<ReadOutcome, pcap::Error>;

    /// Handle that aborts a read in progress, if the source supports it
    fn interrupter(&mut self) -> Option<Interrupter>;
}

/// Live capture from a libpcap device
pub struct PcapSource {
    capture: Capture<Active>,
    link_type: Linktype,
}

impl PcapSource {
    /// Activate `device` in the configured mode and apply `filter`
    ///
    /// The device is released again if the filter cannot be applied.
    pub fn open(device: &CaptureDevice, filter: &CompiledFilter, config: &AppConfig) -> Result<Self, OpenError> {
        info!("Creating capture from device: {}", device.name);
        let capture = Capture::from_device(device.name.as_str()).map_err(|source| OpenError::Device {
            device: device.name.clone(),
            source,
        })?;

        let timeout_ms = i32::try_from(config.read_timeout().as_millis()).unwrap_or(i32::MAX);
        info!(
            "Configuring capture - promiscuous: {}, snaplen: {}, timeout: {}ms",
            config.promiscuous, config.snaplen, timeout_ms
        );
        let mut capture = capture
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(timeout_ms)
            .open()
            .map_err(|source| OpenError::Activate {
                device: device.name.clone(),
                source,
            })?;

        if !filter.is_noop() {
            info!("Applying filter: {}", filter.expression());
            // `capture` is dropped (and the device closed) on the error path
            capture.filter(filter.expression(), true).map_err(|e| FilterError::Compile {
                expression: filter.expression().to_string(),
                reason: e.to_string(),
            })?;
        }

        let link_type = capture.get_datalink();
        if link_type != Linktype::ETHERNET {
            warn!(
                "Device {} uses link type {:?}; frames will be shown as non-Ethernet",
                device.name, link_type
            );
        }

        info!("Successfully opened and activated capture on {}", device.name);
        Ok(Self { capture, link_type })
    }
}

impl FrameSource for PcapSource {
    fn link_type(&self) -> Linktype {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<ReadOutcome, pcap::Error> {
        match self.capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts;
                let timestamp = DateTime::from_timestamp(ts.tv_sec as i64, (ts.tv_usec as u32).saturating_mul(1000))
                    .unwrap_or_else(Utc::now);
                Ok(ReadOutcome::Frame(SourceFrame {
                    timestamp,
                    data: packet.data.to_vec(),
                    orig_len: packet.header.len,
                }))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(ReadOutcome::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(ReadOutcome::Finished),
            Err(e) => Err(e),
        }
    }

    fn interrupter(&mut self) -> Option<Interrupter> {
        let handle = self.capture.breakloop_handle();
        Some(Box::new(move || handle.breakloop()))
    }
}
