//! Live packet inspection: capture frames from an interface on a dedicated
//! thread, decode their link, network and transport layers, and keep a
//! bounded, thread-safe rolling view of the most recent records.

pub mod capture;
pub mod display;
pub mod input;
pub mod models;
pub mod utils;

pub use capture::devices::DeviceEnumerator;
pub use capture::filter::{CompiledFilter, FilterCompiler};
pub use capture::parser::PacketDecoder;
pub use capture::session::{CaptureSession, CaptureSummary, EndReason, SessionState, StopHandle};
pub use capture::source::{FrameSource, PcapSource, ReadOutcome, SourceFrame};
pub use display::sink::DisplaySink;
pub use input::InputWatcher;
