//! # ABF2 Stimulation-Protocol Library for Rust
//!
//! A pure Rust model of Axon Binary Format (ABF2) stimulation protocols.
//! Given the metadata extracted from an ABF2 recording (channel tables,
//! per-DAC epoch tables, raw digital bit-field integers), this library
//! reconstructs a complete, queryable description of the acquisition
//! protocol and synthesizes the exact analog command and digital (TTL)
//! waveforms the hardware produced on a given sweep.
//!
//! Byte-level file parsing is out of scope: pair this crate with an ABF
//! loader that produces a [`StimulusMetadata`] record (or any other
//! [`ProtocolSource`] implementation).
//!
//! ## Quick Start
//!
//! ### Building a protocol and reading its epoch table
//!
//! ```rust
//! use abfstim::{ChannelQuery, Protocol, Result};
//!
//! fn main() -> Result<()> {
//!     // Normally produced by your ABF loader; a demo record here
//!     let metadata = abfstim::doctest_utils::demo_metadata();
//!
//!     let protocol = Protocol::from_metadata(&metadata)?;
//!     println!("{} sweeps of {:.3} s at {} Hz",
//!         protocol.sweep_count,
//!         protocol.sweep_duration(),
//!         protocol.sampling_rate);
//!
//!     // Epoch table of the first DAC, as pCLAMP would letter it
//!     let dac = protocol.get_output(&ChannelQuery::Logical(0))?;
//!     for row in dac.epoch_table(0, &protocol)? {
//!         println!("{}  {:<10} {:>8.1}  {}",
//!             row.letter, row.type_name, row.first_level,
//!             row.digital_pattern_low);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Reconstructing what the hardware emitted
//!
//! ```rust
//! use abfstim::{ChannelQuery, Protocol, Result};
//!
//! fn main() -> Result<()> {
//!     let metadata = abfstim::doctest_utils::demo_metadata();
//!     let protocol = Protocol::from_metadata(&metadata)?;
//!     let dac = ChannelQuery::Physical(0);
//!
//!     // Analog command of sweep 3, one sample per acquisition sample
//!     let analog = protocol.synthesize_analog_waveform(&dac, 3)?;
//!     assert_eq!(analog.len(), protocol.samples_per_sweep);
//!
//!     // TTL waveform of digital output 0 on the same sweep, in volts
//!     let ttl = protocol.synthesize_digital_waveform(&dac, 0, 3)?;
//!     assert_eq!(ttl.len(), analog.len());
//!
//!     // Trigger timestamps line up with the recorded signal (the 1/64
//!     // holding period is already accounted for)
//!     let triggers = protocol.digital_trigger_times(&dac, 0, 3)?;
//!     println!("first trigger at {:.4} s", triggers[0]);
//!
//!     Ok(())
//! }
//! ```
//!
//! ### Persistence round-trip
//!
//! ```rust
//! use abfstim::persist::EncodeContext;
//! use abfstim::{Protocol, Result};
//!
//! fn main() -> Result<()> {
//!     let metadata = abfstim::doctest_utils::demo_metadata();
//!     let protocol = Protocol::from_metadata(&metadata)?;
//!
//!     // Encode into a hierarchical group tree, then to JSON
//!     let mut ctx = EncodeContext::new();
//!     let group = protocol.encode(&mut ctx)?;
//!     let json = group.to_json_string()?;
//!
//!     // Decoding reconstructs a value-equal protocol
//!     let group = abfstim::persist::Group::from_json_str(&json)?;
//!     let restored = Protocol::decode(&group)?;
//!     assert_eq!(protocol, restored);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Sweep-varying epochs
//!
//! Epoch levels and durations vary linearly with the sweep index through
//! their delta fields, so the same epoch table describes every sweep:
//!
//! ```rust
//! use abfstim::{ChannelQuery, Protocol};
//!
//! # let metadata = abfstim::doctest_utils::demo_metadata();
//! # let protocol = Protocol::from_metadata(&metadata)?;
//! let dac = protocol.get_output(&ChannelQuery::Logical(0))?;
//! let step = &dac.epochs[0];
//!
//! // demo record: -10 mV first level, +10 mV per sweep
//! assert_eq!(step.actual_level(0), -10.0);
//! assert_eq!(step.actual_level(5), 40.0);
//! # Ok::<(), abfstim::AbfError>(())
//! ```

pub mod error;
pub mod types;
pub mod utils;
pub mod digital;
pub mod epoch;
pub mod metadata;
pub mod channel;
pub mod protocol;
pub mod waveform;
pub mod persist;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use error::{AbfError, Result};
pub use types::{
    AcquisitionMode, AveragingMode, ChannelQuery, ClampMode, EpochTableRow, Pathway, SampleBuffer,
    SourceIdentity, UnitKind, WaveformSource,
};
pub use digital::{ChannelState, DigitalPattern};
pub use epoch::{Epoch, EpochType, PatternBank};
pub use channel::{InputConfig, OutputConfig};
pub use metadata::{
    AdcMetadata, DacMetadata, EpochMetadata, GlobalMetadata, ProtocolSource, StimulusMetadata,
};
pub use protocol::Protocol;

// Important constants
/// The holding period before the epoch region is 1/64 of the sweep samples
pub const HOLDING_DIVISOR: usize = 64;
/// Digital outputs supported per digitizer (two 4-bit banks)
pub const MAX_DIGITAL_OUTPUTS: usize = 8;

/// Library version
///
/// Returns the current version of the abfstim library.
///
/// # Examples
///
/// ```rust
/// use abfstim;
///
/// let version = abfstim::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// println!("abfstim library version: {}", version);
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
