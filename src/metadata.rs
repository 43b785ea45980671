use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Global acquisition parameters extracted from an ABF2 header
///
/// All counts and codes are carried exactly as the loader reported them;
/// validation happens when a [`Protocol`](crate::Protocol) is constructed,
/// never here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetadata {
    /// Major format version of the source file (2 for ABF2)
    pub format_version_major: i32,
    pub adc_count: usize,
    pub dac_count: usize,
    /// Number of digital outputs on the digitizer (4 or 8)
    pub digital_output_count: usize,
    /// Physical index of the DAC configured as the digital-output emitter.
    /// Carried verbatim from the source; see
    /// [`Protocol::active_dac_index`](crate::Protocol::active_dac_index).
    pub active_dac_index: usize,
    pub alternate_analog_outputs: bool,
    pub alternate_digital_outputs: bool,
    /// Train pulses drive high when true (ABF2 `nDigitalTrainActiveLogic`)
    pub digital_train_active_high: bool,
    /// Per-digital-channel holding state (true = held high between epochs)
    pub digital_holding: Vec<bool>,
    /// ABF2 `nOperationMode` code
    pub acquisition_mode_code: i32,
    pub sweep_count: usize,
    pub run_count: usize,
    pub trial_count: usize,
    /// Samples per sweep, per ADC channel
    pub samples_per_sweep: usize,
    /// Total samples in the recording, across sweeps and ADC channels
    pub total_sample_count: usize,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    /// ABF2 `nAverageAlgorithm` code
    pub averaging_mode_code: i32,
    pub averaging_weight: u32,
    /// GUID or content hash of the source file
    pub file_guid: String,
    /// Path of the protocol file recorded in the header
    pub protocol_path: String,
    pub recording_start_date: Option<NaiveDate>,
    pub recording_start_time: Option<NaiveTime>,
}

/// Per-ADC (input) channel metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcMetadata {
    pub physical_index: usize,
    pub name: String,
    pub units: String,
}

/// Per-DAC (output) channel metadata, with its epoch table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DacMetadata {
    pub physical_index: usize,
    pub name: String,
    pub units: String,
    /// Holding level in this DAC's units
    pub holding_level: f64,
    /// Return to the holding level between episodes
    pub return_to_hold: bool,
    pub analog_waveform_enabled: bool,
    /// ABF2 `nWaveformSource` code
    pub waveform_source_code: i32,
    pub epochs: Vec<EpochMetadata>,
}

/// Per-epoch metadata: levels, timing in samples, raw digital words
///
/// Durations and pulse timing are sample counts, as ABF2 stores them; the
/// model converts to seconds with the protocol sampling rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetadata {
    /// ABF2 `nEpochType` code
    pub type_code: i32,
    pub first_level: f64,
    pub level_delta: f64,
    pub first_duration_samples: i64,
    pub duration_delta_samples: i64,
    pub pulse_period_samples: i64,
    pub pulse_width_samples: i64,
    /// Raw step word of the main digital pattern
    pub main_step_word: u16,
    /// Raw train word of the main digital pattern
    pub main_train_word: u16,
    /// Raw step word of the alternate digital pattern
    pub alternate_step_word: u16,
    /// Raw train word of the alternate digital pattern
    pub alternate_train_word: u16,
    /// Alternate DIG-out state flag, verbatim from the source
    pub alternate_dig_out_state: bool,
}

/// Everything a stimulation protocol needs, as one plain record
///
/// This is the boundary with the out-of-scope ABF loader: the loader parses
/// bytes, this crate consumes the resulting record. The record round-trips
/// through JSON so loaders in other processes can hand it over as text.
///
/// # Examples
///
/// ```rust
/// use abfstim::StimulusMetadata;
///
/// let metadata = abfstim::doctest_utils::demo_metadata();
/// let json = metadata.to_json_string()?;
/// let restored = StimulusMetadata::from_json_str(&json)?;
/// assert_eq!(metadata, restored);
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusMetadata {
    pub global: GlobalMetadata,
    pub adc_channels: Vec<AdcMetadata>,
    pub dac_channels: Vec<DacMetadata>,
}

impl StimulusMetadata {
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Capability of a protocol-metadata provider
///
/// [`Protocol`](crate::Protocol) construction accepts anything implementing
/// this trait, so heterogeneous sources (an in-memory record, a persisted
/// group tree) each get one adapter instead of the core branching on source
/// type. Implementations return owned values; providers are read once at
/// construction.
pub trait ProtocolSource {
    fn global(&self) -> Result<GlobalMetadata>;
    fn adc_channels(&self) -> Result<Vec<AdcMetadata>>;
    fn dac_channels(&self) -> Result<Vec<DacMetadata>>;
}

impl ProtocolSource for StimulusMetadata {
    fn global(&self) -> Result<GlobalMetadata> {
        Ok(self.global.clone())
    }

    fn adc_channels(&self) -> Result<Vec<AdcMetadata>> {
        Ok(self.adc_channels.clone())
    }

    fn dac_channels(&self) -> Result<Vec<DacMetadata>> {
        Ok(self.dac_channels.clone())
    }
}
