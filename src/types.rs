use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{AbfError, Result};

/// Physical dimension of a channel's unit string
///
/// Only the dimension matters for clamp-mode inference, so `"pA"`, `"nA"`
/// and `"A"` all map to [`UnitKind::Current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Current,
    Potential,
    Dimensionless,
}

/// Acquisition mode of the recording, as declared by the protocol
///
/// The numeric codes are the ABF2 `nOperationMode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcquisitionMode {
    VariableLengthEvent,
    FixedLengthEvent,
    GapFree,
    HighSpeedOscilloscope,
    EpisodicStimulation,
}

impl AcquisitionMode {
    /// 从 ABF2 nOperationMode 编码构造
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            1 => Ok(AcquisitionMode::VariableLengthEvent),
            2 => Ok(AcquisitionMode::FixedLengthEvent),
            3 => Ok(AcquisitionMode::GapFree),
            4 => Ok(AcquisitionMode::HighSpeedOscilloscope),
            5 => Ok(AcquisitionMode::EpisodicStimulation),
            _ => Err(AbfError::MalformedRecord(format!(
                "Unknown acquisition mode code: {}",
                code
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AcquisitionMode::VariableLengthEvent => 1,
            AcquisitionMode::FixedLengthEvent => 2,
            AcquisitionMode::GapFree => 3,
            AcquisitionMode::HighSpeedOscilloscope => 4,
            AcquisitionMode::EpisodicStimulation => 5,
        }
    }
}

/// Sweep averaging mode (ABF2 `nAverageAlgorithm`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AveragingMode {
    Cumulative,
    MostRecent,
}

impl AveragingMode {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(AveragingMode::Cumulative),
            1 => Ok(AveragingMode::MostRecent),
            _ => Err(AbfError::MalformedRecord(format!(
                "Unknown averaging mode code: {}",
                code
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            AveragingMode::Cumulative => 0,
            AveragingMode::MostRecent => 1,
        }
    }
}

/// Clamp configuration inferred from an ADC/DAC unit pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClampMode {
    /// Recording current while commanding potential
    VoltageClamp,
    /// Recording potential while commanding current
    CurrentClamp,
    /// Any other pairing
    NoClamp,
}

/// Where a DAC channel's command waveform comes from (ABF2 `nWaveformSource`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformSource {
    /// No analog waveform defined
    None,
    /// Waveform built from the epoch table
    Epochs,
    /// Waveform read from an external stimulus file (not supported)
    File,
}

impl WaveformSource {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(WaveformSource::None),
            1 => Ok(WaveformSource::Epochs),
            2 => Ok(WaveformSource::File),
            _ => Err(AbfError::MalformedRecord(format!(
                "Unknown waveform source code: {}",
                code
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            WaveformSource::None => 0,
            WaveformSource::Epochs => 1,
            WaveformSource::File => 2,
        }
    }
}

/// Selects a channel by physical index, logical index, or name
///
/// Physical indices are the hardware channel numbers stored in the file;
/// logical indices are positions in the protocol's channel list. The two are
/// each unique within one protocol but need not agree.
///
/// # Examples
///
/// ```rust
/// use abfstim::{ChannelQuery, Protocol};
///
/// let metadata = abfstim::doctest_utils::demo_metadata();
/// let protocol = Protocol::from_metadata(&metadata)?;
///
/// let by_physical = protocol.get_output(&ChannelQuery::Physical(0))?;
/// let by_name = protocol.get_output(&ChannelQuery::Name("Cmd 0".to_string()))?;
/// assert_eq!(by_physical.name, by_name.name);
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelQuery {
    Physical(usize),
    Logical(usize),
    Name(String),
}

impl std::fmt::Display for ChannelQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelQuery::Physical(i) => write!(f, "physical index {}", i),
            ChannelQuery::Logical(i) => write!(f, "logical index {}", i),
            ChannelQuery::Name(n) => write!(f, "name '{}'", n),
        }
    }
}

/// Identity of the source recording a protocol was extracted from
///
/// Never participates in structural equality: two protocols extracted from
/// different files compare equal when every acquisition parameter matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceIdentity {
    /// GUID or content hash of the source file
    pub file_guid: String,
    /// Path of the protocol (.pro) file recorded in the header
    pub protocol_path: String,
    /// Acquisition start date, when the source carries one
    pub recording_start_date: Option<NaiveDate>,
    /// Acquisition start time, when the source carries one
    pub recording_start_time: Option<NaiveTime>,
}

/// One full-sweep buffer of synthesized samples
///
/// Tagged with its start time and sampling rate so downstream consumers can
/// place it on an absolute time axis without consulting the protocol again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleBuffer {
    /// Sample values; volts for digital (TTL) buffers, DAC units for analog
    pub samples: Vec<f64>,
    /// Time of the first sample, in seconds from the start of the recording
    pub start_time: f64,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
}

impl SampleBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of sample `index`, in seconds from the start of the recording
    pub fn time_of(&self, index: usize) -> f64 {
        self.start_time + index as f64 / self.sampling_rate
    }

    /// Buffer duration in seconds
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_rate
    }
}

/// A synaptic pathway bound to one digital output channel
///
/// Used by [`Protocol::pathway_stimulation_order`](crate::Protocol::pathway_stimulation_order)
/// to answer "which pathway was stimulated first on sweep N".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pathway {
    pub name: String,
    /// Digital output channel (0..8) that stimulates this pathway
    pub digital_channel: usize,
}

/// One row of the human-facing epoch table (non-Off epochs only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochTableRow {
    pub letter: String,
    pub type_name: String,
    pub first_level: f64,
    pub level_delta: f64,
    pub first_duration_s: f64,
    pub actual_duration_s: f64,
    pub first_duration_samples: usize,
    pub actual_duration_samples: usize,
    /// Digital pattern of outputs 3..0, e.g. `"0*01"`
    pub digital_pattern_low: String,
    /// Digital pattern of outputs 7..4
    pub digital_pattern_high: String,
    /// Pulse repetition rate in Hz (0 when the epoch has no train)
    pub train_rate_hz: f64,
    pub pulse_width_s: f64,
    pub pulse_count: usize,
}

impl EpochTableRow {
    /// 按列输出字符串，供表格渲染使用
    pub fn to_strings(&self) -> Vec<String> {
        vec![
            self.letter.clone(),
            self.type_name.clone(),
            format!("{:.6}", self.first_level),
            format!("{:.6}", self.level_delta),
            format!("{:.6}", self.first_duration_s),
            format!("{:.6}", self.actual_duration_s),
            self.first_duration_samples.to_string(),
            self.actual_duration_samples.to_string(),
            self.digital_pattern_low.clone(),
            self.digital_pattern_high.clone(),
            format!("{:.3}", self.train_rate_hz),
            format!("{:.6}", self.pulse_width_s),
            self.pulse_count.to_string(),
        ]
    }

    /// Column headers matching [`EpochTableRow::to_strings`]
    pub fn column_headers() -> Vec<&'static str> {
        vec![
            "Epoch",
            "Type",
            "First level",
            "Delta level",
            "First duration (s)",
            "Duration (s)",
            "First duration (samples)",
            "Duration (samples)",
            "Digital out 3..0",
            "Digital out 7..4",
            "Train rate (Hz)",
            "Pulse width (s)",
            "Pulse count",
        ]
    }
}
