use serde::{Deserialize, Serialize};

use crate::digital::DigitalPattern;
use crate::epoch::{Epoch, EpochType};
use crate::error::{AbfError, Result};
use crate::protocol::Protocol;
use crate::types::{EpochTableRow, UnitKind, WaveformSource};
use crate::utils::seconds_to_samples;

/// One ADC (input) channel of a protocol
///
/// The physical index is the hardware channel number stored in the file; the
/// logical index is the channel's position in the protocol's ADC list. Both
/// are unique within one protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub physical_index: usize,
    pub logical_index: usize,
    pub name: String,
    /// Unit string as recorded, e.g. `"pA"`
    pub units: String,
    /// Dimension parsed from `units`
    pub unit_kind: UnitKind,
}

/// One DAC (output) channel of a protocol, with its ordered epoch table
///
/// Owns its [`Epoch`]s: an epoch's number is its position in `epochs`.
/// Queries that depend on protocol-wide state (holding samples, alternate
/// output flags, the active DAC) take the owning [`Protocol`] as an explicit
/// argument instead of storing a back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub physical_index: usize,
    pub logical_index: usize,
    pub name: String,
    pub units: String,
    pub unit_kind: UnitKind,
    /// Idle command level in this DAC's units
    pub holding_level: f64,
    /// Return to the holding level between episodes; when false the DAC
    /// carries its final level into the next sweep
    pub return_to_hold: bool,
    pub analog_waveform_enabled: bool,
    pub waveform_source: WaveformSource,
    pub epochs: Vec<Epoch>,
}

impl OutputConfig {
    /// True when any epoch drives any digital output in its *main* pattern
    ///
    /// This is the per-channel "digital output enabled" notion used by the
    /// alternate-output resolution rule.
    pub fn digital_output_enabled(&self) -> bool {
        self.epochs
            .iter()
            .any(|epoch| !epoch.main_pattern.is_blank())
    }

    /// Epochs that fake a TTL trigger through the analog output
    ///
    /// See [`Epoch::emulates_ttl`].
    pub fn ttl_emulating_epochs(&self) -> Vec<&Epoch> {
        self.epochs.iter().filter(|e| e.emulates_ttl()).collect()
    }

    /// 校验下标并取出 epoch
    pub(crate) fn epoch_at(&self, epoch_idx: usize) -> Result<&Epoch> {
        self.epochs.get(epoch_idx).ok_or_else(|| {
            AbfError::InvalidChannelIndex(format!(
                "DAC '{}' has no epoch {} (table holds {})",
                self.name,
                epoch_idx,
                self.epochs.len()
            ))
        })
    }

    /// Duration of one epoch in samples on the given sweep
    ///
    /// Off epochs are disabled and occupy zero samples.
    pub fn epoch_duration_samples(
        &self,
        epoch_idx: usize,
        sweep: usize,
        proto: &Protocol,
    ) -> Result<usize> {
        let epoch = self.epoch_at(epoch_idx)?;
        if epoch.epoch_type == EpochType::Off {
            return Ok(0);
        }
        Ok(seconds_to_samples(
            epoch.actual_duration(sweep)?,
            proto.sampling_rate,
        ))
    }

    /// Sample offset of an epoch within the nominal epoch region
    ///
    /// Sum of the durations of all earlier epochs on this sweep. Does *not*
    /// include the protocol's holding period; see
    /// [`OutputConfig::actual_epoch_start_sample`] for signal-accurate
    /// positions.
    pub fn epoch_start_sample(
        &self,
        epoch_idx: usize,
        sweep: usize,
        proto: &Protocol,
    ) -> Result<usize> {
        self.epoch_at(epoch_idx)?;
        let mut start = 0usize;
        for idx in 0..epoch_idx {
            start += self.epoch_duration_samples(idx, sweep, proto)?;
        }
        Ok(start)
    }

    /// Sample offset of an epoch within the synthesized sweep buffer
    ///
    /// Adds the protocol's holding-sample count, which precedes the epoch
    /// region in the physical signal but is invisible in the nominal epoch
    /// table. Trigger timestamps must use this offset.
    pub fn actual_epoch_start_sample(
        &self,
        epoch_idx: usize,
        sweep: usize,
        proto: &Protocol,
    ) -> Result<usize> {
        Ok(self.epoch_start_sample(epoch_idx, sweep, proto)? + proto.holding_sample_count())
    }

    /// Digital pattern this channel physically emits for one epoch and sweep
    ///
    /// Implements the alternate-output resolution rule:
    ///
    /// * With alternate digital output enabled and this channel's logical
    ///   index below 2, only the protocol's active DAC emits: its epoch's
    ///   alternate pattern on odd sweeps, main pattern on even sweeps. The
    ///   other low-index channel contributes nothing; any digital fields on
    ///   its epochs are a GUI placeholder for the alternate pattern, never
    ///   physically emitted from that channel.
    /// * Otherwise the main pattern is emitted when this channel has digital
    ///   output enabled, and nothing when it does not.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use abfstim::{ChannelQuery, ChannelState, Protocol};
    ///
    /// let metadata = abfstim::doctest_utils::demo_metadata_with_alternation();
    /// let protocol = Protocol::from_metadata(&metadata)?;
    /// let dac = protocol.get_output(&ChannelQuery::Physical(0))?;
    ///
    /// // even sweeps emit the main pattern (digital output 0 trains)
    /// let even = dac.resolve_digital_pattern(1, &protocol, 0)?;
    /// assert_eq!(even.state_of(0), ChannelState::Train);
    ///
    /// // odd sweeps emit the alternate pattern (digital output 1 pulses)
    /// let odd = dac.resolve_digital_pattern(1, &protocol, 1)?;
    /// assert_eq!(odd.state_of(0), ChannelState::Off);
    /// assert_eq!(odd.state_of(1), ChannelState::Pulse);
    /// # Ok::<(), abfstim::AbfError>(())
    /// ```
    pub fn resolve_digital_pattern(
        &self,
        epoch_idx: usize,
        proto: &Protocol,
        sweep: usize,
    ) -> Result<DigitalPattern> {
        let epoch = self.epoch_at(epoch_idx)?;

        if proto.alternate_digital_outputs && self.logical_index < 2 {
            if self.physical_index == proto.active_dac_index() {
                let pattern = if sweep % 2 == 1 {
                    epoch.alternate_pattern
                } else {
                    epoch.main_pattern
                };
                return Ok(pattern);
            }
            // 非活动通道在交替模式下不输出
            return Ok(DigitalPattern::all_off());
        }

        if self.digital_output_enabled() {
            Ok(epoch.main_pattern)
        } else {
            Ok(DigitalPattern::all_off())
        }
    }

    /// Builds the human-facing epoch table for one sweep
    ///
    /// One row per non-Off epoch. Digital pattern strings show the pattern
    /// this channel actually emits on the requested sweep, so the table
    /// reflects alternation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use abfstim::{ChannelQuery, Protocol};
    ///
    /// let metadata = abfstim::doctest_utils::demo_metadata();
    /// let protocol = Protocol::from_metadata(&metadata)?;
    /// let dac = protocol.get_output(&ChannelQuery::Logical(0))?;
    ///
    /// let rows = dac.epoch_table(0, &protocol)?;
    /// assert_eq!(rows[0].letter, "A");
    /// for row in &rows {
    ///     println!("{} {} {:.1}", row.letter, row.type_name, row.first_level);
    /// }
    /// # Ok::<(), abfstim::AbfError>(())
    /// ```
    pub fn epoch_table(&self, sweep: usize, proto: &Protocol) -> Result<Vec<EpochTableRow>> {
        let mut rows = Vec::new();

        for (idx, epoch) in self.epochs.iter().enumerate() {
            if epoch.epoch_type == EpochType::Off {
                continue;
            }

            let pattern = self.resolve_digital_pattern(idx, proto, sweep)?;
            let actual_duration = epoch.actual_duration(sweep)?;
            let train_rate_hz = if epoch.pulse_period > 0.0 {
                1.0 / epoch.pulse_period
            } else {
                0.0
            };

            rows.push(EpochTableRow {
                letter: epoch.letter(),
                type_name: epoch.epoch_type.name().to_string(),
                first_level: epoch.first_level,
                level_delta: epoch.level_delta,
                first_duration_s: epoch.first_duration,
                actual_duration_s: actual_duration,
                first_duration_samples: seconds_to_samples(
                    epoch.first_duration,
                    proto.sampling_rate,
                ),
                actual_duration_samples: seconds_to_samples(actual_duration, proto.sampling_rate),
                digital_pattern_low: pattern.pattern_string_low(),
                digital_pattern_high: pattern.pattern_string_high(),
                train_rate_hz,
                pulse_width_s: epoch.pulse_width,
                pulse_count: epoch.pulse_count(sweep)?,
            });
        }

        Ok(rows)
    }

    /// Renders the epoch table as aligned text, one line per epoch
    pub fn epoch_table_text(&self, sweep: usize, proto: &Protocol) -> Result<String> {
        let rows = self.epoch_table(sweep, proto)?;
        let headers = EpochTableRow::column_headers();

        let mut cells: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
        cells.push(headers.iter().map(|h| h.to_string()).collect());
        for row in &rows {
            cells.push(row.to_strings());
        }

        // 每列取最大宽度对齐
        let columns = headers.len();
        let mut widths = vec![0usize; columns];
        for line in &cells {
            for (i, cell) in line.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let mut text = String::new();
        for line in &cells {
            let padded: Vec<String> = line
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect();
            text.push_str(padded.join("  ").trim_end());
            text.push('\n');
        }

        Ok(text)
    }

    /// Structural equality that ignores the epochs' digital patterns
    pub fn identical_except_digital(&self, other: &OutputConfig) -> bool {
        self.physical_index == other.physical_index
            && self.logical_index == other.logical_index
            && self.name == other.name
            && self.units == other.units
            && self.unit_kind == other.unit_kind
            && self.holding_level == other.holding_level
            && self.return_to_hold == other.return_to_hold
            && self.analog_waveform_enabled == other.analog_waveform_enabled
            && self.waveform_source == other.waveform_source
            && self.epochs.len() == other.epochs.len()
            && self
                .epochs
                .iter()
                .zip(other.epochs.iter())
                .all(|(a, b)| a.identical_except_digital(b))
    }
}
