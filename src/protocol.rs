use std::collections::HashSet;

use crate::channel::{InputConfig, OutputConfig};
use crate::digital::DigitalPattern;
use crate::epoch::{Epoch, EpochType};
use crate::error::{AbfError, Result};
use crate::metadata::{DacMetadata, EpochMetadata, GlobalMetadata, ProtocolSource, StimulusMetadata};
use crate::types::{
    AcquisitionMode, AveragingMode, ChannelQuery, ClampMode, Pathway, SourceIdentity, UnitKind,
    WaveformSource,
};
use crate::utils::parse_unit_kind;
use crate::HOLDING_DIVISOR;

/// Complete description of an ABF2 acquisition protocol
///
/// The aggregate root of this crate: owns every [`InputConfig`] and
/// [`OutputConfig`] (which own their [`Epoch`]s) plus the global timing and
/// output-routing parameters. A `Protocol` is fully constructed before it is
/// exposed and treated as read-only thereafter, so sharing one across threads
/// needs no locking.
///
/// # Examples
///
/// ```rust
/// use abfstim::{ChannelQuery, Protocol};
///
/// let metadata = abfstim::doctest_utils::demo_metadata();
/// let protocol = Protocol::from_metadata(&metadata)?;
///
/// println!("{} sweeps of {} samples at {} Hz",
///     protocol.sweep_count,
///     protocol.samples_per_sweep,
///     protocol.sampling_rate);
///
/// // Synthesize what DAC 0 commanded on sweep 2
/// let waveform = protocol.synthesize_analog_waveform(&ChannelQuery::Physical(0), 2)?;
/// assert_eq!(waveform.len(), protocol.samples_per_sweep);
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Protocol {
    pub adc_count: usize,
    pub dac_count: usize,
    /// Number of digital outputs on the digitizer (4 or 8)
    pub digital_output_count: usize,
    active_dac_index: usize,
    pub alternate_analog_outputs: bool,
    pub alternate_digital_outputs: bool,
    /// Train pulses drive high when true
    pub digital_train_active_high: bool,
    /// Per-digital-channel holding state (true = held high between epochs)
    pub digital_holding: Vec<bool>,
    pub acquisition_mode: AcquisitionMode,
    pub sweep_count: usize,
    pub run_count: usize,
    pub trial_count: usize,
    /// Samples per sweep, per ADC channel
    pub samples_per_sweep: usize,
    /// Total samples across sweeps and ADC channels
    pub total_sample_count: usize,
    /// Sampling rate in Hz
    pub sampling_rate: f64,
    pub averaging_mode: AveragingMode,
    pub averaging_weight: u32,
    /// Identity of the source recording; excluded from equality
    pub source: SourceIdentity,
    input_configs: Vec<InputConfig>,
    output_configs: Vec<OutputConfig>,
}

impl Protocol {
    /// Builds a protocol from a plain metadata record
    ///
    /// Equivalent to [`Protocol::from_source`] with the record adapter; see
    /// there for the validation rules.
    pub fn from_metadata(metadata: &StimulusMetadata) -> Result<Self> {
        Self::from_source(metadata)
    }

    /// Builds a protocol from any metadata provider
    ///
    /// Construction fails fast: no partially-built protocol is ever
    /// returned.
    ///
    /// # Errors
    ///
    /// * `AbfError::UnsupportedFormatVersion` - the source is not ABF2
    /// * `AbfError::InconsistentProtocol` - channel counts, sample
    ///   bookkeeping, or index uniqueness do not add up
    /// * `AbfError::InvalidEpochSpec` - an epoch table entry is invalid
    /// * `AbfError::MalformedRecord` - an enum code or raw word is unknown
    pub fn from_source(source: &impl ProtocolSource) -> Result<Self> {
        let global = source.global()?;
        let adc_metadata = source.adc_channels()?;
        let dac_metadata = source.dac_channels()?;

        if global.format_version_major != 2 {
            return Err(AbfError::UnsupportedFormatVersion(format!(
                "ABF version {} (only ABF2 carries per-sweep digital alternation metadata)",
                global.format_version_major
            )));
        }

        Self::check_counts(&global, adc_metadata.len(), dac_metadata.len())?;

        // 逻辑下标即列表位置；物理下标必须互不相同
        Self::check_unique_physical(
            "ADC",
            adc_metadata.iter().map(|m| m.physical_index),
        )?;
        Self::check_unique_physical(
            "DAC",
            dac_metadata.iter().map(|m| m.physical_index),
        )?;

        let input_configs: Vec<InputConfig> = adc_metadata
            .iter()
            .enumerate()
            .map(|(logical, m)| InputConfig {
                physical_index: m.physical_index,
                logical_index: logical,
                name: m.name.clone(),
                units: m.units.clone(),
                unit_kind: parse_unit_kind(&m.units),
            })
            .collect();

        let mut output_configs = Vec::with_capacity(dac_metadata.len());
        for (logical, m) in dac_metadata.iter().enumerate() {
            output_configs.push(Self::build_output_from_parts(m, logical, &global)?);
        }

        let protocol = Protocol {
            adc_count: global.adc_count,
            dac_count: global.dac_count,
            digital_output_count: global.digital_output_count,
            active_dac_index: global.active_dac_index,
            alternate_analog_outputs: global.alternate_analog_outputs,
            alternate_digital_outputs: global.alternate_digital_outputs,
            digital_train_active_high: global.digital_train_active_high,
            digital_holding: global.digital_holding.clone(),
            acquisition_mode: AcquisitionMode::from_code(global.acquisition_mode_code)?,
            sweep_count: global.sweep_count,
            run_count: global.run_count,
            trial_count: global.trial_count,
            samples_per_sweep: global.samples_per_sweep,
            total_sample_count: global.total_sample_count,
            sampling_rate: global.sampling_rate,
            averaging_mode: AveragingMode::from_code(global.averaging_mode_code)?,
            averaging_weight: global.averaging_weight,
            source: SourceIdentity {
                file_guid: global.file_guid.clone(),
                protocol_path: global.protocol_path.clone(),
                recording_start_date: global.recording_start_date,
                recording_start_time: global.recording_start_time,
            },
            input_configs,
            output_configs,
        };

        log::debug!(
            "Constructed protocol: {} ADC, {} DAC, {} sweeps x {} samples, {} Hz",
            protocol.adc_count,
            protocol.dac_count,
            protocol.sweep_count,
            protocol.samples_per_sweep,
            protocol.sampling_rate,
        );

        Ok(protocol)
    }

    fn check_counts(global: &GlobalMetadata, adc_found: usize, dac_found: usize) -> Result<()> {
        if global.adc_count != adc_found {
            return Err(AbfError::InconsistentProtocol(format!(
                "Header declares {} ADC channels but the record carries {}",
                global.adc_count, adc_found
            )));
        }
        if global.dac_count != dac_found {
            return Err(AbfError::InconsistentProtocol(format!(
                "Header declares {} DAC channels but the record carries {}",
                global.dac_count, dac_found
            )));
        }
        if global.digital_output_count != 4 && global.digital_output_count != 8 {
            return Err(AbfError::InconsistentProtocol(format!(
                "Digitizer reports {} digital outputs (expected 4 or 8)",
                global.digital_output_count
            )));
        }
        if global.digital_holding.len() != global.digital_output_count {
            return Err(AbfError::InconsistentProtocol(format!(
                "{} digital holding flags for {} digital outputs",
                global.digital_holding.len(),
                global.digital_output_count
            )));
        }
        if global.sampling_rate <= 0.0 {
            return Err(AbfError::InconsistentProtocol(format!(
                "Non-positive sampling rate {}",
                global.sampling_rate
            )));
        }
        if global.sweep_count == 0 || global.samples_per_sweep == 0 {
            return Err(AbfError::InconsistentProtocol(
                "Zero sweeps or zero samples per sweep".to_string(),
            ));
        }

        // 总采样数必须与 每扫描点数 × 扫描数 × ADC 通道数 一致
        let derived_total = global
            .samples_per_sweep
            .saturating_mul(global.sweep_count)
            .saturating_mul(global.adc_count);
        if derived_total != global.total_sample_count {
            return Err(AbfError::InconsistentProtocol(format!(
                "Declared {} total samples, but {} samples/sweep x {} sweeps x {} ADC = {}",
                global.total_sample_count,
                global.samples_per_sweep,
                global.sweep_count,
                global.adc_count,
                derived_total
            )));
        }

        Ok(())
    }

    fn check_unique_physical(kind: &str, indices: impl Iterator<Item = usize>) -> Result<()> {
        let mut seen = HashSet::new();
        for index in indices {
            if !seen.insert(index) {
                return Err(AbfError::InconsistentProtocol(format!(
                    "Duplicate {} physical index {}",
                    kind, index
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn build_epoch_from_parts(
        e: &EpochMetadata,
        number: usize,
        global: &GlobalMetadata,
    ) -> Result<Epoch> {
        let main_pattern = DigitalPattern::from_raw_words(
            e.main_step_word,
            e.main_train_word,
            global.digital_output_count,
        )?;
        let alternate_pattern = DigitalPattern::from_raw_words(
            e.alternate_step_word,
            e.alternate_train_word,
            global.digital_output_count,
        )?;

        let rate = global.sampling_rate;
        let mut epoch = Epoch::new(
            number,
            EpochType::from_code(e.type_code)?,
            e.first_level,
            e.level_delta,
            e.first_duration_samples as f64 / rate,
            e.duration_delta_samples as f64 / rate,
            e.pulse_period_samples as f64 / rate,
            e.pulse_width_samples as f64 / rate,
            main_pattern,
            alternate_pattern,
        )?;
        epoch.alternate_dig_out_state = e.alternate_dig_out_state;
        Ok(epoch)
    }

    pub(crate) fn build_output_from_parts(
        metadata: &DacMetadata,
        logical_index: usize,
        global: &GlobalMetadata,
    ) -> Result<OutputConfig> {
        let mut epochs = Vec::with_capacity(metadata.epochs.len());

        for (number, e) in metadata.epochs.iter().enumerate() {
            let epoch = Self::build_epoch_from_parts(e, number, global)?;

            if epoch.epoch_type == EpochType::Pulse && epoch.pulse_period == 0.0 {
                log::warn!(
                    "DAC '{}' epoch {} is a pulse train with zero period; it will emit nothing",
                    metadata.name,
                    epoch.letter()
                );
            }

            epochs.push(epoch);
        }

        Ok(OutputConfig {
            physical_index: metadata.physical_index,
            logical_index,
            name: metadata.name.clone(),
            units: metadata.units.clone(),
            unit_kind: parse_unit_kind(&metadata.units),
            holding_level: metadata.holding_level,
            return_to_hold: metadata.return_to_hold,
            analog_waveform_enabled: metadata.analog_waveform_enabled,
            waveform_source: WaveformSource::from_code(metadata.waveform_source_code)?,
            epochs,
        })
    }

    /// Physical index of the DAC configured as the digital-output emitter
    ///
    /// This value is carried verbatim from the source metadata. It is *not*
    /// re-derived from the waveform/digital enable flags: the derivation in
    /// the acquisition software is ambiguous for some flag combinations (the
    /// same flags can yield different reported active channels depending on
    /// unrelated digital-enable state), so this crate reports what the
    /// source said and nothing else.
    pub fn active_dac_index(&self) -> usize {
        self.active_dac_index
    }

    /// ADC channel list, in logical order
    pub fn inputs(&self) -> &[InputConfig] {
        &self.input_configs
    }

    /// DAC channel list, in logical order
    pub fn outputs(&self) -> &[OutputConfig] {
        &self.output_configs
    }

    /// Resolves an ADC channel by physical index, logical index, or name
    ///
    /// # Errors
    ///
    /// * `AbfError::InvalidChannelIndex` - no channel matches the query;
    ///   never a silent default
    pub fn get_input(&self, query: &ChannelQuery) -> Result<&InputConfig> {
        let found = match query {
            ChannelQuery::Physical(index) => self
                .input_configs
                .iter()
                .find(|c| c.physical_index == *index),
            ChannelQuery::Logical(index) => self.input_configs.get(*index),
            ChannelQuery::Name(name) => self.input_configs.iter().find(|c| &c.name == name),
        };
        found.ok_or_else(|| AbfError::InvalidChannelIndex(format!("No ADC channel with {}", query)))
    }

    /// Resolves a DAC channel by physical index, logical index, or name
    ///
    /// # Errors
    ///
    /// * `AbfError::InvalidChannelIndex` - no channel matches the query
    pub fn get_output(&self, query: &ChannelQuery) -> Result<&OutputConfig> {
        let found = match query {
            ChannelQuery::Physical(index) => self
                .output_configs
                .iter()
                .find(|c| c.physical_index == *index),
            ChannelQuery::Logical(index) => self.output_configs.get(*index),
            ChannelQuery::Name(name) => self.output_configs.iter().find(|c| &c.name == name),
        };
        found.ok_or_else(|| AbfError::InvalidChannelIndex(format!("No DAC channel with {}", query)))
    }

    /// Sweep duration in seconds
    pub fn sweep_duration(&self) -> f64 {
        self.samples_per_sweep as f64 / self.sampling_rate
    }

    /// Duration of the whole recording in seconds
    pub fn total_duration(&self) -> f64 {
        self.sweep_duration() * self.sweep_count as f64
    }

    /// Samples of the fixed holding period preceding the epoch region
    ///
    /// The digitizer holds every output for 1/64 of the sweep before the
    /// first epoch starts. The period is invisible in the nominal epoch
    /// table but shifts every physical sample position.
    pub fn holding_sample_count(&self) -> usize {
        self.samples_per_sweep / HOLDING_DIVISOR
    }

    /// Infers the clamp configuration of an ADC/DAC pairing
    ///
    /// Pure unit-dimension reasoning: recording current while commanding
    /// potential is a voltage clamp, the converse is a current clamp, and
    /// any other pairing reports [`ClampMode::NoClamp`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use abfstim::{ChannelQuery, ClampMode, Protocol};
    ///
    /// let metadata = abfstim::doctest_utils::demo_metadata();
    /// let protocol = Protocol::from_metadata(&metadata)?;
    ///
    /// // demo metadata records pA on ADC 0 and commands mV on DAC 0
    /// let mode = protocol.clamp_mode(
    ///     &ChannelQuery::Logical(0),
    ///     &ChannelQuery::Logical(0),
    /// )?;
    /// assert_eq!(mode, ClampMode::VoltageClamp);
    /// # Ok::<(), abfstim::AbfError>(())
    /// ```
    pub fn clamp_mode(&self, adc: &ChannelQuery, dac: &ChannelQuery) -> Result<ClampMode> {
        let input = self.get_input(adc)?;
        let output = self.get_output(dac)?;

        Ok(match (input.unit_kind, output.unit_kind) {
            (UnitKind::Current, UnitKind::Potential) => ClampMode::VoltageClamp,
            (UnitKind::Potential, UnitKind::Current) => ClampMode::CurrentClamp,
            _ => ClampMode::NoClamp,
        })
    }

    /// Orders synaptic pathways by stimulation time, sweep by sweep
    ///
    /// Each [`Pathway`] is bound to one digital output channel. For every
    /// sweep the returned entry lists which pathways the given DAC
    /// stimulates, in temporal order of the triggering epochs:
    ///
    /// * `by_first_stimulus = true` - each stimulated pathway appears once,
    ///   ordered by the start time of its first active epoch in that sweep.
    /// * `by_first_stimulus = false` - every epoch-triggered occurrence is
    ///   listed chronologically, so a pathway index may repeat.
    pub fn pathway_stimulation_order(
        &self,
        pathways: &[Pathway],
        dac: &ChannelQuery,
        by_first_stimulus: bool,
    ) -> Result<Vec<(usize, Vec<usize>)>> {
        let output = self.get_output(dac)?;
        let mut order = Vec::with_capacity(self.sweep_count);

        for sweep in 0..self.sweep_count {
            // (起始采样点, pathway 下标) 事件列表
            let mut occurrences: Vec<(usize, usize)> = Vec::new();

            for (epoch_idx, epoch) in output.epochs.iter().enumerate() {
                if epoch.epoch_type == EpochType::Off {
                    continue;
                }
                let pattern = output.resolve_digital_pattern(epoch_idx, self, sweep)?;
                let start = output.actual_epoch_start_sample(epoch_idx, sweep, self)?;

                for (pathway_idx, pathway) in pathways.iter().enumerate() {
                    if pattern.state_of(pathway.digital_channel)
                        != crate::digital::ChannelState::Off
                    {
                        occurrences.push((start, pathway_idx));
                    }
                }
            }

            occurrences.sort();

            let stimulated = if by_first_stimulus {
                let mut seen = HashSet::new();
                occurrences
                    .into_iter()
                    .filter(|(_, idx)| seen.insert(*idx))
                    .map(|(_, idx)| idx)
                    .collect()
            } else {
                occurrences.into_iter().map(|(_, idx)| idx).collect()
            };

            order.push((sweep, stimulated));
        }

        Ok(order)
    }

    /// Structural equality that additionally ignores digital patterns
    ///
    /// True when the two protocols differ at most in their epochs' digital
    /// patterns, e.g. recordings that share an analog protocol but route
    /// their triggers differently.
    pub fn is_identical_except_digital(&self, other: &Protocol) -> bool {
        self.scalars_equal(other)
            && self.input_configs == other.input_configs
            && self.output_configs.len() == other.output_configs.len()
            && self
                .output_configs
                .iter()
                .zip(other.output_configs.iter())
                .all(|(a, b)| a.identical_except_digital(b))
    }

    fn scalars_equal(&self, other: &Protocol) -> bool {
        self.adc_count == other.adc_count
            && self.dac_count == other.dac_count
            && self.digital_output_count == other.digital_output_count
            && self.active_dac_index == other.active_dac_index
            && self.alternate_analog_outputs == other.alternate_analog_outputs
            && self.alternate_digital_outputs == other.alternate_digital_outputs
            && self.digital_train_active_high == other.digital_train_active_high
            && self.digital_holding == other.digital_holding
            && self.acquisition_mode == other.acquisition_mode
            && self.sweep_count == other.sweep_count
            && self.run_count == other.run_count
            && self.trial_count == other.trial_count
            && self.samples_per_sweep == other.samples_per_sweep
            && self.total_sample_count == other.total_sample_count
            && self.sampling_rate == other.sampling_rate
            && self.averaging_mode == other.averaging_mode
            && self.averaging_weight == other.averaging_weight
    }
}

/// Structural equality over every acquisition parameter and the full channel
/// and epoch lists. The source-identity block (file GUID, protocol path,
/// recording timestamp) never participates.
impl PartialEq for Protocol {
    fn eq(&self, other: &Self) -> bool {
        self.scalars_equal(other)
            && self.input_configs == other.input_configs
            && self.output_configs == other.output_configs
    }
}
