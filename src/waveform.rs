use crate::channel::OutputConfig;
use crate::digital::ChannelState;
use crate::epoch::{Epoch, EpochType};
use crate::error::{AbfError, Result};
use crate::protocol::Protocol;
use crate::types::{ChannelQuery, SampleBuffer, WaveformSource};
use crate::utils::seconds_to_samples;

/// TTL logic-high level in volts
pub const TTL_HIGH_VOLTS: f64 = 5.0;
/// TTL logic-low level in volts
pub const TTL_LOW_VOLTS: f64 = 0.0;

impl OutputConfig {
    /// Synthesizes this DAC's analog command waveform for one sweep
    ///
    /// Reconstructs exactly what the hardware emitted: the first
    /// [`holding_sample_count`](Protocol::holding_sample_count) samples sit
    /// at the holding level, then each non-Off epoch contributes its
    /// sweep-dependent duration, and the remainder of the sweep returns to
    /// hold (or carries the trailing level when `return_to_hold` is false).
    /// When the protocol alternates analog outputs, DACs of logical index 0
    /// and 1 emit only on even and odd sweeps respectively and hold
    /// otherwise.
    ///
    /// # Errors
    ///
    /// * `AbfError::UnsupportedWaveformSource` - the waveform comes from an
    ///   external stimulus file
    /// * `AbfError::InvalidEpochSpec` - an epoch's duration is negative on
    ///   this sweep
    /// * `AbfError::InconsistentProtocol` - `sweep` is out of range
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
    /// let waveform = dac.synthesize_analog_waveform(&protocol, 0)?;
    /// assert_eq!(waveform.len(), protocol.samples_per_sweep);
    ///
    /// // the holding period precedes the first epoch
    /// let holding = protocol.holding_sample_count();
    /// assert!(waveform.samples[..holding]
    ///     .iter()
    ///     .all(|&v| v == dac.holding_level));
    /// # Ok::<(), abfstim::AbfError>(())
    /// ```
    pub fn synthesize_analog_waveform(
        &self,
        proto: &Protocol,
        sweep: usize,
    ) -> Result<SampleBuffer> {
        check_sweep(proto, sweep)?;

        if self.waveform_source == WaveformSource::File {
            return Err(AbfError::UnsupportedWaveformSource(format!(
                "DAC '{}' sources its waveform from an external stimulus file",
                self.name
            )));
        }

        let total = proto.samples_per_sweep;
        let mut samples = vec![self.holding_level; total];
        let buffer = |samples| SampleBuffer {
            samples,
            start_time: sweep as f64 * proto.sweep_duration(),
            sampling_rate: proto.sampling_rate,
        };

        // 无波形定义或当前扫描被交替模式屏蔽时全程保持
        if !self.analog_waveform_enabled
            || self.waveform_source == WaveformSource::None
            || self.suppressed_by_alternation(proto, sweep)
        {
            return Ok(buffer(samples));
        }

        let mut cursor = proto.holding_sample_count();
        let mut level = self.seed_level(proto, sweep)?;

        for epoch in &self.epochs {
            if epoch.epoch_type == EpochType::Off {
                continue;
            }
            let duration =
                seconds_to_samples(epoch.actual_duration(sweep)?, proto.sampling_rate);
            if duration == 0 {
                continue;
            }
            if cursor >= total {
                log::warn!(
                    "DAC '{}' epoch {} starts beyond the sweep on sweep {}; truncating",
                    self.name,
                    epoch.letter(),
                    sweep
                );
                break;
            }

            let end = (cursor + duration).min(total);
            fill_analog_segment(
                &mut samples[cursor..end],
                epoch,
                level,
                duration,
                sweep,
                proto.sampling_rate,
            )?;

            level = trailing_level_of(epoch, level, sweep);
            cursor += duration;
        }

        // 末段：回保持电平，或维持最后一个 epoch 的尾电平
        let tail_level = if self.return_to_hold {
            self.holding_level
        } else {
            level
        };
        for value in samples.iter_mut().skip(cursor.min(total)) {
            *value = tail_level;
        }

        Ok(buffer(samples))
    }

    /// Synthesizes one digital (TTL) output as a voltage waveform
    ///
    /// Per epoch the emitted pattern is resolved with
    /// [`OutputConfig::resolve_digital_pattern`]; a `Pulse` state drives the
    /// active level for the whole epoch, a `Train` state pulses
    /// `pulse_width` every `pulse_period`. Pulse polarity inverts when the
    /// channel's holding flag is set; train polarity inverts when the
    /// protocol's train-active-high flag is clear. Levels are 0/5 V.
    ///
    /// # Errors
    ///
    /// * `AbfError::InvalidChannelIndex` - `digital_channel` is beyond the
    ///   digitizer's outputs
    pub fn synthesize_digital_waveform(
        &self,
        proto: &Protocol,
        digital_channel: usize,
        sweep: usize,
    ) -> Result<SampleBuffer> {
        check_sweep(proto, sweep)?;
        check_digital_channel(proto, digital_channel)?;

        let total = proto.samples_per_sweep;
        let holding_high = proto.digital_holding[digital_channel];
        let baseline = if holding_high {
            TTL_HIGH_VOLTS
        } else {
            TTL_LOW_VOLTS
        };

        let mut samples = vec![baseline; total];
        let mut cursor = proto.holding_sample_count();

        for (epoch_idx, epoch) in self.epochs.iter().enumerate() {
            if epoch.epoch_type == EpochType::Off {
                continue;
            }
            let duration =
                seconds_to_samples(epoch.actual_duration(sweep)?, proto.sampling_rate);
            if duration == 0 {
                continue;
            }
            if cursor >= total {
                break;
            }

            let pattern = self.resolve_digital_pattern(epoch_idx, proto, sweep)?;
            let end = (cursor + duration).min(total);

            match pattern.state_of(digital_channel) {
                ChannelState::Off => {}
                ChannelState::Pulse => {
                    // 保持位为高时脉冲反相
                    let active = if holding_high {
                        TTL_LOW_VOLTS
                    } else {
                        TTL_HIGH_VOLTS
                    };
                    for value in &mut samples[cursor..end] {
                        *value = active;
                    }
                }
                ChannelState::Train => {
                    let (on, off) = if proto.digital_train_active_high {
                        (TTL_HIGH_VOLTS, TTL_LOW_VOLTS)
                    } else {
                        (TTL_LOW_VOLTS, TTL_HIGH_VOLTS)
                    };
                    let segment = &mut samples[cursor..end];
                    for value in segment.iter_mut() {
                        *value = off;
                    }
                    let period =
                        seconds_to_samples(epoch.pulse_period, proto.sampling_rate);
                    let width = seconds_to_samples(epoch.pulse_width, proto.sampling_rate);
                    for pulse in 0..epoch.pulse_count(sweep)? {
                        let segment_len = segment.len();
                        let start = pulse * period;
                        let stop = (start + width).min(segment_len);
                        for value in &mut segment[start.min(segment_len)..stop] {
                            *value = on;
                        }
                    }
                }
            }

            cursor += duration;
        }

        Ok(SampleBuffer {
            samples,
            start_time: sweep as f64 * proto.sweep_duration(),
            sampling_rate: proto.sampling_rate,
        })
    }

    /// Trigger timestamps carried by one digital output on one sweep
    ///
    /// One timestamp per `Pulse` epoch (at the epoch start) and one per
    /// train pulse, in seconds from the start of the sweep. Timestamps
    /// include the holding-period shift, so they line up with the recorded
    /// signal rather than with the nominal epoch table.
    pub fn digital_trigger_times(
        &self,
        proto: &Protocol,
        digital_channel: usize,
        sweep: usize,
    ) -> Result<Vec<f64>> {
        check_sweep(proto, sweep)?;
        check_digital_channel(proto, digital_channel)?;

        let mut times = Vec::new();

        for (epoch_idx, epoch) in self.epochs.iter().enumerate() {
            if epoch.epoch_type == EpochType::Off {
                continue;
            }
            let pattern = self.resolve_digital_pattern(epoch_idx, proto, sweep)?;
            let start_sample = self.actual_epoch_start_sample(epoch_idx, sweep, proto)?;
            let start = start_sample as f64 / proto.sampling_rate;

            match pattern.state_of(digital_channel) {
                ChannelState::Off => {}
                ChannelState::Pulse => times.push(start),
                ChannelState::Train => {
                    for pulse in 0..epoch.pulse_count(sweep)? {
                        times.push(start + pulse as f64 * epoch.pulse_period);
                    }
                }
            }
        }

        Ok(times)
    }

    /// 交替模拟输出：逻辑 0/1 通道只在同奇偶的扫描上输出
    fn suppressed_by_alternation(&self, proto: &Protocol, sweep: usize) -> bool {
        proto.alternate_analog_outputs && self.logical_index < 2 && sweep % 2 != self.logical_index
    }

    /// Level the first epoch starts from on the given sweep
    fn seed_level(&self, proto: &Protocol, sweep: usize) -> Result<f64> {
        if self.return_to_hold || sweep == 0 {
            return Ok(self.holding_level);
        }

        // 不回保持电平时逐扫描推进尾电平，不生成波形缓冲
        let mut level = self.holding_level;
        for s in 0..sweep {
            if self.suppressed_by_alternation(proto, s) {
                level = self.holding_level;
                continue;
            }
            for epoch in &self.epochs {
                if epoch.epoch_type == EpochType::Off {
                    continue;
                }
                if seconds_to_samples(epoch.actual_duration(s)?, proto.sampling_rate) == 0 {
                    continue;
                }
                level = trailing_level_of(epoch, level, s);
            }
        }
        Ok(level)
    }
}

impl Protocol {
    /// Synthesizes the analog command waveform of a DAC channel
    ///
    /// Convenience wrapper over
    /// [`OutputConfig::synthesize_analog_waveform`].
    pub fn synthesize_analog_waveform(
        &self,
        dac: &ChannelQuery,
        sweep: usize,
    ) -> Result<SampleBuffer> {
        self.get_output(dac)?.synthesize_analog_waveform(self, sweep)
    }

    /// Synthesizes one digital output of a DAC channel as a TTL waveform
    pub fn synthesize_digital_waveform(
        &self,
        dac: &ChannelQuery,
        digital_channel: usize,
        sweep: usize,
    ) -> Result<SampleBuffer> {
        self.get_output(dac)?
            .synthesize_digital_waveform(self, digital_channel, sweep)
    }

    /// Trigger timestamps of one digital output on one sweep
    pub fn digital_trigger_times(
        &self,
        dac: &ChannelQuery,
        digital_channel: usize,
        sweep: usize,
    ) -> Result<Vec<f64>> {
        self.get_output(dac)?
            .digital_trigger_times(self, digital_channel, sweep)
    }
}

fn check_sweep(proto: &Protocol, sweep: usize) -> Result<()> {
    if sweep >= proto.sweep_count {
        return Err(AbfError::InconsistentProtocol(format!(
            "Sweep {} out of range (protocol has {} sweeps)",
            sweep, proto.sweep_count
        )));
    }
    Ok(())
}

fn check_digital_channel(proto: &Protocol, digital_channel: usize) -> Result<()> {
    if digital_channel >= proto.digital_output_count {
        return Err(AbfError::InvalidChannelIndex(format!(
            "No digital output {} (digitizer has {})",
            digital_channel, proto.digital_output_count
        )));
    }
    Ok(())
}

/// Level an epoch leaves on the line after its last sample
///
/// Step and ramp segments end at their target level; pulse-shaped segments
/// and cosines (whole cycles) return to the baseline they started from.
fn trailing_level_of(epoch: &Epoch, baseline: f64, sweep: usize) -> f64 {
    match epoch.epoch_type {
        EpochType::Step | EpochType::Ramp => epoch.actual_level(sweep),
        EpochType::Pulse | EpochType::Triangular | EpochType::Biphasic | EpochType::Cosine => {
            baseline
        }
        EpochType::Off => baseline,
    }
}

/// Writes one epoch's analog samples into `segment`
///
/// `segment` may be shorter than `duration` when the epoch overruns the
/// sweep; generation is position-faithful so the visible prefix is still
/// correct.
fn fill_analog_segment(
    segment: &mut [f64],
    epoch: &Epoch,
    baseline: f64,
    duration: usize,
    sweep: usize,
    sampling_rate: f64,
) -> Result<()> {
    let target = epoch.actual_level(sweep);

    match epoch.epoch_type {
        EpochType::Off => {}
        EpochType::Step => {
            for value in segment.iter_mut() {
                *value = target;
            }
        }
        EpochType::Ramp => {
            // 从前一电平线性过渡到目标电平
            for (i, value) in segment.iter_mut().enumerate() {
                let fraction = (i + 1) as f64 / duration as f64;
                *value = baseline + (target - baseline) * fraction;
            }
        }
        EpochType::Pulse | EpochType::Triangular | EpochType::Biphasic => {
            for value in segment.iter_mut() {
                *value = baseline;
            }

            let period = seconds_to_samples(epoch.pulse_period, sampling_rate);
            let width = seconds_to_samples(epoch.pulse_width, sampling_rate);
            if width == 0 {
                return Ok(());
            }

            for pulse in 0..epoch.pulse_count(sweep)? {
                let start = pulse * period;
                for offset in 0..width {
                    let index = start + offset;
                    if index >= segment.len() {
                        break;
                    }
                    segment[index] = match epoch.epoch_type {
                        EpochType::Pulse => target,
                        EpochType::Triangular => {
                            // 脉冲窗口内先升后降
                            let half = width as f64 / 2.0;
                            let fraction = if (offset as f64) < half {
                                offset as f64 / half
                            } else {
                                (width - offset) as f64 / half
                            };
                            baseline + (target - baseline) * fraction
                        }
                        EpochType::Biphasic => {
                            // 前半 +Δ 后半 −Δ
                            if offset < width / 2 {
                                target
                            } else {
                                baseline - (target - baseline)
                            }
                        }
                        _ => unreachable!(),
                    };
                }
            }
        }
        EpochType::Cosine => {
            // 整个 epoch 上的升余弦，pulse_count 个周期
            let cycles = epoch.pulse_count(sweep)? as f64;
            for (i, value) in segment.iter_mut().enumerate() {
                let phase = 2.0 * std::f64::consts::PI * cycles * i as f64 / duration as f64;
                *value = baseline + (target - baseline) * (1.0 - phase.cos()) / 2.0;
            }
        }
    }

    Ok(())
}
