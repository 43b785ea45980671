use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::digital::DigitalPattern;
use crate::error::{AbfError, Result};
use crate::utils::epoch_letter;

/// Waveform shape of one epoch (ABF2 `nEpochType`)
///
/// The numeric codes skip 6, matching the file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochType {
    Off,
    Step,
    Ramp,
    Pulse,
    Triangular,
    Cosine,
    Biphasic,
}

impl EpochType {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(EpochType::Off),
            1 => Ok(EpochType::Step),
            2 => Ok(EpochType::Ramp),
            3 => Ok(EpochType::Pulse),
            4 => Ok(EpochType::Triangular),
            5 => Ok(EpochType::Cosine),
            7 => Ok(EpochType::Biphasic),
            _ => Err(AbfError::MalformedRecord(format!(
                "Unknown epoch type code: {}",
                code
            ))),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            EpochType::Off => 0,
            EpochType::Step => 1,
            EpochType::Ramp => 2,
            EpochType::Pulse => 3,
            EpochType::Triangular => 4,
            EpochType::Cosine => 5,
            EpochType::Biphasic => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EpochType::Off => "Off",
            EpochType::Step => "Step",
            EpochType::Ramp => "Ramp",
            EpochType::Pulse => "Pulse",
            EpochType::Triangular => "Triangular",
            EpochType::Cosine => "Cosine",
            EpochType::Biphasic => "Biphasic",
        }
    }
}

/// Selects the main or the alternate digital pattern of an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternBank {
    Main,
    Alternate,
}

/// One waveform segment of a DAC channel's command output
///
/// An epoch is a pure value: constructed once from decoded metadata, never
/// mutated after being placed in an output channel. Levels are in the owning
/// DAC's units; durations and pulse timing are in seconds. Level and duration
/// vary linearly with the sweep index through their delta fields.
///
/// # Examples
///
/// ```rust
/// use abfstim::{Epoch, EpochType};
/// use abfstim::digital::DigitalPattern;
///
/// let epoch = Epoch::new(
///     0,
///     EpochType::Step,
///     10.0,   // first level
///     5.0,    // level delta per sweep
///     0.050,  // first duration (s)
///     0.010,  // duration delta per sweep (s)
///     0.0,    // pulse period
///     0.0,    // pulse width
///     DigitalPattern::all_off(),
///     DigitalPattern::all_off(),
/// )?;
///
/// assert_eq!(epoch.letter(), "A");
/// assert_eq!(epoch.actual_level(0), 10.0);
/// assert_eq!(epoch.actual_level(3), 25.0);
/// assert!((epoch.actual_duration(2)? - 0.070).abs() < 1e-12);
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epoch {
    /// Position in the owning channel's epoch table
    pub number: usize,
    pub epoch_type: EpochType,
    /// Command level on sweep 0, in the owning DAC's units
    pub first_level: f64,
    /// Level increment per sweep
    pub level_delta: f64,
    /// Duration on sweep 0, in seconds
    pub first_duration: f64,
    /// Duration increment per sweep, in seconds
    pub duration_delta: f64,
    /// Pulse repetition period in seconds (0 = no train)
    pub pulse_period: f64,
    /// Pulse width in seconds
    pub pulse_width: f64,
    /// Digital pattern emitted on normal sweeps
    pub main_pattern: DigitalPattern,
    /// Digital pattern emitted on odd sweeps when alternation is enabled
    pub alternate_pattern: DigitalPattern,
    /// Epoch defines a distinct alternate pattern
    pub use_alternate_pattern: bool,
    /// Alternate DIG-out state flag carried verbatim from the source
    pub alternate_dig_out_state: bool,
}

impl Epoch {
    /// Builds an epoch, validating its timing parameters
    ///
    /// # Errors
    ///
    /// * `AbfError::InvalidEpochSpec` - negative first duration, negative
    ///   pulse timing, or pulse width exceeding pulse period
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        number: usize,
        epoch_type: EpochType,
        first_level: f64,
        level_delta: f64,
        first_duration: f64,
        duration_delta: f64,
        pulse_period: f64,
        pulse_width: f64,
        main_pattern: DigitalPattern,
        alternate_pattern: DigitalPattern,
    ) -> Result<Self> {
        if first_duration < 0.0 {
            return Err(AbfError::InvalidEpochSpec(format!(
                "Epoch {} has negative first duration {}",
                number, first_duration
            )));
        }
        if pulse_period < 0.0 || pulse_width < 0.0 {
            return Err(AbfError::InvalidEpochSpec(format!(
                "Epoch {} has negative pulse timing (period {}, width {})",
                number, pulse_period, pulse_width
            )));
        }
        if (pulse_period > 0.0 || pulse_width > 0.0) && pulse_width > pulse_period {
            return Err(AbfError::InvalidEpochSpec(format!(
                "Epoch {} pulse width {} exceeds pulse period {}",
                number, pulse_width, pulse_period
            )));
        }

        let use_alternate_pattern = alternate_pattern != main_pattern;
        Ok(Epoch {
            number,
            epoch_type,
            first_level,
            level_delta,
            first_duration,
            duration_delta,
            pulse_period,
            pulse_width,
            main_pattern,
            alternate_pattern,
            use_alternate_pattern,
            alternate_dig_out_state: false,
        })
    }

    /// Spreadsheet-style letter label of this epoch (0 → "A", 26 → "AA")
    pub fn letter(&self) -> String {
        epoch_letter(self.number)
    }

    /// Epoch duration on the given sweep, in seconds
    ///
    /// # Errors
    ///
    /// * `AbfError::InvalidEpochSpec` - the duration delta drives the
    ///   duration negative on this sweep. This is a caller error, never
    ///   silently corrected.
    pub fn actual_duration(&self, sweep: usize) -> Result<f64> {
        let duration = self.first_duration + sweep as f64 * self.duration_delta;
        if duration < 0.0 {
            return Err(AbfError::InvalidEpochSpec(format!(
                "Epoch {} duration is negative ({:.6} s) on sweep {}",
                self.number, duration, sweep
            )));
        }
        Ok(duration)
    }

    /// Command level on the given sweep, in the owning DAC's units
    pub fn actual_level(&self, sweep: usize) -> f64 {
        self.first_level + sweep as f64 * self.level_delta
    }

    /// Number of whole pulse periods that fit in this epoch on `sweep`
    ///
    /// 0 when the epoch has no pulse period.
    pub fn pulse_count(&self, sweep: usize) -> Result<usize> {
        if self.pulse_period <= 0.0 {
            return Ok(0);
        }
        let duration = self.actual_duration(sweep)?;
        Ok((duration / self.pulse_period).floor() as usize)
    }

    /// Digital channels used by the selected pattern
    ///
    /// `trains_only = Some(true)` keeps train outputs only, `Some(false)`
    /// pulse outputs only, `None` any non-off output.
    pub fn used_digital_channels(
        &self,
        bank: PatternBank,
        trains_only: Option<bool>,
    ) -> BTreeSet<usize> {
        match bank {
            PatternBank::Main => self.main_pattern.used_channels(trains_only),
            PatternBank::Alternate => self.alternate_pattern.used_channels(trains_only),
        }
    }

    /// True when the DAC channel itself fakes a TTL via an analog pulse
    ///
    /// A sweep-invariant analog pulse with a nonzero level and no digital
    /// outputs in either pattern is, in practice, a TTL trigger wired from
    /// the DAC instead of a digital output. Trigger-derivation consumers
    /// treat such epochs like digital pulses.
    pub fn emulates_ttl(&self) -> bool {
        self.epoch_type == EpochType::Pulse
            && self.level_delta == 0.0
            && self.duration_delta == 0.0
            && self.first_level != 0.0
            && self.main_pattern.is_blank()
            && self.alternate_pattern.is_blank()
    }

    /// Structural equality that ignores both digital-pattern fields
    pub fn identical_except_digital(&self, other: &Epoch) -> bool {
        self.number == other.number
            && self.epoch_type == other.epoch_type
            && self.first_level == other.first_level
            && self.level_delta == other.level_delta
            && self.first_duration == other.first_duration
            && self.duration_delta == other.duration_delta
            && self.pulse_period == other.pulse_period
            && self.pulse_width == other.pulse_width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digital::DigitalPattern;

    fn plain_epoch(epoch_type: EpochType) -> Epoch {
        Epoch::new(
            0,
            epoch_type,
            10.0,
            0.0,
            0.1,
            0.0,
            0.0,
            0.0,
            DigitalPattern::all_off(),
            DigitalPattern::all_off(),
        )
        .unwrap()
    }

    #[test]
    fn test_linear_duration_and_level() {
        let mut epoch = plain_epoch(EpochType::Step);
        epoch.level_delta = -5.0;
        epoch.duration_delta = 0.02;

        for sweep in 0..10 {
            let expected = 0.1 + sweep as f64 * 0.02;
            assert!((epoch.actual_duration(sweep).unwrap() - expected).abs() < 1e-12);
            assert_eq!(epoch.actual_level(sweep), 10.0 - 5.0 * sweep as f64);
        }
    }

    #[test]
    fn test_negative_duration_is_an_error() {
        let mut epoch = plain_epoch(EpochType::Step);
        epoch.duration_delta = -0.03;
        assert!(epoch.actual_duration(0).is_ok());
        assert!(epoch.actual_duration(10).is_err());
    }

    #[test]
    fn test_pulse_count() {
        let mut epoch = plain_epoch(EpochType::Pulse);
        epoch.pulse_period = 0.03;
        epoch.pulse_width = 0.01;
        // 0.1 / 0.03 = 3.33…
        assert_eq!(epoch.pulse_count(0).unwrap(), 3);

        epoch.pulse_period = 0.0;
        epoch.pulse_width = 0.0;
        assert_eq!(epoch.pulse_count(0).unwrap(), 0);
    }

    #[test]
    fn test_pulse_width_must_fit_period() {
        let result = Epoch::new(
            0,
            EpochType::Pulse,
            1.0,
            0.0,
            0.1,
            0.0,
            0.005,
            0.010,
            DigitalPattern::all_off(),
            DigitalPattern::all_off(),
        );
        assert!(matches!(result, Err(AbfError::InvalidEpochSpec(_))));
    }

    #[test]
    fn test_emulates_ttl() {
        let mut epoch = plain_epoch(EpochType::Pulse);
        assert!(epoch.emulates_ttl());

        // 任一条件不满足都不算 TTL 仿真
        epoch.level_delta = 1.0;
        assert!(!epoch.emulates_ttl());
        epoch.level_delta = 0.0;

        epoch.first_level = 0.0;
        assert!(!epoch.emulates_ttl());
        epoch.first_level = 10.0;

        epoch.main_pattern = DigitalPattern::from_raw_words(0b0001, 0, 4).unwrap();
        assert!(!epoch.emulates_ttl());

        let step = plain_epoch(EpochType::Step);
        assert!(!step.emulates_ttl());
    }

    #[test]
    fn test_identical_except_digital() {
        let a = plain_epoch(EpochType::Step);
        let mut b = a.clone();
        b.main_pattern = DigitalPattern::from_raw_words(0b0110, 0b1000, 4).unwrap();
        assert_ne!(a, b);
        assert!(a.identical_except_digital(&b));

        b.first_level = 99.0;
        assert!(!a.identical_except_digital(&b));
    }
}
