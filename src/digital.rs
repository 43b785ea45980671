use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{AbfError, Result};

/// Number of digital outputs per bank
pub const BANK_WIDTH: usize = 4;

/// State of one digital output during one epoch
///
/// Each epoch stores two raw words per pattern: a "step" word and a "train"
/// word. Per channel, a set train bit means [`ChannelState::Train`]
/// regardless of the step bit; a set step bit alone means
/// [`ChannelState::Pulse`]; neither means [`ChannelState::Off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Output stays at its holding level
    Off,
    /// Output is driven for the full epoch duration
    Pulse,
    /// Output emits a pulse train (`pulse_width` every `pulse_period`)
    Train,
}

impl ChannelState {
    /// 表格中使用的单字符表示：0 / 1 / *
    pub fn symbol(&self) -> char {
        match self {
            ChannelState::Off => '0',
            ChannelState::Pulse => '1',
            ChannelState::Train => '*',
        }
    }
}

/// Decoded digital pattern of one epoch: two banks of four outputs
///
/// The raw words store channel 0 in bit 0, but the pattern arrays keep the
/// display order used by epoch tables: `bank_low[0]` is channel 3 and
/// `bank_low[3]` is channel 0 (likewise `bank_high` for channels 7..4). Use
/// [`DigitalPattern::state_of`] to address outputs by channel index without
/// thinking about that reversal.
///
/// # Examples
///
/// ```rust
/// use abfstim::digital::{ChannelState, DigitalPattern};
///
/// // train word 0b0001: digital output 0 carries a pulse train
/// let pattern = DigitalPattern::from_raw_words(0b0000, 0b0001, 4)?;
/// assert_eq!(pattern.state_of(0), ChannelState::Train);
/// assert_eq!(pattern.bank_low, [
///     ChannelState::Off,
///     ChannelState::Off,
///     ChannelState::Off,
///     ChannelState::Train,
/// ]);
/// assert_eq!(pattern.pattern_string_low(), "000*");
///
/// // encode is the exact inverse
/// assert_eq!(pattern.to_raw_words(), (0b0000, 0b0001));
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalPattern {
    /// Digital outputs 3..0, in display order
    pub bank_low: [ChannelState; BANK_WIDTH],
    /// Digital outputs 7..4, in display order
    pub bank_high: [ChannelState; BANK_WIDTH],
}

impl DigitalPattern {
    /// All eight outputs off
    pub fn all_off() -> Self {
        DigitalPattern {
            bank_low: [ChannelState::Off; BANK_WIDTH],
            bank_high: [ChannelState::Off; BANK_WIDTH],
        }
    }

    /// Decodes a step/train word pair into a pattern
    ///
    /// `bit_count` is the number of digital outputs of the digitizer: 4 for
    /// single-bank hardware, 8 for two banks. Raw bits above `bit_count` must
    /// be zero.
    ///
    /// # Errors
    ///
    /// * `AbfError::MalformedRecord` - `bit_count` is not 4 or 8, or a raw
    ///   word has bits set outside the declared outputs
    pub fn from_raw_words(step_word: u16, train_word: u16, bit_count: usize) -> Result<Self> {
        if bit_count != 4 && bit_count != 8 {
            return Err(AbfError::MalformedRecord(format!(
                "Digital bank decode supports 4 or 8 outputs, got {}",
                bit_count
            )));
        }

        let mask = (1u16 << bit_count) - 1;
        if step_word & !mask != 0 || train_word & !mask != 0 {
            return Err(AbfError::MalformedRecord(format!(
                "Digital pattern words {:#06b}/{:#06b} exceed {} outputs",
                step_word, train_word, bit_count
            )));
        }

        let mut pattern = DigitalPattern::all_off();
        for channel in 0..bit_count {
            let train = (train_word >> channel) & 1 == 1;
            let step = (step_word >> channel) & 1 == 1;
            // train 位优先于 step 位
            let state = if train {
                ChannelState::Train
            } else if step {
                ChannelState::Pulse
            } else {
                ChannelState::Off
            };
            pattern.set_state(channel, state);
        }

        Ok(pattern)
    }

    /// Encodes the pattern back into its step/train word pair
    pub fn to_raw_words(&self) -> (u16, u16) {
        let mut step_word = 0u16;
        let mut train_word = 0u16;

        for channel in 0..2 * BANK_WIDTH {
            match self.state_of(channel) {
                ChannelState::Off => {}
                ChannelState::Pulse => step_word |= 1 << channel,
                ChannelState::Train => train_word |= 1 << channel,
            }
        }

        (step_word, train_word)
    }

    /// State of digital output `channel` (0..8)
    ///
    /// Out-of-range channels read as [`ChannelState::Off`].
    pub fn state_of(&self, channel: usize) -> ChannelState {
        // 数组为显示顺序（高位在前），按通道号取反向下标
        match channel {
            0..=3 => self.bank_low[BANK_WIDTH - 1 - channel],
            4..=7 => self.bank_high[BANK_WIDTH - 1 - (channel - BANK_WIDTH)],
            _ => ChannelState::Off,
        }
    }

    fn set_state(&mut self, channel: usize, state: ChannelState) {
        match channel {
            0..=3 => self.bank_low[BANK_WIDTH - 1 - channel] = state,
            4..=7 => self.bank_high[BANK_WIDTH - 1 - (channel - BANK_WIDTH)] = state,
            _ => {}
        }
    }

    /// Channel indices whose state is not `Off`
    ///
    /// `trains_only = Some(true)` keeps only `Train` outputs,
    /// `Some(false)` only `Pulse` outputs, `None` both.
    pub fn used_channels(&self, trains_only: Option<bool>) -> BTreeSet<usize> {
        (0..2 * BANK_WIDTH)
            .filter(|&channel| match (self.state_of(channel), trains_only) {
                (ChannelState::Off, _) => false,
                (_, None) => true,
                (ChannelState::Train, Some(wants_train)) => wants_train,
                (ChannelState::Pulse, Some(wants_train)) => !wants_train,
            })
            .collect()
    }

    /// True when no output is used in either bank
    pub fn is_blank(&self) -> bool {
        self.used_channels(None).is_empty()
    }

    /// Display string of outputs 3..0, e.g. `"0*01"`
    pub fn pattern_string_low(&self) -> String {
        self.bank_low.iter().map(ChannelState::symbol).collect()
    }

    /// Display string of outputs 7..4
    pub fn pattern_string_high(&self) -> String {
        self.bank_high.iter().map(ChannelState::symbol).collect()
    }
}
