// Internal utilities for documentation tests
// This file contains helper functions to build demo metadata for doctests

use chrono::{NaiveDate, NaiveTime};

use crate::metadata::{
    AdcMetadata, DacMetadata, EpochMetadata, GlobalMetadata, StimulusMetadata,
};

/// Builds a small but complete metadata record for documentation examples
///
/// Two ADC channels (pA), two DAC channels (mV), 6 sweeps of 6400 samples at
/// 20 kHz. DAC 0 carries a step/pulse epoch table with a pulse train on
/// digital output 0; DAC 1 holds.
pub fn demo_metadata() -> StimulusMetadata {
    let epochs = vec![
        // Epoch A: 50 ms step, +10 mV per sweep
        EpochMetadata {
            type_code: 1,
            first_level: -10.0,
            level_delta: 10.0,
            first_duration_samples: 1000,
            duration_delta_samples: 0,
            pulse_period_samples: 0,
            pulse_width_samples: 0,
            main_step_word: 0,
            main_train_word: 0,
            alternate_step_word: 0,
            alternate_train_word: 0,
            alternate_dig_out_state: false,
        },
        // Epoch B: 100 ms pulse train, digital output 0 starred
        EpochMetadata {
            type_code: 3,
            first_level: 40.0,
            level_delta: 0.0,
            first_duration_samples: 2000,
            duration_delta_samples: 0,
            pulse_period_samples: 500,
            pulse_width_samples: 50,
            main_step_word: 0b0000,
            main_train_word: 0b0001,
            alternate_step_word: 0b0010,
            alternate_train_word: 0b0000,
            alternate_dig_out_state: false,
        },
    ];

    StimulusMetadata {
        global: GlobalMetadata {
            format_version_major: 2,
            adc_count: 2,
            dac_count: 2,
            digital_output_count: 8,
            active_dac_index: 0,
            alternate_analog_outputs: false,
            alternate_digital_outputs: false,
            digital_train_active_high: true,
            digital_holding: vec![false; 8],
            acquisition_mode_code: 5,
            sweep_count: 6,
            run_count: 1,
            trial_count: 1,
            samples_per_sweep: 6400,
            total_sample_count: 6400 * 6 * 2,
            sampling_rate: 20_000.0,
            averaging_mode_code: 0,
            averaging_weight: 1,
            file_guid: "9f1c2d3e-demo".to_string(),
            protocol_path: "C:/protocols/demo_step_train.pro".to_string(),
            recording_start_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            recording_start_time: NaiveTime::from_hms_opt(14, 30, 0),
        },
        adc_channels: vec![
            AdcMetadata {
                physical_index: 0,
                name: "IN 0".to_string(),
                units: "pA".to_string(),
            },
            AdcMetadata {
                physical_index: 1,
                name: "IN 1".to_string(),
                units: "pA".to_string(),
            },
        ],
        dac_channels: vec![
            DacMetadata {
                physical_index: 0,
                name: "Cmd 0".to_string(),
                units: "mV".to_string(),
                holding_level: -70.0,
                return_to_hold: true,
                analog_waveform_enabled: true,
                waveform_source_code: 1,
                epochs,
            },
            DacMetadata {
                physical_index: 1,
                name: "Cmd 1".to_string(),
                units: "mV".to_string(),
                holding_level: 0.0,
                return_to_hold: true,
                analog_waveform_enabled: false,
                waveform_source_code: 0,
                epochs: Vec::new(),
            },
        ],
    }
}

/// Same record with alternate digital output enabled
///
/// Used by examples that demonstrate even/odd sweep alternation.
pub fn demo_metadata_with_alternation() -> StimulusMetadata {
    let mut metadata = demo_metadata();
    metadata.global.alternate_digital_outputs = true;
    metadata
}
