use abfstim::{AbfError, ChannelQuery, Protocol};
use abfstim::metadata::{
    AdcMetadata, DacMetadata, EpochMetadata, GlobalMetadata, StimulusMetadata,
};
use abfstim::waveform::{TTL_HIGH_VOLTS, TTL_LOW_VOLTS};

// 单 ADC、单 DAC 的测试协议骨架
fn test_metadata(epochs: Vec<EpochMetadata>) -> StimulusMetadata {
    StimulusMetadata {
        global: GlobalMetadata {
            format_version_major: 2,
            adc_count: 1,
            dac_count: 1,
            digital_output_count: 8,
            active_dac_index: 0,
            alternate_analog_outputs: false,
            alternate_digital_outputs: false,
            digital_train_active_high: true,
            digital_holding: vec![false; 8],
            acquisition_mode_code: 5,
            sweep_count: 4,
            run_count: 1,
            trial_count: 1,
            samples_per_sweep: 6400,
            total_sample_count: 6400 * 4,
            sampling_rate: 20_000.0,
            averaging_mode_code: 0,
            averaging_weight: 1,
            file_guid: "wave-test".to_string(),
            protocol_path: "C:/protocols/wave.pro".to_string(),
            recording_start_date: None,
            recording_start_time: None,
        },
        adc_channels: vec![AdcMetadata {
            physical_index: 0,
            name: "IN 0".to_string(),
            units: "pA".to_string(),
        }],
        dac_channels: vec![DacMetadata {
            physical_index: 0,
            name: "Cmd 0".to_string(),
            units: "mV".to_string(),
            holding_level: -70.0,
            return_to_hold: true,
            analog_waveform_enabled: true,
            waveform_source_code: 1,
            epochs,
        }],
    }
}

fn blank_epoch() -> EpochMetadata {
    EpochMetadata {
        type_code: 1,
        first_level: 0.0,
        level_delta: 0.0,
        first_duration_samples: 1000,
        duration_delta_samples: 0,
        pulse_period_samples: 0,
        pulse_width_samples: 0,
        main_step_word: 0,
        main_train_word: 0,
        alternate_step_word: 0,
        alternate_train_word: 0,
        alternate_dig_out_state: false,
    }
}

const DAC: ChannelQuery = ChannelQuery::Physical(0);

#[test]
fn test_step_waveform_layout() {
    let metadata = test_metadata(vec![
        EpochMetadata {
            first_level: -10.0,
            ..blank_epoch()
        },
        EpochMetadata {
            first_level: 20.0,
            first_duration_samples: 2000,
            ..blank_epoch()
        },
    ]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let waveform = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();

    assert_eq!(waveform.len(), 6400);
    let holding = protocol.holding_sample_count();
    assert_eq!(holding, 100);

    // 保持期、两个台阶、回保持电平
    assert!(waveform.samples[..holding].iter().all(|&v| v == -70.0));
    assert!(waveform.samples[holding..holding + 1000]
        .iter()
        .all(|&v| v == -10.0));
    assert!(waveform.samples[holding + 1000..holding + 3000]
        .iter()
        .all(|&v| v == 20.0));
    assert!(waveform.samples[holding + 3000..].iter().all(|&v| v == -70.0));
}

#[test]
fn test_sweep_varying_durations() {
    let metadata = test_metadata(vec![EpochMetadata {
        first_level: 10.0,
        duration_delta_samples: 400,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let dac = protocol.get_output(&DAC).unwrap();
    let epoch = &dac.epochs[0];

    // 持续时间线性增长，采样数与 round(duration * rate) 一致
    for sweep in 0..protocol.sweep_count {
        let expected_samples = 1000 + 400 * sweep;
        let duration = epoch.actual_duration(sweep).unwrap();
        assert_eq!(
            (duration * protocol.sampling_rate).round() as usize,
            expected_samples
        );

        let waveform = protocol.synthesize_analog_waveform(&DAC, sweep).unwrap();
        let holding = protocol.holding_sample_count();
        let last_step_sample = holding + expected_samples - 1;
        assert_eq!(waveform.samples[last_step_sample], 10.0);
        assert_eq!(waveform.samples[last_step_sample + 1], -70.0);
    }
}

#[test]
fn test_ramp_interpolation() {
    let metadata = test_metadata(vec![EpochMetadata {
        type_code: 2,
        first_level: 30.0,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let waveform = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();
    let holding = protocol.holding_sample_count();

    // 从前一电平（保持 -70）线性过渡到 30
    let first = waveform.samples[holding];
    let expected_first = -70.0 + 100.0 / 1000.0;
    assert!((first - expected_first).abs() < 1e-9);

    let last = waveform.samples[holding + 999];
    assert!((last - 30.0).abs() < 1e-9);

    // 单调上升
    for i in holding..holding + 999 {
        assert!(waveform.samples[i] < waveform.samples[i + 1]);
    }
}

#[test]
fn test_analog_pulse_train() {
    let metadata = test_metadata(vec![EpochMetadata {
        type_code: 3,
        first_level: 40.0,
        first_duration_samples: 2000,
        pulse_period_samples: 500,
        pulse_width_samples: 50,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let waveform = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();
    let holding = protocol.holding_sample_count();

    // 4 个脉冲窗口为目标电平，其余为基线（保持电平）
    for pulse in 0..4 {
        let start = holding + pulse * 500;
        assert!(waveform.samples[start..start + 50].iter().all(|&v| v == 40.0));
        assert!(waveform.samples[start + 50..start + 500]
            .iter()
            .all(|&v| v == -70.0));
    }
}

#[test]
fn test_triangular_and_biphasic_pulses() {
    let metadata = test_metadata(vec![
        EpochMetadata {
            type_code: 4,
            first_level: 30.0,
            first_duration_samples: 400,
            pulse_period_samples: 200,
            pulse_width_samples: 100,
            ..blank_epoch()
        },
        EpochMetadata {
            type_code: 7,
            first_level: 30.0,
            first_duration_samples: 400,
            pulse_period_samples: 200,
            pulse_width_samples: 100,
            ..blank_epoch()
        },
    ]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let waveform = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();
    let holding = protocol.holding_sample_count();

    // 三角波：窗口中点到达目标电平，起点在基线
    let tri_start = holding;
    assert_eq!(waveform.samples[tri_start], -70.0);
    assert!((waveform.samples[tri_start + 50] - 30.0).abs() < 1e-9);

    // 双相波：前半 +Δ，后半 −Δ（Δ = 100）
    let bi_start = holding + 400;
    assert_eq!(waveform.samples[bi_start], 30.0);
    assert_eq!(waveform.samples[bi_start + 99], -170.0);
}

#[test]
fn test_cosine_cycles() {
    let metadata = test_metadata(vec![EpochMetadata {
        type_code: 5,
        first_level: 30.0,
        pulse_period_samples: 500,
        pulse_width_samples: 0,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let waveform = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();
    let holding = protocol.holding_sample_count();

    // 1000 个采样内 2 个周期：起点在基线，半周期处到达目标
    assert!((waveform.samples[holding] - -70.0).abs() < 1e-9);
    assert!((waveform.samples[holding + 250] - 30.0).abs() < 1e-9);
    assert!((waveform.samples[holding + 750] - 30.0).abs() < 1e-9);
}

#[test]
fn test_trailing_level_carries_without_return_to_hold() {
    let mut metadata = test_metadata(vec![EpochMetadata {
        type_code: 2,
        first_level: 0.0,
        ..blank_epoch()
    }]);
    metadata.dac_channels[0].return_to_hold = false;

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let holding = protocol.holding_sample_count();

    // 第 0 扫：从保持电平 -70 爬升到 0；扫后维持 0
    let sweep0 = protocol.synthesize_analog_waveform(&DAC, 0).unwrap();
    assert!(sweep0.samples[holding] < -69.0);
    assert_eq!(*sweep0.samples.last().unwrap(), 0.0);

    // 第 1 扫：种子电平为上一扫尾电平 0，斜坡退化为平坦
    let sweep1 = protocol.synthesize_analog_waveform(&DAC, 1).unwrap();
    assert_eq!(sweep1.samples[holding], 0.0);
    assert_eq!(sweep1.samples[holding + 999], 0.0);
}

#[test]
fn test_end_to_end_digital_pulse_train() {
    // 一个 DAC、一个 Pulse epoch：数字通道 0 为链，
    // 周期 100 采样、脉宽 10 采样、持续 200 采样 => 2 个脉冲
    let metadata = test_metadata(vec![EpochMetadata {
        type_code: 3,
        first_level: 0.0,
        first_duration_samples: 200,
        pulse_period_samples: 100,
        pulse_width_samples: 10,
        main_train_word: 0b0001,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let dac = protocol.get_output(&DAC).unwrap();

    assert_eq!(dac.epochs[0].pulse_count(0).unwrap(), 2);

    let ttl = protocol.synthesize_digital_waveform(&DAC, 0, 0).unwrap();
    let holding = protocol.holding_sample_count();

    // 保持期为低
    assert!(ttl.samples[..holding].iter().all(|&v| v == TTL_LOW_VOLTS));

    // epoch 内相对 [0,10) 与 [100,110) 为高，其余为低
    let epoch = &ttl.samples[holding..holding + 200];
    for (i, &value) in epoch.iter().enumerate() {
        let expected = if i < 10 || (100..110).contains(&i) {
            TTL_HIGH_VOLTS
        } else {
            TTL_LOW_VOLTS
        };
        assert_eq!(value, expected, "sample {} within epoch", i);
    }

    // epoch 结束后回到基线
    assert!(ttl.samples[holding + 200..].iter().all(|&v| v == TTL_LOW_VOLTS));

    // 触发时间戳包含保持期偏移
    let triggers = protocol.digital_trigger_times(&DAC, 0, 0).unwrap();
    let rate = protocol.sampling_rate;
    assert_eq!(triggers.len(), 2);
    assert!((triggers[0] - holding as f64 / rate).abs() < 1e-9);
    assert!((triggers[1] - (holding + 100) as f64 / rate).abs() < 1e-9);
}

#[test]
fn test_digital_pulse_state_holds_full_epoch() {
    let metadata = test_metadata(vec![EpochMetadata {
        main_step_word: 0b0100,
        first_duration_samples: 500,
        ..blank_epoch()
    }]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let ttl = protocol.synthesize_digital_waveform(&DAC, 2, 0).unwrap();
    let holding = protocol.holding_sample_count();

    assert!(ttl.samples[holding..holding + 500]
        .iter()
        .all(|&v| v == TTL_HIGH_VOLTS));
    assert!(ttl.samples[holding + 500..].iter().all(|&v| v == TTL_LOW_VOLTS));

    // 脉冲状态只产生一个触发时间戳
    let triggers = protocol.digital_trigger_times(&DAC, 2, 0).unwrap();
    assert_eq!(triggers.len(), 1);
}

#[test]
fn test_digital_polarity_inversions() {
    let mut metadata = test_metadata(vec![EpochMetadata {
        main_step_word: 0b0001,
        main_train_word: 0b0010,
        first_duration_samples: 400,
        pulse_period_samples: 200,
        pulse_width_samples: 20,
        ..blank_epoch()
    }]);
    metadata.global.digital_holding[0] = true;
    metadata.global.digital_train_active_high = false;

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let holding = protocol.holding_sample_count();

    // 通道 0 保持为高，脉冲反相驱动为低
    let pulse = protocol.synthesize_digital_waveform(&DAC, 0, 0).unwrap();
    assert!(pulse.samples[..holding].iter().all(|&v| v == TTL_HIGH_VOLTS));
    assert!(pulse.samples[holding..holding + 400]
        .iter()
        .all(|&v| v == TTL_LOW_VOLTS));

    // 链在 active-high 关闭时反相：窗口为低，窗口外为高
    let train = protocol.synthesize_digital_waveform(&DAC, 1, 0).unwrap();
    assert!(train.samples[holding..holding + 20]
        .iter()
        .all(|&v| v == TTL_LOW_VOLTS));
    assert!(train.samples[holding + 20..holding + 200]
        .iter()
        .all(|&v| v == TTL_HIGH_VOLTS));
}

#[test]
fn test_alternate_digital_output() {
    // 两个 DAC：活动 DAC 0 交替主/备用位模式，DAC 1 不输出
    let mut metadata = test_metadata(vec![EpochMetadata {
        main_train_word: 0b0001,
        alternate_step_word: 0b0010,
        first_duration_samples: 400,
        pulse_period_samples: 200,
        pulse_width_samples: 20,
        ..blank_epoch()
    }]);
    metadata.global.alternate_digital_outputs = true;
    metadata.global.dac_count = 2;
    metadata.dac_channels.push(DacMetadata {
        physical_index: 1,
        name: "Cmd 1".to_string(),
        units: "mV".to_string(),
        holding_level: 0.0,
        return_to_hold: true,
        analog_waveform_enabled: false,
        waveform_source_code: 0,
        epochs: vec![EpochMetadata {
            main_step_word: 0b1000,
            first_duration_samples: 400,
            ..blank_epoch()
        }],
    });

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let holding = protocol.holding_sample_count();
    let dac0 = ChannelQuery::Physical(0);
    let dac1 = ChannelQuery::Physical(1);

    // 偶数扫描：主模式（通道 0 链）
    let even = protocol.synthesize_digital_waveform(&dac0, 0, 0).unwrap();
    assert!(even.samples[holding..holding + 20]
        .iter()
        .all(|&v| v == TTL_HIGH_VOLTS));
    let even_ch1 = protocol.synthesize_digital_waveform(&dac0, 1, 0).unwrap();
    assert!(even_ch1.samples.iter().all(|&v| v == TTL_LOW_VOLTS));

    // 奇数扫描：备用模式（通道 1 脉冲），通道 0 静默
    let odd_ch0 = protocol.synthesize_digital_waveform(&dac0, 0, 1).unwrap();
    assert!(odd_ch0.samples.iter().all(|&v| v == TTL_LOW_VOLTS));
    let odd_ch1 = protocol.synthesize_digital_waveform(&dac0, 1, 1).unwrap();
    assert!(odd_ch1.samples[holding..holding + 400]
        .iter()
        .all(|&v| v == TTL_HIGH_VOLTS));

    // 交替模式下逻辑下标 < 2 的非活动通道完全不输出
    for sweep in 0..protocol.sweep_count {
        let silent = protocol.synthesize_digital_waveform(&dac1, 3, sweep).unwrap();
        assert!(silent.samples.iter().all(|&v| v == TTL_LOW_VOLTS));
    }
}

#[test]
fn test_alternate_analog_output_parity() {
    let mut metadata = test_metadata(vec![EpochMetadata {
        first_level: 20.0,
        ..blank_epoch()
    }]);
    metadata.global.alternate_analog_outputs = true;
    metadata.global.dac_count = 2;
    metadata.dac_channels.push(DacMetadata {
        physical_index: 1,
        name: "Cmd 1".to_string(),
        units: "mV".to_string(),
        holding_level: 0.0,
        return_to_hold: true,
        analog_waveform_enabled: true,
        waveform_source_code: 1,
        epochs: vec![EpochMetadata {
            first_level: -30.0,
            ..blank_epoch()
        }],
    });

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let holding = protocol.holding_sample_count();

    // DAC 0 只在偶数扫描输出，DAC 1 只在奇数扫描输出
    let dac0_even = protocol
        .synthesize_analog_waveform(&ChannelQuery::Physical(0), 0)
        .unwrap();
    assert_eq!(dac0_even.samples[holding], 20.0);
    let dac0_odd = protocol
        .synthesize_analog_waveform(&ChannelQuery::Physical(0), 1)
        .unwrap();
    assert!(dac0_odd.samples.iter().all(|&v| v == -70.0));

    let dac1_even = protocol
        .synthesize_analog_waveform(&ChannelQuery::Physical(1), 0)
        .unwrap();
    assert!(dac1_even.samples.iter().all(|&v| v == 0.0));
    let dac1_odd = protocol
        .synthesize_analog_waveform(&ChannelQuery::Physical(1), 1)
        .unwrap();
    assert_eq!(dac1_odd.samples[holding], -30.0);
}

#[test]
fn test_stimulus_file_source_is_unsupported() {
    let mut metadata = test_metadata(vec![blank_epoch()]);
    metadata.dac_channels[0].waveform_source_code = 2;

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    assert!(matches!(
        protocol.synthesize_analog_waveform(&DAC, 0),
        Err(AbfError::UnsupportedWaveformSource(_))
    ));
}

#[test]
fn test_sweep_and_channel_bounds() {
    let metadata = test_metadata(vec![blank_epoch()]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();

    assert!(matches!(
        protocol.synthesize_analog_waveform(&DAC, 99),
        Err(AbfError::InconsistentProtocol(_))
    ));
    assert!(matches!(
        protocol.synthesize_digital_waveform(&DAC, 8, 0),
        Err(AbfError::InvalidChannelIndex(_))
    ));
}

#[test]
fn test_buffer_time_tags() {
    let metadata = test_metadata(vec![blank_epoch()]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();

    let sweep2 = protocol.synthesize_analog_waveform(&DAC, 2).unwrap();
    assert!((sweep2.start_time - 2.0 * protocol.sweep_duration()).abs() < 1e-12);
    assert_eq!(sweep2.sampling_rate, protocol.sampling_rate);
    assert!((sweep2.time_of(0) - sweep2.start_time).abs() < 1e-12);
    assert!((sweep2.duration() - protocol.sweep_duration()).abs() < 1e-12);
}

#[test]
fn test_ttl_emulating_epochs() {
    let metadata = test_metadata(vec![
        EpochMetadata {
            type_code: 3,
            first_level: 10.0,
            pulse_period_samples: 500,
            pulse_width_samples: 50,
            ..blank_epoch()
        },
        EpochMetadata {
            first_level: 20.0,
            ..blank_epoch()
        },
    ]);
    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let dac = protocol.get_output(&DAC).unwrap();

    let ttl_epochs = dac.ttl_emulating_epochs();
    assert_eq!(ttl_epochs.len(), 1);
    assert_eq!(ttl_epochs[0].letter(), "A");
}
