use std::fs;
use std::path::Path;

use abfstim::persist::{
    decode_epoch, decode_input_config, decode_output_config, encode_epoch, encode_input_config,
    encode_output_config, AttrValue, EncodeContext, Group,
};
use abfstim::{ChannelQuery, Protocol, StimulusMetadata};

// 清理测试文件的辅助函数
fn cleanup_test_file(filename: &str) {
    if Path::new(filename).exists() {
        fs::remove_file(filename).ok();
    }
}

fn demo_protocol() -> Protocol {
    Protocol::from_metadata(&abfstim::doctest_utils::demo_metadata()).unwrap()
}

#[test]
fn test_protocol_round_trip() {
    let protocol = demo_protocol();

    let mut ctx = EncodeContext::new();
    let group = protocol.encode(&mut ctx).unwrap();
    let restored = Protocol::decode(&group).unwrap();

    assert_eq!(protocol, restored);

    // 源标识也要完整还原（虽然不参与相等性）
    assert_eq!(protocol.source.file_guid, restored.source.file_guid);
    assert_eq!(protocol.source.protocol_path, restored.source.protocol_path);
    assert_eq!(
        protocol.source.recording_start_date,
        restored.source.recording_start_date
    );
    assert_eq!(
        protocol.source.recording_start_time,
        restored.source.recording_start_time
    );
}

#[test]
fn test_round_trip_through_json_file() {
    let filename = "test_protocol_round_trip.json";
    let protocol = demo_protocol();

    // 写入阶段
    {
        let mut ctx = EncodeContext::new();
        let group = protocol.encode(&mut ctx).unwrap();
        fs::write(filename, group.to_json_string().unwrap()).unwrap();
    }

    // 读取阶段
    {
        let json = fs::read_to_string(filename).unwrap();
        let group = Group::from_json_str(&json).unwrap();
        let restored = Protocol::decode(&group).unwrap();
        assert_eq!(protocol, restored);
    }

    cleanup_test_file(filename);
}

#[test]
fn test_epoch_round_trip() {
    let protocol = demo_protocol();
    let dac = protocol.get_output(&ChannelQuery::Logical(0)).unwrap();
    let rate = protocol.sampling_rate;

    for epoch in &dac.epochs {
        let mut ctx = EncodeContext::new();
        let group = encode_epoch(epoch, rate, &mut ctx, "epochs/standalone").unwrap();
        let restored = decode_epoch(&group, rate, &group).unwrap();
        assert_eq!(epoch, &restored);
    }
}

#[test]
fn test_input_config_round_trip() {
    let protocol = demo_protocol();

    for input in protocol.inputs() {
        let group = encode_input_config(input);
        let restored = decode_input_config(&group).unwrap();
        assert_eq!(input, &restored);
    }
}

#[test]
fn test_output_config_round_trip() {
    let protocol = demo_protocol();
    let rate = protocol.sampling_rate;

    for output in protocol.outputs() {
        let mut ctx = EncodeContext::new();
        let group = encode_output_config(output, rate, &mut ctx, "dac_standalone").unwrap();
        let restored = decode_output_config(&group, rate, &group).unwrap();
        assert_eq!(output, &restored);
    }
}

#[test]
fn test_identical_epochs_are_shared() {
    // 两个 DAC 携带同一张 epoch 表：第二份应当只写链接
    let mut metadata = abfstim::doctest_utils::demo_metadata();
    metadata.dac_channels[1].epochs = metadata.dac_channels[0].epochs.clone();
    metadata.dac_channels[1].analog_waveform_enabled = true;
    metadata.dac_channels[1].waveform_source_code = 1;

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let mut ctx = EncodeContext::new();
    let group = protocol.encode(&mut ctx).unwrap();

    let dac1_epochs = group
        .child("dac_channels")
        .unwrap()
        .child("dac1")
        .unwrap()
        .child("epochs")
        .unwrap();

    // 共享的子对象以 link 属性表示，不重复落盘
    for epoch_group in &dac1_epochs.children {
        match epoch_group.attributes.get("link") {
            Some(AttrValue::Str(path)) => {
                assert!(path.starts_with("dac_channels/dac0/epochs/"));
                assert!(epoch_group.attributes.len() == 1);
            }
            other => panic!("Expected link attribute, got {:?}", other),
        }
    }

    // 链接解码后与原值相等
    let restored = Protocol::decode(&group).unwrap();
    assert_eq!(protocol, restored);
    assert_eq!(
        restored.outputs()[0].epochs,
        restored.outputs()[1].epochs
    );
}

#[test]
fn test_distinct_epochs_are_not_shared() {
    let protocol = demo_protocol();
    let mut ctx = EncodeContext::new();
    let group = protocol.encode(&mut ctx).unwrap();

    let dac0_epochs = group
        .child("dac_channels")
        .unwrap()
        .child("dac0")
        .unwrap()
        .child("epochs")
        .unwrap();

    // 互不相同的 epoch 全部完整落盘
    for epoch_group in &dac0_epochs.children {
        assert!(epoch_group.attributes.get("link").is_none());
        assert!(epoch_group.attributes.contains_key("type_code"));
    }
}

#[test]
fn test_digital_words_round_trip() {
    let mut metadata = abfstim::doctest_utils::demo_metadata();
    metadata.dac_channels[0].epochs[1].main_step_word = 0b0101;
    metadata.dac_channels[0].epochs[1].main_train_word = 0b1010;

    let protocol = Protocol::from_metadata(&metadata).unwrap();
    let mut ctx = EncodeContext::new();
    let group = protocol.encode(&mut ctx).unwrap();
    let restored = Protocol::decode(&group).unwrap();

    let original = &protocol.outputs()[0].epochs[1];
    let decoded = &restored.outputs()[0].epochs[1];
    assert_eq!(original.main_pattern, decoded.main_pattern);
    assert_eq!(original.main_pattern.to_raw_words(), (0b0101, 0b1010));
}

#[test]
fn test_metadata_json_round_trip() {
    let metadata = abfstim::doctest_utils::demo_metadata();
    let json = metadata.to_json_string().unwrap();
    let restored = StimulusMetadata::from_json_str(&json).unwrap();
    assert_eq!(metadata, restored);

    // 解析后的协议也一致
    let a = Protocol::from_metadata(&metadata).unwrap();
    let b = Protocol::from_metadata(&restored).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_malformed_group_is_rejected() {
    let protocol = demo_protocol();
    let mut ctx = EncodeContext::new();
    let mut group = protocol.encode(&mut ctx).unwrap();

    // 缺属性
    group.attributes.remove("sweep_count");
    assert!(Protocol::decode(&group).is_err());

    // 属性类型不对
    let mut group = protocol.encode(&mut EncodeContext::new()).unwrap();
    group.set("sweep_count", AttrValue::Str("six".to_string()));
    assert!(Protocol::decode(&group).is_err());

    // 缺子组
    let mut group = protocol.encode(&mut EncodeContext::new()).unwrap();
    group.children.retain(|c| c.name != "dac_channels");
    assert!(Protocol::decode(&group).is_err());
}
