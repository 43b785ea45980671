use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::channel::{InputConfig, OutputConfig};
use crate::epoch::Epoch;
use crate::error::{AbfError, Result};
use crate::metadata::{AdcMetadata, DacMetadata, EpochMetadata, GlobalMetadata, ProtocolSource};
use crate::protocol::Protocol;
use crate::utils::seconds_to_samples;

/// One attribute value of a persisted group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    BoolList(Vec<bool>),
    IntList(Vec<i64>),
}

/// Node of the hierarchical persistence container
///
/// A `Group` is the HDF5-style group/attributes analogue this crate
/// persists protocols into: scalar fields live in `attributes`, owned
/// sub-objects are child groups. No byte layout is mandated; the tree
/// round-trips through JSON and any other serde backend.
///
/// # Examples
///
/// ```rust
/// use abfstim::persist::EncodeContext;
/// use abfstim::Protocol;
///
/// let metadata = abfstim::doctest_utils::demo_metadata();
/// let protocol = Protocol::from_metadata(&metadata)?;
///
/// let mut ctx = EncodeContext::new();
/// let group = protocol.encode(&mut ctx)?;
/// let json = group.to_json_string()?;
///
/// let restored = Protocol::decode(&abfstim::persist::Group::from_json_str(&json)?)?;
/// assert_eq!(protocol, restored);
/// # Ok::<(), abfstim::AbfError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub attributes: BTreeMap<String, AttrValue>,
    pub children: Vec<Group>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Group {
            name: name.to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: AttrValue) {
        self.attributes.insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Result<&AttrValue> {
        self.attributes.get(key).ok_or_else(|| {
            AbfError::MalformedRecord(format!(
                "Group '{}' is missing attribute '{}'",
                self.name, key
            ))
        })
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            AttrValue::Bool(v) => Ok(*v),
            other => Err(self.type_error(key, "bool", other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.get(key)? {
            AttrValue::Int(v) => Ok(*v),
            other => Err(self.type_error(key, "int", other)),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        let value = self.get_int(key)?;
        usize::try_from(value).map_err(|_| {
            AbfError::MalformedRecord(format!(
                "Group '{}' attribute '{}' is negative ({})",
                self.name, key, value
            ))
        })
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        match self.get(key)? {
            AttrValue::Float(v) => Ok(*v),
            other => Err(self.type_error(key, "float", other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            AttrValue::Str(v) => Ok(v),
            other => Err(self.type_error(key, "string", other)),
        }
    }

    pub fn get_bool_list(&self, key: &str) -> Result<Vec<bool>> {
        match self.get(key)? {
            AttrValue::BoolList(v) => Ok(v.clone()),
            other => Err(self.type_error(key, "bool list", other)),
        }
    }

    fn type_error(&self, key: &str, expected: &str, got: &AttrValue) -> AbfError {
        AbfError::MalformedRecord(format!(
            "Group '{}' attribute '{}' should be {}, found {:?}",
            self.name, key, expected, got
        ))
    }

    pub fn child(&self, name: &str) -> Result<&Group> {
        self.children.iter().find(|c| c.name == name).ok_or_else(|| {
            AbfError::MalformedRecord(format!(
                "Group '{}' is missing child group '{}'",
                self.name, name
            ))
        })
    }

    /// 按 "a/b/c" 路径从本组向下查找
    pub fn resolve_path(&self, path: &str) -> Result<&Group> {
        let mut current = self;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current.child(segment)?;
        }
        Ok(current)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Deduplication state of one encode call tree
///
/// Maps the content fingerprint of an already-emitted sub-object to the
/// path it was emitted at, so a structurally identical sub-object under the
/// same aggregate becomes a link instead of a copy. Always supplied by the
/// caller; there is no module-level cache.
#[derive(Debug, Default)]
pub struct EncodeContext {
    seen: HashMap<String, String>,
}

impl EncodeContext {
    pub fn new() -> Self {
        EncodeContext::default()
    }
}

const LINK_ATTR: &str = "link";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";

impl Protocol {
    /// Encodes this protocol into a persistence group tree
    ///
    /// Child groups hold the channel lists; each DAC group holds its epoch
    /// list. A sub-object already emitted under this protocol is referenced
    /// by a link attribute instead of being duplicated.
    pub fn encode(&self, ctx: &mut EncodeContext) -> Result<Group> {
        let mut root = Group::new("protocol");

        root.set("format_version_major", AttrValue::Int(2));
        root.set("adc_count", AttrValue::Int(self.adc_count as i64));
        root.set("dac_count", AttrValue::Int(self.dac_count as i64));
        root.set(
            "digital_output_count",
            AttrValue::Int(self.digital_output_count as i64),
        );
        root.set(
            "active_dac_index",
            AttrValue::Int(self.active_dac_index() as i64),
        );
        root.set(
            "alternate_analog_outputs",
            AttrValue::Bool(self.alternate_analog_outputs),
        );
        root.set(
            "alternate_digital_outputs",
            AttrValue::Bool(self.alternate_digital_outputs),
        );
        root.set(
            "digital_train_active_high",
            AttrValue::Bool(self.digital_train_active_high),
        );
        root.set(
            "digital_holding",
            AttrValue::BoolList(self.digital_holding.clone()),
        );
        root.set(
            "acquisition_mode",
            AttrValue::Int(self.acquisition_mode.code() as i64),
        );
        root.set("sweep_count", AttrValue::Int(self.sweep_count as i64));
        root.set("run_count", AttrValue::Int(self.run_count as i64));
        root.set("trial_count", AttrValue::Int(self.trial_count as i64));
        root.set(
            "samples_per_sweep",
            AttrValue::Int(self.samples_per_sweep as i64),
        );
        root.set(
            "total_sample_count",
            AttrValue::Int(self.total_sample_count as i64),
        );
        root.set("sampling_rate", AttrValue::Float(self.sampling_rate));
        root.set(
            "averaging_mode",
            AttrValue::Int(self.averaging_mode.code() as i64),
        );
        root.set(
            "averaging_weight",
            AttrValue::Int(self.averaging_weight as i64),
        );
        root.set("file_guid", AttrValue::Str(self.source.file_guid.clone()));
        root.set(
            "protocol_path",
            AttrValue::Str(self.source.protocol_path.clone()),
        );
        if let Some(date) = self.source.recording_start_date {
            root.set(
                "recording_start_date",
                AttrValue::Str(date.format(DATE_FORMAT).to_string()),
            );
        }
        if let Some(time) = self.source.recording_start_time {
            root.set(
                "recording_start_time",
                AttrValue::Str(time.format(TIME_FORMAT).to_string()),
            );
        }

        let mut adc_group = Group::new("adc_channels");
        for input in self.inputs() {
            adc_group.children.push(encode_input_config(input));
        }
        root.children.push(adc_group);

        let mut dac_group = Group::new("dac_channels");
        for output in self.outputs() {
            let prefix = format!("dac_channels/dac{}", output.logical_index);
            dac_group
                .children
                .push(encode_output_config(output, self.sampling_rate, ctx, &prefix)?);
        }
        root.children.push(dac_group);

        Ok(root)
    }

    /// Decodes a protocol from a persistence group tree
    ///
    /// The group tree acts as a [`ProtocolSource`], so decoding shares the
    /// construction and validation path of [`Protocol::from_metadata`].
    pub fn decode(group: &Group) -> Result<Protocol> {
        Protocol::from_source(group)
    }
}

/// Encodes one ADC channel
pub fn encode_input_config(config: &InputConfig) -> Group {
    let mut group = Group::new(&format!("adc{}", config.logical_index));
    group.set(
        "physical_index",
        AttrValue::Int(config.physical_index as i64),
    );
    group.set("logical_index", AttrValue::Int(config.logical_index as i64));
    group.set("name", AttrValue::Str(config.name.clone()));
    group.set("units", AttrValue::Str(config.units.clone()));
    group
}

/// Decodes one ADC channel
pub fn decode_input_config(group: &Group) -> Result<InputConfig> {
    let units = group.get_str("units")?.to_string();
    Ok(InputConfig {
        physical_index: group.get_usize("physical_index")?,
        logical_index: group.get_usize("logical_index")?,
        name: group.get_str("name")?.to_string(),
        unit_kind: crate::utils::parse_unit_kind(&units),
        units,
    })
}

/// Encodes one DAC channel with its epoch list
pub fn encode_output_config(
    config: &OutputConfig,
    sampling_rate: f64,
    ctx: &mut EncodeContext,
    path_prefix: &str,
) -> Result<Group> {
    let mut group = Group::new(&format!("dac{}", config.logical_index));
    group.set(
        "physical_index",
        AttrValue::Int(config.physical_index as i64),
    );
    group.set("logical_index", AttrValue::Int(config.logical_index as i64));
    group.set("name", AttrValue::Str(config.name.clone()));
    group.set("units", AttrValue::Str(config.units.clone()));
    group.set("holding_level", AttrValue::Float(config.holding_level));
    group.set("return_to_hold", AttrValue::Bool(config.return_to_hold));
    group.set(
        "analog_waveform_enabled",
        AttrValue::Bool(config.analog_waveform_enabled),
    );
    group.set(
        "waveform_source",
        AttrValue::Int(config.waveform_source.code() as i64),
    );

    let mut epochs_group = Group::new("epochs");
    for epoch in &config.epochs {
        let path = format!("{}/epochs/epoch{}", path_prefix, epoch.number);
        epochs_group
            .children
            .push(encode_epoch(epoch, sampling_rate, ctx, &path)?);
    }
    group.children.push(epochs_group);

    Ok(group)
}

/// Decodes one DAC channel
///
/// `root` is the containing protocol group used to resolve epoch links;
/// pass the DAC group itself when decoding a standalone channel that was
/// encoded with a fresh context.
pub fn decode_output_config(
    group: &Group,
    sampling_rate: f64,
    root: &Group,
) -> Result<OutputConfig> {
    let metadata = decode_dac_metadata(group, root)?;
    let logical_index = group.get_usize("logical_index")?;

    let global = synthetic_global(sampling_rate);
    Protocol::build_output_from_parts(&metadata, logical_index, &global)
}

/// Encodes one epoch, deduplicating against the encode context
pub fn encode_epoch(
    epoch: &Epoch,
    sampling_rate: f64,
    ctx: &mut EncodeContext,
    path: &str,
) -> Result<Group> {
    let mut group = Group::new(&format!("epoch{}", epoch.number));
    group.set("number", AttrValue::Int(epoch.number as i64));
    group.set("type_code", AttrValue::Int(epoch.epoch_type.code() as i64));
    group.set("first_level", AttrValue::Float(epoch.first_level));
    group.set("level_delta", AttrValue::Float(epoch.level_delta));
    group.set(
        "first_duration_samples",
        AttrValue::Int(seconds_to_samples(epoch.first_duration, sampling_rate) as i64),
    );
    group.set(
        "duration_delta_samples",
        AttrValue::Int((epoch.duration_delta * sampling_rate).round() as i64),
    );
    group.set(
        "pulse_period_samples",
        AttrValue::Int(seconds_to_samples(epoch.pulse_period, sampling_rate) as i64),
    );
    group.set(
        "pulse_width_samples",
        AttrValue::Int(seconds_to_samples(epoch.pulse_width, sampling_rate) as i64),
    );

    let (main_step, main_train) = epoch.main_pattern.to_raw_words();
    let (alternate_step, alternate_train) = epoch.alternate_pattern.to_raw_words();
    group.set("main_step_word", AttrValue::Int(main_step as i64));
    group.set("main_train_word", AttrValue::Int(main_train as i64));
    group.set("alternate_step_word", AttrValue::Int(alternate_step as i64));
    group.set(
        "alternate_train_word",
        AttrValue::Int(alternate_train as i64),
    );
    group.set(
        "alternate_dig_out_state",
        AttrValue::Bool(epoch.alternate_dig_out_state),
    );

    // 相同内容的 epoch 在同一聚合下只落盘一次，其余写链接
    let fingerprint = serde_json::to_string(&group)?;
    if let Some(existing) = ctx.seen.get(&fingerprint) {
        let mut link = Group::new(&group.name);
        link.set(LINK_ATTR, AttrValue::Str(existing.clone()));
        return Ok(link);
    }
    ctx.seen.insert(fingerprint, path.to_string());

    Ok(group)
}

/// Decodes one epoch, following a link attribute if present
pub fn decode_epoch(group: &Group, sampling_rate: f64, root: &Group) -> Result<Epoch> {
    let metadata = decode_epoch_metadata(group, root)?;
    let number = resolve_linked(group, root)?.get_usize("number")?;

    let global = synthetic_global(sampling_rate);
    Protocol::build_epoch_from_parts(&metadata, number, &global)
}

fn resolve_linked<'a>(group: &'a Group, root: &'a Group) -> Result<&'a Group> {
    match group.attributes.get(LINK_ATTR) {
        Some(AttrValue::Str(path)) => root.resolve_path(path),
        Some(other) => Err(AbfError::MalformedRecord(format!(
            "Group '{}' link attribute should be a path string, found {:?}",
            group.name, other
        ))),
        None => Ok(group),
    }
}

fn decode_epoch_metadata(group: &Group, root: &Group) -> Result<EpochMetadata> {
    let group = resolve_linked(group, root)?;

    let word = |key: &str| -> Result<u16> {
        let value = group.get_int(key)?;
        u16::try_from(value).map_err(|_| {
            AbfError::MalformedRecord(format!(
                "Group '{}' attribute '{}' does not fit a raw digital word ({})",
                group.name, key, value
            ))
        })
    };

    Ok(EpochMetadata {
        type_code: group.get_int("type_code")? as i32,
        first_level: group.get_float("first_level")?,
        level_delta: group.get_float("level_delta")?,
        first_duration_samples: group.get_int("first_duration_samples")?,
        duration_delta_samples: group.get_int("duration_delta_samples")?,
        pulse_period_samples: group.get_int("pulse_period_samples")?,
        pulse_width_samples: group.get_int("pulse_width_samples")?,
        main_step_word: word("main_step_word")?,
        main_train_word: word("main_train_word")?,
        alternate_step_word: word("alternate_step_word")?,
        alternate_train_word: word("alternate_train_word")?,
        alternate_dig_out_state: group.get_bool("alternate_dig_out_state")?,
    })
}

fn decode_adc_metadata(group: &Group) -> Result<AdcMetadata> {
    Ok(AdcMetadata {
        physical_index: group.get_usize("physical_index")?,
        name: group.get_str("name")?.to_string(),
        units: group.get_str("units")?.to_string(),
    })
}

fn decode_dac_metadata(group: &Group, root: &Group) -> Result<DacMetadata> {
    let mut epochs = Vec::new();
    for child in &group.child("epochs")?.children {
        epochs.push(decode_epoch_metadata(child, root)?);
    }

    Ok(DacMetadata {
        physical_index: group.get_usize("physical_index")?,
        name: group.get_str("name")?.to_string(),
        units: group.get_str("units")?.to_string(),
        holding_level: group.get_float("holding_level")?,
        return_to_hold: group.get_bool("return_to_hold")?,
        analog_waveform_enabled: group.get_bool("analog_waveform_enabled")?,
        waveform_source_code: group.get_int("waveform_source")? as i32,
        epochs,
    })
}

/// Minimal global block for decoding standalone channel/epoch groups
fn synthetic_global(sampling_rate: f64) -> GlobalMetadata {
    GlobalMetadata {
        format_version_major: 2,
        adc_count: 0,
        dac_count: 0,
        digital_output_count: 8,
        active_dac_index: 0,
        alternate_analog_outputs: false,
        alternate_digital_outputs: false,
        digital_train_active_high: true,
        digital_holding: vec![false; 8],
        acquisition_mode_code: 5,
        sweep_count: 1,
        run_count: 1,
        trial_count: 1,
        samples_per_sweep: 0,
        total_sample_count: 0,
        sampling_rate,
        averaging_mode_code: 0,
        averaging_weight: 0,
        file_guid: String::new(),
        protocol_path: String::new(),
        recording_start_date: None,
        recording_start_time: None,
    }
}

impl ProtocolSource for Group {
    fn global(&self) -> Result<GlobalMetadata> {
        let recording_start_date = match self.attributes.get("recording_start_date") {
            Some(AttrValue::Str(text)) => {
                Some(NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|e| {
                    AbfError::MalformedRecord(format!("Bad recording start date '{}': {}", text, e))
                })?)
            }
            _ => None,
        };
        let recording_start_time = match self.attributes.get("recording_start_time") {
            Some(AttrValue::Str(text)) => {
                Some(NaiveTime::parse_from_str(text, TIME_FORMAT).map_err(|e| {
                    AbfError::MalformedRecord(format!("Bad recording start time '{}': {}", text, e))
                })?)
            }
            _ => None,
        };

        Ok(GlobalMetadata {
            format_version_major: self.get_int("format_version_major")? as i32,
            adc_count: self.get_usize("adc_count")?,
            dac_count: self.get_usize("dac_count")?,
            digital_output_count: self.get_usize("digital_output_count")?,
            active_dac_index: self.get_usize("active_dac_index")?,
            alternate_analog_outputs: self.get_bool("alternate_analog_outputs")?,
            alternate_digital_outputs: self.get_bool("alternate_digital_outputs")?,
            digital_train_active_high: self.get_bool("digital_train_active_high")?,
            digital_holding: self.get_bool_list("digital_holding")?,
            acquisition_mode_code: self.get_int("acquisition_mode")? as i32,
            sweep_count: self.get_usize("sweep_count")?,
            run_count: self.get_usize("run_count")?,
            trial_count: self.get_usize("trial_count")?,
            samples_per_sweep: self.get_usize("samples_per_sweep")?,
            total_sample_count: self.get_usize("total_sample_count")?,
            sampling_rate: self.get_float("sampling_rate")?,
            averaging_mode_code: self.get_int("averaging_mode")? as i32,
            averaging_weight: self.get_int("averaging_weight")? as u32,
            file_guid: self.get_str("file_guid")?.to_string(),
            protocol_path: self.get_str("protocol_path")?.to_string(),
            recording_start_date,
            recording_start_time,
        })
    }

    fn adc_channels(&self) -> Result<Vec<AdcMetadata>> {
        self.child("adc_channels")?
            .children
            .iter()
            .map(decode_adc_metadata)
            .collect()
    }

    fn dac_channels(&self) -> Result<Vec<DacMetadata>> {
        self.child("dac_channels")?
            .children
            .iter()
            .map(|dac| decode_dac_metadata(dac, self))
            .collect()
    }
}
