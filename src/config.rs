//! YAML rule-set configuration, grounded in the teacher's
//! `config::SynthConfig`: `serde`/`serde_yaml` deserialization plus an
//! explicit `validate` pass, loaded with `anyhow`-style context.
//!
//! This is a genuine supplement over spec.md: the source program only ever
//! built rules through an in-process C builder API. A standalone router
//! binary needs a way to load a rule set from disk, and YAML is how the
//! teacher's analogous program (and the closely related `mtrack` MIDI
//! player) configures themselves.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::EventType;
use crate::rule::Rule;

/// Top-level router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    pub devices: DeviceConfig,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl RouterConfig {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let config: RouterConfig = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Inverted windows (`min > max`) are a legal, intentional feature
    /// (spec.md §3) and are never rejected here; only literals that cannot
    /// describe a well-formed window at all are.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (idx, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|msg| ConfigError::Invalid(format!("rule {idx}: {msg}")))?;
        }
        Ok(())
    }

    /// Build the `Rule`s this configuration describes, in file order (the
    /// first rule in the file is added first and therefore ends up evaluated
    /// last, since `add_rule` prepends — see spec.md §4.1).
    pub fn build_rules(&self) -> Vec<Rule> {
        self.rules.iter().map(RuleConfig::to_rule).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    pub midi_in: String,
    #[serde(default)]
    pub midi_out: Option<String>,
    /// Channel capacity bound used by the channel affine transform
    /// (spec.md §4.2.d). Defaults to the standard 16-channel single cable.
    #[serde(default = "default_channels")]
    pub channels: u32,
}

fn default_channels() -> u32 {
    16
}

/// One rule, as written in YAML. Field names mirror the rule-builder
/// surface from spec.md §6 (`set_chan`, `set_param1`, `set_param2`,
/// `set_type`, `set_newtype`, `set_custom`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleConfig {
    #[serde(rename = "type", default)]
    pub rule_type: Option<EventTypeName>,
    #[serde(default)]
    pub newtype: Option<EventTypeName>,

    #[serde(default)]
    pub chan: WindowConfig,
    #[serde(default)]
    pub param1: WindowConfig,
    #[serde(default)]
    pub param2: WindowConfig,

    #[serde(default)]
    pub custom: Option<u32>,
}

impl RuleConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, window) in [("chan", &self.chan), ("param1", &self.param1), ("param2", &self.param2)] {
            if !window.mul.is_finite() {
                return Err(format!("{name}.mul must be finite"));
            }
        }
        Ok(())
    }

    fn to_rule(&self) -> Rule {
        let mut rule = Rule::new()
            .set_chan(self.chan.min, self.chan.max, self.chan.mul, self.chan.add)
            .set_param1(self.param1.min, self.param1.max, self.param1.mul, self.param1.add)
            .set_param2(self.param2.min, self.param2.max, self.param2.mul, self.param2.add);
        if let Some(t) = self.rule_type {
            rule = rule.set_type(t.into());
        }
        if let Some(t) = self.newtype {
            rule = rule.set_newtype(t.into());
        }
        if let Some(id) = self.custom {
            rule = rule.set_custom(id);
        }
        rule
    }
}

/// A match/transform window, as written in YAML. Defaults match the
/// in-memory `Window` defaults from spec.md §3.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct WindowConfig {
    #[serde(default = "default_min")]
    pub min: i64,
    #[serde(default = "default_max")]
    pub max: i64,
    #[serde(default = "default_mul")]
    pub mul: f64,
    #[serde(default)]
    pub add: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
            mul: default_mul(),
            add: 0,
        }
    }
}

fn default_min() -> i64 {
    0
}
fn default_max() -> i64 {
    999_999
}
fn default_mul() -> f64 {
    1.0
}

/// Case-insensitive YAML spelling of the spec.md §6 event type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTypeName {
    NoteOn,
    NoteOff,
    KeyPressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchBend,
    Sysex,
    MidiStart,
    MidiContinue,
    MidiStop,
    MidiSync,
    MidiSystemReset,
}

impl From<EventTypeName> for EventType {
    fn from(name: EventTypeName) -> Self {
        match name {
            EventTypeName::NoteOn => EventType::NoteOn,
            EventTypeName::NoteOff => EventType::NoteOff,
            EventTypeName::KeyPressure => EventType::KeyPressure,
            EventTypeName::ControlChange => EventType::ControlChange,
            EventTypeName::ProgramChange => EventType::ProgramChange,
            EventTypeName::ChannelPressure => EventType::ChannelPressure,
            EventTypeName::PitchBend => EventType::PitchBend,
            EventTypeName::Sysex => EventType::Sysex,
            EventTypeName::MidiStart => EventType::MidiStart,
            EventTypeName::MidiContinue => EventType::MidiContinue,
            EventTypeName::MidiStop => EventType::MidiStop,
            EventTypeName::MidiSync => EventType::MidiSync,
            EventTypeName::MidiSystemReset => EventType::MidiSystemReset,
        }
    }
}
