use crate::bodies::BodyId;
use std::fmt;

#[derive(Debug)]
pub enum SonificationError {
    Config(ConfigError),
    Voice(VoiceFault),
    System(SystemFault),
}

/// Invalid body parameters or settings. Fatal only at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyTable,
    DuplicateBody { name: String },
    InvalidEccentricity { body: String, value: f64 },
    NonPositiveDistance { body: String, model: &'static str, value: f64 },
    InvalidSetting { field: &'static str, reason: String },
    Parse(String),
}

/// The audio operation a voice fault happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceOp {
    Create,
    Release,
    Update,
}

/// A single voice's start/stop/update failed.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceFault {
    pub body: BodyId,
    pub op: VoiceOp,
    pub reason: String,
}

/// The audio graph as a whole could not be (re)built.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemFault {
    pub reason: String,
}

impl VoiceFault {
    pub fn new(body: BodyId, op: VoiceOp, reason: impl Into<String>) -> Self {
        VoiceFault {
            body,
            op,
            reason: reason.into(),
        }
    }
}

impl SystemFault {
    pub fn new(reason: impl Into<String>) -> Self {
        SystemFault {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SonificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SonificationError::Config(e) => write!(f, "Config error: {e}"),
            SonificationError::Voice(e) => write!(f, "Voice fault: {e}"),
            SonificationError::System(e) => write!(f, "System fault: {e}"),
        }
    }
}

impl std::error::Error for SonificationError {}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyTable => write!(f, "Body table is empty"),
            ConfigError::DuplicateBody { name } => write!(f, "Duplicate body '{name}'"),
            ConfigError::InvalidEccentricity { body, value } => {
                write!(f, "Eccentricity {value} of '{body}' is outside [0, 1)")
            }
            ConfigError::NonPositiveDistance { body, model, value } => {
                write!(f, "Mean distance {value} of '{body}' ({model} model) must be > 0")
            }
            ConfigError::InvalidSetting { field, reason } => write!(f, "Invalid {field}: {reason}"),
            ConfigError::Parse(msg) => write!(f, "Could not parse config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl fmt::Display for VoiceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VoiceOp::Create => "create",
            VoiceOp::Release => "release",
            VoiceOp::Update => "update",
        };
        f.write_str(name)
    }
}

impl fmt::Display for VoiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of voice {} failed: {}", self.op, self.body, self.reason)
    }
}

impl std::error::Error for VoiceFault {}

impl fmt::Display for SystemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audio graph rebuild failed: {}", self.reason)
    }
}

impl std::error::Error for SystemFault {}

impl From<ConfigError> for SonificationError {
    fn from(e: ConfigError) -> Self {
        SonificationError::Config(e)
    }
}

impl From<VoiceFault> for SonificationError {
    fn from(e: VoiceFault) -> Self {
        SonificationError::Voice(e)
    }
}

impl From<SystemFault> for SonificationError {
    fn from(e: SystemFault) -> Self {
        SonificationError::System(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}
