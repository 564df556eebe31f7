//! Device-wide configuration, built once and injected into [`crate::Device`].

use nine_gpu::UploadAllocatorDesc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown configuration key `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// `upload.initial_size`: bytes in the first upload ring buffer.
    pub upload_initial_size: u64,
    /// `upload.alignment`: power of two >= 4; also the constant-buffer binding alignment.
    pub upload_alignment: u64,
    /// `upload.deferred_destroy`: keep replaced ring buffers until explicitly retired.
    pub upload_deferred_destroy: bool,
    /// `pipeline_cache.capacity`: maximum cached pipelines, `0` for unbounded.
    pub pipeline_cache_capacity: usize,
    /// `debug.validate`: extra argument validation on draw entry points.
    pub validate: bool,
    /// `resolve.early_pipeline_on_map`: allow [`crate::Device::prepare_for_map`] to build the
    /// pipeline early.
    pub early_pipeline_on_map: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            upload_initial_size: 1024 * 1024,
            upload_alignment: 256,
            upload_deferred_destroy: true,
            pipeline_cache_capacity: 4096,
            validate: cfg!(debug_assertions),
            early_pipeline_on_map: true,
        }
    }
}

const ENV_KEYS: &[(&str, &str)] = &[
    ("NINE_UPLOAD_INITIAL_SIZE", "upload.initial_size"),
    ("NINE_UPLOAD_ALIGNMENT", "upload.alignment"),
    ("NINE_UPLOAD_DEFERRED_DESTROY", "upload.deferred_destroy"),
    ("NINE_PIPELINE_CACHE_CAPACITY", "pipeline_cache.capacity"),
    ("NINE_DEBUG_VALIDATE", "debug.validate"),
    ("NINE_EARLY_PIPELINE_ON_MAP", "resolve.early_pipeline_on_map"),
];

impl DeviceConfig {
    /// Build a configuration from `key = value` pairs applied over the defaults.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Build a configuration from `NINE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for &(var, key) in ENV_KEYS {
            if let Ok(value) = std::env::var(var) {
                config.set(key, &value)?;
            }
        }
        Ok(config)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        };
        match key.trim() {
            "upload.initial_size" => {
                self.upload_initial_size = parse_u64(value).filter(|&v| v > 0).ok_or_else(invalid)?
            }
            "upload.alignment" => {
                self.upload_alignment = parse_u64(value)
                    .filter(|&v| v >= 4 && v.is_power_of_two())
                    .ok_or_else(invalid)?
            }
            "upload.deferred_destroy" => {
                self.upload_deferred_destroy = parse_bool(value).ok_or_else(invalid)?
            }
            "pipeline_cache.capacity" => {
                self.pipeline_cache_capacity = parse_u64(value)
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(invalid)?
            }
            "debug.validate" => self.validate = parse_bool(value).ok_or_else(invalid)?,
            "resolve.early_pipeline_on_map" => {
                self.early_pipeline_on_map = parse_bool(value).ok_or_else(invalid)?
            }
            other => return Err(ConfigError::UnknownKey(other.to_owned())),
        }
        Ok(())
    }

    pub fn upload_desc(&self) -> UploadAllocatorDesc {
        UploadAllocatorDesc {
            initial_size: self.upload_initial_size,
            alignment: self.upload_alignment,
            deferred_destroy: self.upload_deferred_destroy,
            ..Default::default()
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    let v = raw.trim();
    if v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
    {
        Some(true)
    } else if v == "0"
        || v.eq_ignore_ascii_case("false")
        || v.eq_ignore_ascii_case("no")
        || v.eq_ignore_ascii_case("off")
    {
        Some(false)
    } else {
        None
    }
}

fn parse_u64(raw: &str) -> Option<u64> {
    let v = raw.trim();
    match v.strip_prefix("0x").or_else(|| v.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => v.parse().ok(),
    }
}
