use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SqlPipeError};
use crate::scalar::ScalarValue;

/// Configuration for rendering and traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Upper bound on rows pulled per page by the chunked executor.
    pub chunk_size: usize,
    /// Error on unknown functions instead of passing them through verbatim.
    pub strict_sql: bool,
    /// Always render numeric literals with a decimal point.
    pub strict_numeric: bool,
}

impl Default for SqlConfig {
    fn default() -> Self {
        SqlConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            strict_sql: false,
            strict_numeric: false,
        }
    }
}

impl SqlConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| SqlPipeError::InvalidSetting(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| SqlPipeError::InvalidSetting(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();

        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| SqlPipeError::InvalidSetting(format!("Missing setting for '{name}'")))?;

        let scalar = (func.get)(&def_conf);
        (func.set)(scalar, self)
    }

    /// Check values that bypassed `set_from_scalar`, e.g. deserialized or
    /// built directly.
    pub fn validate(&self) -> Result<()> {
        ChunkSize::validate_value(self.chunk_size)
    }

    pub fn reset_all(&mut self) {
        *self = Self::default();
    }

    /// Name, description, and current value of every setting, sorted by
    /// name.
    pub fn list_settings(&self) -> Vec<(&'static str, &'static str, ScalarValue)> {
        let mut settings: Vec<_> = GET_SET_FUNCTIONS
            .iter()
            .map(|(name, func)| (*name, func.description, (func.get)(self)))
            .collect();
        settings.sort_by_key(|(name, _, _)| *name);
        settings
    }
}

struct SettingFunctions {
    description: &'static str,
    set: fn(scalar: ScalarValue, conf: &mut SqlConfig) -> Result<()>,
    get: fn(conf: &SqlConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: Setting>() -> Self {
        SettingFunctions {
            description: S::DESCRIPTION,
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: Setting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<ChunkSize>(&mut map);
    insert_setting::<StrictSql>(&mut map);
    insert_setting::<StrictNumeric>(&mut map);

    map
});

pub trait Setting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SqlConfig) -> Result<()>;
    fn get_as_scalar(conf: &SqlConfig) -> ScalarValue;
}

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;

const MIN_CHUNK_SIZE: usize = 1;
const MAX_CHUNK_SIZE: usize = 1_000_000;

pub struct ChunkSize;

impl ChunkSize {
    pub fn validate_value(val: usize) -> Result<()> {
        if val < MIN_CHUNK_SIZE {
            return Err(SqlPipeError::InvalidSetting(format!(
                "Chunk size cannot be less than {MIN_CHUNK_SIZE}"
            )));
        }

        if val > MAX_CHUNK_SIZE {
            return Err(SqlPipeError::InvalidSetting(format!(
                "Chunk size cannot be greater than {MAX_CHUNK_SIZE}"
            )));
        }

        Ok(())
    }
}

impl Setting for ChunkSize {
    const NAME: &'static str = "chunk_size";
    const DESCRIPTION: &'static str = "Maximum number of rows fetched per page";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SqlConfig) -> Result<()> {
        let val = scalar.try_as_usize()?;
        Self::validate_value(val)?;

        conf.chunk_size = val;
        Ok(())
    }

    fn get_as_scalar(conf: &SqlConfig) -> ScalarValue {
        conf.chunk_size.into()
    }
}

pub struct StrictSql;

impl Setting for StrictSql {
    const NAME: &'static str = "strict_sql";
    const DESCRIPTION: &'static str = "Error on functions without a known translation";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SqlConfig) -> Result<()> {
        conf.strict_sql = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SqlConfig) -> ScalarValue {
        conf.strict_sql.into()
    }
}

pub struct StrictNumeric;

impl Setting for StrictNumeric {
    const NAME: &'static str = "strict_numeric";
    const DESCRIPTION: &'static str = "Render numeric literals with an explicit decimal point";

    fn set_from_scalar(scalar: ScalarValue, conf: &mut SqlConfig) -> Result<()> {
        conf.strict_numeric = scalar.try_as_bool()?;
        Ok(())
    }

    fn get_as_scalar(conf: &SqlConfig) -> ScalarValue {
        conf.strict_numeric.into()
    }
}
