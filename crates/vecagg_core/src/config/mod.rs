use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use vecagg_error::{DbError, Result};

use crate::arrays::scalar::ScalarValue;

/// Default row-batch capacity.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Default number of directory slots for a fresh hash table.
pub const DEFAULT_HASH_TABLE_CAPACITY: usize = 512;

/// Configuration read once when an aggregate operator is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Fixed capacity of every batch the operator allocates.
    pub batch_size: usize,
    /// Initial directory size for each grouping set hash table. Rounded up to
    /// a power of two.
    pub hash_table_initial_capacity: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            hash_table_initial_capacity: DEFAULT_HASH_TABLE_CAPACITY,
        }
    }
}

impl ExecutionConfig {
    pub fn set_from_scalar(&mut self, name: &str, value: &ScalarValue) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_scalar(&self, name: &str) -> Result<ScalarValue> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let default = Self::default().get_as_scalar(name)?;
        self.set_from_scalar(name, &default)
    }
}

struct SettingFunctions {
    set: fn(scalar: &ScalarValue, conf: &mut ExecutionConfig) -> Result<()>,
    get: fn(conf: &ExecutionConfig) -> ScalarValue,
}

impl SettingFunctions {
    const fn new<S: ExecutionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_scalar as _,
            get: S::get_as_scalar as _,
        }
    }
}

fn insert_setting<S: ExecutionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<BatchSize>(&mut map);
    insert_setting::<HashTableInitialCapacity>(&mut map);

    map
});

pub trait ExecutionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_scalar(scalar: &ScalarValue, conf: &mut ExecutionConfig) -> Result<()>;
    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue;
}

fn positive_usize(scalar: &ScalarValue, name: &str) -> Result<usize> {
    let val = scalar.try_as_usize()?;
    if val == 0 {
        return Err(DbError::new(format!("'{name}' must be greater than zero")));
    }
    Ok(val)
}

pub struct BatchSize;

impl ExecutionSetting for BatchSize {
    const NAME: &'static str = "batch_size";
    const DESCRIPTION: &'static str = "Number of row slots in each batch";

    fn set_from_scalar(scalar: &ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.batch_size = positive_usize(scalar, Self::NAME)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        ScalarValue::Int64(conf.batch_size as i64)
    }
}

pub struct HashTableInitialCapacity;

impl ExecutionSetting for HashTableInitialCapacity {
    const NAME: &'static str = "hash_table_initial_capacity";
    const DESCRIPTION: &'static str = "Initial directory size for aggregate hash tables";

    fn set_from_scalar(scalar: &ScalarValue, conf: &mut ExecutionConfig) -> Result<()> {
        conf.hash_table_initial_capacity = positive_usize(scalar, Self::NAME)?;
        Ok(())
    }

    fn get_as_scalar(conf: &ExecutionConfig) -> ScalarValue {
        ScalarValue::Int64(conf.hash_table_initial_capacity as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_by_name() {
        let mut conf = ExecutionConfig::default();
        conf.set_from_scalar("batch_size", &ScalarValue::Int64(16))
            .unwrap();
        assert_eq!(16, conf.batch_size);
        assert_eq!(
            ScalarValue::Int64(16),
            conf.get_as_scalar("batch_size").unwrap()
        );

        conf.reset("batch_size").unwrap();
        assert_eq!(DEFAULT_BATCH_SIZE, conf.batch_size);
    }

    #[test]
    fn rejects_unknown_and_zero() {
        let mut conf = ExecutionConfig::default();
        conf.set_from_scalar("no_such_setting", &ScalarValue::Int64(1))
            .unwrap_err();
        conf.set_from_scalar("batch_size", &ScalarValue::Int64(0))
            .unwrap_err();
        conf.set_from_scalar("batch_size", &ScalarValue::Int64(-3))
            .unwrap_err();
    }

    #[test]
    fn deserialize_partial() {
        let conf: ExecutionConfig = serde_json::from_str(r#"{"batch_size": 8}"#).unwrap();
        assert_eq!(8, conf.batch_size);
        assert_eq!(
            DEFAULT_HASH_TABLE_CAPACITY,
            conf.hash_table_initial_capacity
        );
    }
}
