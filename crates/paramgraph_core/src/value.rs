use crate::error::AttributeError;
use serde::{Deserialize, Serialize};

/// The closed set of datatypes an attribute can be declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Real,
    Integer,
    Long,
    Unsigned,
    Boolean,
    Text,
    Axis,
}

impl DataType {
    /// Numeric datatypes may be read by other attributes' expressions.
    pub fn is_observable(self) -> bool {
        !matches!(self, DataType::Text | DataType::Axis)
    }
}

/// Channel a pulse or gradient shape acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PulseAxis {
    #[default]
    Void,
    Rf,
    Gx,
    Gy,
    Gz,
}

impl PulseAxis {
    /// Maps the literal tokens `RF`, `GX`, `GY`, `GZ`; anything else is `Void`.
    pub fn from_token(token: &str) -> Self {
        match token {
            "RF" => PulseAxis::Rf,
            "GX" => PulseAxis::Gx,
            "GY" => PulseAxis::Gy,
            "GZ" => PulseAxis::Gz,
            _ => PulseAxis::Void,
        }
    }
}

/// Tagged payload of an attribute. The variant always matches the
/// attribute's `DataType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Real(f64),
    Integer(i32),
    Long(i64),
    Unsigned(u32),
    Boolean(bool),
    Text(String),
    Axis(PulseAxis),
}

impl Value {
    pub fn default_for(datatype: DataType) -> Self {
        match datatype {
            DataType::Real => Value::Real(0.0),
            DataType::Integer => Value::Integer(0),
            DataType::Long => Value::Long(0),
            DataType::Unsigned => Value::Unsigned(0),
            DataType::Boolean => Value::Boolean(false),
            DataType::Text => Value::Text(String::new()),
            DataType::Axis => Value::Axis(PulseAxis::Void),
        }
    }

    pub fn datatype(&self) -> DataType {
        match self {
            Value::Real(_) => DataType::Real,
            Value::Integer(_) => DataType::Integer,
            Value::Long(_) => DataType::Long,
            Value::Unsigned(_) => DataType::Unsigned,
            Value::Boolean(_) => DataType::Boolean,
            Value::Text(_) => DataType::Text,
            Value::Axis(_) => DataType::Axis,
        }
    }

    /// Numeric view used when feeding subjects to the engine.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(f64::from(*v)),
            Value::Long(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(f64::from(*v)),
            Value::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Text(_) | Value::Axis(_) => None,
        }
    }

    /// Narrows an engine result to `datatype`. Integer targets truncate toward
    /// zero and saturate at their bounds; booleans are `x != 0`.
    pub fn narrowed(datatype: DataType, x: f64) -> Option<Self> {
        match datatype {
            DataType::Real => Some(Value::Real(x)),
            DataType::Integer => Some(Value::Integer(x as i32)),
            DataType::Long => Some(Value::Long(x as i64)),
            DataType::Unsigned => Some(Value::Unsigned(x as u32)),
            DataType::Boolean => Some(Value::Boolean(x != 0.0)),
            DataType::Text | DataType::Axis => None,
        }
    }
}

/// Rust types that can be stored in an attribute.
pub trait AttributeType: Sized {
    const DATATYPE: DataType;

    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! attribute_type {
    ($ty:ty, $variant:ident) => {
        impl AttributeType for $ty {
            const DATATYPE: DataType = DataType::$variant;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

attribute_type!(f64, Real);
attribute_type!(i32, Integer);
attribute_type!(i64, Long);
attribute_type!(u32, Unsigned);
attribute_type!(bool, Boolean);
attribute_type!(String, Text);
attribute_type!(PulseAxis, Axis);

/// Current value of an attribute plus an optional snapshot.
///
/// The datatype is fixed when the store is created; every write is checked
/// against it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueStore {
    value: Value,
    backup: Option<Value>,
}

impl ValueStore {
    pub fn new(datatype: DataType) -> Self {
        Self {
            value: Value::default_for(datatype),
            backup: None,
        }
    }

    pub fn datatype(&self) -> DataType {
        self.value.datatype()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn read<T: AttributeType>(&self) -> Result<T, AttributeError> {
        T::from_value(&self.value).ok_or(AttributeError::TypeMismatch {
            expected: T::DATATYPE,
            found: self.datatype(),
        })
    }

    pub fn write<T: AttributeType>(&mut self, value: T) -> Result<(), AttributeError> {
        self.write_value(value.into_value())
    }

    pub fn write_value(&mut self, value: Value) -> Result<(), AttributeError> {
        if value.datatype() != self.datatype() {
            return Err(AttributeError::TypeMismatch {
                expected: value.datatype(),
                found: self.datatype(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Writes an engine result, narrowing it to the fixed datatype.
    pub fn write_narrowed(&mut self, x: f64) -> Result<(), AttributeError> {
        let value = Value::narrowed(self.datatype(), x).ok_or(AttributeError::TypeMismatch {
            expected: DataType::Real,
            found: self.datatype(),
        })?;
        self.value = value;
        Ok(())
    }

    pub fn numeric(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Snapshots the current value, dropping any earlier snapshot.
    pub fn backup(&mut self) {
        self.backup = Some(self.value.clone());
    }

    /// Reinstates the snapshot. Returns `false` if there is none.
    /// The snapshot is kept so it can be restored again.
    pub fn restore(&mut self) -> bool {
        match &self.backup {
            Some(saved) => {
                self.value = saved.clone();
                true
            }
            None => false,
        }
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    pub fn discard_backup(&mut self) {
        self.backup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_holds_default_of_its_type() {
        assert_eq!(ValueStore::new(DataType::Real).read::<f64>(), Ok(0.0));
        assert_eq!(ValueStore::new(DataType::Boolean).read::<bool>(), Ok(false));
        assert_eq!(
            ValueStore::new(DataType::Axis).read::<PulseAxis>(),
            Ok(PulseAxis::Void)
        );
        assert_eq!(
            ValueStore::new(DataType::Text).read::<String>(),
            Ok(String::new())
        );
    }

    #[test]
    fn mismatched_read_and_write_are_rejected() {
        let mut store = ValueStore::new(DataType::Integer);
        let err = store.write(1.5_f64).expect_err("f64 into integer slot");
        assert_eq!(
            err,
            AttributeError::TypeMismatch {
                expected: DataType::Real,
                found: DataType::Integer
            }
        );
        assert!(store.read::<u32>().is_err());
        assert_eq!(store.read::<i32>(), Ok(0));
    }

    #[test]
    fn restore_reinstates_snapshot_after_writes() {
        let mut store = ValueStore::new(DataType::Text);
        store.write("before".to_string()).expect("write");
        store.backup();
        store.write("after".to_string()).expect("write");
        store.write("again".to_string()).expect("write");
        assert!(store.restore());
        assert_eq!(store.read::<String>(), Ok("before".to_string()));
        assert!(store.has_backup());
        store.discard_backup();
        assert!(!store.restore());
    }

    #[test]
    fn narrowing_truncates_and_saturates() {
        let mut store = ValueStore::new(DataType::Integer);
        store.write_narrowed(-2.9).expect("narrow");
        assert_eq!(store.read::<i32>(), Ok(-2));
        store.write_narrowed(1e12).expect("narrow");
        assert_eq!(store.read::<i32>(), Ok(i32::MAX));

        let mut unsigned = ValueStore::new(DataType::Unsigned);
        unsigned.write_narrowed(-4.0).expect("narrow");
        assert_eq!(unsigned.read::<u32>(), Ok(0));

        let mut flag = ValueStore::new(DataType::Boolean);
        flag.write_narrowed(0.25).expect("narrow");
        assert_eq!(flag.read::<bool>(), Ok(true));

        let mut axis = ValueStore::new(DataType::Axis);
        assert!(axis.write_narrowed(1.0).is_err());
    }

    #[test]
    fn axis_tokens_map_to_channels() {
        assert_eq!(PulseAxis::from_token("GY"), PulseAxis::Gy);
        assert_eq!(PulseAxis::from_token("rf"), PulseAxis::Void);
        assert_eq!(PulseAxis::from_token("bogus"), PulseAxis::Void);
    }
}
