//! Sample data types for raster output

use num_traits::{Bounded, NumCast};
use std::fmt::Debug;

/// Numeric type of the samples written to an output raster.
///
/// The engine always computes in `f64`. Conversion to the target type
/// happens once, when a sink persists its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    U8,
    U16,
    I16,
    I32,
    U32,
    F32,
    #[default]
    F64,
}

impl DataType {
    /// Parse a data type name such as `"f32"` or `"uint8"`
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "u8" | "uint8" | "byte" => Some(DataType::U8),
            "u16" | "uint16" => Some(DataType::U16),
            "i16" | "int16" => Some(DataType::I16),
            "i32" | "int32" => Some(DataType::I32),
            "u32" | "uint32" => Some(DataType::U32),
            "f32" | "float32" => Some(DataType::F32),
            "f64" | "float64" => Some(DataType::F64),
            _ => None,
        }
    }

    /// Whether this type stores floating point samples
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }
}

/// Trait for types a sink can persist samples as.
pub trait RasterElement:
    Copy + Debug + PartialOrd + NumCast + Bounded + Send + Sync + 'static
{
    /// The matching [`DataType`] tag
    const DATA_TYPE: DataType;

    /// Convert an engine value, saturating at the type bounds.
    ///
    /// NaN maps to zero for integer types.
    fn from_f64(value: f64) -> Self {
        if let Some(v) = NumCast::from(value) {
            return v;
        }
        if value.is_nan() {
            return NumCast::from(0u8).unwrap_or_else(Self::min_value);
        }
        if value > 0.0 {
            Self::max_value()
        } else {
            Self::min_value()
        }
    }
}

macro_rules! impl_raster_element {
    ($t:ty, $dt:expr) => {
        impl RasterElement for $t {
            const DATA_TYPE: DataType = $dt;
        }
    };
}

impl_raster_element!(u8, DataType::U8);
impl_raster_element!(u16, DataType::U16);
impl_raster_element!(i16, DataType::I16);
impl_raster_element!(i32, DataType::I32);
impl_raster_element!(u32, DataType::U32);
impl_raster_element!(f32, DataType::F32);
impl_raster_element!(f64, DataType::F64);

/// Convert engine values into a target element type
pub fn convert_samples<'a, T: RasterElement>(values: impl IntoIterator<Item = &'a f64>) -> Vec<T> {
    values.into_iter().map(|&v| T::from_f64(v)).collect()
}
