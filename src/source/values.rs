//! Row materialization from Arrow columns into [`Record`]s.

use arrow_array::cast::AsArray;
use arrow_array::types::{
    Date32Type, Date64Type, Decimal128Type, Decimal256Type, Float16Type, Float32Type,
    Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type,
    UInt16Type, UInt32Type, UInt64Type,
};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{DataType, TimeUnit};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::FeatureError;
use crate::record::{Record, RecordValue};

/// Materializes row `row` of `batch`, one entry per column in schema order.
pub fn row_record(batch: &RecordBatch, row: usize) -> Result<Record, FeatureError> {
    let schema = batch.schema();
    let mut record = Record::with_capacity(schema.fields().len());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        let value = array_value(column.as_ref(), row, field.name())?;
        record.insert(field.name().as_str(), value);
    }
    Ok(record)
}

fn array_value(array: &dyn Array, row: usize, column: &str) -> Result<RecordValue, FeatureError> {
    if array.is_null(row) {
        return Ok(RecordValue::Null);
    }

    let value = match array.data_type() {
        DataType::Null => RecordValue::Null,
        DataType::Boolean => RecordValue::Bool(array.as_boolean().value(row)),

        DataType::Int8 => RecordValue::Int(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => RecordValue::Int(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => RecordValue::Int(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => RecordValue::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => RecordValue::UInt(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => {
            RecordValue::UInt(array.as_primitive::<UInt16Type>().value(row).into())
        }
        DataType::UInt32 => {
            RecordValue::UInt(array.as_primitive::<UInt32Type>().value(row).into())
        }
        DataType::UInt64 => RecordValue::UInt(array.as_primitive::<UInt64Type>().value(row)),

        DataType::Float16 => {
            RecordValue::Float(array.as_primitive::<Float16Type>().value(row).to_f64())
        }
        DataType::Float32 => {
            RecordValue::Float(array.as_primitive::<Float32Type>().value(row).into())
        }
        DataType::Float64 => RecordValue::Float(array.as_primitive::<Float64Type>().value(row)),

        DataType::Utf8 => RecordValue::String(array.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => {
            RecordValue::String(array.as_string::<i64>().value(row).to_string())
        }
        DataType::Utf8View => RecordValue::String(array.as_string_view().value(row).to_string()),

        DataType::Binary => RecordValue::Binary(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => {
            RecordValue::Binary(array.as_binary::<i64>().value(row).to_vec())
        }
        DataType::BinaryView => RecordValue::Binary(array.as_binary_view().value(row).to_vec()),
        DataType::FixedSizeBinary(_) => {
            RecordValue::Binary(array.as_fixed_size_binary().value(row).to_vec())
        }

        DataType::List(_) => list_value(array.as_list::<i32>().value(row).as_ref(), column)?,
        DataType::LargeList(_) => {
            list_value(array.as_list::<i64>().value(row).as_ref(), column)?
        }
        DataType::FixedSizeList(_, _) => {
            list_value(array.as_fixed_size_list().value(row).as_ref(), column)?
        }

        DataType::Struct(_) => {
            let array = array.as_struct();
            let mut record = Record::with_capacity(array.num_columns());
            for (field, child) in array.fields().iter().zip(array.columns()) {
                record.insert(
                    field.name().as_str(),
                    array_value(child.as_ref(), row, column)?,
                );
            }
            RecordValue::Map(record)
        }

        DataType::Map(_, _) => {
            let entries = array.as_map().value(row);
            let keys = entries.column(0);
            let values = entries.column(1);
            let mut record = Record::with_capacity(entries.len());
            for index in 0..entries.len() {
                let key = map_key(array_value(keys.as_ref(), index, column)?);
                record.insert(key, array_value(values.as_ref(), index, column)?);
            }
            RecordValue::Map(record)
        }

        DataType::Dictionary(_, _) => {
            let dictionary = array.as_any_dictionary();
            match dictionary_key(dictionary.keys(), row) {
                Some(key) => array_value(dictionary.values().as_ref(), key, column)?,
                None => RecordValue::Null,
            }
        }

        DataType::Timestamp(unit, _) => {
            let nanos = match unit {
                TimeUnit::Second => {
                    i128::from(array.as_primitive::<TimestampSecondType>().value(row))
                        * 1_000_000_000
                }
                TimeUnit::Millisecond => {
                    i128::from(array.as_primitive::<TimestampMillisecondType>().value(row))
                        * 1_000_000
                }
                TimeUnit::Microsecond => {
                    i128::from(array.as_primitive::<TimestampMicrosecondType>().value(row))
                        * 1_000
                }
                TimeUnit::Nanosecond => {
                    i128::from(array.as_primitive::<TimestampNanosecondType>().value(row))
                }
            };
            format_timestamp_nanos(nanos).map_or(RecordValue::Null, RecordValue::String)
        }
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row);
            OffsetDateTime::UNIX_EPOCH
                .checked_add(Duration::days(days.into()))
                .map_or(RecordValue::Null, |dt| RecordValue::String(dt.date().to_string()))
        }
        DataType::Date64 => {
            let millis = array.as_primitive::<Date64Type>().value(row);
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .map_or(RecordValue::Null, |dt| RecordValue::String(dt.date().to_string()))
        }

        DataType::Decimal128(_, _) => RecordValue::String(
            array.as_primitive::<Decimal128Type>().value_as_string(row),
        ),
        DataType::Decimal256(_, _) => RecordValue::String(
            array.as_primitive::<Decimal256Type>().value_as_string(row),
        ),

        other => {
            return Err(FeatureError::UnsupportedType {
                column: column.to_string(),
                data_type: other.clone(),
            });
        }
    };

    Ok(value)
}

fn list_value(values: &dyn Array, column: &str) -> Result<RecordValue, FeatureError> {
    let items = (0..values.len())
        .map(|index| array_value(values, index, column))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RecordValue::List(items))
}

fn map_key(key: RecordValue) -> String {
    match key {
        RecordValue::String(key) => key,
        other => other.into_json().to_string(),
    }
}

fn dictionary_key(keys: &dyn Array, row: usize) -> Option<usize> {
    if keys.is_null(row) {
        return None;
    }
    match keys.data_type() {
        DataType::Int8 => usize::try_from(keys.as_primitive::<Int8Type>().value(row)).ok(),
        DataType::Int16 => usize::try_from(keys.as_primitive::<Int16Type>().value(row)).ok(),
        DataType::Int32 => usize::try_from(keys.as_primitive::<Int32Type>().value(row)).ok(),
        DataType::Int64 => usize::try_from(keys.as_primitive::<Int64Type>().value(row)).ok(),
        DataType::UInt8 => Some(usize::from(keys.as_primitive::<UInt8Type>().value(row))),
        DataType::UInt16 => Some(usize::from(keys.as_primitive::<UInt16Type>().value(row))),
        DataType::UInt32 => usize::try_from(keys.as_primitive::<UInt32Type>().value(row)).ok(),
        DataType::UInt64 => usize::try_from(keys.as_primitive::<UInt64Type>().value(row)).ok(),
        _ => None,
    }
}

fn format_timestamp_nanos(nanos: i128) -> Option<String> {
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?;
    dt.format(&Rfc3339).ok()
}
