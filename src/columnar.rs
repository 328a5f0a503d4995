//! Parquet files for the tables that are usually handed on to data tooling
//! (combined charts, credits) and for track ID inputs produced by it.
//!
//! Tables are built from strings, so column types are inferred on write: a
//! column whose non-empty values all parse as integers becomes `Int64`,
//! everything else `Utf8`. Empty values are stored as nulls.

use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, Int64Array, StringArray},
    compute::cast,
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use parquet::arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder};

use crate::error::StateError;

/// Writes string rows as a Parquet file, replacing any existing file.
pub fn write_parquet(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<(), StateError> {
    if headers.is_empty() {
        return Err(StateError::CriticalError(format!(
            "cannot write '{}' without columns",
            path.display()
        )));
    }

    let mut fields = Vec::with_capacity(headers.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(headers.len());
    for (i, name) in headers.iter().enumerate() {
        let values: Vec<Option<&str>> = rows
            .iter()
            .map(|row| row.get(i).map(String::as_str).filter(|v| !v.is_empty()))
            .collect();

        match integer_column(&values) {
            Some(ints) => {
                fields.push(Field::new(name.as_str(), DataType::Int64, true));
                columns.push(Arc::new(Int64Array::from(ints)));
            }
            None => {
                fields.push(Field::new(name.as_str(), DataType::Utf8, true));
                columns.push(Arc::new(StringArray::from(values)));
            }
        }
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)?;

    let tmp = crate::output::part_path(path);
    {
        let file = File::create(&tmp)?;
        let mut writer = ArrowWriter::try_new(file, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads `columns` of a Parquet file as strings, row by row. Nulls become
/// empty strings.
pub fn read_parquet_rows(path: &Path, columns: &[&str]) -> Result<Vec<Vec<String>>, StateError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    for column in columns {
        if builder.schema().column_with_name(column).is_none() {
            return Err(StateError::CriticalError(format!(
                "'{}' has no '{}' column",
                path.display(),
                column
            )));
        }
    }

    let mut rows = Vec::new();
    for batch in builder.build()? {
        let batch = batch?;
        let mut strings = Vec::with_capacity(columns.len());
        for column in columns {
            let array = batch.column_by_name(column).ok_or_else(|| {
                StateError::CriticalError(format!("batch has no '{}' column", column))
            })?;
            strings.push(cast(array, &DataType::Utf8)?);
        }

        let strings: Vec<&StringArray> = strings
            .iter()
            .map(|array| {
                array.as_any().downcast_ref::<StringArray>().ok_or_else(|| {
                    StateError::CriticalError("column could not be read as text".to_string())
                })
            })
            .collect::<Result<_, _>>()?;

        for i in 0..batch.num_rows() {
            rows.push(
                strings
                    .iter()
                    .map(|array| {
                        if array.is_null(i) {
                            String::new()
                        } else {
                            array.value(i).to_string()
                        }
                    })
                    .collect(),
            );
        }
    }
    Ok(rows)
}

fn integer_column(values: &[Option<&str>]) -> Option<Vec<Option<i64>>> {
    if values.iter().all(Option::is_none) {
        return None;
    }
    values
        .iter()
        .map(|value| match value {
            Some(v) => v.parse::<i64>().ok().map(Some),
            None => Some(None),
        })
        .collect()
}
