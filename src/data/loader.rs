use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, Float64Array, Float64Builder, LargeListArray, ListArray, ListBuilder,
    StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde_json::Value as JsonValue;

use super::model::{ChannelRecord, Session};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a session from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` / `.pq` – one row per channel (recommended for long recordings)
/// * `.json`            – `{ "channels": [ ... ] }` or a bare channel array
pub fn load_session(path: &Path) -> Result<Session> {
    let session = match extension(path).as_str() {
        "parquet" | "pq" => load_parquet(path)?,
        "json" => load_json(path)?,
        other => bail!("Unsupported file extension: .{other}"),
    };
    info!("loaded {} channel(s) from {}", session.channels.len(), path.display());
    Ok(session)
}

/// Write a session to a file, choosing the format from the extension.
pub fn save_session(path: &Path, session: &Session) -> Result<()> {
    match extension(path).as_str() {
        "parquet" | "pq" => save_parquet(path, session)?,
        "json" => save_json(path, session)?,
        other => bail!("Unsupported file extension: .{other}"),
    }
    info!("wrote {} channel(s) to {}", session.channels.len(), path.display());
    Ok(())
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Expected JSON schema:
///
/// ```json
/// {
///   "channels": [
///     {
///       "chantype": "pupil_l",
///       "sampleRate": 500.0,
///       "unit": "mm",
///       "values": [3.1, 3.2, null, ...]
///     }
///   ]
/// }
/// ```
fn load_json(path: &Path) -> Result<Session> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let session = if root.is_array() {
        Session {
            channels: serde_json::from_value(root).context("parsing channel array")?,
        }
    } else {
        serde_json::from_value(root).context("parsing session object")?
    };
    Ok(session)
}

fn save_json(path: &Path, session: &Session) -> Result<()> {
    let text = serde_json::to_string_pretty(session).context("serializing session")?;
    std::fs::write(path, text).context("writing JSON file")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Expected schema:
/// - `chantype`: Utf8
/// - `sample_rate`: Float64
/// - `unit`: Utf8
/// - `values`: List<Float64> or LargeList<Float64>, nulls are missing samples
/// - `header` (optional): Utf8 holding JSON text
fn load_parquet(path: &Path) -> Result<Session> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut channels = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;

        let chantype = string_column(&batch, "chantype")?;
        let unit = string_column(&batch, "unit")?;
        let header = batch
            .column_by_name("header")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>());
        let rate = batch
            .column_by_name("sample_rate")
            .context("Parquet file missing 'sample_rate' column")?
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("'sample_rate' must be Float64")?;
        let values_col = batch
            .column_by_name("values")
            .context("Parquet file missing 'values' column")?;

        for row in 0..batch.num_rows() {
            let values = extract_f64_list(values_col, row)
                .with_context(|| format!("Row {row}: failed to read 'values'"))?;
            let header = match header {
                Some(col) if !col.is_null(row) => Some(
                    serde_json::from_str(col.value(row))
                        .with_context(|| format!("Row {row}: header is not valid JSON"))?,
                ),
                _ => None,
            };

            channels.push(ChannelRecord {
                chantype: chantype.value(row).to_string(),
                sample_rate: rate.value(row),
                unit: unit.value(row).to_string(),
                values,
                header,
            });
        }
    }

    Ok(Session { channels })
}

fn save_parquet(path: &Path, session: &Session) -> Result<()> {
    let item = Arc::new(Field::new("item", DataType::Float64, true));
    let schema = Arc::new(Schema::new(vec![
        Field::new("chantype", DataType::Utf8, false),
        Field::new("sample_rate", DataType::Float64, false),
        Field::new("unit", DataType::Utf8, false),
        Field::new("values", DataType::List(item), false),
        Field::new("header", DataType::Utf8, true),
    ]));

    let mut values_builder = ListBuilder::new(Float64Builder::new());
    for channel in &session.channels {
        let values = values_builder.values();
        for &v in &channel.values {
            values.append_option(v);
        }
        values_builder.append(true);
    }

    let chantypes: Vec<&str> = session.channels.iter().map(|c| c.chantype.as_str()).collect();
    let rates: Vec<f64> = session.channels.iter().map(|c| c.sample_rate).collect();
    let units: Vec<&str> = session.channels.iter().map(|c| c.unit.as_str()).collect();
    let headers: Vec<Option<String>> = session
        .channels
        .iter()
        .map(|c| c.header.as_ref().map(|h| h.to_string()))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(chantypes)),
        Arc::new(Float64Array::from(rates)),
        Arc::new(StringArray::from(units)),
        Arc::new(values_builder.finish()),
        Arc::new(StringArray::from(headers)),
    ];
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;

    let file = std::fs::File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

// -- Parquet / Arrow helpers --

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Parquet file missing '{name}' column"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("'{name}' must be a Utf8 column"))
}

/// Extract the values of a List or LargeList column at the given row,
/// keeping nulls as `None`.
fn extract_f64_list(col: &ArrayRef, row: usize) -> Result<Vec<Option<f64>>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    match values_array.as_any().downcast_ref::<Float64Array>() {
        Some(f64_arr) => Ok(f64_arr.iter().collect()),
        None => bail!(
            "List inner type is {:?}, expected Float64",
            values_array.data_type()
        ),
    }
}
