use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde::Serialize;

use crate::preprocess::{SegmentRecord, SegmentStats};

/// One CSV row: one view of one eye-role of one segment.
#[derive(Debug, Serialize)]
struct Row<'a> {
    segment: &'a str,
    start: f64,
    end: f64,
    role: String,
    view: &'static str,
    mean: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    percent: f64,
    sample_count: usize,
}

impl<'a> Row<'a> {
    fn new(record: &'a SegmentRecord, role: String, view: &'static str, stats: &SegmentStats) -> Self {
        Self {
            segment: &record.segment.name,
            start: record.segment.start,
            end: record.segment.end,
            role,
            view,
            mean: stats.mean_diameter,
            min: stats.min_diameter,
            max: stats.max_diameter,
            percent: stats.percent,
            sample_count: stats.sample_count,
        }
    }
}

/// Write segment statistics as a flat table, two rows per segment and role.
pub fn write_segments_csv<W: std::io::Write>(writer: W, records: &[SegmentRecord]) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for record in records {
        for stats in &record.stats {
            let role = stats.role.to_string();
            out.serialize(Row::new(record, role.clone(), "smooth", &stats.smooth))
                .context("writing CSV row")?;
            out.serialize(Row::new(record, role, "valid", &stats.valid))
                .context("writing CSV row")?;
        }
    }
    out.flush().context("flushing CSV")?;
    Ok(())
}

pub fn export_segments(path: &Path, records: &[SegmentRecord]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_segments_csv(file, records)
}

/// The same table as [`write_segments_csv`], as an Arrow batch for printing.
pub fn segments_batch(records: &[SegmentRecord]) -> Result<RecordBatch> {
    let mut rows = Vec::new();
    for record in records {
        for stats in &record.stats {
            let role = stats.role.to_string();
            rows.push(Row::new(record, role.clone(), "smooth", &stats.smooth));
            rows.push(Row::new(record, role, "valid", &stats.valid));
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("segment", DataType::Utf8, false),
        Field::new("start", DataType::Float64, false),
        Field::new("end", DataType::Float64, false),
        Field::new("role", DataType::Utf8, false),
        Field::new("view", DataType::Utf8, false),
        Field::new("mean", DataType::Float64, true),
        Field::new("min", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
        Field::new("percent", DataType::Float64, false),
        Field::new("sample_count", DataType::UInt64, false),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.segment))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.start))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.end))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.role.as_str()))),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.view))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.mean))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.min))),
        Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.max))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.percent))),
        Arc::new(UInt64Array::from_iter_values(
            rows.iter().map(|r| r.sample_count as u64),
        )),
    ];
    RecordBatch::try_new(schema, columns).context("building segment table")
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use crate::preprocess::{EyeLabel, EyeRole, RoleStats, Segment};

    fn stats(mean: Option<f64>, percent: f64, n: usize) -> SegmentStats {
        SegmentStats {
            mean_diameter: mean,
            min_diameter: mean,
            max_diameter: mean,
            percent,
            sample_count: n,
        }
    }

    #[test]
    fn rows_per_view_with_empty_fields_for_missing() {
        let records = vec![SegmentRecord {
            segment: Segment::new(0.0, 2.5, "baseline"),
            stats: vec![RoleStats {
                role: EyeRole::SingleEye(EyeLabel::Left),
                smooth: stats(Some(4.25), 10.0, 2500),
                valid: stats(None, 0.0, 0),
            }],
        }];
        let mut buf = Vec::new();
        write_segments_csv(&mut buf, &records).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "segment,start,end,role,view,mean,min,max,percent,sample_count"
        );
        assert_eq!(lines[1], "baseline,0.0,2.5,l,smooth,4.25,4.25,4.25,10.0,2500");
        assert_eq!(lines[2], "baseline,0.0,2.5,l,valid,,,,0.0,0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn batch_has_one_row_per_view() {
        let records = vec![SegmentRecord {
            segment: Segment::new(1.0, 2.0, "task"),
            stats: vec![
                RoleStats {
                    role: EyeRole::SingleEye(EyeLabel::Left),
                    smooth: stats(Some(4.0), 0.0, 10),
                    valid: stats(Some(4.0), 100.0, 5),
                },
                RoleStats {
                    role: EyeRole::Combined,
                    smooth: stats(None, 100.0, 10),
                    valid: stats(None, 0.0, 0),
                },
            ],
        }];
        let batch = segments_batch(&records).unwrap();
        assert_eq!(batch.num_rows(), 4);
        assert_eq!(batch.num_columns(), 10);
        let mean = batch
            .column_by_name("mean")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(mean.null_count(), 2);
    }
}
