use std::path::Path;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::IncidentRecord;
use crate::config::ColumnNames;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load incident records from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row; only the configured columns are read
/// * `.parquet` – string or timestamp column for the time, numeric columns for
///   the coordinates
///
/// Rows with a missing value in any of the four columns are dropped, as are
/// rows whose values do not parse.
pub fn load_incidents(path: &Path, columns: &ColumnNames) -> Result<Vec<IncidentRecord>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let (records, stats) = match ext.as_str() {
        "csv" => load_csv(path, columns)?,
        "parquet" | "pq" => load_parquet(path, columns)?,
        other => bail!("Unsupported file extension: .{other}"),
    };

    info!(
        "loaded {} incidents from {} ({} rows with missing values, {} unparsable)",
        records.len(),
        path.display(),
        stats.missing,
        stats.unparsable
    );
    Ok(records)
}

#[derive(Debug, Default)]
struct DropStats {
    missing: usize,
    unparsable: usize,
}

/// Cell values read as missing, following pandas' default `na_values`.
/// Matching is exact; surrounding whitespace makes a cell non-missing.
const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(cell: Option<&str>) -> bool {
    cell.map_or(true, |c| NA_VALUES.contains(&c))
}

/// Turn four raw cells into a record, counting why a row was dropped.
fn build_record(
    row: usize,
    cells: [Option<&str>; 4],
    stats: &mut DropStats,
) -> Option<IncidentRecord> {
    if cells.iter().any(|c| is_missing(*c)) {
        stats.missing += 1;
        return None;
    }
    let [ts, category, lat, lon] = cells.map(|c| c.unwrap_or(""));
    let (ts, lat, lon) = (ts.trim(), lat.trim(), lon.trim());

    let parsed = parse_timestamp(ts).and_then(|timestamp| {
        Some(IncidentRecord {
            timestamp,
            category: category.to_string(),
            latitude: parse_coordinate(lat)?,
            longitude: parse_coordinate(lon)?,
        })
    });
    if parsed.is_none() {
        debug!("row {row}: dropping unparsable values ({ts:?}, {lat:?}, {lon:?})");
        stats.unparsable += 1;
    }
    parsed
}

fn parse_coordinate(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse the timestamp layouts seen in incident exports.  A bare date means
/// midnight.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn load_csv(path: &Path, columns: &ColumnNames) -> Result<(Vec<IncidentRecord>, DropStats)> {
    // Short rows leave their trailing cells missing instead of failing the load.
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .context("opening CSV")?;
    let headers = reader.headers().context("reading CSV headers")?.clone();

    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("CSV missing '{name}' column"))
    };
    let idx = [
        position(&columns.timestamp)?,
        position(&columns.category)?,
        position(&columns.latitude)?,
        position(&columns.longitude)?,
    ];

    let mut records = Vec::new();
    let mut stats = DropStats::default();

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let cells = idx.map(|i| record.get(i));
        if let Some(rec) = build_record(row_no, cells, &mut stats) {
            records.push(rec);
        }
    }

    Ok((records, stats))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Every selected column is cast to UTF-8 so the same row logic applies to
/// both formats.  Timestamp columns cast to ISO-8601 with a `T` separator,
/// which [`parse_timestamp`] accepts.
fn load_parquet(path: &Path, columns: &ColumnNames) -> Result<(Vec<IncidentRecord>, DropStats)> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let names = [
        columns.timestamp.as_str(),
        columns.category.as_str(),
        columns.latitude.as_str(),
        columns.longitude.as_str(),
    ];

    let mut records = Vec::new();
    let mut stats = DropStats::default();
    let mut offset = 0;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let mut text_cols: Vec<ArrayRef> = Vec::with_capacity(names.len());
        for name in names {
            let idx = schema
                .index_of(name)
                .map_err(|_| anyhow::anyhow!("Parquet file missing '{name}' column"))?;
            text_cols.push(column_as_text(batch.column(idx), name)?);
        }
        let text: Vec<&StringArray> = text_cols
            .iter()
            .map(|c| c.as_any().downcast_ref::<StringArray>().context("expected StringArray"))
            .collect::<Result<_>>()?;

        for row in 0..batch.num_rows() {
            let cells = [
                cell(text[0], row),
                cell(text[1], row),
                cell(text[2], row),
                cell(text[3], row),
            ];
            if let Some(rec) = build_record(offset + row, cells, &mut stats) {
                records.push(rec);
            }
        }
        offset += batch.num_rows();
    }

    Ok((records, stats))
}

fn cell(col: &StringArray, row: usize) -> Option<&str> {
    (!col.is_null(row)).then(|| col.value(row))
}

fn column_as_text(col: &ArrayRef, name: &str) -> Result<ArrayRef> {
    match col.data_type() {
        DataType::Float64 => {
            // Format floats ourselves so NaN stays recognisable as missing.
            let arr = col
                .as_any()
                .downcast_ref::<Float64Array>()
                .context("expected Float64Array")?;
            let text: StringArray = arr.iter().map(|v| v.map(|f| f.to_string())).collect();
            Ok(std::sync::Arc::new(text))
        }
        other => cast(col, &DataType::Utf8)
            .with_context(|| format!("column '{name}' of type {other:?} is not readable as text")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    const HEADER: &str =
        "id,data_hora_inclusao,natureza_descricao,numero_latitude,numero_longitude,extra";

    fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "{HEADER}").unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn csv_reads_selected_columns() {
        let file = write_csv(&[
            "1,2018-11-01 00:15:00,FURTO,-23.55,-46.63,x",
            "2,2018-11-01 01:20:00,ROUBO,-23.56,-46.64,y",
        ]);
        let records = load_incidents(file.path(), &ColumnNames::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].category, "FURTO");
        assert_eq!(records[1].latitude, -23.56);
        assert_eq!(
            records[1].timestamp,
            NaiveDateTime::parse_from_str("2018-11-01 01:20:00", "%Y-%m-%d %H:%M:%S").unwrap()
        );
    }

    #[test]
    fn csv_drops_missing_and_unparsable_rows() {
        let file = write_csv(&[
            "1,2018-11-01 00:15:00,FURTO,-23.55,-46.63,x",
            "2,2018-11-01 01:20:00,,-23.56,-46.64,y",
            "3,2018-11-01 01:20:00,ROUBO,NaN,-46.64,y",
            "4,not a date,ROUBO,-23.56,-46.64,y",
            "5,2018-11-01 02:00:00,ROUBO,abc,-46.64,y",
            "6,2018-11-01 03:00:00,ROUBO,-23.57,-46.65,",
        ]);
        let records = load_incidents(file.path(), &ColumnNames::default()).unwrap();
        let cats: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        // The empty `extra` cell of row 6 is not a selected column.
        assert_eq!(cats, vec!["FURTO", "ROUBO"]);
    }

    #[test]
    fn csv_short_rows_are_dropped() {
        let file = write_csv(&[
            "1,2018-11-01 00:15:00,FURTO,-23.55,-46.63,x",
            "2,2018-11-01 00:20:00,FURTO,-23.55",
            "3,2018-11-01 01:20:00,ROUBO,-23.56,-46.64,y",
        ]);
        let records = load_incidents(file.path(), &ColumnNames::default()).unwrap();
        let cats: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(cats, vec!["FURTO", "ROUBO"]);
    }

    #[test]
    fn na_tokens_match_exactly() {
        for token in ["-1.#IND", "1.#IND", "-1.#QNAN", "1.#QNAN", "NULL", ""] {
            assert!(is_missing(Some(token)), "{token:?}");
        }
        assert!(is_missing(None));
        assert!(!is_missing(Some("   ")));
        assert!(!is_missing(Some(" NaN")));
    }

    #[test]
    fn blank_category_is_kept() {
        let file = write_csv(&["1,2018-11-01 00:15:00,  ,-23.55,-46.63,x"]);
        let records = load_incidents(file.path(), &ColumnNames::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "  ");
    }

    #[test]
    fn csv_missing_column_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "data_hora_inclusao,numero_latitude").unwrap();
        let err = load_incidents(file.path(), &ColumnNames::default()).unwrap_err();
        assert!(err.to_string().contains("natureza_descricao"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        assert!(load_incidents(file.path(), &ColumnNames::default()).is_err());
    }

    #[test]
    fn timestamp_layouts() {
        let expected =
            NaiveDateTime::parse_from_str("2018-11-01 07:05:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(parse_timestamp("2018-11-01 07:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2018-11-01 07:05:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2018-11-01T07:05:00"), Some(expected));
        assert_eq!(parse_timestamp("2018-11-01 07:05"), Some(expected));
        assert_eq!(
            parse_timestamp("2018-11-01").map(|t| t.to_string()),
            Some("2018-11-01 00:00:00".to_string())
        );
        assert_eq!(parse_timestamp("01/11/2018"), None);
    }

    #[test]
    fn parquet_reads_typed_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("data_hora_inclusao", DataType::Utf8, true),
            Field::new("natureza_descricao", DataType::Utf8, true),
            Field::new("numero_latitude", DataType::Float64, true),
            Field::new("numero_longitude", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![
                    Some("2018-11-01 00:15:00"),
                    Some("2018-11-01 01:15:00"),
                    None,
                ])),
                Arc::new(StringArray::from(vec![Some("FURTO"), Some("ROUBO"), Some("ROUBO")])),
                Arc::new(Float64Array::from(vec![Some(-23.5), Some(f64::NAN), Some(-23.6)])),
                Arc::new(Float64Array::from(vec![Some(-46.6), Some(-46.7), Some(-46.8)])),
            ],
        )
        .unwrap();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let records = load_incidents(file.path(), &ColumnNames::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].category, "FURTO");
        assert_eq!(records[0].latitude, -23.5);
        assert_eq!(records[0].longitude, -46.6);
    }
}
