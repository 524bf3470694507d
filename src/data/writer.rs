use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{
    Array, BinaryArray, Int32Array, ListArray, ListBuilder, UInt32Array, UInt32Builder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::info;
use ndarray::{Array4, Axis};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::{Deserialize, Serialize};

use super::model::{CrimeGrid, SlotKey};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Write a grid.  Dispatch by extension (`.parquet`/`.pq` or `.json`).
pub fn write_grid(grid: &CrimeGrid, path: &Path) -> Result<()> {
    match extension(path).as_str() {
        "parquet" | "pq" => write_parquet(grid, path)?,
        "json" => write_json(grid, path)?,
        other => bail!("Unsupported output extension: .{other}"),
    }
    info!("wrote {} frames to {}", grid.len(), path.display());
    Ok(())
}

/// Read a grid written by [`write_grid`].
pub fn read_grid(path: &Path) -> Result<CrimeGrid> {
    let grid = match extension(path).as_str() {
        "parquet" | "pq" => read_parquet(path)?,
        "json" => read_json(path)?,
        other => bail!("Unsupported grid extension: .{other}"),
    };
    info!(
        "read {} frames of shape {:?} from {}",
        grid.len(),
        &grid.data().shape()[1..],
        path.display()
    );
    Ok(grid)
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Parquet layout
// ---------------------------------------------------------------------------
//
// One row per (frame, flow):
//   timestamp: Binary        – the `YYYYMMDDSS` key
//   flow:      Int32         – channel index
//   counts:    List<UInt32>  – row-major height × width histogram
//
// Grid height and width are kept in the schema metadata.

const META_HEIGHT: &str = "crime_grid.height";
const META_WIDTH: &str = "crime_grid.width";

fn grid_schema(height: usize, width: usize) -> Schema {
    let metadata = HashMap::from([
        (META_HEIGHT.to_string(), height.to_string()),
        (META_WIDTH.to_string(), width.to_string()),
    ]);
    Schema::new_with_metadata(
        vec![
            Field::new("timestamp", DataType::Binary, false),
            Field::new("flow", DataType::Int32, false),
            Field::new(
                "counts",
                DataType::List(Arc::new(Field::new("item", DataType::UInt32, true))),
                false,
            ),
        ],
        metadata,
    )
}

fn write_parquet(grid: &CrimeGrid, path: &Path) -> Result<()> {
    let schema = Arc::new(grid_schema(grid.height(), grid.width()));

    let mut keys: Vec<&[u8]> = Vec::with_capacity(grid.len() * grid.nb_flow());
    let mut flows: Vec<i32> = Vec::with_capacity(keys.capacity());
    let mut counts = ListBuilder::new(UInt32Builder::new());

    for (key, frame) in grid.timestamps().iter().zip(grid.data().axis_iter(Axis(0))) {
        for (flow, hist) in frame.axis_iter(Axis(0)).enumerate() {
            keys.push(key.as_bytes());
            flows.push(i32::try_from(flow).context("flow index overflows Int32")?);
            // `iter` walks in logical (row-major) order.
            counts.values().append_slice(&hist.iter().copied().collect::<Vec<u32>>());
            counts.append(true);
        }
    }

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(BinaryArray::from_vec(keys)),
            Arc::new(Int32Array::from(flows)),
            Arc::new(counts.finish()),
        ],
    )
    .context("building grid record batch")?;

    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing grid batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn metadata_dim(schema: &Schema, key: &str) -> Result<usize> {
    schema
        .metadata()
        .get(key)
        .with_context(|| format!("grid file missing '{key}' metadata"))?
        .parse()
        .with_context(|| format!("grid metadata '{key}' is not a number"))
}

fn read_parquet(path: &Path) -> Result<CrimeGrid> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let schema = builder.schema().clone();
    let height = metadata_dim(&schema, META_HEIGHT)?;
    let width = metadata_dim(&schema, META_WIDTH)?;
    let reader = builder.build().context("building parquet reader")?;

    // key → flow → histogram
    let mut frames: BTreeMap<SlotKey, BTreeMap<usize, Vec<u32>>> = BTreeMap::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let keys = batch
            .column(0)
            .as_any()
            .downcast_ref::<BinaryArray>()
            .context("expected Binary 'timestamp' column")?;
        let flows = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32 'flow' column")?;
        let counts = batch
            .column(2)
            .as_any()
            .downcast_ref::<ListArray>()
            .context("expected List 'counts' column")?;

        for row in 0..batch.num_rows() {
            let key = SlotKey::from_bytes(keys.value(row))?;
            let flow = usize::try_from(flows.value(row))
                .with_context(|| format!("row {row}: negative flow index"))?;
            let values = counts.value(row);
            let values = values
                .as_any()
                .downcast_ref::<UInt32Array>()
                .context("expected UInt32 counts")?;
            if values.len() != height * width {
                bail!(
                    "row {row}: expected {} counts for a {height}x{width} grid, got {}",
                    height * width,
                    values.len()
                );
            }
            let previous = frames
                .entry(key)
                .or_default()
                .insert(flow, values.values().to_vec());
            if previous.is_some() {
                bail!("row {row}: duplicate counts for frame {key}, flow {flow}");
            }
        }
    }

    let nb_flow = frames
        .values()
        .filter_map(|f| f.keys().next_back())
        .max()
        .map_or(0, |&max| max + 1);

    let mut data = Array4::<u32>::zeros((frames.len(), nb_flow, height, width));
    for (i, (key, flows)) in frames.iter().enumerate() {
        if flows.len() != nb_flow {
            bail!("frame {key} has {} of {nb_flow} flows", flows.len());
        }
        for (&flow, values) in flows {
            for (cell, &v) in data
                .slice_mut(ndarray::s![i, flow, .., ..])
                .iter_mut()
                .zip(values)
            {
                *cell = v;
            }
        }
    }

    Ok(CrimeGrid::new(data, frames.into_keys().collect())?)
}

// ---------------------------------------------------------------------------
// JSON layout
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct GridJson {
    /// `[slots, flows, height, width]`
    shape: Vec<usize>,
    timestamps: Vec<SlotKey>,
    /// Row-major counts.
    data: Vec<u32>,
}

fn write_json(grid: &CrimeGrid, path: &Path) -> Result<()> {
    let doc = GridJson {
        shape: grid.data().shape().to_vec(),
        timestamps: grid.timestamps().to_vec(),
        data: grid.data().iter().copied().collect(),
    };
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), &doc).context("writing grid JSON")?;
    Ok(())
}

fn read_json(path: &Path) -> Result<CrimeGrid> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let doc: GridJson =
        serde_json::from_reader(BufReader::new(file)).context("parsing grid JSON")?;
    let [n, f, h, w] = doc.shape[..] else {
        bail!("grid shape must have 4 dimensions, got {:?}", doc.shape);
    };
    let data = Array4::from_shape_vec((n, f, h, w), doc.data)
        .context("grid data does not match shape")?;
    Ok(CrimeGrid::new(data, doc.timestamps)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;

    fn sample_grid() -> CrimeGrid {
        let mut data = Array4::<u32>::zeros((3, 2, 4, 3));
        for mut frame in data.outer_iter_mut() {
            for mut flow in frame.outer_iter_mut() {
                for (i, v) in flow.iter_mut().enumerate() {
                    *v = (i % 7) as u32;
                }
            }
        }
        let keys: Vec<SlotKey> = ["2018110101", "2018110102", "2018110224"]
            .iter()
            .map(|k| k.parse().unwrap())
            .collect();
        CrimeGrid::new(data, keys).unwrap()
    }

    #[test]
    fn parquet_round_trip_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.parquet");
        let grid = sample_grid();

        write_grid(&grid, &path).unwrap();
        let back = read_grid(&path).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn json_round_trip_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        let grid = sample_grid();

        write_grid(&grid, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"2018110224\""));
        assert_eq!(read_grid(&path).unwrap(), grid);
    }

    #[test]
    fn unsupported_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_grid(&sample_grid(), &dir.path().join("grid.npy")).is_err());
        assert!(read_grid(&dir.path().join("grid.npy")).is_err());
    }

    #[test]
    fn json_with_bad_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        std::fs::write(&path, r#"{"shape":[1,1,2],"timestamps":["2018110101"],"data":[0,0]}"#)
            .unwrap();
        assert!(read_grid(&path).is_err());
    }

    #[test]
    fn json_with_divergent_flows_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.json");
        std::fs::write(
            &path,
            r#"{"shape":[1,2,1,2],"timestamps":["2018110101"],"data":[5,0,0,9]}"#,
        )
        .unwrap();
        let err = read_grid(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GridError>(),
            Some(GridError::DivergentFlows(0))
        ));
    }

    #[test]
    fn parquet_with_duplicate_rows_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.parquet");
        let schema = Arc::new(grid_schema(1, 2));
        let mut counts = ListBuilder::new(UInt32Builder::new());
        for values in [[1u32, 2], [3, 4]] {
            counts.values().append_slice(&values);
            counts.append(true);
        }
        let key = b"2018110101".as_slice();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(BinaryArray::from_vec(vec![key, key])),
                Arc::new(Int32Array::from(vec![0, 0])),
                Arc::new(counts.finish()),
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = read_grid(&path).unwrap_err();
        assert!(err.to_string().contains("duplicate counts"));
    }
}
