#![allow(dead_code)]

use arrow_array::{
    ArrayRef, BinaryArray, Float64Array, Int64Array, RecordBatch, StringArray, StructArray,
};
use arrow_schema::{DataType, Field, Fields, Schema};
use geo_types::{Geometry, LineString, Point};
use geozero::{CoordDimensions, ToWkb};
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const GEO_METADATA: &str = r#"{"version":"1.0.0","primary_column":"geom","columns":{"geom":{"encoding":"WKB","geometry_types":[]}}}"#;

pub fn point_wkb(x: f64, y: f64) -> Vec<u8> {
    Geometry::Point(Point::new(x, y))
        .to_wkb(CoordDimensions::xy())
        .unwrap()
}

pub fn line_wkb() -> Vec<u8> {
    Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]))
        .to_wkb(CoordDimensions::xy())
        .unwrap()
}

/// Describes a `places` fixture: one point per row, named `place-{i}`.
pub struct Places {
    pub rows: usize,
    pub geometry_column: &'static str,
    pub geo_metadata: bool,
    /// Rows whose geometry bytes are not valid WKB.
    pub broken: Vec<usize>,
    pub row_group_size: usize,
}

impl Default for Places {
    fn default() -> Self {
        Self {
            rows: 10,
            geometry_column: "geometry",
            geo_metadata: false,
            broken: Vec::new(),
            row_group_size: 1024,
        }
    }
}

impl Places {
    pub fn write(&self, path: &Path) {
        let address_fields = Fields::from(vec![
            Field::new("city", DataType::Utf8, true),
            Field::new("zip", DataType::Int64, true),
        ]);
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("population", DataType::Int64, true),
            Field::new("score", DataType::Float64, false),
            Field::new("address", DataType::Struct(address_fields.clone()), true),
            Field::new(self.geometry_column, DataType::Binary, true),
        ]));

        let names: Vec<String> = (0..self.rows).map(|i| format!("place-{i}")).collect();
        // Every third row has no population
        let population: Vec<Option<i64>> = (0..self.rows)
            .map(|i| (i % 3 != 0).then_some(i as i64 * 100))
            .collect();
        let scores: Vec<f64> = (0..self.rows).map(|i| i as f64 / 2.0).collect();
        let cities: Vec<Option<String>> =
            (0..self.rows).map(|i| Some(format!("city-{}", i % 4))).collect();
        let zips: Vec<Option<i64>> = (0..self.rows).map(|i| Some(1000 + i as i64)).collect();
        let geometries: Vec<Vec<u8>> = (0..self.rows)
            .map(|i| {
                if self.broken.contains(&i) {
                    vec![1, 1, 0, 0, 0]
                } else {
                    point_wkb(i as f64, -(i as f64))
                }
            })
            .collect();

        let address = StructArray::new(
            address_fields,
            vec![
                Arc::new(StringArray::from(cities)) as ArrayRef,
                Arc::new(Int64Array::from(zips)) as ArrayRef,
            ],
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(names)) as ArrayRef,
                Arc::new(Int64Array::from(population)) as ArrayRef,
                Arc::new(Float64Array::from(scores)) as ArrayRef,
                Arc::new(address) as ArrayRef,
                Arc::new(BinaryArray::from_iter_values(geometries.iter())) as ArrayRef,
            ],
        )
        .unwrap();

        let geo = self
            .geo_metadata
            .then(|| vec![KeyValue::new("geo".to_string(), GEO_METADATA.to_string())]);
        let props = WriterProperties::builder()
            .set_max_row_group_size(self.row_group_size)
            .set_key_value_metadata(geo)
            .build();
        let file = File::create(path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, Some(props)).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }
}

/// Writes a single-row file whose geometry is a line and carries a `bbox` column.
pub fn write_line_with_bbox(path: &Path) {
    let bbox_fields = Fields::from(vec![
        Field::new("xmin", DataType::Float64, false),
        Field::new("ymin", DataType::Float64, false),
        Field::new("xmax", DataType::Float64, false),
        Field::new("ymax", DataType::Float64, false),
    ]);
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("bbox", DataType::Struct(bbox_fields.clone()), false),
        Field::new("geometry", DataType::Binary, false),
    ]));
    let bbox = StructArray::new(
        bbox_fields,
        vec![
            Arc::new(Float64Array::from(vec![0.0])) as ArrayRef,
            Arc::new(Float64Array::from(vec![0.0])) as ArrayRef,
            Arc::new(Float64Array::from(vec![1.0])) as ArrayRef,
            Arc::new(Float64Array::from(vec![1.0])) as ArrayRef,
        ],
        None,
    );
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(vec!["road-1"])) as ArrayRef,
            Arc::new(bbox) as ArrayRef,
            Arc::new(BinaryArray::from_iter_values([line_wkb()])) as ArrayRef,
        ],
    )
    .unwrap();

    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

/// Little-endian ISO WKB point with a Z ordinate.
pub fn point_z_wkb(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut wkb = vec![0x01];
    wkb.extend_from_slice(&1001_u32.to_le_bytes());
    for ordinate in [x, y, z] {
        wkb.extend_from_slice(&ordinate.to_le_bytes());
    }
    wkb
}

/// Writes one row per geometry, with an `id` column counting from zero.
pub fn write_geometries(path: &Path, geometries: &[Vec<u8>]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("geometry", DataType::Binary, false),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from_iter_values(0..geometries.len() as i64)) as ArrayRef,
            Arc::new(BinaryArray::from_iter_values(geometries.iter())) as ArrayRef,
        ],
    )
    .unwrap();

    let file = File::create(path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}
