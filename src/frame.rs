//! Tabular read results.

use chrono::DateTime;
use chrono_tz::Tz;

use crate::chunk::ColumnKind;
use crate::tick::Scalar;

/// A column of a decoded chunk or a read result.
///
/// Missing numeric cells are NaN, missing text cells are `None`. Integer
/// columns never have missing cells.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Text(Vec<Option<String>>),
}

impl Column {
    /// A column of `len` missing cells of the given kind.
    ///
    /// Integer columns cannot hold a missing cell and come back as floats.
    pub fn missing(kind: ColumnKind, len: usize) -> Self {
        match kind {
            ColumnKind::Text => Column::Text(vec![None; len]),
            ColumnKind::Int64 | ColumnKind::Float64 => Column::Float64(vec![f64::NAN; len]),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Float64(_) => ColumnKind::Float64,
            Column::Int64(_) => ColumnKind::Int64,
            Column::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Float64(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell value; `None` for a missing cell.
    pub fn value(&self, row: usize) -> Option<Scalar> {
        match self {
            Column::Float64(v) => v.get(row).filter(|x| !x.is_nan()).map(|x| Scalar::Float(*x)),
            Column::Int64(v) => v.get(row).map(|x| Scalar::Int(*x)),
            Column::Text(v) => v.get(row)?.clone().map(Scalar::Text),
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            Column::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match self {
            Column::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&[Option<String>]> {
        match self {
            Column::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric cells widened to `f64`; `None` for text columns.
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Column::Float64(v) => Some(v.clone()),
            Column::Int64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Column::Text(_) => None,
        }
    }
}

/// Column builder that accepts cells of a fixed target kind.
pub(crate) enum ColumnBuilder {
    Float64(Vec<f64>),
    Int64(Vec<i64>),
    Text(Vec<Option<String>>),
}

impl ColumnBuilder {
    pub(crate) fn new(kind: ColumnKind, capacity: usize) -> Self {
        match kind {
            ColumnKind::Float64 => ColumnBuilder::Float64(Vec::with_capacity(capacity)),
            ColumnKind::Int64 => ColumnBuilder::Int64(Vec::with_capacity(capacity)),
            ColumnKind::Text => ColumnBuilder::Text(Vec::with_capacity(capacity)),
        }
    }

    /// Append a cell, converting it to the builder's kind.
    ///
    /// Integer builders are only created for columns with no missing cells,
    /// so a `None` there is recorded as zero.
    pub(crate) fn push(&mut self, value: Option<Scalar>) {
        match self {
            ColumnBuilder::Float64(v) => {
                v.push(value.and_then(|s| s.as_f64()).unwrap_or(f64::NAN))
            }
            ColumnBuilder::Int64(v) => v.push(match value {
                Some(Scalar::Int(x)) => x,
                Some(Scalar::Float(x)) => x as i64,
                _ => 0,
            }),
            ColumnBuilder::Text(v) => v.push(value.map(|s| s.to_string())),
        }
    }

    pub(crate) fn finish(self) -> Column {
        match self {
            ColumnBuilder::Float64(v) => Column::Float64(v),
            ColumnBuilder::Int64(v) => Column::Int64(v),
            ColumnBuilder::Text(v) => Column::Text(v),
        }
    }
}

/// Result of a read: a timestamp index plus named columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct TickFrame {
    timezone: Tz,
    index: Vec<DateTime<Tz>>,
    columns: Vec<(String, Column)>,
}

impl TickFrame {
    pub(crate) fn new(
        timezone: Tz,
        index: Vec<DateTime<Tz>>,
        columns: Vec<(String, Column)>,
    ) -> Self {
        debug_assert!(columns.iter().all(|(_, c)| c.len() == index.len()));
        Self {
            timezone,
            index,
            columns,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Tz>] {
        &self.index
    }

    /// Index as UTC epoch milliseconds.
    pub fn index_millis(&self) -> Vec<i64> {
        self.index.iter().map(|dt| dt.timestamp_millis()).collect()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn columns(&self) -> &[(String, Column)] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, column)| column)
    }

    /// Convert to an arrow record batch with a leading `index` column.
    #[cfg(feature = "arrow")]
    pub fn to_record_batch(&self) -> crate::Result<arrow::record_batch::RecordBatch> {
        use std::sync::Arc;

        use arrow::array::{
            ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
        };
        use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

        let tz_name: Arc<str> = self.timezone.name().into();

        let mut fields = Vec::with_capacity(self.columns.len() + 1);
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len() + 1);

        fields.push(Field::new(
            crate::tick::INDEX_FIELD,
            DataType::Timestamp(TimeUnit::Millisecond, Some(tz_name.clone())),
            false,
        ));
        arrays.push(Arc::new(
            TimestampMillisecondArray::from(self.index_millis()).with_timezone(tz_name),
        ));

        for (name, column) in &self.columns {
            let (data_type, array): (DataType, ArrayRef) = match column {
                Column::Float64(v) => (DataType::Float64, Arc::new(Float64Array::from(v.clone()))),
                Column::Int64(v) => (DataType::Int64, Arc::new(Int64Array::from(v.clone()))),
                Column::Text(v) => (DataType::Utf8, Arc::new(StringArray::from(v.clone()))),
            };
            fields.push(Field::new(name, data_type, true));
            arrays.push(array);
        }

        Ok(arrow::record_batch::RecordBatch::try_new(
            Arc::new(Schema::new(fields)),
            arrays,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frame() -> TickFrame {
        let tz = Tz::Europe__London;
        let index = vec![
            tz.with_ymd_and_hms(2013, 1, 1, 10, 0, 0).unwrap(),
            tz.with_ymd_and_hms(2013, 1, 1, 11, 0, 0).unwrap(),
        ];
        TickFrame::new(
            tz,
            index,
            vec![
                ("a".to_string(), Column::Float64(vec![1.0, f64::NAN])),
                ("n".to_string(), Column::Int64(vec![3, 4])),
                ("s".to_string(), Column::Text(vec![None, Some("x".into())])),
            ],
        )
    }

    #[test]
    fn test_value_missing_markers() {
        let frame = frame();
        let a = frame.column("a").unwrap();
        assert_eq!(a.value(0), Some(Scalar::Float(1.0)));
        assert_eq!(a.value(1), None);
        let s = frame.column("s").unwrap();
        assert_eq!(s.value(0), None);
        assert_eq!(s.value(1), Some(Scalar::Text("x".into())));
        assert_eq!(frame.column("n").unwrap().to_f64_vec(), Some(vec![3.0, 4.0]));
        assert_eq!(frame.column_names(), vec!["a", "n", "s"]);
    }

    #[test]
    fn test_missing_int_becomes_float() {
        let column = Column::missing(ColumnKind::Int64, 2);
        assert_eq!(column.kind(), ColumnKind::Float64);
        assert!(column.as_f64().unwrap().iter().all(|x| x.is_nan()));
    }

    #[cfg(feature = "arrow")]
    #[test]
    fn test_to_record_batch() {
        use arrow::array::Array;
        use arrow::datatypes::DataType;

        let batch = frame().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        let schema = batch.schema();
        assert_eq!(schema.field(0).name(), "index");
        assert!(matches!(schema.field(0).data_type(), DataType::Timestamp(_, Some(tz)) if tz.as_ref() == "Europe/London"));
        assert_eq!(schema.field(3).data_type(), &DataType::Utf8);
        assert!(batch.column(3).is_null(0));
    }
}
