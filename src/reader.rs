//! Read path: chunk pruning, decode, trim and reassembly.
//!
//! Each requested symbol is read on its own: the chunk index selects every
//! chunk whose `[start, end]` can hold a row of the range, the chunks are
//! decoded at the requested projection, rows (and image rows when asked)
//! are stable-sorted by time and trimmed to the exact interval. Per-symbol
//! results are then concatenated in caller order.

use std::collections::BTreeSet;

use chrono_tz::Tz;

use crate::chunk::{ChunkDocument, ChunkImage, ColumnKind, DecodedChunk};
use crate::error::{Error, Result};
use crate::frame::{Column, ColumnBuilder, TickFrame};
use crate::interval::{DateRange, ResolvedRange};
use crate::store::{ChunkQuery, DocumentStore};
use crate::tick::{millis_to_datetime, Scalar, SYMBOL_FIELD};
use crate::tick_store::TickStore;

/// Symbols to read.
///
/// A list always yields a `SYMBOL` column, even with one element; a single
/// symbol only does when `SYMBOL` is requested explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbols {
    One(String),
    Many(Vec<String>),
}

impl Symbols {
    fn names(&self) -> &[String] {
        match self {
            Symbols::One(symbol) => std::slice::from_ref(symbol),
            Symbols::Many(symbols) => symbols,
        }
    }

    fn is_list(&self) -> bool {
        matches!(self, Symbols::Many(_))
    }
}

impl From<&str> for Symbols {
    fn from(value: &str) -> Self {
        Symbols::One(value.to_string())
    }
}

impl From<String> for Symbols {
    fn from(value: String) -> Self {
        Symbols::One(value)
    }
}

impl From<Vec<String>> for Symbols {
    fn from(value: Vec<String>) -> Self {
        Symbols::Many(value)
    }
}

impl From<Vec<&str>> for Symbols {
    fn from(value: Vec<&str>) -> Self {
        Symbols::Many(value.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Symbols {
    fn from(value: &[&str]) -> Self {
        Symbols::Many(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Symbols {
    fn from(value: [&str; N]) -> Self {
        Symbols::Many(value.iter().map(|s| s.to_string()).collect())
    }
}

/// Options of a read.
#[derive(Debug, Clone, Default)]
pub struct ReadRequest {
    /// `None` reads every stored row.
    pub date_range: Option<DateRange>,
    /// `None` returns the union of stored columns, sorted by name.
    pub columns: Option<Vec<String>>,
    pub include_images: bool,
    /// Overrides the configured timezone for this read.
    pub timezone: Option<Tz>,
}

impl ReadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn date_range(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    pub fn columns<I, T>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    pub fn timezone(mut self, timezone: Tz) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// Where a result row comes from.
#[derive(Debug, Clone, Copy)]
enum RowSource {
    Chunk { chunk: usize, row: usize },
    Image { chunk: usize },
}

/// One symbol's decoded chunks and its surviving rows, sorted and trimmed.
struct SymbolRows {
    symbol: String,
    decoded: Vec<DecodedChunk>,
    images: Vec<Option<ChunkImage>>,
    rows: Vec<(i64, RowSource)>,
}

impl SymbolRows {
    fn cell(&self, source: RowSource, name: &str) -> Option<Scalar> {
        match source {
            RowSource::Chunk { chunk, row } => {
                self.decoded[chunk].columns.get(name).and_then(|c| c.value(row))
            }
            RowSource::Image { chunk } => self.images[chunk]
                .as_ref()
                .and_then(|image| image.values.get(name).cloned()),
        }
    }

    /// Storage kinds this symbol contributes to `name`, counting only chunks
    /// with a row left after trimming.
    fn kinds(&self, name: &str) -> impl Iterator<Item = ColumnKind> + '_ {
        let name = name.to_string();
        let surviving: BTreeSet<usize> = self
            .rows
            .iter()
            .filter_map(|(_, source)| match source {
                RowSource::Chunk { chunk, .. } => Some(*chunk),
                RowSource::Image { .. } => None,
            })
            .collect();
        surviving
            .into_iter()
            .flat_map(move |chunk| self.decoded[chunk].stored_columns())
            .filter(move |(n, _)| **n == name)
            .map(|(_, column)| column.kind())
    }
}

impl<S: DocumentStore> TickStore<S> {
    /// Read ticks for one or more symbols.
    ///
    /// # Errors
    ///
    /// - `Error::NoData`: no requested symbol has a chunk in the range
    /// - `Error::InvalidRange`: a range bound cannot be resolved
    pub fn read(&self, symbols: impl Into<Symbols>, request: &ReadRequest) -> Result<TickFrame> {
        let symbols = symbols.into();
        let tz = request.timezone.unwrap_or(self.config.timezone);
        let range = match &request.date_range {
            Some(range) => range.resolve(&tz)?,
            None => ResolvedRange::unbounded(),
        };

        // The symbol pseudo-column is never stored.
        let stored_projection: Option<Vec<String>> = request.columns.as_ref().map(|cols| {
            cols.iter()
                .filter(|c| c.as_str() != SYMBOL_FIELD)
                .cloned()
                .collect()
        });

        let mut per_symbol = Vec::new();
        for symbol in symbols.names() {
            let projection = stored_projection.as_deref();
            match self.read_symbol(symbol, &range, projection, request.include_images)? {
                Some(rows) => per_symbol.push(rows),
                None => log::warn!("no data for {} in {:?}", symbol, range),
            }
        }
        if per_symbol.is_empty() {
            return Err(Error::NoData(symbols.names().join(", ")));
        }

        let names = output_columns(&per_symbol, request.include_images, stored_projection.as_deref());
        // An explicitly requested symbol column keeps its requested position;
        // otherwise list reads get it in front.
        let requested_at = request
            .columns
            .as_ref()
            .and_then(|cols| cols.iter().position(|c| c == SYMBOL_FIELD));
        let symbol_at = match requested_at {
            Some(pos) => Some(pos),
            None if symbols.is_list() => Some(0),
            None => None,
        };

        assemble(&per_symbol, &names, symbol_at, tz)
    }

    fn read_symbol(
        &self,
        symbol: &str,
        range: &ResolvedRange,
        projection: Option<&[String]>,
        include_images: bool,
    ) -> Result<Option<SymbolRows>> {
        let docs = self
            .store
            .find(&ChunkQuery::symbol(symbol).overlapping(range))?;
        if docs.is_empty() {
            return Ok(None);
        }
        log::debug!("{}: {} chunks overlap {:?}", symbol, docs.len(), range);

        let mut decoded = Vec::with_capacity(docs.len());
        let mut images = Vec::with_capacity(docs.len());
        let mut rows = Vec::new();
        for (chunk, doc) in docs.into_iter().enumerate() {
            let chunk_rows = self.codec.decode(&doc, projection)?;
            let ChunkDocument { image, .. } = doc;
            let image = if include_images { image } else { None };
            if let Some(image) = &image {
                rows.push((image.timestamp, RowSource::Image { chunk }));
            }
            rows.extend(
                chunk_rows
                    .index
                    .iter()
                    .enumerate()
                    .map(|(row, &ts)| (ts, RowSource::Chunk { chunk, row })),
            );
            decoded.push(chunk_rows);
            images.push(image);
        }

        // Chunks may overlap; a stable sort keeps image rows ahead of the
        // rows of their chunk and keeps duplicates.
        rows.sort_by_key(|(ts, _)| *ts);
        rows.retain(|(ts, _)| range.contains(*ts));

        Ok(Some(SymbolRows {
            symbol: symbol.to_string(),
            decoded,
            images,
            rows,
        }))
    }
}

/// Output column names, excluding the symbol pseudo-column.
fn output_columns(
    per_symbol: &[SymbolRows],
    include_images: bool,
    stored_projection: Option<&[String]>,
) -> Vec<String> {
    if let Some(columns) = stored_projection {
        return columns.to_vec();
    }
    let mut names = BTreeSet::new();
    for rows in per_symbol {
        for decoded in &rows.decoded {
            names.extend(decoded.columns.keys().cloned());
        }
        if include_images {
            for image in rows.images.iter().flatten() {
                names.extend(image.values.keys().cloned());
            }
        }
    }
    names.into_iter().collect()
}

/// Concatenate per-symbol rows into one frame, unifying column kinds.
fn assemble(
    per_symbol: &[SymbolRows],
    names: &[String],
    symbol_at: Option<usize>,
    tz: Tz,
) -> Result<TickFrame> {
    let total: usize = per_symbol.iter().map(|s| s.rows.len()).sum();

    let mut index = Vec::with_capacity(total);
    for rows in per_symbol {
        for (ts, _) in &rows.rows {
            index.push(
                millis_to_datetime(*ts, &tz)
                    .ok_or(Error::Corrupt("stored timestamp out of range"))?,
            );
        }
    }

    let mut columns: Vec<(String, Column)> = Vec::with_capacity(names.len() + 1);
    for name in names {
        let cells: Vec<Option<Scalar>> = per_symbol
            .iter()
            .flat_map(|rows| rows.rows.iter().map(move |(_, src)| rows.cell(*src, name)))
            .collect();
        let kind = unify_kind(per_symbol, name, &cells);
        let mut builder = ColumnBuilder::new(kind, total);
        for cell in cells {
            builder.push(cell);
        }
        columns.push((name.clone(), builder.finish()));
    }

    if let Some(pos) = symbol_at {
        let symbol_column = Column::Text(
            per_symbol
                .iter()
                .flat_map(|rows| std::iter::repeat(Some(rows.symbol.clone())).take(rows.rows.len()))
                .collect(),
        );
        let pos = pos.min(columns.len());
        columns.insert(pos, (SYMBOL_FIELD.to_string(), symbol_column));
    }

    Ok(TickFrame::new(tz, index, columns))
}

/// Result kind of one column.
///
/// Starts from the stored kinds of every contributing chunk and the kinds of
/// image values, then widens integers to floats if any output cell is
/// missing. A column nothing stores is an all-missing float column.
fn unify_kind(per_symbol: &[SymbolRows], name: &str, cells: &[Option<Scalar>]) -> ColumnKind {
    let stored = per_symbol.iter().flat_map(|rows| rows.kinds(name));
    let from_cells = cells.iter().flatten().map(scalar_kind);
    let kind = stored
        .chain(from_cells)
        .reduce(ColumnKind::promote)
        .unwrap_or(ColumnKind::Float64);
    if cells.iter().any(Option::is_none) {
        kind.with_missing()
    } else {
        kind
    }
}

fn scalar_kind(value: &Scalar) -> ColumnKind {
    match value {
        Scalar::Int(_) => ColumnKind::Int64,
        Scalar::Float(_) => ColumnKind::Float64,
        Scalar::Text(_) => ColumnKind::Text,
    }
}
