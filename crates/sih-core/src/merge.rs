//! Mergeable per-key partial state.
//!
//! Every merge operator carries enough state to be associative and
//! commutative: sums add, means keep `(sum, count)`, modes keep value counts
//! with the first ordinal each value was seen at, "first" keeps the value of
//! the lowest ordinal, and argmax keeps the winning score and ordinal. A
//! grouped pass over all rows and any tree of chunk merges therefore produce
//! the same result.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use polars::prelude::{Column, DataFrame, DataType, IntoColumn, NamedFrom, Series};
use serde::{Deserialize, Serialize};
use sih_common::round_to;
use sih_model::{Cell, cells_to_series, column_cells};
use sih_transform::{DerivedField, RuleSet, apply_derived};

use crate::error::AggregateError;

const FIRST_ORD: &str = "__first_ord";
const ROWS: &str = "__rows";

/// How duplicates of one column are merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeKind {
    /// Value from the earliest row.
    First,
    /// Sum of values; null is the identity.
    Sum,
    /// Mean of non-null values, rounded at finalization.
    Mean,
    /// Most frequent non-null value; ties go to the value seen first.
    Mode,
    /// Value from the row with the greatest `by`; ties go to the earliest row.
    Argmax { by: String },
}

impl fmt::Display for MergeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => f.write_str("first"),
            Self::Sum => f.write_str("sum"),
            Self::Mean => f.write_str("mean"),
            Self::Mode => f.write_str("mode"),
            Self::Argmax { by } => write!(f, "argmax({by})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergePolicy {
    pub key: String,
    /// Columns not listed merge as [`MergeKind::First`].
    pub columns: BTreeMap<String, MergeKind>,
    pub mean_decimals: u32,
    /// Fields recomputed from merged components after finalization.
    pub derived: Vec<DerivedField>,
}

impl MergePolicy {
    /// Contraction policy for AIH records normalized by `rules`.
    pub fn standard(rules: &RuleSet) -> Self {
        let mut columns = BTreeMap::new();
        for name in ["VAL_SH", "VAL_SP", "VAL_UTI", "QT_DIARIAS"] {
            columns.insert(name.to_string(), MergeKind::Sum);
        }
        for name in ["UTI_MES_TO", "UTI_INT_TO", "DIAR_ACOM"] {
            columns.insert(name.to_string(), MergeKind::Mean);
        }
        for name in ["CNES", "MUNIC_RES", "SEXO", "RACA_COR", "NASC"] {
            columns.insert(name.to_string(), MergeKind::Mode);
        }
        columns.insert(
            "PROC_REA".to_string(),
            MergeKind::Argmax {
                by: "VAL_TOT".to_string(),
            },
        );
        Self {
            key: rules.key.clone(),
            columns,
            mean_decimals: 1,
            derived: rules.derived.clone(),
        }
    }

    pub fn kind_for(&self, column: &str) -> MergeKind {
        self.columns.get(column).cloned().unwrap_or(MergeKind::First)
    }
}

/// Value counts of one column within one key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeTally {
    entries: Vec<TallyEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TallyEntry {
    value: Cell,
    count: u64,
    first_ord: u64,
}

impl ModeTally {
    pub fn observe(&mut self, value: Cell, ord: u64) {
        self.add(value, 1, ord);
    }

    fn add(&mut self, value: Cell, count: u64, ord: u64) {
        match self.entries.iter_mut().find(|e| e.value == value) {
            Some(entry) => {
                entry.count += count;
                entry.first_ord = entry.first_ord.min(ord);
            }
            None => self.entries.push(TallyEntry {
                value,
                count,
                first_ord: ord,
            }),
        }
    }

    pub fn merge(&mut self, other: ModeTally) {
        for entry in other.entries {
            self.add(entry.value, entry.count, entry.first_ord);
        }
    }

    /// Most frequent non-null value, ties broken by earliest first sighting.
    /// Null only when every observation was null.
    pub fn resolve(&self) -> Cell {
        self.entries
            .iter()
            .filter(|e| !e.value.is_null())
            .min_by(|a, b| b.count.cmp(&a.count).then(a.first_ord.cmp(&b.first_ord)))
            .map(|e| e.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SlotState {
    Key,
    First(Cell),
    Sum(Cell),
    Mean { sum: f64, count: u64 },
    Mode(ModeTally),
    Argmax { value: Cell, score: Option<f64>, ord: u64 },
}

fn beats(score: Option<f64>, ord: u64, other_score: Option<f64>, other_ord: u64) -> bool {
    match (score, other_score) {
        (Some(a), Some(b)) if a != b => a > b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => ord < other_ord,
    }
}

impl SlotState {
    fn merge(&mut self, other: SlotState, other_is_earlier: bool) {
        match (self, other) {
            (Self::First(mine), Self::First(theirs)) => {
                if other_is_earlier {
                    *mine = theirs;
                }
            }
            (Self::Sum(mine), Self::Sum(theirs)) => *mine = mine.add(&theirs),
            (Self::Mean { sum, count }, Self::Mean { sum: s, count: c }) => {
                *sum += s;
                *count += c;
            }
            (Self::Mode(mine), Self::Mode(theirs)) => mine.merge(theirs),
            (
                Self::Argmax { value, score, ord },
                Self::Argmax {
                    value: v,
                    score: s,
                    ord: o,
                },
            ) => {
                if beats(s, o, *score, *ord) {
                    *value = v;
                    *score = s;
                    *ord = o;
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct KeyState {
    first_ord: u64,
    rows: u64,
    slots: Vec<SlotState>,
}

impl KeyState {
    fn merge(&mut self, other: KeyState) {
        let other_is_earlier = other.first_ord < self.first_ord;
        for (slot, theirs) in self.slots.iter_mut().zip(other.slots) {
            slot.merge(theirs, other_is_earlier);
        }
        self.first_ord = self.first_ord.min(other.first_ord);
        self.rows += other.rows;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SlotSpec {
    name: String,
    dtype: DataType,
    kind: Option<MergeKind>,
}

/// Column layout of a normalized frame under a merge policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    key: String,
    slots: Vec<SlotSpec>,
}

impl Layout {
    pub fn new(frame: &DataFrame, policy: &MergePolicy) -> Result<Self, AggregateError> {
        let key = frame
            .column(&policy.key)
            .map_err(|_| AggregateError::MissingColumn {
                column: policy.key.clone(),
            })?;
        if key.dtype() != &DataType::Int64 {
            return Err(AggregateError::KeyType {
                column: policy.key.clone(),
                dtype: key.dtype().to_string(),
            });
        }
        let mut slots = Vec::with_capacity(frame.width());
        for column in frame.get_columns() {
            let name = column.name().to_string();
            let kind = if name == policy.key {
                None
            } else {
                let kind = policy.kind_for(&name);
                if let MergeKind::Argmax { by } = &kind
                    && frame.column(by).is_err()
                {
                    return Err(AggregateError::MissingColumn { column: by.clone() });
                }
                Some(kind)
            };
            slots.push(SlotSpec {
                name,
                dtype: column.dtype().clone(),
                kind,
            });
        }
        Ok(Self {
            key: policy.key.clone(),
            slots,
        })
    }
}

/// Per-key merge state for a subset of rows.
#[derive(Debug, Clone)]
pub struct PartialAggregate {
    layout: Layout,
    states: HashMap<i64, KeyState>,
}

fn i64_cells(column: &Column) -> Result<Vec<Option<i64>>, AggregateError> {
    let cast = column.cast(&DataType::Int64)?;
    Ok(cast.i64()?.into_iter().collect())
}

impl PartialAggregate {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            states: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Folds normalized rows in; row `i` gets ordinal `first_ord + i`.
    pub fn fold_frame(&mut self, frame: &DataFrame, first_ord: u64) -> Result<(), AggregateError> {
        let keys = i64_cells(frame.column(&self.layout.key)?)?;
        let mut columns: Vec<Option<Vec<Cell>>> = Vec::with_capacity(self.layout.slots.len());
        let mut scores: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for slot in &self.layout.slots {
            if slot.kind.is_none() {
                columns.push(None);
                continue;
            }
            let column = frame
                .column(&slot.name)
                .map_err(|_| AggregateError::MissingColumn {
                    column: slot.name.clone(),
                })?;
            columns.push(Some(column_cells(column)?));
            if let Some(MergeKind::Argmax { by }) = &slot.kind
                && !scores.contains_key(by)
            {
                let values = column_cells(frame.column(by)?)?
                    .iter()
                    .map(Cell::as_f64)
                    .collect();
                scores.insert(by.clone(), values);
            }
        }

        for (row, key) in keys.into_iter().enumerate() {
            let Some(key) = key else { continue };
            let ord = first_ord + row as u64;
            let slots = self
                .layout
                .slots
                .iter()
                .zip(&columns)
                .map(|(slot, cells)| {
                    let cell = cells
                        .as_ref()
                        .map(|cells| cells[row].clone())
                        .unwrap_or_default();
                    match &slot.kind {
                        None => SlotState::Key,
                        Some(MergeKind::First) => SlotState::First(cell),
                        Some(MergeKind::Sum) => SlotState::Sum(cell),
                        Some(MergeKind::Mean) => match cell.as_f64() {
                            Some(value) => SlotState::Mean {
                                sum: value,
                                count: 1,
                            },
                            None => SlotState::Mean { sum: 0.0, count: 0 },
                        },
                        Some(MergeKind::Mode) => {
                            let mut tally = ModeTally::default();
                            tally.observe(cell, ord);
                            SlotState::Mode(tally)
                        }
                        Some(MergeKind::Argmax { by }) => SlotState::Argmax {
                            value: cell,
                            score: scores.get(by).and_then(|s| s[row]),
                            ord,
                        },
                    }
                })
                .collect();
            self.insert(
                key,
                KeyState {
                    first_ord: ord,
                    rows: 1,
                    slots,
                },
            );
        }
        Ok(())
    }

    fn insert(&mut self, key: i64, state: KeyState) {
        match self.states.get_mut(&key) {
            Some(existing) => existing.merge(state),
            None => {
                self.states.insert(key, state);
            }
        }
    }

    pub fn merge(&mut self, other: PartialAggregate) {
        for (key, state) in other.states {
            self.insert(key, state);
        }
    }

    fn ordered(&self) -> Vec<(&i64, &KeyState)> {
        let mut ordered: Vec<_> = self.states.iter().collect();
        ordered.sort_by_key(|(_, state)| state.first_ord);
        ordered
    }

    /// Serializes the partial state, sufficient statistics included.
    pub fn to_frame(&self) -> Result<DataFrame, AggregateError> {
        let ordered = self.ordered();
        let mut columns: Vec<Column> = vec![
            Series::new(
                self.layout.key.as_str().into(),
                ordered.iter().map(|(key, _)| **key).collect::<Vec<i64>>(),
            )
            .into_column(),
            Series::new(
                FIRST_ORD.into(),
                ordered
                    .iter()
                    .map(|(_, s)| s.first_ord as i64)
                    .collect::<Vec<i64>>(),
            )
            .into_column(),
            Series::new(
                ROWS.into(),
                ordered
                    .iter()
                    .map(|(_, s)| s.rows as i64)
                    .collect::<Vec<i64>>(),
            )
            .into_column(),
        ];
        for (idx, slot) in self.layout.slots.iter().enumerate() {
            let states: Vec<&SlotState> = ordered.iter().map(|(_, s)| &s.slots[idx]).collect();
            match &slot.kind {
                None => {}
                Some(MergeKind::First | MergeKind::Sum) => {
                    let cells: Vec<Cell> = states
                        .iter()
                        .map(|state| match state {
                            SlotState::First(cell) | SlotState::Sum(cell) => cell.clone(),
                            _ => Cell::Null,
                        })
                        .collect();
                    columns.push(cells_to_series(&slot.name, &cells, &slot.dtype)?.into_column());
                }
                Some(MergeKind::Mean) => {
                    let (sums, counts): (Vec<f64>, Vec<i64>) = states
                        .iter()
                        .map(|state| match state {
                            SlotState::Mean { sum, count } => (*sum, *count as i64),
                            _ => (0.0, 0),
                        })
                        .unzip();
                    columns.push(Series::new(format!("{}__sum", slot.name).into(), sums).into_column());
                    columns.push(
                        Series::new(format!("{}__count", slot.name).into(), counts).into_column(),
                    );
                }
                Some(MergeKind::Mode) => {
                    let mut tallies = Vec::with_capacity(states.len());
                    for state in &states {
                        let json = match state {
                            SlotState::Mode(tally) => serde_json::to_string(tally).map_err(|e| {
                                AggregateError::PartialState {
                                    column: slot.name.clone(),
                                    message: e.to_string(),
                                }
                            })?,
                            _ => String::from("{\"entries\":[]}"),
                        };
                        tallies.push(json);
                    }
                    columns.push(
                        Series::new(format!("{}__tally", slot.name).into(), tallies).into_column(),
                    );
                }
                Some(MergeKind::Argmax { .. }) => {
                    let mut values = Vec::with_capacity(states.len());
                    let mut scores = Vec::with_capacity(states.len());
                    let mut ords = Vec::with_capacity(states.len());
                    for state in &states {
                        if let SlotState::Argmax { value, score, ord } = state {
                            values.push(value.clone());
                            scores.push(*score);
                            ords.push(*ord as i64);
                        }
                    }
                    columns.push(cells_to_series(&slot.name, &values, &slot.dtype)?.into_column());
                    columns.push(
                        Series::new(format!("{}__score", slot.name).into(), scores).into_column(),
                    );
                    columns
                        .push(Series::new(format!("{}__ord", slot.name).into(), ords).into_column());
                }
            }
        }
        Ok(DataFrame::new(columns)?)
    }

    /// Restores partial state written by [`PartialAggregate::to_frame`].
    pub fn from_frame(frame: &DataFrame, layout: &Layout) -> Result<Self, AggregateError> {
        let column = |name: &str| {
            frame
                .column(name)
                .map_err(|_| AggregateError::PartialState {
                    column: name.to_string(),
                    message: "column missing from partial artifact".to_string(),
                })
        };
        let keys = i64_cells(column(&layout.key)?)?;
        let first_ords = i64_cells(column(FIRST_ORD)?)?;
        let rows = i64_cells(column(ROWS)?)?;
        let height = frame.height();
        let mut slot_columns: Vec<Vec<SlotState>> = Vec::with_capacity(layout.slots.len());
        for slot in &layout.slots {
            let states = match &slot.kind {
                None => vec![SlotState::Key; height],
                Some(MergeKind::First) => column_cells(column(&slot.name)?)?
                    .into_iter()
                    .map(SlotState::First)
                    .collect(),
                Some(MergeKind::Sum) => column_cells(column(&slot.name)?)?
                    .into_iter()
                    .map(SlotState::Sum)
                    .collect(),
                Some(MergeKind::Mean) => {
                    let sums = column_cells(column(&format!("{}__sum", slot.name))?)?;
                    let counts = i64_cells(column(&format!("{}__count", slot.name))?)?;
                    sums.iter()
                        .zip(counts)
                        .map(|(sum, count)| SlotState::Mean {
                            sum: sum.as_f64().unwrap_or(0.0),
                            count: count.unwrap_or(0).max(0) as u64,
                        })
                        .collect()
                }
                Some(MergeKind::Mode) => {
                    let name = format!("{}__tally", slot.name);
                    let texts = column_cells(column(&name)?)?;
                    let mut states = Vec::with_capacity(height);
                    for text in texts {
                        let json = text.as_text().unwrap_or_default();
                        let tally: ModeTally = serde_json::from_str(&json).map_err(|e| {
                            AggregateError::PartialState {
                                column: name.clone(),
                                message: e.to_string(),
                            }
                        })?;
                        states.push(SlotState::Mode(tally));
                    }
                    states
                }
                Some(MergeKind::Argmax { .. }) => {
                    let values = column_cells(column(&slot.name)?)?;
                    let scores = column_cells(column(&format!("{}__score", slot.name))?)?;
                    let ords = i64_cells(column(&format!("{}__ord", slot.name))?)?;
                    values
                        .into_iter()
                        .zip(scores)
                        .zip(ords)
                        .map(|((value, score), ord)| SlotState::Argmax {
                            value,
                            score: score.as_f64(),
                            ord: ord.unwrap_or(0).max(0) as u64,
                        })
                        .collect()
                }
            };
            slot_columns.push(states);
        }

        let mut partial = Self::new(layout.clone());
        let mut slot_iters: Vec<_> = slot_columns.into_iter().map(Vec::into_iter).collect();
        for row in 0..height {
            let slots = slot_iters
                .iter_mut()
                .map(|iter| iter.next().unwrap_or(SlotState::Key))
                .collect();
            let Some(key) = keys[row] else { continue };
            partial.insert(
                key,
                KeyState {
                    first_ord: first_ords[row].unwrap_or(0).max(0) as u64,
                    rows: rows[row].unwrap_or(0).max(0) as u64,
                    slots,
                },
            );
        }
        Ok(partial)
    }

    /// Resolves every key to one canonical record, ordered by first sighting,
    /// and recomputes derived fields.
    pub fn finalize(&self, policy: &MergePolicy) -> Result<DataFrame, AggregateError> {
        let ordered = self.ordered();
        let mut columns: Vec<Column> = Vec::with_capacity(self.layout.slots.len());
        for (idx, slot) in self.layout.slots.iter().enumerate() {
            let series = match &slot.kind {
                None => Series::new(
                    slot.name.as_str().into(),
                    ordered.iter().map(|(key, _)| **key).collect::<Vec<i64>>(),
                ),
                Some(MergeKind::Mean) => Series::new(
                    slot.name.as_str().into(),
                    ordered
                        .iter()
                        .map(|(_, state)| match &state.slots[idx] {
                            SlotState::Mean { sum, count } if *count > 0 => {
                                Some(round_to(sum / *count as f64, policy.mean_decimals))
                            }
                            _ => None,
                        })
                        .collect::<Vec<Option<f64>>>(),
                ),
                Some(_) => {
                    let cells: Vec<Cell> = ordered
                        .iter()
                        .map(|(_, state)| match &state.slots[idx] {
                            SlotState::First(cell) | SlotState::Sum(cell) => cell.clone(),
                            SlotState::Mode(tally) => tally.resolve(),
                            SlotState::Argmax { value, .. } => value.clone(),
                            _ => Cell::Null,
                        })
                        .collect();
                    cells_to_series(&slot.name, &cells, &slot.dtype)?
                }
            };
            columns.push(series.into_column());
        }
        let mut frame = DataFrame::new(columns)?;
        apply_derived(&mut frame, &policy.derived)?;
        Ok(frame)
    }
}

/// Fails when any key value occurs more than once.
pub fn verify_unique_keys(frame: &DataFrame, key: &str) -> Result<(), AggregateError> {
    let keys = i64_cells(frame.column(key)?)?;
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    let mut duplicates = 0;
    let mut first = None;
    for key in keys.into_iter().flatten() {
        if !seen.insert(key) {
            duplicates += 1;
            first.get_or_insert(key);
        }
    }
    match first {
        Some(first) => Err(AggregateError::DuplicateKeys {
            count: duplicates,
            first,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_prefers_count_then_first_seen() {
        let mut tally = ModeTally::default();
        tally.observe(Cell::Text("B".into()), 3);
        tally.observe(Cell::Text("A".into()), 1);
        tally.observe(Cell::Text("B".into()), 4);
        tally.observe(Cell::Text("A".into()), 2);
        assert_eq!(tally.resolve(), Cell::Text("A".into()));
        tally.observe(Cell::Text("B".into()), 9);
        assert_eq!(tally.resolve(), Cell::Text("B".into()));
    }

    #[test]
    fn mode_ignores_nulls_unless_all_null() {
        let mut tally = ModeTally::default();
        tally.observe(Cell::Null, 0);
        tally.observe(Cell::Null, 1);
        assert_eq!(tally.resolve(), Cell::Null);
        tally.observe(Cell::Int(5), 2);
        assert_eq!(tally.resolve(), Cell::Int(5));
    }

    #[test]
    fn mode_merge_is_order_independent() {
        let mut left = ModeTally::default();
        left.observe(Cell::Int(1), 5);
        let mut right = ModeTally::default();
        right.observe(Cell::Int(2), 0);

        let mut a = left.clone();
        a.merge(right.clone());
        let mut b = right;
        b.merge(left);
        assert_eq!(a.resolve(), b.resolve());
        assert_eq!(a.resolve(), Cell::Int(2));
    }

    #[test]
    fn argmax_ties_go_to_earliest() {
        assert!(beats(Some(2.0), 9, Some(1.0), 0));
        assert!(beats(Some(1.0), 0, Some(1.0), 3));
        assert!(!beats(Some(1.0), 3, Some(1.0), 0));
        assert!(beats(Some(0.0), 5, None, 0));
    }

    #[test]
    fn unlisted_columns_merge_as_first() {
        let policy = MergePolicy::standard(&RuleSet::standard());
        assert_eq!(policy.kind_for("COMPLEX"), MergeKind::First);
        assert_eq!(policy.kind_for("VAL_SH"), MergeKind::Sum);
        assert_eq!(policy.kind_for("PROC_REA").to_string(), "argmax(VAL_TOT)");
    }
}
