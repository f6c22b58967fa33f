//! Columnar storage for module-registered population states.

use fnv::FnvHashMap;

use crate::error::{Error, Result};
use crate::{Float, Int, ModName, StateName};

/// Key of a population state column: owning module plus state name.
pub type StorageIndex = (ModName, StateName);

/// A single typed value, used as the fill for newly created rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Var {
    Bool(bool),
    Int(Int),
    Float(Float),
}

/// A typed column of per-agent values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateVec {
    Bool(Vec<bool>),
    Int(Vec<Int>),
    Float(Vec<Float>),
}

impl StateVec {
    fn with_fill(fill: Var, len: usize) -> Self {
        match fill {
            Var::Bool(v) => StateVec::Bool(vec![v; len]),
            Var::Int(v) => StateVec::Int(vec![v; len]),
            Var::Float(v) => StateVec::Float(vec![v; len]),
        }
    }

    fn grow(&mut self, fill: Var, n: usize) {
        match (self, fill) {
            (StateVec::Bool(data), Var::Bool(v)) => data.resize(data.len() + n, v),
            (StateVec::Int(data), Var::Int(v)) => data.resize(data.len() + n, v),
            (StateVec::Float(data), Var::Float(v)) => data.resize(data.len() + n, v),
            _ => unreachable!("column fill type diverged from column type"),
        }
    }

    fn trim(&mut self, keep: &[usize]) {
        match self {
            StateVec::Bool(data) => *data = keep.iter().map(|&i| data[i]).collect(),
            StateVec::Int(data) => *data = keep.iter().map(|&i| data[i]).collect(),
            StateVec::Float(data) => *data = keep.iter().map(|&i| data[i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StateVec::Bool(data) => data.len(),
            StateVec::Int(data) => data.len(),
            StateVec::Float(data) => data.len(),
        }
    }
}

/// One registered column with its fill value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub fill: Var,
    pub data: StateVec,
}

/// Main data store for module states of the population.
///
/// Columns are keyed by `(module, state)` so modules can use colliding
/// state names without interfering with each other. All columns always
/// have the same length as the population.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Storage {
    map: FnvHashMap<StorageIndex, Column>,
}

impl Storage {
    pub fn new() -> Self {
        Storage {
            map: FnvHashMap::default(),
        }
    }

    /// Registers a new column filled with the given value. Registering an
    /// existing index is a no-op, so module re-initialization is safe.
    pub fn register(&mut self, idx: StorageIndex, fill: Var, len: usize) {
        self.map.entry(idx).or_insert_with(|| Column {
            fill,
            data: StateVec::with_fill(fill, len),
        });
    }

    pub fn has(&self, idx: &StorageIndex) -> bool {
        self.map.contains_key(idx)
    }

    /// Extends every column with its fill value.
    pub fn grow(&mut self, n: usize) {
        for column in self.map.values_mut() {
            let fill = column.fill;
            column.data.grow(fill, n);
        }
    }

    /// Keeps only the rows at the given indices, in the given order.
    pub fn trim(&mut self, keep: &[usize]) {
        for column in self.map.values_mut() {
            column.data.trim(keep);
        }
    }
}

/// Type-strict getters.
impl Storage {
    pub fn get_bool(&self, idx: &StorageIndex) -> Result<&Vec<bool>> {
        match &self.map.get(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Bool(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }

    pub fn get_bool_mut(&mut self, idx: &StorageIndex) -> Result<&mut Vec<bool>> {
        match &mut self.map.get_mut(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Bool(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }

    pub fn get_int(&self, idx: &StorageIndex) -> Result<&Vec<Int>> {
        match &self.map.get(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Int(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }

    pub fn get_int_mut(&mut self, idx: &StorageIndex) -> Result<&mut Vec<Int>> {
        match &mut self.map.get_mut(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Int(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }

    pub fn get_float(&self, idx: &StorageIndex) -> Result<&Vec<Float>> {
        match &self.map.get(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Float(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }

    pub fn get_float_mut(&mut self, idx: &StorageIndex) -> Result<&mut Vec<Float>> {
        match &mut self.map.get_mut(idx).ok_or(Error::NoState(*idx))?.data {
            StateVec::Float(data) => Ok(data),
            _ => Err(Error::StateTypeMismatch(*idx)),
        }
    }
}

/// Batch setters over row indices.
impl Storage {
    pub fn set_bool_at(&mut self, idx: &StorageIndex, rows: &[usize], value: bool) -> Result<()> {
        let data = self.get_bool_mut(idx)?;
        for &row in rows {
            data[row] = value;
        }
        Ok(())
    }

    pub fn set_float_at(&mut self, idx: &StorageIndex, rows: &[usize], value: Float) -> Result<()> {
        let data = self.get_float_mut(idx)?;
        for &row in rows {
            data[row] = value;
        }
        Ok(())
    }

    /// Writes per-row values; `values` is parallel to `rows`.
    pub fn set_float_each(
        &mut self,
        idx: &StorageIndex,
        rows: &[usize],
        values: &[Float],
    ) -> Result<()> {
        debug_assert_eq!(rows.len(), values.len());
        let data = self.get_float_mut(idx)?;
        for (&row, &value) in rows.iter().zip(values) {
            data[row] = value;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::new_truncate;

    fn idx(module: &str, state: &str) -> StorageIndex {
        (new_truncate(module), new_truncate(state))
    }

    #[test]
    fn register_grow_trim_roundtrip() {
        let mut storage = Storage::new();
        let infected = idx("sir", "infected");
        let ti_inf = idx("sir", "ti_infected");
        storage.register(infected, Var::Bool(false), 3);
        storage.register(ti_inf, Var::Float(Float::NAN), 3);

        storage.get_bool_mut(&infected).unwrap()[1] = true;
        storage.grow(2);
        assert_eq!(storage.get_bool(&infected).unwrap().len(), 5);
        assert!(!storage.get_bool(&infected).unwrap()[4]);
        assert!(storage.get_float(&ti_inf).unwrap()[4].is_nan());

        storage.trim(&[1, 4]);
        let data = storage.get_bool(&infected).unwrap();
        assert_eq!(data.len(), 2);
        assert!(data[0]);
        assert!(!data[1]);
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let mut storage = Storage::new();
        let state = idx("hiv", "cd4");
        storage.register(state, Var::Float(500.), 2);
        assert!(matches!(
            storage.get_bool(&state),
            Err(Error::StateTypeMismatch(_))
        ));
        assert!(matches!(
            storage.get_float(&idx("hiv", "missing")),
            Err(Error::NoState(_))
        ));
    }

    #[test]
    fn reregistration_preserves_data() {
        let mut storage = Storage::new();
        let state = idx("net", "participant");
        storage.register(state, Var::Bool(false), 2);
        storage.get_bool_mut(&state).unwrap()[0] = true;
        storage.register(state, Var::Bool(false), 2);
        assert!(storage.get_bool(&state).unwrap()[0]);
    }
}
