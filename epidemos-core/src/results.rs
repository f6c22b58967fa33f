//! Named result time series.

use std::io::Write;

use linked_hash_map::LinkedHashMap;

use crate::error::{Error, Result};
use crate::{string, Float, ModName, RsltName};

/// A single result time series, one value per timepoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rslt {
    pub module: ModName,
    pub name: RsltName,
    pub values: Vec<Float>,
}

impl Rslt {
    pub fn new(module: &str, name: &str, npts: usize) -> Self {
        Rslt {
            module: string::new_truncate(module),
            name: string::new_truncate(name),
            values: vec![0.; npts],
        }
    }

    /// The `module.name` key under which the series is filed.
    pub fn key(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }
}

/// Insertion-ordered collection of all result series of a simulation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    map: LinkedHashMap<String, Rslt>,
    npts: usize,
}

impl Results {
    pub fn new(npts: usize) -> Self {
        Results {
            map: LinkedHashMap::new(),
            npts,
        }
    }

    pub fn npts(&self) -> usize {
        self.npts
    }

    /// Creates a zero-filled series; a no-op if it already exists.
    pub fn new_series(&mut self, module: &str, name: &str) {
        let series = Rslt::new(module, name, self.npts);
        let key = series.key();
        self.map.entry(key).or_insert(series);
    }

    pub fn get(&self, module: &str, name: &str) -> Result<&Rslt> {
        self.map.get(&format!("{}.{}", module, name)).ok_or_else(|| {
            Error::NoResult(string::new_truncate(module), string::new_truncate(name))
        })
    }

    pub fn get_mut(&mut self, module: &str, name: &str) -> Result<&mut Rslt> {
        self.map
            .get_mut(&format!("{}.{}", module, name))
            .ok_or_else(|| {
                Error::NoResult(string::new_truncate(module), string::new_truncate(name))
            })
    }

    /// Sets the value of a series at the given timepoint.
    pub fn set(&mut self, module: &str, name: &str, ti: usize, value: Float) -> Result<()> {
        let series = self.get_mut(module, name)?;
        series.values[ti] = value;
        Ok(())
    }

    /// Adds to the value of a series at the given timepoint.
    pub fn add(&mut self, module: &str, name: &str, ti: usize, value: Float) -> Result<()> {
        let series = self.get_mut(module, name)?;
        series.values[ti] += value;
        Ok(())
    }

    /// Value of `module.name` at the given timepoint.
    pub fn at(&self, module: &str, name: &str, ti: usize) -> Result<Float> {
        Ok(self.get(module, name)?.values[ti])
    }

    /// Running total of `module.name` through the given timepoint.
    pub fn cumulative_to(&self, module: &str, name: &str, ti: usize) -> Result<Float> {
        Ok(self.get(module, name)?.values[..=ti].iter().sum())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rslt> {
        self.map.values()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Writes all series as CSV, one row per timepoint, with a leading
    /// `year` column.
    pub fn write_csv<W: Write>(&self, writer: W, years: &[Float]) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["year".to_string()];
        header.extend(self.map.keys().cloned());
        wtr.write_record(&header)
            .map_err(|e| Error::CsvError(e.to_string()))?;
        for ti in 0..self.npts {
            let mut record = Vec::with_capacity(self.map.len() + 1);
            record.push(format!("{}", years.get(ti).copied().unwrap_or(ti as Float)));
            for series in self.map.values() {
                record.push(format!("{}", series.values[ti]));
            }
            wtr.write_record(&record)
                .map_err(|e| Error::CsvError(e.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }
}
