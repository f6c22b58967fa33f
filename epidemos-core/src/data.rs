//! Tabular demographic inputs.
//!
//! Rate tables and population age structures are read from two-column CSV
//! files with a header row, e.g.
//!
//! ```csv
//! age,rate
//! 15,0.021
//! 20,0.162
//! 25,0.175
//! ```
//!
//! Rates are interpolated linearly between the tabulated ages and clamped
//! outside them.

use std::path::Path;

use crate::error::{Error, Result};
use crate::util;
use crate::Float;

fn read_pairs(path: &Path) -> Result<Vec<(Float, Float)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| Error::CsvError(format!("{}: {}", path.display(), e)))?;
    let mut pairs: Vec<(Float, Float)> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::CsvError(e.to_string()))?;
        if record.len() < 2 {
            return Err(Error::CsvError(format!(
                "{}: expected two columns, got {}",
                path.display(),
                record.len()
            )));
        }
        let x: Float = record[0].parse()?;
        let y: Float = record[1].parse()?;
        pairs.push((x, y));
    }
    if pairs.is_empty() {
        return Err(Error::CsvError(format!("{}: no data rows", path.display())));
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(pairs)
}

/// An age-indexed rate table (e.g. fertility or mortality rates).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateTable {
    ages: Vec<Float>,
    rates: Vec<Float>,
}

impl RateTable {
    pub fn new(pairs: Vec<(Float, Float)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::CsvError("empty rate table".to_string()));
        }
        let (ages, rates) = pairs.into_iter().unzip();
        Ok(RateTable { ages, rates })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let table = RateTable::new(read_pairs(path)?)?;
        debug!(
            "loaded rate table from {}: {} rows",
            path.display(),
            table.ages.len()
        );
        Ok(table)
    }

    /// Interpolated rate at the given age.
    pub fn rate_at(&self, age: Float) -> Float {
        util::interp(age, &self.ages, &self.rates)
    }
}

/// A population age structure: relative weight of each age bin.
///
/// Rows are `(bin start age, weight)`; the last bin is assumed as wide as
/// its predecessor. Weights need not be normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgeStructure {
    bin_starts: Vec<Float>,
    cumulative: Vec<Float>,
    total: Float,
    last_width: Float,
}

impl AgeStructure {
    pub fn new(pairs: Vec<(Float, Float)>) -> Result<Self> {
        if pairs.is_empty() {
            return Err(Error::CsvError("empty age structure".to_string()));
        }
        let bin_starts: Vec<Float> = pairs.iter().map(|&(a, _)| a).collect();
        let mut cumulative = Vec::with_capacity(pairs.len());
        let mut total = 0.;
        for &(_, weight) in &pairs {
            if weight < 0. {
                return Err(Error::CsvError(
                    "age structure weights must be non-negative".to_string(),
                ));
            }
            cumulative.push(total);
            total += weight;
        }
        if total <= 0. {
            return Err(Error::CsvError(
                "age structure weights sum to zero".to_string(),
            ));
        }
        let last_width = if bin_starts.len() > 1 {
            bin_starts[bin_starts.len() - 1] - bin_starts[bin_starts.len() - 2]
        } else {
            5.
        };
        Ok(AgeStructure {
            bin_starts,
            cumulative,
            total,
            last_width,
        })
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        AgeStructure::new(read_pairs(path)?)
    }

    /// Maps a uniform variate in `[0, 1)` to an age: the bin is selected
    /// proportionally to its weight and the age is placed uniformly within
    /// the bin.
    pub fn age_at(&self, u: Float) -> Float {
        let target = u.max(0.).min(1.) * self.total;
        let mut bin = self.bin_starts.len() - 1;
        for i in 0..self.cumulative.len() - 1 {
            if target < self.cumulative[i + 1] {
                bin = i;
                break;
            }
        }
        let bin_weight = if bin + 1 < self.cumulative.len() {
            self.cumulative[bin + 1] - self.cumulative[bin]
        } else {
            self.total - self.cumulative[bin]
        };
        let frac = if bin_weight > 0. {
            (target - self.cumulative[bin]) / bin_weight
        } else {
            0.
        };
        let width = if bin + 1 < self.bin_starts.len() {
            self.bin_starts[bin + 1] - self.bin_starts[bin]
        } else {
            self.last_width
        };
        self.bin_starts[bin] + frac * width
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rate_table_interpolates() {
        let table = RateTable::new(vec![(15., 0.), (25., 0.2), (50., 0.)]).unwrap();
        assert_eq!(table.rate_at(10.), 0.);
        assert!((table.rate_at(20.) - 0.1).abs() < 1e-12);
        assert!((table.rate_at(25.) - 0.2).abs() < 1e-12);
        assert_eq!(table.rate_at(60.), 0.);
    }

    #[test]
    fn rate_table_reads_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "age,rate").unwrap();
        writeln!(file, "20,0.5").unwrap();
        writeln!(file, "0,0.1").unwrap();
        file.flush().unwrap();
        let table = RateTable::from_csv_path(file.path()).unwrap();
        // rows get sorted by age
        assert!((table.rate_at(0.) - 0.1).abs() < 1e-12);
        assert!((table.rate_at(20.) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn age_structure_samples_within_bins() {
        let structure =
            AgeStructure::new(vec![(0., 1.), (10., 1.), (20., 2.)]).unwrap();
        // first quarter of the mass is the 0-10 bin
        let age = structure.age_at(0.1);
        assert!(age >= 0. && age < 10., "age was {}", age);
        // last half of the mass is the 20-30 bin
        let age = structure.age_at(0.75);
        assert!(age >= 20. && age < 30., "age was {}", age);
        // boundaries stay in range
        assert!(structure.age_at(0.) >= 0.);
        assert!(structure.age_at(0.999) < 30.);
    }

    #[test]
    fn malformed_csv_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "age,rate").unwrap();
        writeln!(file, "banana,0.1").unwrap();
        file.flush().unwrap();
        assert!(RateTable::from_csv_path(file.path()).is_err());
    }
}
