use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::engine::{Bar, Signal};
use crate::errors::{Error, Result};

/// Default train/test/validation ratios.
pub const DEFAULT_SPLIT: (f64, f64, f64) = (0.6, 0.2, 0.2);

/// A source of bars in time order.
pub trait DataSource {
    /// Loads and validates every bar.
    fn load(&self) -> Result<Vec<Bar>>;

    /// Loads the bars behind a shared handle, ready for [`crate::engine::Backtest`].
    fn load_shared(&self) -> Result<Arc<[Bar]>> {
        Ok(Arc::from(self.load()?))
    }
}

/// Parses a timestamp written as RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC), or an integer of epoch
/// seconds. Integers of eleven digits or more are read as epoch milliseconds.
///
/// ```rust
/// use sbt::data::parse_timestamp;
///
/// let a = parse_timestamp("2024-03-01T12:00:00Z").unwrap();
/// let b = parse_timestamp("2024-03-01 12:00:00").unwrap();
/// let c = parse_timestamp("1709294400").unwrap();
/// let d = parse_timestamp("1709294400000").unwrap();
/// assert!(a == b && b == c && c == d);
/// ```
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return from_epoch(epoch);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::InvalidTimestamp(value.to_string()))
}

fn from_epoch(epoch: i64) -> Result<DateTime<Utc>> {
    let datetime = if epoch.abs() >= 100_000_000_000 {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    };
    datetime.ok_or_else(|| Error::InvalidTimestamp(epoch.to_string()))
}

/// Splits `bars` into consecutive train, test and validation slices.
///
/// Slice lengths are `⌊len × train⌋` and `⌊len × test⌋`; validation takes the rest.
///
/// ```rust
/// use sbt::prelude::*;
/// use chrono::DateTime;
///
/// let bars = (0..10)
///     .map(|i| Bar::new(DateTime::default(), 100.0 + i as f64, Signal::Hold).unwrap())
///     .collect::<Vec<_>>();
/// let (train, test, validation) = split_train_test(&bars, 0.6, 0.2, 0.2).unwrap();
/// assert_eq!((train.len(), test.len(), validation.len()), (6, 2, 2));
/// assert!(split_train_test(&bars, 0.6, 0.6, 0.2).is_err());
/// ```
pub fn split_train_test(bars: &[Bar], train: f64, test: f64, validation: f64) -> Result<(&[Bar], &[Bar], &[Bar])> {
    let ratios = [train, test, validation];
    let total = ratios.iter().sum::<f64>();
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0) || (total - 1.0).abs() > 1e-9 {
        return Err(Error::InvalidSplit(train, test, validation));
    }

    let len = bars.len() as f64;
    let train_end = ((len * train).floor() as usize).min(bars.len());
    let test_end = (train_end + (len * test).floor() as usize).min(bars.len());
    Ok((&bars[..train_end], &bars[train_end..test_end], &bars[test_end..]))
}

/// Deterministic geometric random walk, useful for demos and tests.
///
/// Every bar moves the price by a uniform shock in `[-volatility, volatility]`. Bars are one
/// hour apart and carry [`Signal::Hold`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalk {
    /// Number of bars.
    pub len: usize,
    /// Seed of the generator.
    pub seed: u64,
    /// Price of the first bar.
    pub start_price: f64,
    /// Largest relative move per bar, in `[0, 1)`.
    pub volatility: f64,
    /// Timestamp of the first bar.
    pub start: DateTime<Utc>,
}

impl Default for RandomWalk {
    fn default() -> Self {
        Self {
            len: 1_000,
            seed: 42,
            start_price: 100.0,
            volatility: 0.01,
            start: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

impl DataSource for RandomWalk {
    fn load(&self) -> Result<Vec<Bar>> {
        if !(0.0..1.0).contains(&self.volatility) {
            return Err(Error::Msg(format!(
                "Random walk volatility must be in [0, 1) (got: {})",
                self.volatility
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut price = self.start_price;
        let mut bars = Vec::with_capacity(self.len);
        for i in 0..self.len {
            let timestamp = self.start + TimeDelta::hours(i as i64);
            bars.push(Bar::new(timestamp, price, Signal::Hold)?);
            let shock = if self.volatility > 0.0 {
                rng.random_range(-self.volatility..=self.volatility)
            } else {
                0.0
            };
            price *= 1.0 + shock;
        }
        Ok(bars)
    }
}

#[cfg(feature = "serde")]
pub use files::*;

#[cfg(feature = "serde")]
mod files {
    use std::{fs::File, io::BufReader, path::PathBuf};

    use chrono::TimeDelta;
    use serde::Deserialize;

    use super::{DataSource, from_epoch, parse_timestamp};
    use crate::engine::{Bar, Signal};
    use crate::errors::Result;

    #[derive(Debug, Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Epoch(i64),
        Text(String),
    }

    /// One input row. Unknown columns (open, high, volume...) are ignored.
    #[derive(Debug, Deserialize)]
    struct Record {
        #[serde(default)]
        timestamp: Option<RawTimestamp>,
        #[serde(alias = "close")]
        price: f64,
        #[serde(default)]
        signal: Option<i64>,
    }

    impl Record {
        /// Rows without a timestamp are placed one hour apart from the epoch.
        fn into_bar(self, index: usize) -> Result<Bar> {
            let timestamp = match self.timestamp {
                Some(RawTimestamp::Epoch(epoch)) => from_epoch(epoch)?,
                Some(RawTimestamp::Text(text)) => parse_timestamp(&text)?,
                None => chrono::DateTime::<chrono::Utc>::UNIX_EPOCH + TimeDelta::hours(index as i64),
            };
            let signal = self.signal.map(Signal::try_from).transpose()?.unwrap_or_default();
            Bar::new(timestamp, self.price, signal)
        }
    }

    /// Bars from a CSV file with a header row.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct CsvFile {
        path: PathBuf,
    }

    impl CsvFile {
        /// Creates a CSV source.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl DataSource for CsvFile {
        fn load(&self) -> Result<Vec<Bar>> {
            let mut reader = csv::Reader::from_reader(BufReader::new(File::open(&self.path)?));
            reader
                .deserialize::<Record>()
                .enumerate()
                .map(|(index, record)| record?.into_bar(index))
                .collect()
        }
    }

    /// Bars from a JSON array of records.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct JsonFile {
        path: PathBuf,
    }

    impl JsonFile {
        /// Creates a JSON source.
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }
    }

    impl DataSource for JsonFile {
        fn load(&self) -> Result<Vec<Bar>> {
            let records: Vec<Record> = serde_json::from_reader(BufReader::new(File::open(&self.path)?))?;
            records
                .into_iter()
                .enumerate()
                .map(|(index, record)| record.into_bar(index))
                .collect()
        }
    }

}
