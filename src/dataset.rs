use crate::types::TrafficRecord;
use std::collections::BTreeMap;

/// Snapshot of the feed with `unknown` readings removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<TrafficRecord>,
}

impl Dataset {
    /// Concatenate `records`, dropping every `unknown` reading. Order of the
    /// remaining records is kept.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = TrafficRecord>,
    {
        Self {
            records: records
                .into_iter()
                .filter(|r| !r.traffic.is_unknown())
                .collect(),
        }
    }

    pub fn records(&self) -> &[TrafficRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrafficRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Readings per status label, sorted by label.
    pub fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.records {
            *counts.entry(r.traffic.to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Mean coordinate, or `None` for an empty dataset.
    pub fn centroid(&self) -> Option<(f64, f64)> {
        if self.records.is_empty() {
            return None;
        }
        let n = self.records.len() as f64;
        let (lat, lon) = self
            .records
            .iter()
            .fold((0.0, 0.0), |(la, lo), r| (la + r.lat, lo + r.lon));
        Some((lat / n, lon / n))
    }
}
