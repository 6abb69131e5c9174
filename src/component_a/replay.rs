//! replay.rs
//! Perceiver backed by a recorded CSV of perception records.
//!
//! One record is handed out per frame. Once the recording runs out the last record is
//! repeated, so the controller keeps seeing the final scene instead of an empty one.

use std::path::Path;

use log::info;

use crate::component_a::{
    capture::Frame,
    perception::{PerceptionRecord, Perceiver},
};

pub struct ReplayPerceiver {
    records: Vec<PerceptionRecord>,
    cursor: usize,
}

impl ReplayPerceiver {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, csv::Error> {
        let mut reader = csv::Reader::from_path(path.as_ref())?;
        let records = reader
            .deserialize()
            .collect::<Result<Vec<PerceptionRecord>, _>>()?;
        info!(
            "[Replay] loaded {} records from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(Self::from_records(records))
    }

    pub fn from_records(records: Vec<PerceptionRecord>) -> Self {
        Self { records, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.records.len().saturating_sub(self.cursor)
    }
}

impl Perceiver for ReplayPerceiver {
    fn perceive(&mut self, _frame: &Frame) -> PerceptionRecord {
        let record = match self.records.get(self.cursor) {
            Some(r) => r.clone(),
            None => self.records.last().cloned().unwrap_or_default(),
        };
        if self.cursor < self.records.len() {
            self.cursor += 1;
        }
        record
    }
}
