use std::collections::HashSet;

use serde::Deserialize;
use tracing::{error, info};

use crate::config::LookupLocation;
use crate::error::Result;
use crate::storage::ObjectStore;
use crate::types::EventRecord;

#[derive(Debug, Deserialize)]
struct LookupRow {
    mapping_event: Option<String>,
}

/// Set of event names, as they appear on the listing page, that count as
/// major events.
#[derive(Debug, Clone, Default)]
pub struct MajorEventLookup {
    names: HashSet<String>,
}

impl MajorEventLookup {
    /// Parses the `major_events,mapping_event` table.
    pub fn from_csv(data: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(data);
        let mut names = HashSet::new();
        for row in reader.deserialize::<LookupRow>() {
            if let Some(name) = row?.mapping_event {
                let name = name.trim();
                if !name.is_empty() {
                    names.insert(name.to_string());
                }
            }
        }
        Ok(Self { names })
    }

    pub async fn load(store: &dyn ObjectStore, location: &LookupLocation) -> Result<Self> {
        info!("Reading the major events lookup from S3");
        let data = store
            .get_object(&location.bucket, &location.key)
            .await
            .map_err(|e| {
                error!("An error occurred when reading the lookup from S3: {}", e);
                e
            })?;
        let lookup = Self::from_csv(&data)?;
        info!("Loaded {} major event names", lookup.len());
        Ok(lookup)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, event_name: &str) -> bool {
        self.names.contains(event_name)
    }

    /// Left join on exact event name: every record gets a Y/N flag.
    pub fn flag(&self, records: &mut [EventRecord]) {
        for record in records {
            record.is_major_event = Some(self.contains(&record.name));
        }
    }
}
