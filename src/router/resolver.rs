//! Status resolver: normalizes the local store and the remote tracker
//! into one result shape so the router never inspects backend-specific
//! records.

use std::sync::Arc;
use tracing::error;

use crate::router::store::{Store, VehicleStatusRecord};
use crate::router::tracker::{TrackedVehicle, Tracker, TrackerClient};

/// Outcome of a status lookup. "Not found" and "lookup failed" are
/// distinct on purpose; the router replies differently to each.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(StatusCard),
    NotFound,
    Failed(String),
}

/// Backend-agnostic status snapshot. Locations are always populated,
/// with the configured unknown marker standing in for missing data.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCard {
    pub vin: String,
    pub last_location: String,
    pub next_location: String,
    pub reference: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub departure: Option<String>,
    pub arrival: Option<String>,
    pub updated_at: Option<String>,
}

pub struct StatusResolver<K: Tracker = TrackerClient> {
    store: Arc<Store>,
    tracker: Option<K>,
    unknown: String,
}

impl<K: Tracker> StatusResolver<K> {
    pub fn new(store: Arc<Store>, tracker: Option<K>, unknown_marker: String) -> Self {
        Self { store, tracker, unknown: unknown_marker }
    }

    /// Resolve a normalized VIN: the local store first, then the remote
    /// tracker when one is configured. A tracker timeout or I/O error is
    /// a lookup failure, never "not found".
    pub async fn resolve(&self, vin: &str) -> Resolution {
        match self.store.get_vehicle_status(vin) {
            Err(e) => {
                error!("Status lookup failed for {vin}: {e}");
                Resolution::Failed(e)
            }
            Ok(Some(record)) => Resolution::Found(self.card_from_record(record)),
            Ok(None) => match &self.tracker {
                None => Resolution::NotFound,
                Some(tracker) => match tracker.lookup(vin).await {
                    Ok(Some(vehicle)) => Resolution::Found(self.card_from_tracked(vin, vehicle)),
                    Ok(None) => Resolution::NotFound,
                    Err(e) => {
                        error!("Tracker lookup failed for {vin}: {e}");
                        Resolution::Failed(e)
                    }
                },
            },
        }
    }

    fn card_from_record(&self, record: VehicleStatusRecord) -> StatusCard {
        let (last, next) = split_status(&record.status_text, &self.unknown);
        StatusCard {
            vin: record.vin,
            last_location: last,
            next_location: next,
            reference: record.reference,
            make: None,
            model: None,
            departure: None,
            arrival: None,
            updated_at: Some(record.updated_at),
        }
    }

    fn card_from_tracked(&self, vin: &str, vehicle: TrackedVehicle) -> StatusCard {
        StatusCard {
            vin: vin.to_string(),
            last_location: vehicle.current_location.unwrap_or_else(|| self.unknown.clone()),
            next_location: vehicle.next_stop.unwrap_or_else(|| self.unknown.clone()),
            reference: None,
            make: vehicle.make,
            model: vehicle.model,
            departure: vehicle.departure,
            arrival: vehicle.arrival,
            updated_at: None,
        }
    }
}

/// Split a composite "last | next" status on the first delimiter only.
/// A missing or empty side becomes the unknown marker, never "".
fn split_status(text: &str, unknown: &str) -> (String, String) {
    match text.split_once('|') {
        Some((last, next)) => (fill(last, unknown), fill(next, unknown)),
        None => (fill(text, unknown), unknown.to_string()),
    }
}

fn fill(side: &str, unknown: &str) -> String {
    let side = side.trim();
    if side.is_empty() { unknown.to_string() } else { side.to_string() }
}
