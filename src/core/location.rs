//! # Location Slice
//!
//! Current position, destination search and the route between them.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::core::geo::{Coordinates, Location};

/// Queries shorter than this clear the results without calling the backend.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub coordinates: Coordinates,
}

impl Place {
    pub fn to_location(&self) -> Location {
        let address = if self.address.is_empty() {
            self.name.clone()
        } else {
            self.address.clone()
        };
        Location::from(self.coordinates).with_address(address)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub points: Vec<Coordinates>,
    pub distance_km: f64,
    pub duration_min: f64,
}

#[derive(Debug, Default)]
pub struct LocationSlice {
    pub current_location: Option<Location>,
    pub search_query: String,
    pub search_results: Vec<Place>,
    pub destination: Option<Place>,
    pub route: Option<Route>,
    pub is_searching: bool,
    pub is_loading_route: bool,
    pub error: Option<String>,
}

impl LocationSlice {
    pub fn set_current_location(&mut self, location: Location) {
        if !location.coordinates.is_valid() {
            warn!("Ignoring invalid location fix: {}", location.coordinates);
            return;
        }
        self.current_location = Some(location);
    }

    /// Returns the trimmed query if a search should be sent.
    pub fn begin_search(&mut self, query: &str) -> Option<String> {
        let query = query.trim().to_string();
        self.search_query = query.clone();
        if query.chars().count() < MIN_QUERY_LEN {
            self.search_results.clear();
            self.is_searching = false;
            return None;
        }
        self.is_searching = true;
        self.error = None;
        Some(query)
    }

    /// Results for a query the user has since changed are dropped.
    pub fn finish_search(&mut self, query: &str, result: Result<Vec<Place>, ApiError>) {
        if query != self.search_query {
            debug!("Dropping stale results for \"{}\"", query);
            return;
        }
        self.is_searching = false;
        match result {
            Ok(places) => self.search_results = places,
            Err(e) => {
                warn!("Place search failed: {}", e);
                self.error = Some(e.user_message());
            }
        }
    }

    pub fn select_destination(&mut self, place: Place) {
        self.search_results.clear();
        self.search_query = place.name.clone();
        self.route = None;
        self.destination = Some(place);
    }

    pub fn clear_destination(&mut self) {
        self.destination = None;
        self.route = None;
        self.search_query.clear();
        self.search_results.clear();
    }

    pub fn begin_route(&mut self, from: &Coordinates, to: &Coordinates) -> bool {
        if self.is_loading_route {
            return false;
        }
        if !from.is_valid() || !to.is_valid() {
            self.error = Some("Invalid route endpoints.".to_string());
            return false;
        }
        self.is_loading_route = true;
        self.error = None;
        true
    }

    pub fn finish_route(&mut self, result: Result<Route, ApiError>) {
        self.is_loading_route = false;
        match result {
            Ok(route) => self.route = Some(route),
            Err(e) => {
                warn!("Route fetch failed: {}", e);
                self.error = Some(e.user_message());
            }
        }
    }
}
