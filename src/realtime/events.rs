use std::fmt;

use serde::Deserialize;

use crate::core::driver::DriverRequest;
use crate::core::geo::Coordinates;
use crate::core::ride::RideStatus;

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Ride(String),
    Driver(String),
}

impl Topic {
    /// Path segment appended to the stream URL, e.g. `ride/ride-1`.
    pub fn path(&self) -> String {
        match self {
            Topic::Ride(id) => format!("ride/{id}"),
            Topic::Driver(id) => format!("driver/{id}"),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// A decoded stream payload, tagged by `type`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum StreamEvent {
    #[serde(rename = "ride.status")]
    RideStatus { ride_id: String, status: RideStatus },
    #[serde(rename = "ride.location")]
    RideLocation {
        ride_id: String,
        location: Coordinates,
        #[serde(default)]
        eta_min: Option<u32>,
    },
    #[serde(rename = "driver.request")]
    DriverRequest(DriverRequest),
}

impl StreamEvent {
    /// Decodes one `data:` payload. When the payload has no `type` field the
    /// SSE `event:` name is used instead.
    pub fn decode(event_name: Option<&str>, data: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(data)?;
        if let (Some(name), Some(object)) = (event_name, value.as_object_mut())
            && !object.contains_key("type")
        {
            object.insert("type".to_string(), serde_json::Value::String(name.to_string()));
        }
        serde_json::from_value(value)
    }
}

/// What a channel reports to its subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// The stream is established.
    Open,
    Event(StreamEvent),
}
