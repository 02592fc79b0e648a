use std::fmt;
use std::str::FromStr;

use loglite_gax::grpc::Status;

/// A cloud region, e.g. `us-central1`: exactly two hyphen-separated
/// segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CloudRegion {
    name: String,
}

impl CloudRegion {
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl FromStr for CloudRegion {
    type Err = Status;

    fn from_str(value: &str) -> Result<Self, Status> {
        let segments: Vec<&str> = value.split('-').collect();
        if segments.len() != 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(Status::invalid_argument(format!("Invalid region name: {value}")));
        }
        Ok(Self {
            name: value.to_string(),
        })
    }
}

impl fmt::Display for CloudRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A cloud zone, e.g. `us-central1-a`: a region plus a single-letter
/// suffix.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CloudZone {
    region: CloudRegion,
    zone_id: char,
}

impl CloudZone {
    pub fn region(&self) -> &CloudRegion {
        &self.region
    }
}

impl FromStr for CloudZone {
    type Err = Status;

    fn from_str(value: &str) -> Result<Self, Status> {
        let segments: Vec<&str> = value.split('-').collect();
        if segments.len() != 3 || segments[2].chars().count() != 1 {
            return Err(Status::invalid_argument(format!("Invalid zone name: {value}")));
        }
        let region = format!("{}-{}", segments[0], segments[1])
            .parse::<CloudRegion>()
            .map_err(|_| Status::invalid_argument(format!("Invalid zone name: {value}")))?;
        let zone_id = segments[2].chars().next().unwrap_or_default();
        Ok(Self { region, zone_id })
    }
}

impl fmt::Display for CloudZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.region, self.zone_id)
    }
}

/// Either a region or a zone, distinguished by segment count.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Location {
    Region(CloudRegion),
    Zone(CloudZone),
}

impl FromStr for Location {
    type Err = Status;

    fn from_str(value: &str) -> Result<Self, Status> {
        match value.split('-').count() {
            2 => Ok(Location::Region(value.parse()?)),
            3 => Ok(Location::Zone(value.parse()?)),
            _ => Err(Status::invalid_argument(format!("Invalid location name: {value}"))),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Region(region) => region.fmt(f),
            Location::Zone(zone) => zone.fmt(f),
        }
    }
}

/// Fully qualified topic resource name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TopicName {
    pub project: String,
    pub location: Location,
    pub name: String,
}

impl TopicName {
    pub fn new(project: impl Into<String>, location: Location, name: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            location,
            name: name.into(),
        }
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/topics/{}",
            self.project, self.location, self.name
        )
    }
}

#[cfg(test)]
mod tests {
    use loglite_gax::grpc::Code;

    use super::{CloudRegion, CloudZone, Location, TopicName};

    #[test]
    fn test_valid_region() {
        let region: CloudRegion = "us-central1".parse().unwrap();
        assert_eq!(region.to_string(), "us-central1");
    }

    #[test]
    fn test_region_with_three_segments_is_invalid() {
        let err = "first-second-third".parse::<CloudRegion>().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().contains("Invalid region"));
    }

    #[test]
    fn test_valid_zone() {
        let zone: CloudZone = "europe-west1-b".parse().unwrap();
        assert_eq!(zone.to_string(), "europe-west1-b");
        assert_eq!(zone.region().as_str(), "europe-west1");
    }

    #[test]
    fn test_zone_with_long_suffix_is_invalid() {
        let err = "first-second-notaletter".parse::<CloudZone>().unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(err.message().contains("Invalid zone"));
    }

    #[test]
    fn test_location_by_segment_count() {
        assert!(matches!("us-east4".parse::<Location>().unwrap(), Location::Region(_)));
        assert!(matches!("us-east4-c".parse::<Location>().unwrap(), Location::Zone(_)));
        assert!("useast".parse::<Location>().is_err());
        assert!("a-b-c-d".parse::<Location>().is_err());
    }

    #[test]
    fn test_topic_name_format() {
        let topic = TopicName::new("my-project", "us-central1-a".parse().unwrap(), "events");
        assert_eq!(
            topic.to_string(),
            "projects/my-project/locations/us-central1-a/topics/events"
        );
    }
}
