//! Speed test server, user info and candidate list models

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Public address and location of the measuring host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(rename = "IP")]
    pub ip: String,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
    #[serde(rename = "Isp")]
    pub isp: String,
}

impl fmt::Display for UserInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) [{}, {}]", self.ip, self.isp, self.lat, self.lon)
    }
}

/// A candidate speed test endpoint and everything measured against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    pub host: String,
    /// Upload endpoint; download and latency resources live next to it
    pub url: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "distance")]
    pub distance_km: f64,
    #[serde(rename = "latency_ms", with = "duration_ms", default)]
    pub latency: Option<Duration>,
    #[serde(rename = "jitter_ms", with = "duration_ms", default)]
    pub jitter: Option<Duration>,
    #[serde(rename = "dl_speed", default)]
    pub download_mbps: Option<f64>,
    #[serde(rename = "ul_speed", default)]
    pub upload_mbps: Option<f64>,
}

impl Server {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: String::new(),
            sponsor: String::new(),
            host: String::new(),
            url: url.into(),
            lat: 0.0,
            lon: 0.0,
            distance_km: 0.0,
            latency: None,
            jitter: None,
            download_mbps: None,
            upload_mbps: None,
        }
    }

    pub fn with_location(mut self, country: &str, sponsor: &str, distance_km: f64) -> Self {
        self.country = country.to_string();
        self.sponsor = sponsor.to_string();
        self.distance_km = distance_km;
        self
    }

    /// Great-circle distance from the given coordinates in kilometres
    pub fn distance_from(&self, lat: f64, lon: f64) -> f64 {
        haversine_km(lat, lon, self.lat, self.lon)
    }

    pub fn latency_ms(&self) -> Option<f64> {
        self.latency.map(|d| d.as_secs_f64() * 1000.0)
    }

    /// Base URL for latency and download resources: the upload URL minus its file name
    pub fn base_url(&self) -> String {
        let path_start = self.url.find("://").map(|i| i + 3).unwrap_or(0);
        match self.url[path_start..].rfind('/') {
            Some(idx) => self.url[..path_start + idx].to_string(),
            None => self.url.clone(),
        }
    }

    /// Drop every measured value so the server can be tested again
    pub fn clear_measurements(&mut self) {
        self.latency = None;
        self.jitter = None;
        self.download_mbps = None;
        self.upload_mbps = None;
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>4}] {:8.2}km {} ({}) by {}",
            self.id, self.distance_km, self.name, self.country, self.sponsor
        )
    }
}

/// Haversine distance between two coordinates in kilometres
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Discovery-ordered servers with unique identifiers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CandidateList {
    servers: Vec<Server>,
}

impl CandidateList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from discovery output, keeping the first occurrence of each id
    pub fn from_discovered(servers: Vec<Server>) -> Self {
        let mut seen = HashSet::new();
        let servers = servers
            .into_iter()
            .filter(|s| seen.insert(s.id.clone()))
            .collect();
        Self { servers }
    }

    /// Append a server, rejecting duplicate identifiers
    pub fn try_push(&mut self, server: Server) -> Result<()> {
        if self.contains(&server.id) {
            return Err(AppError::config(format!("Duplicate server id: {}", server.id)));
        }
        self.servers.push(server);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.servers.iter().any(|s| s.id == id)
    }

    pub fn get(&self, id: &str) -> Option<&Server> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Server> {
        self.servers.iter()
    }

    pub fn as_slice(&self) -> &[Server] {
        &self.servers
    }

    /// Keep only the listed ids, preserving discovery order
    pub fn retain_ids(&self, ids: &[String]) -> CandidateList {
        Self {
            servers: self
                .servers
                .iter()
                .filter(|s| ids.iter().any(|id| id == &s.id))
                .cloned()
                .collect(),
        }
    }

    /// The `count` closest servers, nearest first
    pub fn nearest(&self, count: usize) -> Vec<Server> {
        let mut sorted = self.servers.clone();
        sorted.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        sorted.truncate(count);
        sorted
    }

    /// Recompute every distance from the measuring host's coordinates
    pub fn update_distances(&mut self, user: &UserInfo) {
        for server in &mut self.servers {
            server.distance_km = server.distance_from(user.lat, user.lon);
        }
    }
}

impl IntoIterator for CandidateList {
    type Item = Server;
    type IntoIter = std::vec::IntoIter<Server>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.into_iter()
    }
}

/// Optional durations serialized as fractional milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_secs_f64() * 1000.0)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<f64>::deserialize(deserializer)?;
        Ok(ms
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| Duration::from_secs_f64(v / 1000.0)))
    }
}
