//! Client info and candidate server discovery
//!
//! The client config endpoint answers with an XML document whose `<client>`
//! element carries the public IP, coordinates and ISP. The server list
//! endpoint answers with a JSON array in which coordinates and ids are
//! usually strings.

use crate::{
    defaults,
    error::{AppError, Result},
    logging::Logger,
    models::{CandidateList, Config, Server, UserInfo},
};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::{collections::HashMap, sync::OnceLock};

/// Source of the measuring host's identity and the candidate servers
#[async_trait]
pub trait ServerDiscovery: Send + Sync {
    async fn fetch_user_info(&self) -> Result<UserInfo>;

    /// Fetch candidates; distances are recomputed when `user` is known
    async fn fetch_servers(&self, user: Option<&UserInfo>) -> Result<CandidateList>;
}

/// Discovery over the speedtest.net HTTP endpoints
pub struct HttpDiscovery {
    client: Client,
    config_url: String,
    servers_url: String,
    logger: Logger,
}

impl HttpDiscovery {
    pub fn new(config: &Config, logger: Logger) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(defaults::USER_AGENT)
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config_url: config.config_url.clone(),
            servers_url: config.servers_url.clone(),
            logger,
        })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ServerDiscovery for HttpDiscovery {
    async fn fetch_user_info(&self) -> Result<UserInfo> {
        let body = self.get_text(&self.config_url).await?;
        let user = parse_client_config(&body)?;

        self.logger
            .debug("User info fetched")
            .field("ip", &user.ip)
            .field("isp", &user.isp)
            .log()
            .await;
        Ok(user)
    }

    async fn fetch_servers(&self, user: Option<&UserInfo>) -> Result<CandidateList> {
        let body = self
            .get_text(&self.servers_url)
            .await
            .map_err(|e| AppError::discovery(format!("{}: {}", self.servers_url, e)))?;
        let servers = parse_server_list(&body).map_err(|e| AppError::discovery(e.to_string()))?;

        let discovered = servers.len();
        let mut candidates = CandidateList::from_discovered(servers);
        if let Some(user) = user {
            candidates.update_distances(user);
        }

        if candidates.len() < discovered {
            self.logger
                .warn("Duplicate server ids dropped")
                .field("discovered", discovered)
                .field("kept", candidates.len())
                .log()
                .await;
        }

        self.logger
            .info("Server list fetched")
            .field("servers", candidates.len())
            .log()
            .await;
        Ok(candidates)
    }
}

/// `<client .../>` element and its `name="value"` attributes, compiled once
static CLIENT_PATTERNS: OnceLock<std::result::Result<(Regex, Regex), regex::Error>> = OnceLock::new();

fn client_patterns() -> Result<&'static (Regex, Regex)> {
    CLIENT_PATTERNS
        .get_or_init(|| {
            Ok((
                Regex::new(r"<client\s+([^>]*?)/?>")?,
                Regex::new(r#"(\w+)\s*=\s*"([^"]*)""#)?,
            ))
        })
        .as_ref()
        .map_err(|e| AppError::internal(e.to_string()))
}

/// Extract user info from the `<client .../>` element of the config document
pub fn parse_client_config(xml: &str) -> Result<UserInfo> {
    let (element, attribute) = client_patterns()?;

    let attrs = element
        .captures(xml)
        .and_then(|c| c.get(1))
        .ok_or_else(|| AppError::parse("client element missing from config document"))?
        .as_str();

    let values: HashMap<&str, &str> = attribute
        .captures_iter(attrs)
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let field = |name: &str| {
        values
            .get(name)
            .copied()
            .ok_or_else(|| AppError::parse(format!("client element has no '{}' attribute", name)))
    };

    Ok(UserInfo {
        ip: field("ip")?.to_string(),
        lat: field("lat")?.trim().parse()?,
        lon: field("lon")?.trim().parse()?,
        isp: field("isp").unwrap_or_default().to_string(),
    })
}

/// Numbers the server list sends either quoted or bare
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    fn into_id(self) -> String {
        match self {
            Self::Number(v) if v.fract() == 0.0 => format!("{}", v as i64),
            Self::Number(v) => v.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerEntry {
    id: Loose,
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    host: String,
    lat: Option<Loose>,
    lon: Option<Loose>,
    distance: Option<Loose>,
}

/// Parse the JSON server list in discovery order
pub fn parse_server_list(json: &str) -> Result<Vec<Server>> {
    let entries: Vec<ServerEntry> = serde_json::from_str(json)?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            let mut server = Server::new(entry.id.into_id(), entry.name, entry.url);
            server.country = entry.country;
            server.sponsor = entry.sponsor;
            server.host = entry.host;
            server.lat = entry.lat.and_then(|v| v.as_f64()).unwrap_or_default();
            server.lon = entry.lon.and_then(|v| v.as_f64()).unwrap_or_default();
            server.distance_km = entry.distance.and_then(|v| v.as_f64()).unwrap_or_default();
            server
        })
        .collect())
}
