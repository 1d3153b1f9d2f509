//! Candidate filtering, probing and ranking

use super::prober::LatencyProber;
use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::{CandidateList, Config, Server},
};
use futures::future::join_all;
use std::cmp::Ordering;

/// Selection settings
#[derive(Debug, Clone, Default)]
pub struct SelectionConfig {
    /// Restrict selection to these ids; empty means every candidate
    pub server_ids: Vec<String>,
    /// How many of the nearest candidates get probed
    pub probe_subset: usize,
    /// Round trips per candidate
    pub ping_count: u32,
}

impl From<&Config> for SelectionConfig {
    fn from(config: &Config) -> Self {
        Self {
            server_ids: config.server_ids.clone(),
            probe_subset: config.probe_subset,
            ping_count: config.selection_ping_count,
        }
    }
}

pub struct ServerSelector {
    prober: LatencyProber,
    config: SelectionConfig,
    logger: Logger,
}

impl ServerSelector {
    pub fn new(prober: LatencyProber, config: SelectionConfig, logger: Logger) -> Self {
        Self { prober, config, logger }
    }

    /// Rank reachable candidates by latency, then distance, and keep up to `max_count`.
    ///
    /// `max_count` of 0 keeps the single best server, or every requested
    /// server when explicit ids were given.
    pub async fn select(&self, candidates: &CandidateList, max_count: usize) -> Result<Vec<Server>> {
        let explicit = !self.config.server_ids.is_empty();
        let pool = if explicit {
            self.filter_explicit(candidates).await?
        } else {
            candidates.nearest(self.config.probe_subset.max(1))
        };

        if pool.is_empty() {
            return Err(AppError::selection("no candidate servers available"));
        }

        self.logger
            .info("Probing candidates")
            .field("candidates", pool.len())
            .field("ping_count", self.config.ping_count)
            .log()
            .await;

        let probes = join_all(pool.into_iter().map(|mut server| async move {
            let result = self.prober.probe_into(&mut server, self.config.ping_count).await;
            (server, result)
        }))
        .await;

        let mut reachable = Vec::with_capacity(probes.len());
        for (server, result) in probes {
            match result {
                Ok(_) => reachable.push(server),
                Err(error) => {
                    self.logger
                        .warn("Candidate excluded")
                        .server(&server)
                        .error_info(&error)
                        .field("error", error.to_string())
                        .log()
                        .await;
                }
            }
        }

        if reachable.is_empty() {
            return Err(AppError::selection("no reachable server among the probed candidates"));
        }

        rank(&mut reachable);

        let limit = match max_count {
            0 if explicit => reachable.len(),
            0 => 1,
            n => n,
        };
        reachable.truncate(limit);

        self.logger
            .info("Servers selected")
            .field("selected", reachable.iter().map(|s| s.id.as_str()).collect::<Vec<_>>())
            .log()
            .await;

        Ok(reachable)
    }

    async fn filter_explicit(&self, candidates: &CandidateList) -> Result<Vec<Server>> {
        let filtered = candidates.retain_ids(&self.config.server_ids);

        let missing: Vec<&String> = self
            .config
            .server_ids
            .iter()
            .filter(|id| !filtered.contains(id))
            .collect();
        if !missing.is_empty() {
            self.logger
                .warn("Requested servers not in candidate list")
                .field("missing", &missing)
                .log()
                .await;
        }

        if filtered.is_empty() {
            return Err(AppError::selection(format!(
                "none of the requested servers were found: {}",
                self.config.server_ids.join(", ")
            )));
        }
        Ok(filtered.into_iter().collect())
    }
}

/// Ascending latency, ties broken by ascending distance; unprobed servers last
pub fn rank(servers: &mut [Server]) {
    servers.sort_by(|a, b| match (a.latency, b.latency) {
        (Some(la), Some(lb)) => la.cmp(&lb).then_with(|| a.distance_km.total_cmp(&b.distance_km)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.distance_km.total_cmp(&b.distance_km),
    });
}
