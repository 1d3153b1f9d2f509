//! Machine-readable report

use crate::{error::Result, models::RunReport};

/// Serialize the whole run as one JSON object
pub fn render_json(report: &RunReport, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(report)?
    } else {
        serde_json::to_string(report)?
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AverageResult, Server, SessionRecord, SessionStage, UserInfo};
    use crate::types::MeasurementMode;
    use serde_json::Value;
    use std::time::Duration;

    #[test]
    fn test_report_shape() {
        let mut report = RunReport::new(Some(UserInfo {
            ip: "198.51.100.1".into(),
            lat: 1.0,
            lon: 2.0,
            isp: "ISP".into(),
        }));

        let mut ok = Server::new("1", "A", "http://a/upload.php");
        ok.latency = Some(Duration::from_millis(10));
        ok.download_mbps = Some(90.0);
        ok.upload_mbps = Some(9.0);
        report.servers.push(SessionRecord::completed(ok, MeasurementMode::Full, Vec::new()));
        report.servers.push(SessionRecord::failed(
            Server::new("2", "B", "http://b/upload.php"),
            MeasurementMode::Full,
            SessionStage::Probing,
            "Server 2 unreachable".into(),
        ));
        report.average = Some(AverageResult {
            download_mbps: 90.0,
            upload_mbps: 9.0,
            server_count: 1,
        });

        let value: Value = serde_json::from_str(&render_json(&report, false).unwrap()).unwrap();
        assert!(value["timestamp"].is_string());
        assert_eq!(value["user_info"]["IP"], "198.51.100.1");
        assert_eq!(value["servers"][0]["id"], "1");
        assert_eq!(value["servers"][0]["dl_speed"], 90.0);
        assert_eq!(value["servers"][0]["latency_ms"], 10.0);
        assert_eq!(value["servers"][0]["status"], "completed");
        assert_eq!(value["servers"][1]["status"], "failed");
        assert_eq!(value["servers"][1]["failed_stage"], "probing");
        assert_eq!(value["average"]["server_count"], 1);
    }

    #[test]
    fn test_report_round_trips() {
        let report = RunReport::new(None);
        let json = render_json(&report, true).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert!(parsed.user_info.is_none());
        assert!(parsed.servers.is_empty());
    }
}
