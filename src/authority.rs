// 🛰️ External Prioritization Authority - consumed, never required
//
// The authority scores submissions and keeps its own view of the queue,
// keyed by id only (it never sees names). Every call is bounded by the
// client timeout; a failure is terminal for that attempt and the caller
// falls back to local scoring.

use crate::error::{Result, TriageError};
use crate::queue::{EntryScore, RemoteEntry};
use crate::risk::RiskLevel;
use crate::vitals::{Demographics, Intake, VitalSigns};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Flat scoring request, the shape the authority's /predict/ endpoint takes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssessmentRequest {
    pub id: String,
    pub age: f64,
    pub gender: u8,
    pub weight_kg: f64,
    pub height_m: f64,
    pub heart_rate: f64,
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub respiratory_rate: f64,
    pub body_temperature: f64,
    pub oxygen_saturation: f64,
}

impl AssessmentRequest {
    pub fn new(id: &str, intake: &Intake) -> Self {
        let v = &intake.vitals;
        let d = &intake.demographics;
        AssessmentRequest {
            id: id.to_string(),
            age: d.age,
            gender: d.gender,
            weight_kg: d.weight_kg,
            height_m: d.height_m,
            heart_rate: v.heart_rate,
            systolic_bp: v.systolic_bp,
            diastolic_bp: v.diastolic_bp,
            respiratory_rate: v.respiratory_rate,
            body_temperature: v.body_temperature,
            oxygen_saturation: v.oxygen_saturation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorityAssessment {
    #[serde(deserialize_with = "risk_level_any_case")]
    pub risk_level: RiskLevel,
    pub priority_score: f64,
    #[serde(default)]
    pub estimated_wait_time: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

impl AuthorityAssessment {
    pub fn to_score(&self) -> EntryScore {
        EntryScore::authoritative(
            self.risk_level,
            self.priority_score,
            self.confidence_score,
            self.estimated_wait_time.and_then(minutes),
        )
    }
}

/// One entry of the authority's queue. No name: the authority never has one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorityRecord {
    pub id: String,
    #[serde(deserialize_with = "risk_level_any_case")]
    pub risk_level: RiskLevel,
    pub priority_score: f64,
    #[serde(default)]
    pub estimated_wait_time: Option<f64>,
    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub check_in_time: Option<DateTime<Utc>>,
    pub vital_signs: VitalSigns,
    pub demographics: Demographics,
}

impl AuthorityRecord {
    pub fn into_remote(self) -> RemoteEntry {
        let score = EntryScore::authoritative(
            self.risk_level,
            self.priority_score,
            self.confidence_score,
            self.estimated_wait_time.and_then(minutes),
        );
        RemoteEntry {
            id: self.id,
            score,
            vital_signs: self.vital_signs,
            demographics: self.demographics,
            check_in_time: self.check_in_time,
        }
    }
}

fn minutes(raw: f64) -> Option<u32> {
    if raw.is_finite() && raw >= 0.0 {
        Some(raw.round().min(u32::MAX as f64) as u32)
    } else {
        None
    }
}

fn risk_level_any_case<'de, D>(deserializer: D) -> std::result::Result<RiskLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "high" => Ok(RiskLevel::High),
        "medium" | "moderate" => Ok(RiskLevel::Medium),
        "low" => Ok(RiskLevel::Low),
        other => Err(serde::de::Error::custom(format!("unknown risk level {:?}", other))),
    }
}

// ============================================================================
// CONTRACT
// ============================================================================

#[async_trait]
pub trait PriorityAuthority: Send + Sync {
    /// Score one submission
    async fn assess(&self, request: &AssessmentRequest) -> Result<AuthorityAssessment>;

    /// The authority's full current queue
    async fn fetch_queue(&self) -> Result<Vec<AuthorityRecord>>;

    /// Pop the authority's highest-priority entry
    async fn remove_next(&self) -> Result<()>;

    /// Remove one id from the authority's queue
    async fn remove(&self, id: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct HttpAuthority {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| TriageError::Config(format!("invalid authority URL {:?}: {}", base_url, e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        Ok(HttpAuthority {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// /queue/{id} with the id percent-encoded as one path segment
    fn entry_url(&self, id: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url("/queue"))
            .map_err(|e| TriageError::Config(format!("invalid authority URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TriageError::Config(format!("authority URL {} cannot take a path", self.base_url)))?
            .push(id);
        Ok(url)
    }

    fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(TriageError::ExternalService(format!(
                "{} returned status {}",
                what, status
            )))
        }
    }

    async fn delete<U: reqwest::IntoUrl>(&self, url: U, what: &str) -> Result<()> {
        let response = self.client.delete(url).send().await?;
        Self::expect_success(response, what)?;
        Ok(())
    }
}

#[async_trait]
impl PriorityAuthority for HttpAuthority {
    async fn assess(&self, request: &AssessmentRequest) -> Result<AuthorityAssessment> {
        let response = self
            .client
            .post(self.url("/predict/"))
            .json(request)
            .send()
            .await?;

        let response = Self::expect_success(response, "predict")?;
        Ok(response.json::<AuthorityAssessment>().await?)
    }

    async fn fetch_queue(&self) -> Result<Vec<AuthorityRecord>> {
        let response = self.client.get(self.url("/queue")).send().await?;
        let response = Self::expect_success(response, "queue")?;
        Ok(response.json::<Vec<AuthorityRecord>>().await?)
    }

    async fn remove_next(&self) -> Result<()> {
        self.delete(self.url("/queue/next"), "remove next").await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.delete(self.entry_url(id)?, "remove").await
    }

    async fn clear(&self) -> Result<()> {
        self.delete(self.url("/queue"), "clear").await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn sample_intake() -> Intake {
        Intake {
            name: "Never Sent".to_string(),
            vitals: VitalSigns {
                heart_rate: 130.0,
                respiratory_rate: 28.0,
                body_temperature: 39.5,
                oxygen_saturation: 85.0,
                systolic_bp: 190.0,
                diastolic_bp: 100.0,
            },
            demographics: Demographics {
                age: 45.0,
                gender: 1,
                weight_kg: 80.0,
                height_m: 1.8,
            },
        }
    }

    /// Serve exactly one canned HTTP response, returning the base URL
    async fn one_shot_server(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_request_never_carries_name() {
        let request = AssessmentRequest::new("p-1", &sample_intake());
        let wire = serde_json::to_value(&request).unwrap();

        assert_eq!(wire["id"], "p-1");
        assert_eq!(wire["heart_rate"], 130.0);
        assert!(wire.get("name").is_none());
    }

    #[test]
    fn test_assessment_parsing() {
        let parsed: AuthorityAssessment = serde_json::from_value(json!({
            "risk_level": "HIGH",
            "priority_score": 140.0,
            "estimated_wait_time": 4.6
        }))
        .unwrap();

        let score = parsed.to_score();
        assert_eq!(score.risk_level, RiskLevel::High);
        assert_eq!(score.priority_score, 100.0);
        assert_eq!(score.authority_wait_estimate, Some(5));
        assert!(score.risk_score.is_none());
    }

    #[test]
    fn test_unknown_risk_level_is_rejected() {
        let parsed: std::result::Result<AuthorityAssessment, _> = serde_json::from_value(json!({
            "risk_level": "Unknown",
            "priority_score": 50.0
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_record_into_remote() {
        let record: AuthorityRecord = serde_json::from_value(json!({
            "id": "abc",
            "risk_level": "medium",
            "priority_score": 61.5,
            "confidence_score": 0.93,
            "check_in_time": "2026-01-05T10:30:00Z",
            "vital_signs": {
                "heart_rate": 105.0, "respiratory_rate": 18.0, "body_temperature": 37.0,
                "oxygen_saturation": 96.0, "systolic_bp": 150.0, "diastolic_bp": 90.0
            },
            "demographics": { "age": 70.0, "gender": 0, "weight_kg": 65.0, "height_m": 1.6 }
        }))
        .unwrap();

        let remote = record.into_remote();
        assert_eq!(remote.id, "abc");
        assert_eq!(remote.score.risk_level, RiskLevel::Medium);
        assert_eq!(remote.score.confidence_score, 0.93);
        assert!(remote.check_in_time.is_some());
    }

    #[test]
    fn test_entry_url_encodes_id_as_one_segment() {
        let authority =
            HttpAuthority::new("http://127.0.0.1:9/api/", Duration::from_secs(1)).unwrap();

        assert_eq!(
            authority.entry_url("plain-id").unwrap().as_str(),
            "http://127.0.0.1:9/api/queue/plain-id"
        );
        assert_eq!(
            authority.entry_url("a/b?c#d").unwrap().as_str(),
            "http://127.0.0.1:9/api/queue/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpAuthority::new("not a url", Duration::from_secs(1)).err().unwrap();
        assert!(matches!(err, TriageError::Config(_)));
    }

    #[tokio::test]
    async fn test_http_assess_success() {
        let base = one_shot_server(
            "200 OK",
            json!({ "risk_level": "Medium", "priority_score": 55.0 }).to_string(),
        )
        .await;

        let authority = HttpAuthority::new(&base, Duration::from_secs(5)).unwrap();
        let result = authority
            .assess(&AssessmentRequest::new("p-1", &sample_intake()))
            .await
            .unwrap();

        assert_eq!(result.risk_level, RiskLevel::Medium);
        assert_eq!(result.priority_score, 55.0);
    }

    #[tokio::test]
    async fn test_http_error_status_is_external_error() {
        let base = one_shot_server("503 Service Unavailable", String::new()).await;

        let authority = HttpAuthority::new(&base, Duration::from_secs(5)).unwrap();
        let err = authority.fetch_queue().await.unwrap_err();

        assert!(err.is_external());
        assert!(matches!(err, TriageError::ExternalService(_)));
    }

    #[tokio::test]
    async fn test_http_unreachable_is_external_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let authority =
            HttpAuthority::new(&format!("http://{}", addr), Duration::from_secs(2)).unwrap();
        let err = authority.clear().await.unwrap_err();
        assert!(err.is_external());
    }

    #[tokio::test]
    async fn test_http_timeout_is_external_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without answering
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let authority =
            HttpAuthority::new(&format!("http://{}/", addr), Duration::from_millis(300)).unwrap();
        assert_eq!(authority.base_url(), format!("http://{}", addr));

        let err = authority.remove_next().await.unwrap_err();
        assert!(matches!(err, TriageError::Http(ref e) if e.is_timeout()));
    }
}
