//! Public IP detection.

use crate::error::{DdnsError, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Source of the machine's current public address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IpSource: Send + Sync {
    /// Resolve the current public IP.
    async fn current_ip(&self) -> Result<IpAddr>;
}

/// IP detector with fallback services.
pub struct IpDetector {
    client: reqwest::Client,
    services: Vec<String>,
}

impl IpDetector {
    /// Create a detector for the given services and request timeout.
    pub fn new(services: Vec<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, services })
    }

    /// Try a single IP detection service.
    async fn try_service(&self, url: &str) -> Result<IpAddr> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DdnsError::IpDetection(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let text = response.text().await?;
        let ip_str = text.trim();

        ip_str
            .parse()
            .map_err(|_| DdnsError::IpDetection(format!("Invalid IP response: {:?}", ip_str)))
    }
}

#[async_trait]
impl IpSource for IpDetector {
    async fn current_ip(&self) -> Result<IpAddr> {
        for service in &self.services {
            match self.try_service(service).await {
                Ok(ip) => {
                    tracing::debug!("Detected {} from {}", ip, service);
                    return Ok(ip);
                }
                Err(e) => {
                    tracing::warn!("cannot get current ip via {}: {}", service, e);
                }
            }
        }

        Err(DdnsError::IpDetection(
            "All IP detection services failed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn detector(services: Vec<String>) -> IpDetector {
        IpDetector::new(services, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_body_is_trimmed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("5.6.7.8\r\n"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let ip = assert_ok!(
            detector(vec![format!("{}/ip", mock_server.uri())])
                .current_ip()
                .await
        );
        assert_eq!(ip, "5.6.7.8".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_falls_back_to_next_service() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ip"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2001:db8::1"))
            .mount(&mock_server)
            .await;

        let uri = mock_server.uri();
        let ip = assert_ok!(
            detector(vec![
                format!("{}/down", uri),
                format!("{}/garbage", uri),
                format!("{}/ip", uri),
            ])
            .current_ip()
            .await
        );
        assert!(ip.is_ipv6());
    }

    #[tokio::test]
    async fn test_all_services_failing_is_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let err = assert_err!(
            detector(vec![format!("{}/ip", mock_server.uri())])
                .current_ip()
                .await
        );
        assert!(matches!(err, DdnsError::IpDetection(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_error() {
        // Port 9 (discard) on localhost is not listening in test environments.
        let result = detector(vec!["http://127.0.0.1:9/ip".to_string()])
            .current_ip()
            .await;
        assert!(result.is_err());
    }
}
