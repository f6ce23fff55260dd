//! reqwest-backed sessions with homepage cookie seeding.
//!
//! Exchange archives reject requests that arrive without the cookies their
//! homepage sets, so every new session first GETs the homepage with
//! browser-like headers and keeps the resulting cookie jar.

use super::transport::{HttpResponse, HttpSession, SessionFactory, TransportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;

/// Browser identity sent to the exchange sites.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36";

/// Everything needed to open a session against one exchange.
#[derive(Debug, Clone)]
pub struct SessionProfile {
    /// Log label, e.g. the source id.
    pub label: String,
    /// Page fetched to seed cookies.
    pub home_url: String,
    /// Default headers for every request.
    pub headers: Vec<(String, String)>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Timeout for the seeding request.
    pub seed_timeout: Duration,
    /// Pause after seeding before the first real request.
    pub seed_pause: Duration,
}

impl SessionProfile {
    /// Headers for archive downloads (HTML/XLS/ZIP).
    pub fn browser_headers(user_agent: &str, referer: &str) -> Vec<(String, String)> {
        vec![
            ("User-Agent".into(), user_agent.into()),
            (
                "Accept".into(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
            ),
            ("Accept-Language".into(), "en-US,en;q=0.9".into()),
            ("Connection".into(), "keep-alive".into()),
            ("Referer".into(), referer.into()),
        ]
    }

    /// Headers for the JSON APIs.
    pub fn api_headers(user_agent: &str, referer: &str) -> Vec<(String, String)> {
        vec![
            ("User-Agent".into(), user_agent.into()),
            ("Accept".into(), "application/json, text/plain, */*".into()),
            ("Referer".into(), referer.into()),
        ]
    }
}

/// Opens cookie-seeded reqwest sessions.
pub struct ReqwestSessionFactory {
    profile: SessionProfile,
}

impl ReqwestSessionFactory {
    pub fn new(profile: SessionProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SessionProfile {
        &self.profile
    }

    fn header_map(&self) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.profile.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Other(format!("invalid header value: {e}")))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    fn seed(&self, client: &reqwest::blocking::Client) {
        let label = &self.profile.label;
        tracing::info!(source = %label, url = %self.profile.home_url, "seeding cookies");
        match client
            .get(&self.profile.home_url)
            .timeout(self.profile.seed_timeout)
            .send()
        {
            Ok(resp) => {
                tracing::info!(source = %label, status = resp.status().as_u16(), "cookie seed done")
            }
            Err(e) => tracing::warn!(source = %label, error = %e, "cookie seed failed"),
        }
        if !self.profile.seed_pause.is_zero() {
            std::thread::sleep(self.profile.seed_pause);
        }
    }
}

impl SessionFactory for ReqwestSessionFactory {
    type Session = ReqwestSession;

    fn label(&self) -> &str {
        &self.profile.label
    }

    fn open(&self) -> Result<ReqwestSession, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .default_headers(self.header_map()?)
            .timeout(self.profile.timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        self.seed(&client);
        Ok(ReqwestSession { client })
    }
}

/// A live session: one reqwest client with its own cookie jar.
pub struct ReqwestSession {
    client: reqwest::blocking::Client,
}

impl HttpSession for ReqwestSession {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        let resp = self.client.get(url).send().map_err(classify)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().map_err(classify)?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

fn classify(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(headers: Vec<(String, String)>) -> SessionProfile {
        SessionProfile {
            label: "TEST".into(),
            home_url: "http://127.0.0.1:9".into(),
            headers,
            timeout: Duration::from_secs(1),
            seed_timeout: Duration::from_millis(200),
            seed_pause: Duration::ZERO,
        }
    }

    #[test]
    fn builds_header_map_from_profile() {
        let factory = ReqwestSessionFactory::new(profile(SessionProfile::api_headers(
            DEFAULT_USER_AGENT,
            "https://www.nseindia.com",
        )));
        let map = factory.header_map().unwrap();
        assert_eq!(map.get("referer").unwrap(), "https://www.nseindia.com");
        assert_eq!(
            map.get("accept").unwrap(),
            "application/json, text/plain, */*"
        );
    }

    #[test]
    fn rejects_invalid_header_names() {
        let factory =
            ReqwestSessionFactory::new(profile(vec![("bad header".into(), "x".into())]));
        assert!(matches!(
            factory.header_map(),
            Err(TransportError::Other(_))
        ));
    }

    #[test]
    fn seed_failure_still_opens_a_session() {
        // Port 9 (discard) refuses connections locally; seeding warns and carries on.
        let factory = ReqwestSessionFactory::new(profile(SessionProfile::browser_headers(
            DEFAULT_USER_AGENT,
            "https://www.bseindia.com",
        )));
        assert!(factory.open().is_ok());
    }
}
