// src/fetch/mod.rs
//! Remote fetcher: endpoint resolution, bounded retry, payload decoding.

pub mod archive;
pub mod source;
pub mod urls;

use regex::Regex;
use std::collections::HashMap;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::{Endpoints, RetryConfig};
use crate::error::{DashboardError, Result, TransportError};
use crate::process::GeoShapes;
use crate::schema::{DatasetKind, Period};

pub use source::{HttpSource, ReqwestSource};

/// Untyped records exactly as decoded from the upstream file.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub kind: DatasetKind,
    pub period: Period,
    /// URL, plus `#entry` when the table came out of an archive.
    pub source: String,
    /// Every CSV record, header row included and not yet located.
    pub records: Vec<Vec<String>>,
}

impl RawDataset {
    pub fn from_csv(
        kind: DatasetKind,
        period: Period,
        source: impl Into<String>,
        data: &[u8],
    ) -> Result<Self> {
        let source = source.into();
        let records = archive::read_records(data)
            .map_err(|e| DashboardError::schema(kind, format!("{:#} ({})", e, source)))?;
        Ok(Self {
            kind,
            period,
            source,
            records,
        })
    }
}

/// Outcome of a fetch that reached the upstream.
#[derive(Debug)]
pub enum Fetched<T> {
    Data(T),
    /// Upstream has nothing for the requested period.
    Empty,
}

impl<T> Fetched<T> {
    pub fn into_data(self, kind: DatasetKind, period: Period) -> Result<T> {
        match self {
            Fetched::Data(d) => Ok(d),
            Fetched::Empty => Err(DashboardError::EmptyResult { kind, period }),
        }
    }
}

pub struct Fetcher<S> {
    source: S,
    endpoints: Endpoints,
    entry_patterns: HashMap<DatasetKind, Regex>,
    retry: RetryConfig,
}

impl<S: HttpSource> Fetcher<S> {
    pub fn new(source: S, endpoints: Endpoints, retry: RetryConfig) -> anyhow::Result<Self> {
        let mut entry_patterns = HashMap::new();
        for kind in [
            DatasetKind::Enrollment,
            DatasetKind::Penetration,
            DatasetKind::Ratebook,
            DatasetKind::Geography,
        ] {
            let pattern = &endpoints.get(kind).entry_pattern;
            let re = Regex::new(pattern).map_err(|e| {
                anyhow::anyhow!("invalid entry_pattern for {}: {}", kind, e)
            })?;
            entry_patterns.insert(kind, re);
        }
        Ok(Self {
            source,
            endpoints,
            entry_patterns,
            retry,
        })
    }

    #[cfg(test)]
    pub(crate) fn source(&self) -> &S {
        &self.source
    }

    /// GET with the configured retry budget. `Ok(None)` means HTTP 404.
    async fn get_with_retry(&self, kind: DatasetKind, url: &str) -> Result<Option<Vec<u8>>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.source.get(url).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(e) if e.is_not_found() => {
                    info!(%url, "not published (404)");
                    return Ok(None);
                }
                Err(e) if attempt < self.retry.attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%url, attempt, delay_ms = delay.as_millis() as u64, error = %e, "Retrying");
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(%url, attempt, error = %e, "Exhausted retries");
                    return Err(DashboardError::Fetch {
                        kind,
                        url: url.to_string(),
                        attempts: attempt,
                        source: e,
                    });
                }
            }
        }
    }

    /// The download URL for `kind` in `period`; `None` if a listing page has no link for it.
    async fn resolve_url(&self, kind: DatasetKind, period: Period) -> Result<Option<String>> {
        let endpoint = self.endpoints.get(kind);
        let url = urls::expand(&endpoint.url, period);
        let Some(link_pattern) = &endpoint.link_pattern else {
            return Ok(Some(url));
        };

        let pattern = Regex::new(&urls::expand(link_pattern, period)).map_err(|e| {
            DashboardError::InvalidRequest(format!("invalid link_pattern for {}: {}", kind, e))
        })?;
        let base = Url::parse(&url).map_err(|e| {
            DashboardError::InvalidRequest(format!("invalid listing url {}: {}", url, e))
        })?;
        let Some(page) = self.get_with_retry(kind, &url).await? else {
            return Ok(None);
        };

        let link = urls::find_zip_link(&String::from_utf8_lossy(&page), &base, &pattern);
        debug!(listing = %url, link = ?link, "resolved listing link");
        Ok(link)
    }

    /// Fetch one tabular dataset for `period`.
    #[instrument(level = "info", skip(self, period), fields(period = %period))]
    pub async fn fetch_table(
        &self,
        kind: DatasetKind,
        period: Period,
    ) -> Result<Fetched<RawDataset>> {
        if kind == DatasetKind::Geography {
            return Err(DashboardError::InvalidRequest(
                "geography is not a tabular dataset".to_string(),
            ));
        }

        let Some(url) = self.resolve_url(kind, period).await? else {
            return Ok(Fetched::Empty);
        };
        let Some(bytes) = self.get_with_retry(kind, &url).await? else {
            return Ok(Fetched::Empty);
        };

        let raw = if archive::is_zip(&bytes) {
            let pattern = &self.entry_patterns[&kind];
            let entry = archive::extract_entry(&bytes, pattern)
                .map_err(|e| DashboardError::schema(kind, format!("{:#} ({})", e, url)))?;
            let Some((name, data)) = entry else {
                return Err(DashboardError::schema(
                    kind,
                    format!("no archive entry matching {} in {}", pattern, url),
                ));
            };
            RawDataset::from_csv(kind, period, format!("{}#{}", url, name), &data)?
        } else {
            RawDataset::from_csv(kind, period, url, &bytes)?
        };

        if raw.records.is_empty() {
            info!(source = %raw.source, "no records");
            return Ok(Fetched::Empty);
        }
        info!(source = %raw.source, records = raw.records.len(), "fetched");
        Ok(Fetched::Data(raw))
    }

    /// Fetch county boundaries. Geometry is period-independent.
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_geography(&self) -> Result<GeoShapes> {
        let kind = DatasetKind::Geography;
        let url = self.endpoints.get(kind).url.clone();
        let Some(bytes) = self.get_with_retry(kind, &url).await? else {
            return Err(DashboardError::Fetch {
                kind,
                url,
                attempts: 1,
                source: TransportError::Status(404),
            });
        };

        let payload = if archive::is_zip(&bytes) {
            let pattern = &self.entry_patterns[&kind];
            archive::extract_entry(&bytes, pattern)
                .map_err(|e| DashboardError::schema(kind, format!("{:#}", e)))?
                .map(|(_, data)| data)
                .ok_or_else(|| {
                    DashboardError::schema(kind, format!("no archive entry matching {}", pattern))
                })?
        } else {
            bytes
        };

        let shapes = GeoShapes::from_geojson(&payload)
            .map_err(|e| DashboardError::schema(kind, format!("{:#} ({})", e, url)))?;
        info!(counties = shapes.len(), "fetched county shapes");
        Ok(shapes)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves canned responses by URL and counts requests.
    #[derive(Default)]
    pub(crate) struct FixtureSource {
        responses: Mutex<HashMap<String, Vec<std::result::Result<Vec<u8>, u16>>>>,
        pub calls: AtomicUsize,
    }

    impl FixtureSource {
        /// Queue responses for `url`; the last one repeats once the queue drains.
        pub(crate) fn with(
            self,
            url: &str,
            responses: Vec<std::result::Result<Vec<u8>, u16>>,
        ) -> Self {
            self.responses
                .lock()
                .unwrap()
                .insert(url.to_string(), responses);
            self
        }
    }

    #[async_trait]
    impl HttpSource for FixtureSource {
        async fn get(&self, url: &str) -> std::result::Result<Vec<u8>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut map = self.responses.lock().unwrap();
            let queue = match map.get_mut(url) {
                Some(q) if !q.is_empty() => q,
                _ => return Err(TransportError::Status(404)),
            };
            let next = if queue.len() > 1 {
                queue.remove(0)
            } else {
                queue[0].clone()
            };
            next.map_err(TransportError::Status)
        }
    }

    pub(crate) fn test_endpoints() -> Endpoints {
        let ep = |url: &str, entry: &str| EndpointConfig {
            url: url.to_string(),
            link_pattern: None,
            entry_pattern: entry.to_string(),
        };
        Endpoints {
            enrollment: ep("http://cms.test/enrollment-{year}-{month}.zip", r"(?i)enrollment.*\.csv$"),
            penetration: ep("http://cms.test/penetration-{year}-{month}.csv", r"\.csv$"),
            ratebook: ep("http://cms.test/ratebook-{year}.zip", r"(?i)ratebook.*\.csv$"),
            geography: ep("http://census.test/counties.json", r"\.json$"),
        }
    }

    pub(crate) fn fast_retry() -> RetryConfig {
        RetryConfig {
            attempts: 3,
            initial_backoff_ms: 1,
            timeout_secs: 1,
        }
    }

    const JAN: Period = Period { year: 2023, month: 1 };

    #[tokio::test]
    async fn extracts_enrollment_from_archive() -> anyhow::Result<()> {
        let zip = archive::tests::zip_bytes(&[
            ("CPSC_Contract_Info_2023_01.csv", "Contract ID\nH1234\n"),
            (
                "CPSC_Enrollment_Info_2023_01.csv",
                "Contract Number,Plan ID,State,County,Enrollment\nH1234,001,IL,Cook,500\n",
            ),
        ]);
        let source = FixtureSource::default().with("http://cms.test/enrollment-2023-01.zip", vec![Ok(zip)]);
        let fetcher = Fetcher::new(source, test_endpoints(), fast_retry())?;

        let raw = fetcher
            .fetch_table(DatasetKind::Enrollment, JAN)
            .await?
            .into_data(DatasetKind::Enrollment, JAN)?;

        assert_eq!(raw.kind, DatasetKind::Enrollment);
        assert_eq!(raw.period, JAN);
        assert!(raw.source.ends_with("#CPSC_Enrollment_Info_2023_01.csv"));
        assert_eq!(raw.records.len(), 2);
        assert_eq!(raw.records[1][3], "Cook");
        Ok(())
    }

    #[tokio::test]
    async fn retries_then_succeeds() -> anyhow::Result<()> {
        let url = "http://cms.test/penetration-2023-01.csv";
        let source = FixtureSource::default().with(
            url,
            vec![Err(503), Err(500), Ok(b"State Name,County Name\nIllinois,Cook\n".to_vec())],
        );
        let fetcher = Fetcher::new(source, test_endpoints(), fast_retry())?;

        let fetched = fetcher.fetch_table(DatasetKind::Penetration, JAN).await?;

        assert!(matches!(fetched, Fetched::Data(_)));
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn gives_up_after_retry_budget() -> anyhow::Result<()> {
        let url = "http://cms.test/penetration-2023-01.csv";
        let source = FixtureSource::default().with(url, vec![Err(503)]);
        let fetcher = Fetcher::new(source, test_endpoints(), fast_retry())?;

        let err = fetcher
            .fetch_table(DatasetKind::Penetration, JAN)
            .await
            .unwrap_err();

        match err {
            DashboardError::Fetch {
                kind,
                attempts,
                source: TransportError::Status(503),
                ..
            } => {
                assert_eq!(kind, DatasetKind::Penetration);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn unpublished_period_is_empty_not_an_error() -> anyhow::Result<()> {
        let fetcher = Fetcher::new(FixtureSource::default(), test_endpoints(), fast_retry())?;

        let fetched = fetcher.fetch_table(DatasetKind::Enrollment, JAN).await?;

        assert!(matches!(fetched, Fetched::Empty));
        // 404 is not retried
        assert_eq!(fetcher.source.calls.load(Ordering::SeqCst), 1);
        let err = fetched.into_data(DatasetKind::Enrollment, JAN).unwrap_err();
        assert!(matches!(err, DashboardError::EmptyResult { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn archive_without_expected_entry_is_schema_error() -> anyhow::Result<()> {
        let zip = archive::tests::zip_bytes(&[("notes.txt", "nothing here")]);
        let source = FixtureSource::default().with("http://cms.test/ratebook-2023.zip", vec![Ok(zip)]);
        let fetcher = Fetcher::new(source, test_endpoints(), fast_retry())?;

        let err = fetcher
            .fetch_table(DatasetKind::Ratebook, JAN)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Schema { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn resolves_link_from_listing_page() -> anyhow::Result<()> {
        let mut endpoints = test_endpoints();
        endpoints.ratebook = EndpointConfig {
            url: "http://cms.test/ratebooks/".to_string(),
            link_pattern: Some(r"ratebook-{year}\.zip$".to_string()),
            entry_pattern: r"\.csv$".to_string(),
        };
        let listing = r#"<a href="files/ratebook-2022.zip">2022</a><a href="files/ratebook-2023.zip">2023</a>"#;
        let zip = archive::tests::zip_bytes(&[("rates.csv", "Code,Rate\n14141,1050\n")]);
        let source = FixtureSource::default()
            .with("http://cms.test/ratebooks/", vec![Ok(listing.as_bytes().to_vec())])
            .with("http://cms.test/ratebooks/files/ratebook-2023.zip", vec![Ok(zip)]);
        let fetcher = Fetcher::new(source, endpoints, fast_retry())?;

        let raw = fetcher
            .fetch_table(DatasetKind::Ratebook, JAN)
            .await?
            .into_data(DatasetKind::Ratebook, JAN)?;
        assert_eq!(raw.records[1], vec!["14141", "1050"]);

        let later = Period { year: 2024, month: 1 };
        assert!(matches!(
            fetcher.fetch_table(DatasetKind::Ratebook, later).await?,
            Fetched::Empty
        ));
        Ok(())
    }

    #[tokio::test]
    async fn fetches_geography() -> anyhow::Result<()> {
        let geojson = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"17031","properties":{},"geometry":null}]}"#;
        let source = FixtureSource::default()
            .with("http://census.test/counties.json", vec![Ok(geojson.as_bytes().to_vec())]);
        let fetcher = Fetcher::new(source, test_endpoints(), fast_retry())?;

        let shapes = fetcher.fetch_geography().await?;
        assert_eq!(shapes.len(), 1);
        assert!(shapes.get("17031").is_some());
        Ok(())
    }
}
