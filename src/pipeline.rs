// src/pipeline.rs
//! Request-level orchestration: fetch, normalize, enrich, chart.
//!
//! A `Dashboard` is built once from `Config` and reused for every request. Panels that
//! cannot be drawn come back as `Panel::NoData` or `Panel::Failed`, never as partial charts.

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::chart::{self, ChartSpec, SelectOption};
use crate::config::{Config, RequestConfig};
use crate::enrich::{enrich, EnrichedTable, StateFilter};
use crate::error::{DashboardError, Result};
use crate::fetch::{Fetched, Fetcher, HttpSource, ReqwestSource};
use crate::process::{
    normalize, CanonicalRow, EnrollmentTable, GeoShapes, NormalizedTable, PenetrationTable,
    RatebookTable,
};
use crate::schema::{DatasetKind, Period};

/// One user selection: a reporting month and an optional state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardRequest {
    pub period: Period,
    pub state: StateFilter,
}

impl DashboardRequest {
    pub fn new(year: u16, month: u8, state: &str) -> Result<Self> {
        let period = Period::new(year, month)?;
        let state: StateFilter = state.parse().unwrap_or_default();
        if let StateFilter::Only(code) = &state {
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(DashboardError::InvalidRequest(format!(
                    "state {:?} is not a two-letter code",
                    code
                )));
            }
        }
        Ok(Self { period, state })
    }

    pub fn from_config(request: &RequestConfig) -> Result<Self> {
        Self::new(request.year, request.month, &request.state)
    }
}

/// What the presentation layer shows in one chart slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Panel {
    Chart(ChartSpec),
    NoData { message: String },
    Failed { message: String },
}

impl Panel {
    pub fn from_result(result: Result<ChartSpec>) -> Self {
        match result {
            Ok(spec) => Panel::Chart(spec),
            Err(e) => Panel::from_error(&e),
        }
    }

    pub fn from_error(err: &DashboardError) -> Self {
        match err {
            DashboardError::EmptyResult { .. } => Panel::NoData {
                message: err.to_string(),
            },
            _ => Panel::Failed {
                message: err.to_string(),
            },
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self, Panel::Chart(_))
    }
}

/// Every panel for one request.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub request: DashboardRequest,
    pub state_options: Vec<SelectOption>,
    pub trend: Panel,
    pub map: Panel,
    pub payment: Panel,
    /// Joined table behind the payment panel, kept for export.
    #[serde(skip)]
    pub enriched: Option<EnrichedTable>,
}

pub struct Dashboard<S> {
    fetcher: Fetcher<S>,
    trend_months: usize,
    shapes: OnceCell<GeoShapes>,
}

impl Dashboard<ReqwestSource> {
    /// Dashboard backed by live HTTP.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let source = ReqwestSource::new(&config.retry)?;
        Self::new(config, source)
    }
}

impl<S: HttpSource> Dashboard<S> {
    pub fn new(config: &Config, source: S) -> anyhow::Result<Self> {
        let fetcher = Fetcher::new(source, config.endpoints.clone(), config.retry.clone())?;
        Ok(Self {
            fetcher,
            trend_months: config.dashboard.trend_months.max(1),
            shapes: OnceCell::new(),
        })
    }

    /// Fetch and normalize one monthly dataset over `periods`.
    ///
    /// Unpublished months are skipped; it is `EmptyResult` only when none of them has rows.
    async fn load_monthly<R: CanonicalRow>(&self, periods: &[Period]) -> Result<NormalizedTable<R>> {
        let Some(&last) = periods.last() else {
            return Err(DashboardError::InvalidRequest("empty period window".to_string()));
        };

        let mut raw = Vec::with_capacity(periods.len());
        for &period in periods {
            match self.fetcher.fetch_table(R::KIND, period).await? {
                Fetched::Data(ds) => raw.push(ds),
                Fetched::Empty => info!(kind = %R::KIND, %period, "skipping unpublished month"),
            }
        }

        let table: NormalizedTable<R> = normalize(&raw)?;
        if table.is_empty() {
            return Err(DashboardError::EmptyResult {
                kind: R::KIND,
                period: last,
            });
        }
        Ok(table)
    }

    /// Enrollment for the trend window ending at `period`.
    pub async fn load_enrollment(&self, period: Period) -> Result<EnrollmentTable> {
        self.load_monthly(&period.trailing(self.trend_months)).await
    }

    async fn load_penetration(&self, period: Period) -> Result<PenetrationTable> {
        self.load_monthly(&[period]).await
    }

    async fn load_ratebook(&self, period: Period) -> Result<RatebookTable> {
        let kind = DatasetKind::Ratebook;
        let raw = self
            .fetcher
            .fetch_table(kind, period)
            .await?
            .into_data(kind, period)?;
        let table: RatebookTable = normalize(&[raw])?;
        if table.is_empty() {
            return Err(DashboardError::EmptyResult { kind, period });
        }
        Ok(table)
    }

    /// County boundaries, downloaded on first use.
    async fn shapes(&self) -> Result<&GeoShapes> {
        self.shapes
            .get_or_try_init(|| self.fetcher.fetch_geography())
            .await
    }

    /// Join the requested month of `enrollment` to its year's ratebook.
    async fn enrich_period(
        &self,
        enrollment: &EnrollmentTable,
        request: &DashboardRequest,
    ) -> Result<EnrichedTable> {
        let period = request.period;
        let current = NormalizedTable::from_rows(
            enrollment
                .rows()
                .iter()
                .filter(|r| r.period() == period)
                .cloned(),
        );
        let empty = DashboardError::EmptyResult {
            kind: DatasetKind::Enrollment,
            period,
        };
        if current.is_empty() {
            return Err(empty);
        }

        let ratebook = self.load_ratebook(period).await?;
        let enriched = enrich(&current, &ratebook, &request.state)?;
        if enriched.is_empty() {
            info!(state = %request.state, "no rows left after state filter");
            return Err(empty);
        }
        Ok(enriched)
    }

    async fn map_for(&self, period: Period) -> Result<ChartSpec> {
        let penetration = self.load_penetration(period).await?;
        let shapes = self.shapes().await?;
        Ok(chart::penetration_map(&penetration, shapes, period))
    }

    pub async fn enrollment_trend(&self, year: u16, month: u8) -> Result<ChartSpec> {
        let period = Period::new(year, month)?;
        let enrollment = self.load_enrollment(period).await?;
        Ok(chart::enrollment_trend(&enrollment))
    }

    pub async fn penetration_map(&self, year: u16, month: u8) -> Result<ChartSpec> {
        self.map_for(Period::new(year, month)?).await
    }

    pub async fn payment_by_county(&self, year: u16, month: u8, state: &str) -> Result<ChartSpec> {
        let request = DashboardRequest::new(year, month, state)?;
        let enrollment = self.load_enrollment(request.period).await?;
        let enriched = self.enrich_period(&enrollment, &request).await?;
        Ok(chart::payment_by_county(&enriched, &request.state))
    }

    pub async fn state_options(&self, year: u16, month: u8) -> Result<Vec<SelectOption>> {
        let enrollment = self.load_enrollment(Period::new(year, month)?).await?;
        Ok(chart::state_options(&enrollment))
    }

    /// Render every panel for `request`, fetching enrollment once.
    #[instrument(level = "info", skip(self, request), fields(period = %request.period, state = %request.state))]
    pub async fn snapshot(&self, request: &DashboardRequest) -> DashboardSnapshot {
        let enrollment = self.load_enrollment(request.period).await;

        let (trend, state_options, payment, enriched) = match &enrollment {
            Ok(table) => {
                let enriched = self.enrich_period(table, request).await;
                let payment = match &enriched {
                    Ok(e) => Panel::Chart(chart::payment_by_county(e, &request.state)),
                    Err(e) => Panel::from_error(e),
                };
                (
                    Panel::Chart(chart::enrollment_trend(table)),
                    chart::state_options(table),
                    payment,
                    enriched.ok(),
                )
            }
            Err(e) => (
                Panel::from_error(e),
                chart::state_options(&EnrollmentTable::default()),
                Panel::from_error(e),
                None,
            ),
        };
        let map = Panel::from_result(self.map_for(request.period).await);

        for (name, panel) in [("trend", &trend), ("map", &map), ("payment", &payment)] {
            if let Panel::Failed { message } = panel {
                warn!(panel = name, %message, "panel failed");
            }
        }
        info!(
            trend = trend.is_chart(),
            map = map.is_chart(),
            payment = payment.is_chart(),
            "snapshot rendered"
        );

        DashboardSnapshot {
            request: request.clone(),
            state_options,
            trend,
            map,
            payment,
            enriched,
        }
    }
}
