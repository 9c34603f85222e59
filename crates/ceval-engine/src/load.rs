//! Synthetic load generation and per-request records
//!
//! Load is sequential: for each canonical region, `requests_per_region`
//! requests with an `x-user-region` header, latency measured around each
//! one. Transport failures become a synthetic `599` record so every
//! attempted request appears in the CSV. Each record is appended and
//! flushed immediately; a crashed run keeps everything sent so far.
//!
//! Classification happens here, per response, from the decision headers
//! the router attaches — independent of the router's own raw reason.

use crate::error::EngineError;
use crate::runcfg::{RegionInputMode, RunConfig};
use ceval_config::PolicyMode;
use ceval_core::{
    carbon_saved_vs_local, decision_brief, CarbonSavings, ExpectedCrossTracker, FixtureExpectation,
    RegionRelation, RerouteCounts, ZoneRegionMap, CANONICAL_REGIONS, REGION_EAST, REGION_WEST,
};
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Region the requester claims to originate from.
pub const HDR_USER_REGION: &str = "x-user-region";
/// Carbon intensity of the selected zone.
pub const HDR_SELECTED_INTENSITY: &str = "x-carbon-selected-intensity";
/// Delimited per-zone intensities considered for the decision.
pub const HDR_ZONE_INTENSITY: &str = "x-carbon-zone-intensity";
/// Delimited intensities of the zones that stayed eligible.
pub const HDR_ELIGIBLE_INTENSITY: &str = "x-carbon-eligible-zone-intensity";
/// Delimited per-zone filter reasons.
pub const HDR_ZONE_FILTER_REASONS: &str = "x-carbon-zone-filter-reasons";
/// Raw decision reason the router reports for itself.
pub const HDR_DECISION_REASON: &str = "x-carbon-decision-reason";
/// Router-reported saved-vs-worst figure.
pub const HDR_SAVED_VS_WORST: &str = "x-carbon-saved-vs-worst";
/// Router-reported saved-vs-worst percentage.
pub const HDR_SAVED_VS_WORST_PERCENT: &str = "x-carbon-saved-vs-worst-percent";

/// Status recorded for requests that never got an HTTP response.
pub const SYNTHETIC_FAILURE_STATUS: u16 = 599;

/// CSV header for the per-request record file.
pub const CSV_HEADER: &str = "timestamp,scenario,requested_region,header_region,selected_zone,\
selected_region,region_relation,latency_ms,status,selected_intensity,zone_intensity,\
eligible_zone_intensity,zone_filter_reasons,raw_reason,decision_brief,\
carbon_saved_vs_local_g_per_kwh,carbon_saved_vs_local_percent,saved_vs_worst,\
saved_vs_worst_percent";

fn escape_csv(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One classified request outcome.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// UTC timestamp of the request
    pub timestamp: String,
    /// Scenario name
    pub scenario: String,
    /// Nominal region of the load loop
    pub requested_region: String,
    /// Region actually sent in the header
    pub header_region: String,
    /// Zone the router selected, empty when unknown
    pub selected_zone: String,
    /// Region the selected zone maps to, empty when unknown
    pub selected_region: String,
    /// Requested-vs-selected relation
    pub relation: RegionRelation,
    /// Wall-clock latency in milliseconds
    pub latency_ms: f64,
    /// HTTP status, or the synthetic failure status
    pub status: u16,
    /// Parsed selected-zone intensity
    pub selected_intensity: Option<f64>,
    /// Raw per-zone intensity header
    pub zone_intensity: String,
    /// Raw eligible-zone intensity header
    pub eligible_intensity: String,
    /// Raw per-zone filter reasons header
    pub zone_filter_reasons: String,
    /// Raw decision reason header
    pub raw_reason: String,
    /// Independent classification of the decision
    pub brief: String,
    /// Carbon saved versus the requester's local best
    pub savings: CarbonSavings,
    /// Raw router-reported saved-vs-worst header
    pub saved_vs_worst: String,
    /// Raw router-reported saved-vs-worst percent header
    pub saved_vs_worst_percent: String,
}

impl RequestRecord {
    /// Render one CSV row matching [`CSV_HEADER`].
    #[must_use]
    pub fn csv_row(&self) -> String {
        let (saved_abs, saved_pct) = self.savings.csv_fields();
        let fields = [
            self.timestamp.as_str(),
            self.scenario.as_str(),
            self.requested_region.as_str(),
            self.header_region.as_str(),
            self.selected_zone.as_str(),
            self.selected_region.as_str(),
            &self.relation.to_string(),
            &format!("{:.3}", self.latency_ms),
            &self.status.to_string(),
            &self
                .selected_intensity
                .map_or_else(String::new, |v| format!("{v:.3}")),
            self.zone_intensity.as_str(),
            self.eligible_intensity.as_str(),
            self.zone_filter_reasons.as_str(),
            self.raw_reason.as_str(),
            self.brief.as_str(),
            &saved_abs,
            &saved_pct,
            self.saved_vs_worst.as_str(),
            self.saved_vs_worst_percent.as_str(),
        ];
        fields
            .iter()
            .map(|f| escape_csv(f))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Append-and-flush writer for the per-request CSV.
#[derive(Debug)]
pub struct RecordWriter {
    path: PathBuf,
    file: File,
}

impl RecordWriter {
    /// Create the file and write the header row.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let path = path.into();
        let mut file = File::create(&path).map_err(|e| EngineError::io(path.clone(), e))?;
        writeln!(file, "{CSV_HEADER}").map_err(|e| EngineError::io(path.clone(), e))?;
        file.flush().map_err(|e| EngineError::io(path.clone(), e))?;
        Ok(Self { path, file })
    }

    /// Append one record and flush it to disk.
    pub fn append(&mut self, record: &RequestRecord) -> Result<(), EngineError> {
        writeln!(self.file, "{}", record.csv_row())
            .map_err(|e| EngineError::io(self.path.clone(), e))?;
        self.file
            .flush()
            .map_err(|e| EngineError::io(self.path.clone(), e))
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Aggregate outcome of one mode's load window.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    /// Per-request latencies in milliseconds
    pub latencies_ms: Vec<f64>,
    /// Responses with a non-server-error status
    pub ok_count: u64,
    /// Server errors and synthetic failures
    pub error_count: u64,
    /// Requests that never got an HTTP response
    pub synthetic_failures: u64,
    /// Selected-zone tally from the responses themselves
    pub zone_counts: BTreeMap<String, u64>,
    /// Mean selected intensity across responses that reported one
    pub mean_selected_intensity: Option<f64>,
    /// Cross-region and directional reroute tallies
    pub reroutes: RerouteCounts,
    /// Expected-cross-to-green accounting
    pub expected_cross: ExpectedCrossTracker,
    /// Decision-brief tally
    pub brief_counts: BTreeMap<String, u64>,
}

fn header_str(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn pick_header_region<'a>(mode: RegionInputMode, nominal: &'a str) -> &'a str {
    match mode {
        RegionInputMode::PassThrough => nominal,
        RegionInputMode::FixedEast => REGION_EAST,
        RegionInputMode::FixedWest => REGION_WEST,
        RegionInputMode::Random => {
            if rand::rng().random_bool(0.5) {
                REGION_EAST
            } else {
                REGION_WEST
            }
        }
    }
}

fn timestamp_utc() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Drive one mode's load window, appending every record as it happens.
pub async fn run_load(
    client: &reqwest::Client,
    cfg: &RunConfig,
    mode: &PolicyMode,
    zones: &ZoneRegionMap,
    expectation: Option<&FixtureExpectation>,
    writer: &mut RecordWriter,
) -> Result<LoadOutcome, EngineError> {
    let url = cfg.route_url();
    let expected_direction = expectation.map(FixtureExpectation::direction);
    let mut outcome = LoadOutcome::default();
    let mut intensity_sum = 0.0;
    let mut intensity_count = 0u64;

    for nominal_region in CANONICAL_REGIONS {
        for _ in 0..cfg.requests_per_region {
            let header_region = pick_header_region(cfg.region_input, nominal_region);
            let started = Instant::now();
            let response = client
                .get(&url)
                .header(HDR_USER_REGION, header_region)
                .send()
                .await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            outcome.latencies_ms.push(latency_ms);

            let record = match response {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let selected_intensity_raw = header_str(&response, HDR_SELECTED_INTENSITY);
                    let zone_intensity = header_str(&response, HDR_ZONE_INTENSITY);
                    let eligible_intensity = header_str(&response, HDR_ELIGIBLE_INTENSITY);
                    let zone_filter_reasons = header_str(&response, HDR_ZONE_FILTER_REASONS);
                    let raw_reason = header_str(&response, HDR_DECISION_REASON);
                    let saved_vs_worst = header_str(&response, HDR_SAVED_VS_WORST);
                    let saved_vs_worst_percent =
                        header_str(&response, HDR_SAVED_VS_WORST_PERCENT);

                    let body: Value = response.json().await.unwrap_or(Value::Null);
                    let selected_zone = body
                        .get("zone")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    // zone map first, the response's own region claim second
                    let selected_region = zones
                        .region_for(&selected_zone)
                        .map(str::to_string)
                        .or_else(|| {
                            body.get("region")
                                .and_then(Value::as_str)
                                .map(str::to_string)
                        })
                        .unwrap_or_default();
                    let selected_region_opt =
                        (!selected_region.is_empty()).then_some(selected_region.as_str());

                    let relation = RegionRelation::classify(header_region, selected_region_opt);
                    let selected_intensity = selected_intensity_raw.trim().parse::<f64>().ok();

                    let savings = if mode.is_baseline() {
                        CarbonSavings::NotApplicable
                    } else {
                        carbon_saved_vs_local(
                            header_region,
                            selected_intensity,
                            &eligible_intensity,
                            zones,
                        )
                    };
                    let brief = decision_brief(
                        header_region,
                        relation,
                        &raw_reason,
                        &zone_filter_reasons,
                        zones,
                    );

                    outcome
                        .reroutes
                        .observe(header_region, selected_region_opt, relation);
                    outcome.expected_cross.observe(
                        expected_direction,
                        header_region,
                        selected_region_opt,
                        relation,
                    );
                    // 4xx means the router answered; only 5xx and
                    // transport failures count against the mode
                    if (200..500).contains(&status) {
                        outcome.ok_count += 1;
                    } else {
                        outcome.error_count += 1;
                    }
                    if !selected_zone.is_empty() {
                        *outcome.zone_counts.entry(selected_zone.clone()).or_insert(0) += 1;
                    }
                    if let Some(v) = selected_intensity {
                        intensity_sum += v;
                        intensity_count += 1;
                    }
                    *outcome.brief_counts.entry(brief.clone()).or_insert(0) += 1;

                    RequestRecord {
                        timestamp: timestamp_utc(),
                        scenario: mode.name.clone(),
                        requested_region: nominal_region.to_string(),
                        header_region: header_region.to_string(),
                        selected_zone,
                        selected_region,
                        relation,
                        latency_ms,
                        status,
                        selected_intensity,
                        zone_intensity,
                        eligible_intensity,
                        zone_filter_reasons,
                        raw_reason,
                        brief,
                        savings,
                        saved_vs_worst,
                        saved_vs_worst_percent,
                    }
                }
                Err(err) => {
                    tracing::debug!(%err, region = header_region, "request failed in transport");
                    outcome.error_count += 1;
                    outcome.synthetic_failures += 1;
                    outcome.expected_cross.observe(
                        expected_direction,
                        header_region,
                        None,
                        RegionRelation::Unknown,
                    );
                    *outcome
                        .brief_counts
                        .entry("unknown".to_string())
                        .or_insert(0) += 1;
                    RequestRecord {
                        timestamp: timestamp_utc(),
                        scenario: mode.name.clone(),
                        requested_region: nominal_region.to_string(),
                        header_region: header_region.to_string(),
                        selected_zone: String::new(),
                        selected_region: String::new(),
                        relation: RegionRelation::Unknown,
                        latency_ms,
                        status: SYNTHETIC_FAILURE_STATUS,
                        selected_intensity: None,
                        zone_intensity: String::new(),
                        eligible_intensity: String::new(),
                        zone_filter_reasons: String::new(),
                        raw_reason: String::new(),
                        brief: "unknown".to_string(),
                        savings: if mode.is_baseline() {
                            CarbonSavings::NotApplicable
                        } else {
                            CarbonSavings::zero()
                        },
                        saved_vs_worst: String::new(),
                        saved_vs_worst_percent: String::new(),
                    }
                }
            };
            writer.append(&record)?;
        }
    }

    if intensity_count > 0 {
        outcome.mean_selected_intensity = Some(intensity_sum / intensity_count as f64);
    }
    Ok(outcome)
}
