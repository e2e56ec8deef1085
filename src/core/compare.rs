//! Comparative analysis across scenario endpoints
//!
//! Computes per-scenario duration matrices over fixed origin and destination
//! sets, melts them into long-form origin:destination tables, joins them
//! across scenarios, and derives difference/agreement sets and per-pair route
//! geometries.

use std::collections::HashMap;

use futures::StreamExt;

use crate::core::error::{Error, Result};
use crate::core::points::{Coord, ODPair, PointSet};
use crate::core::query::QueryClient;

/// Dense origin x destination travel-time matrix for one scenario
///
/// Unreachable pairs carry NaN, never a missing cell: dimensions always equal
/// |origins| x |destinations|.
#[derive(Debug, Clone)]
pub struct DurationMatrix {
    origin_ids: Vec<String>,
    dest_ids: Vec<String>,
    durations: Vec<Vec<f64>>,
}

/// One melted matrix cell
#[derive(Debug, Clone)]
pub struct MeltRow {
    pub origin_id: String,
    pub dest_id: String,
    pub duration: f64,
}

impl DurationMatrix {
    pub fn new(
        origin_ids: Vec<String>,
        dest_ids: Vec<String>,
        durations: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if durations.len() != origin_ids.len()
            || durations.iter().any(|row| row.len() != dest_ids.len())
        {
            return Err(Error::Configuration(format!(
                "duration matrix must be {}x{}",
                origin_ids.len(),
                dest_ids.len()
            )));
        }
        Ok(Self {
            origin_ids,
            dest_ids,
            durations,
        })
    }

    pub fn origin_ids(&self) -> &[String] {
        &self.origin_ids
    }

    pub fn dest_ids(&self) -> &[String] {
        &self.dest_ids
    }

    pub fn get(&self, origin_id: &str, dest_id: &str) -> Option<f64> {
        let row = self.origin_ids.iter().position(|id| id == origin_id)?;
        let col = self.dest_ids.iter().position(|id| id == dest_id)?;
        Some(self.durations[row][col])
    }

    /// Melt into long form: one row per (origin, destination) cell, exactly
    /// |origins| x |destinations| rows
    pub fn melt(&self) -> Vec<MeltRow> {
        let mut rows = Vec::with_capacity(self.origin_ids.len() * self.dest_ids.len());
        for (row, origin_id) in self.origin_ids.iter().enumerate() {
            for (col, dest_id) in self.dest_ids.iter().enumerate() {
                rows.push(MeltRow {
                    origin_id: origin_id.clone(),
                    dest_id: dest_id.clone(),
                    duration: self.durations[row][col],
                });
            }
        }
        rows
    }
}

/// Long-form table with one row per OD pair and one duration per scenario
#[derive(Debug, Clone)]
pub struct DurationTable {
    pub scenarios: Vec<String>,
    pub rows: Vec<DurationTableRow>,
}

#[derive(Debug, Clone)]
pub struct DurationTableRow {
    pub origin_id: String,
    pub dest_id: String,
    /// Durations in the same order as `DurationTable::scenarios`
    pub durations: Vec<f64>,
}

/// One computed route between an OD pair; failed pairs carry NaN durations
/// and no geometry
#[derive(Debug, Clone)]
pub struct RouteRecord {
    pub origin_id: String,
    pub dest_id: String,
    pub duration: f64,
    pub distance: f64,
    pub geometry: Option<serde_json::Value>,
}

/// Strict-inequality comparison with NaN/NaN equal and NaN/number different
fn durations_differ(a: f64, b: f64) -> bool {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => false,
        (false, false) => a != b,
        _ => true,
    }
}

/// Comparative analysis engine over named scenario endpoints
///
/// Matrix row/column order follows the origin/destination order declared at
/// construction time. Matrices are computed once per scenario name and cached
/// for the engine's lifetime unless caching is disabled.
pub struct ComparisonEngine {
    origins: PointSet,
    dests: PointSet,
    clients: HashMap<String, QueryClient>,
    cache: HashMap<String, DurationMatrix>,
    caching: bool,
    concurrency: usize,
}

impl ComparisonEngine {
    pub fn new(
        origins: PointSet,
        dests: PointSet,
        clients: HashMap<String, QueryClient>,
    ) -> Self {
        Self {
            origins,
            dests,
            clients,
            cache: HashMap::new(),
            caching: true,
            concurrency: num_cpus::get().min(8),
        }
    }

    /// Disable the per-scenario matrix cache: every call recomputes
    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    /// Bound on concurrently outstanding route queries per batch
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn origins(&self) -> &PointSet {
        &self.origins
    }

    pub fn dests(&self) -> &PointSet {
        &self.dests
    }

    /// Full origin x destination cross-product, in declared order
    pub fn od_pairs(&self) -> Vec<ODPair> {
        let mut pairs = Vec::with_capacity(self.origins.len() * self.dests.len());
        for (origin_id, _) in self.origins.iter() {
            for (dest_id, _) in self.dests.iter() {
                pairs.push(ODPair::new(origin_id.clone(), dest_id.clone()));
            }
        }
        pairs
    }

    fn client(&self, scenario: &str) -> Result<&QueryClient> {
        self.clients.get(scenario).ok_or_else(|| {
            Error::Configuration(format!("no client for scenario '{}'", scenario))
        })
    }

    /// Duration matrix for one scenario, computed once per name and cached
    pub async fn duration_matrix(&mut self, scenario: &str) -> Result<&DurationMatrix> {
        if !self.caching || !self.cache.contains_key(scenario) {
            let client = self.client(scenario)?;
            let raw = client
                .table(&self.origins.coords(), &self.dests.coords())
                .await?;
            let matrix = DurationMatrix::new(self.origins.ids(), self.dests.ids(), raw)?;
            self.cache.insert(scenario.to_string(), matrix);
        }
        Ok(self
            .cache
            .get(scenario)
            .expect("matrix inserted or cached above"))
    }

    /// Long-form duration table across scenarios, inner-joined on
    /// (origin_id, dest_id)
    ///
    /// All scenarios must cover the same OD universe; a pair missing from any
    /// scenario's melt is a caller error, not a silently dropped row.
    pub async fn duration_table(&mut self, scenarios: &[&str]) -> Result<DurationTable> {
        if scenarios.is_empty() {
            return Err(Error::Configuration(
                "duration table needs at least one scenario".to_string(),
            ));
        }

        for scenario in scenarios {
            self.duration_matrix(scenario).await?;
        }

        // First scenario's melt fixes the row order; the rest join onto it.
        let base = self.cache[scenarios[0]].melt();
        let mut rows: Vec<DurationTableRow> = base
            .into_iter()
            .map(|melt| DurationTableRow {
                origin_id: melt.origin_id,
                dest_id: melt.dest_id,
                durations: vec![melt.duration],
            })
            .collect();

        for scenario in &scenarios[1..] {
            let lookup: HashMap<(String, String), f64> = self.cache[*scenario]
                .melt()
                .into_iter()
                .map(|melt| ((melt.origin_id, melt.dest_id), melt.duration))
                .collect();
            for row in &mut rows {
                let key = (row.origin_id.clone(), row.dest_id.clone());
                match lookup.get(&key) {
                    Some(duration) => row.durations.push(*duration),
                    None => {
                        return Err(Error::Configuration(format!(
                            "scenario '{}' has no duration for pair ({}, {})",
                            scenario, row.origin_id, row.dest_id
                        )))
                    }
                }
            }
        }

        Ok(DurationTable {
            scenarios: scenarios.iter().map(|s| s.to_string()).collect(),
            rows,
        })
    }

    /// OD pairs whose durations differ between two scenarios
    pub async fn difference(&mut self, a: &str, b: &str) -> Result<DurationTable> {
        let mut table = self.duration_table(&[a, b]).await?;
        table
            .rows
            .retain(|row| durations_differ(row.durations[0], row.durations[1]));
        Ok(table)
    }

    /// OD pairs whose durations agree between two scenarios; exact complement
    /// of `difference`
    pub async fn same(&mut self, a: &str, b: &str) -> Result<DurationTable> {
        let mut table = self.duration_table(&[a, b]).await?;
        table
            .rows
            .retain(|row| !durations_differ(row.durations[0], row.durations[1]));
        Ok(table)
    }

    /// Per-pair routes for one scenario, over all OD pairs or a caller-chosen
    /// subset
    ///
    /// Pair failures never abort the batch: a failed pair becomes a row with
    /// NaN duration/distance and no geometry, so partial results always come
    /// back.
    pub async fn routes(
        &self,
        scenario: &str,
        od_pairs: Option<&[ODPair]>,
    ) -> Result<Vec<RouteRecord>> {
        let client = self.client(scenario)?;

        let pairs = match od_pairs {
            Some(pairs) => pairs.to_vec(),
            None => self.od_pairs(),
        };
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        // Resolve coordinates up front so unknown ids fail the whole call.
        let mut resolved: Vec<(ODPair, Coord, Coord)> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let origin = self.origins.get(&pair.origin_id).ok_or_else(|| {
                Error::Configuration(format!("unknown origin id '{}'", pair.origin_id))
            })?;
            let dest = self.dests.get(&pair.dest_id).ok_or_else(|| {
                Error::Configuration(format!("unknown destination id '{}'", pair.dest_id))
            })?;
            resolved.push((pair, origin, dest));
        }

        let records = futures::stream::iter(resolved)
            .map(|(pair, origin, dest)| async move {
                match client.route(&[origin, dest]).await {
                    Ok(Some(route)) => RouteRecord {
                        origin_id: pair.origin_id,
                        dest_id: pair.dest_id,
                        duration: route.duration,
                        distance: route.distance,
                        geometry: Some(route.geometry),
                    },
                    Ok(None) => RouteRecord {
                        origin_id: pair.origin_id,
                        dest_id: pair.dest_id,
                        duration: f64::NAN,
                        distance: f64::NAN,
                        geometry: None,
                    },
                    Err(err) => {
                        log::warn!(
                            "route ({}, {}) failed: {}",
                            pair.origin_id,
                            pair.dest_id,
                            err
                        );
                        RouteRecord {
                            origin_id: pair.origin_id,
                            dest_id: pair.dest_id,
                            duration: f64::NAN,
                            distance: f64::NAN,
                            geometry: None,
                        }
                    }
                }
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(records)
    }
}
