//! Parallel scenario coordination
//!
//! Starts several scenarios' servers together so analyses can query them side
//! by side. Startup is all-or-nothing: if any member fails to reach
//! readiness, every member that did start is stopped before the failure is
//! reported.

use std::collections::HashMap;
use std::future::Future;

use futures::future;

use crate::core::error::{Error, Result};
use crate::core::query::QueryClient;
use crate::core::scenario::Scenario;

/// Coordinator over named scenarios, borrowed for the group's lifetime
pub struct ParallelGroup<'a> {
    scenarios: Vec<&'a mut Scenario>,
}

impl<'a> ParallelGroup<'a> {
    /// Group the given scenarios; member names must be unique since they key
    /// the client mapping
    pub fn new(scenarios: Vec<&'a mut Scenario>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.name().to_string()) {
                return Err(Error::Configuration(format!(
                    "duplicate scenario name '{}' in group",
                    scenario.name()
                )));
            }
        }
        Ok(Self { scenarios })
    }

    pub fn names(&self) -> Vec<String> {
        self.scenarios
            .iter()
            .map(|scenario| scenario.name().to_string())
            .collect()
    }

    /// Compile (if needed) and start every member concurrently
    ///
    /// Returns the name-keyed clients once all members are ready. On any
    /// failure the whole group is stopped first and the first error is
    /// returned.
    pub async fn start(&mut self) -> Result<HashMap<String, QueryClient>> {
        let starts = self.scenarios.iter_mut().map(|scenario| async move {
            let name = scenario.name().to_string();
            let outcome = scenario.serve().await;
            (name, outcome)
        });
        let outcomes = future::join_all(starts).await;

        let mut clients = HashMap::new();
        let mut first_error = None;
        for (name, outcome) in outcomes {
            match outcome {
                Ok(client) => {
                    clients.insert(name, client);
                }
                Err(err) => {
                    log::warn!("Scenario '{}' failed to start: {}", name, err);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = first_error {
            self.stop().await;
            return Err(err);
        }
        Ok(clients)
    }

    /// Stop every member, tolerating members already stopped
    pub async fn stop(&mut self) {
        future::join_all(self.scenarios.iter_mut().map(|scenario| scenario.stop())).await;
    }

    /// Scoped acquisition spanning the group: start all, hand the client map
    /// to `f`, stop all on every exit path
    pub async fn with_servers<F, Fut, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(HashMap<String, QueryClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let clients = self.start().await?;
        let result = f(clients).await;
        self.stop().await;
        result
    }
}
