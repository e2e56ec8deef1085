//! Scenario: one (map, profile, algorithm) configuration
//!
//! A scenario is pure configuration until compiled, owns at most one server
//! process while served, and releases it on stop. The `with_server` helper
//! sequences compile -> start -> query -> stop with stop guaranteed on every
//! exit path.

use std::future::Future;
use std::path::{Path, PathBuf};

use crate::core::dataset::{Algorithm, BehaviorProfile, MapDataset};
use crate::core::env::Environment;
use crate::core::error::{Error, Result};
use crate::core::pipeline::{self, BuildOptions};
use crate::core::query::QueryClient;
use crate::core::server::{ServeOptions, ServerProcess};

/// One servable routing configuration
pub struct Scenario {
    env: Environment,
    map: MapDataset,
    profile: BehaviorProfile,
    algorithm: Algorithm,
    name: String,
    build_opts: BuildOptions,
    serve_opts: ServeOptions,
    dataset_path: Option<PathBuf>,
    server: Option<ServerProcess>,
}

impl Scenario {
    /// Configure a scenario; no I/O beyond what the inputs already did
    ///
    /// The algorithm defaults to the profile's required algorithm when it has
    /// one, otherwise to contraction. The name defaults to `{map}_{profile}`
    /// and keys the build cache, so distinct configurations need distinct
    /// names.
    pub fn new(env: &Environment, map: MapDataset, profile: BehaviorProfile) -> Self {
        let algorithm = profile.required_algorithm().unwrap_or_default();
        let name = format!("{}_{}", map.name(), profile.name());
        let build_opts = BuildOptions {
            overwrite: env.overwrite(),
            ..Default::default()
        };
        Self {
            env: env.clone(),
            map,
            profile,
            algorithm,
            name,
            build_opts,
            serve_opts: ServeOptions::default(),
            dataset_path: None,
            server: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override the build algorithm; rejected if the profile is pinned to a
    /// different one
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Result<Self> {
        if let Some(required) = self.profile.required_algorithm() {
            if required != algorithm {
                return Err(Error::Configuration(format!(
                    "profile '{}' requires algorithm {} but {} was requested",
                    self.profile.name(),
                    required,
                    algorithm
                )));
            }
        }
        self.algorithm = algorithm;
        Ok(self)
    }

    pub fn with_build_options(mut self, opts: BuildOptions) -> Self {
        self.build_opts = opts;
        self
    }

    pub fn with_serve_options(mut self, opts: ServeOptions) -> Self {
        self.serve_opts = opts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn profile(&self) -> &BehaviorProfile {
        &self.profile
    }

    /// Compiled dataset path, if compile has run in this scenario's lifetime
    pub fn dataset_path(&self) -> Option<&Path> {
        self.dataset_path.as_deref()
    }

    /// Compile the servable dataset (or reuse the name-keyed cached one)
    pub async fn compile(&mut self) -> Result<PathBuf> {
        let path = pipeline::build(
            &self.env,
            &self.map,
            &self.profile,
            self.algorithm,
            &self.name,
            &self.build_opts,
        )
        .await?;
        self.dataset_path = Some(path.clone());
        Ok(path)
    }

    /// Compile if needed, start the query server, and wait until it is ready
    pub async fn serve(&mut self) -> Result<QueryClient> {
        if let Some(client) = self.client() {
            return Ok(client);
        }

        let dataset_path = match &self.dataset_path {
            Some(path) => path.clone(),
            None => self.compile().await?,
        };

        let mut server = ServerProcess::new(
            &self.env.toolchain().routed,
            dataset_path,
            self.serve_opts.clone(),
        );
        match server.start().await {
            Ok(()) => {
                self.server = Some(server);
                // start() only returns Ok once a port is bound
                Ok(self.client().expect("server ready without a port"))
            }
            Err(err) => {
                // start() already tore the child down on its failure paths
                Err(err)
            }
        }
    }

    /// Client for the running server, if any
    pub fn client(&self) -> Option<QueryClient> {
        self.server
            .as_ref()
            .filter(|server| server.is_ready())
            .and_then(ServerProcess::port)
            .map(|port| QueryClient::new(port).with_profile(self.profile.name()))
    }

    /// Whether the served endpoint is actually answering queries
    pub async fn is_alive(&self) -> bool {
        match self.client() {
            Some(client) => client.is_alive().await,
            None => false,
        }
    }

    /// Stop the server process, if running. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop().await;
        }
    }

    /// Scoped acquisition: serve, hand the client to `f`, and stop on every
    /// exit path
    pub async fn with_server<F, Fut, T>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(QueryClient) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = self.serve().await?;
        let result = f(client).await;
        self.stop().await;
        result
    }
}
