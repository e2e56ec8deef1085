//! # Butterfly-scenario Library
//!
//! A toolkit for orchestrating OSRM routing scenarios: compiling map data
//! against behavior profiles, supervising query server processes, and
//! comparing travel times and routes across scenarios.
//!
//! ## Features
//!
//! - **Build pipeline**: Runs the OSRM toolchain (extract, then contract or
//!   partition/customize) with name-keyed dataset caching
//! - **Server supervision**: Starts `osrm-routed` on a free local port and
//!   waits for its readiness marker, with timeout teardown
//! - **Parallel groups**: All-or-nothing startup of several scenarios for
//!   side-by-side querying
//! - **Comparison engine**: Duration matrices, cross-scenario joins,
//!   difference/agreement sets, and per-pair route geometries
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use butterfly_scenario::{Environment, MapDataset, BehaviorProfile, Scenario};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let env = Environment::new("./work");
//!     let map = MapDataset::new("./region.osm.pbf")?;
//!     let profile = BehaviorProfile::new("./walk_normal.lua")?;
//!
//!     let mut scenario = Scenario::new(&env, map, profile);
//!     scenario
//!         .with_server(|client| async move {
//!             let route = client
//!                 .route(&[(31.14, -26.52).into(), (31.20, -26.60).into()])
//!                 .await?;
//!             println!("{:?}", route.map(|r| r.duration));
//!             Ok(())
//!         })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Comparing Scenarios
//!
//! ```rust,no_run
//! use butterfly_scenario::{ComparisonEngine, ParallelGroup, PointSet};
//! # use butterfly_scenario::{Environment, MapDataset, BehaviorProfile, Scenario};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let env = Environment::new("./work");
//! # let map = MapDataset::new("./region.osm.pbf")?;
//! # let normal_profile = BehaviorProfile::new("./walk_normal.lua")?;
//! # let flood_profile = BehaviorProfile::new("./walk_flood.lua")?;
//! let mut normal = Scenario::new(&env, map.clone(), normal_profile);
//! let mut flood = Scenario::new(&env, map, flood_profile);
//!
//! let origins = PointSet::from_geojson_file("./homesteads.geojson", "homesteads")?;
//! let dests = PointSet::from_geojson_file("./schools.geojson", "schools")?;
//!
//! let mut group = ParallelGroup::new(vec![&mut normal, &mut flood])?;
//! let diff = group
//!     .with_servers(|clients| async move {
//!         let mut engine = ComparisonEngine::new(origins, dests, clients);
//!         engine.difference("region_walk_normal", "region_walk_flood").await
//!     })
//!     .await?;
//! println!("{} pairs changed", diff.rows.len());
//! # Ok(())
//! # }
//! ```

// Re-export the public surface
pub use crate::core::compare::{
    ComparisonEngine, DurationMatrix, DurationTable, DurationTableRow, MeltRow, RouteRecord,
};
pub use crate::core::dataset::{Algorithm, BehaviorProfile, MapDataset};
pub use crate::core::env::{Environment, Toolchain};
pub use crate::core::error::{Error, Result};
pub use crate::core::group::ParallelGroup;
pub use crate::core::pipeline::{build, BuildOptions};
pub use crate::core::points::{Coord, ODPair, PointSet};
pub use crate::core::process::{registered_count, terminate_all, ProcessHandle};
pub use crate::core::query::{QueryClient, Route, Waypoint};
pub use crate::core::scenario::Scenario;
pub use crate::core::server::{allocate_port, ServeOptions, ServerProcess, ServerState};

// Internal modules
mod core;
