//! ThreatGlobe Deterministic Simulation Harness
//!
//! Runs the whole globe engine on a virtual clock against a seeded event
//! feed, so a failing run can be replayed from its seed alone.
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: a virtual clock the runner advances tick by tick
//! - **Network**: image downloads with seeded latency and failures
//! - **Randomness**: spawn jitter and the feed both derive from one seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (virtual clock + ChaCha8 jitter)          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────────┐   fetch  ┌──▼──────────────┐             │
//! │  │ GlobeRuntime  │─────────►│ SimImageFetcher │             │
//! │  └───────────────┘◄─────────└─────────────────┘             │
//! │       ▲   raw JSON records                                  │
//! │  ┌────┴──────────────────────────────┐                      │
//! │  │            EventOracle            │                      │
//! │  │   (ground truth event stream)     │                      │
//! │  └───────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use threatglobe_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_duration(10.0).run(ScenarioId::Mixed);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod fetcher;
mod oracle;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use fetcher::SimImageFetcher;
pub use oracle::{EmittedRecord, EventOracle, Hotspot, OracleConfig, OracleTotals, TypeMix};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
