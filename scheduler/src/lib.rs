//! Multi-target observation scheduling and execution engine
//!
//! This crate drives unattended execution of a night's worth of imaging
//! targets against a remote observatory controller. The pieces, leaf first:
//!
//! - [`clock`]: wall-clock abstraction; simulated time for dry runs
//! - [`meridian`]: transit prediction and the pause/resume window around it
//! - [`queue`]: target validation and ordering into an execution plan
//! - [`executor`]: the per-target observation state machine
//! - [`orchestrator`]: runs the queue to completion or cutoff and publishes
//!   status events to registered observers
//!
//! The remote controller is reached only through the [`controller::ControllerOps`]
//! trait, so the whole timeline can be simulated without network traffic.

pub mod clock;
pub mod config;
pub mod context;
pub mod controller;
pub mod coords;
pub mod error;
pub mod executor;
pub mod meridian;
pub mod orchestrator;
pub mod queue;
pub mod report;
pub mod target;

pub use clock::{Clock, SharedClock, SimulatedClock, SystemClock};
pub use config::{MeridianFlipConfig, ObserverSite, RetryConfig, ScheduleConfig};
pub use context::{RunContext, WaitOutcome};
pub use controller::{
    ControllerOps, PlanHandle, PlanPoll, SharedControllerOps, SimulatedController,
};
pub use error::{ControllerError, ControllerErrorKind, PredictionError, ValidationError};
pub use executor::ObservationExecutor;
pub use meridian::MeridianWindow;
pub use orchestrator::{ObserverId, ObserverRegistry, Orchestrator};
pub use queue::ObservationQueue;
pub use report::{RunReport, ScheduleSummary, StatusEvent, TargetRecord, TimelinePreview};
pub use target::{ExposurePlan, FilterExposure, Target, TargetStatus};
