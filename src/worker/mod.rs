//! Worker-side execution: the job loop, its startup step, and the job
//! contract implemented by the embedding application.

pub mod metrics;
pub mod runner;
pub mod startup;
pub mod worker_loop;

pub use metrics::UsageSample;
pub use runner::{JobContext, JobError, JobOutcome, JobRunner};
pub use startup::{
    install_requirements, CommandInstaller, DependencyInstaller, InstallOutcome,
    RequirementsManifest,
};
pub use worker_loop::{run_stdio, stop_on_signal, LoopExit, WorkerLoop};
