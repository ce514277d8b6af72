//! Lazily started location-fix relay.
//!
//! A [`Coordinator`] takes fixes from any thread and delivers them to a background
//! worker over a [`MethodChannel`], starting the worker on first use and buffering
//! the latest fix until the worker reports it is ready.

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod executor;
pub mod fix;
pub mod loader;
pub mod local;
pub mod logging;
pub mod payload;
pub mod transport;
pub mod worker;

pub use channel::MethodChannel;
pub use config::RelayConfig;
pub use coordinator::Collaborators;
pub use coordinator::Coordinator;
pub use coordinator::Phase;
pub use coordinator::Status;
pub use executor::MainExecutor;
pub use fix::LocationFix;
pub use fix::PlatformCaps;
pub use loader::Bootstrap;
pub use loader::Loader;
pub use worker::EntryPoint;
pub use worker::Settings;
pub use worker::WorkerHandle;
pub use worker::WorkerHost;
