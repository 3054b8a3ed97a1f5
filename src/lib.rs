//! Low-overhead sampling of Linux system performance counters
//!
//! The kernel exposes most of its activity counters as text pseudo-files in
//! procfs. This crate reads them with as little overhead as possible, parses
//! them into typed snapshots, compares consecutive snapshots into rates and
//! usage ratios, and optionally does so periodically in a background thread.
//!
//! The usual entry point is the `Profiler`, which hands out on-demand
//! `Snapshotter`s and periodic `Sampler`s for each supported pseudo-file:
//!
//! ```no_run
//! use performancer_sampler::{Config, Profiler};
//!
//! let profiler = Profiler::new(Config::default())?;
//! let mut stat = profiler.stat()?;
//! let prior = stat.get()?.value;
//! std::thread::sleep(std::time::Duration::from_secs(1));
//! let delta = stat.delta(&prior)?;
//! println!("{:?}", delta.value.cpus[0].usage);
//! # Ok::<(), performancer_sampler::Error>(())
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod delta;
pub mod error;
pub mod parser;
pub mod procfs;
pub mod profiler;
pub mod reader;
pub mod sampler;
pub mod snapshot;
pub mod snapshotter;
pub mod splitter;

pub use crate::clock::ClockTicks;
pub use crate::codec::{BinaryCodec, Codec, JsonCodec};
pub use crate::config::Config;
pub use crate::delta::{DeltaComputer, Ratio};
pub use crate::error::{Error, ParseCause, Partial};
pub use crate::parser::PseudoFileParser;
pub use crate::profiler::Profiler;
pub use crate::sampler::{Sampler, SamplerState};
pub use crate::snapshot::Snapshot;
pub use crate::snapshotter::Snapshotter;
