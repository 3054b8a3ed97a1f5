//! This module defines how pseudo-files are sampled periodically
//!
//! A sampler runs a snapshotter on a fixed interval in a background thread of
//! its own, and publishes what it gets (either raw snapshots or deltas with
//! respect to the previous snapshot) on a data channel. Problems go to a
//! separate error channel, and never stop the sampler.
//!
//! The lifecycle of a sampler is `Created -> Running -> Stopped -> Closed`:
//!
//! - Creation performs a warm-up readout, which seeds the "prior" snapshot
//!   that the first delta will be computed against. If that readout is
//!   incomplete, its errors go to the error channel, and the first complete
//!   snapshot seeds the prior without being published.
//! - Starting spawns the sampling thread. It owns the snapshotter and the
//!   sending halves of the channels, and shares nothing else with the owner.
//! - Stopping signals the thread and joins it, so that once stop() returns,
//!   the loop has exited. Cancellation is cooperative: it is observed between
//!   ticks, never in the middle of a parse (parses are short anyway).
//! - Closing releases the channels. Since the senders belong to the thread,
//!   the data channel is closed exactly when the loop exits, and there is no
//!   way to send on a closed channel.
//!
//! The data channel holds at most one in-flight item, so results are
//! published in strict acquisition order. An owner that stops draining it
//! will stall the sampler: this is backpressure, not a bug. Stopping works
//! regardless, because the stalled loop keeps listening to the stop signal.

use crate::config::Config;
use crate::delta::DeltaComputer;
use crate::error::{Error, Partial};
use crate::parser::PseudoFileParser;
use crate::snapshot::Snapshot;
use crate::snapshotter::Snapshotter;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender,
                      TrySendError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};


/// Lifecycle state of a sampler
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerState {
    /// Warmed up, but not sampling yet
    Created,

    /// Sampling in a background thread
    Running,

    /// Sampling thread has exited, channels are still around
    Stopped,

    /// Channels have been released (terminal)
    Closed,
}


/// Periodic sampler of a pseudo-file, publishing values of type `O`
pub struct Sampler<O: Send + 'static> {
    /// Current lifecycle state
    state: SamplerState,

    /// The sampling loop, until it is started
    pending: Option<Box<dyn FnOnce() + Send>>,

    /// Handle to the sampling thread, while it is running
    worker: Option<JoinHandle<()>>,

    /// Stop signal (dropping it also stops the sampling thread)
    stop_tx: Option<mpsc::Sender<()>>,

    /// Where samples get published
    data_rx: Option<Receiver<O>>,

    /// Where problems get reported
    error_rx: Option<Receiver<Error>>,

    /// Name of the thread, for logging purposes
    name: String,
}
//
impl<O: Send + 'static> Sampler<O> {
    /// Current lifecycle state
    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Channel on which samples are published, in acquisition order
    pub fn data(&self) -> Result<&Receiver<O>, Error> {
        self.data_rx.as_ref().ok_or(Error::SamplerState {
            expected: SamplerState::Running,
            actual: self.state,
        })
    }

    /// Channel on which per-tick problems are reported
    pub fn errors(&self) -> Result<&Receiver<Error>, Error> {
        self.error_rx.as_ref().ok_or(Error::SamplerState {
            expected: SamplerState::Running,
            actual: self.state,
        })
    }

    /// Spawn the sampling thread
    pub fn start(&mut self) -> Result<(), Error> {
        let body = match (self.state, self.pending.take()) {
            (SamplerState::Created, Some(body)) => body,
            (actual, pending) => {
                self.pending = pending;
                return Err(Error::SamplerState {
                    expected: SamplerState::Created,
                    actual,
                });
            },
        };
        let worker = thread::Builder::new()
            .name(self.name.clone())
            .spawn(body)
            .map_err(Error::Spawn)?;
        debug!(sampler = %self.name, "sampler started");
        self.worker = Some(worker);
        self.state = SamplerState::Running;
        Ok(())
    }

    /// Ask the sampling thread to stop, and wait for it to do so
    ///
    /// Stopping a sampler which was never started is allowed: it simply
    /// never runs. Stopping twice is a no-op.
    ///
    pub fn stop(&mut self) {
        match self.state {
            SamplerState::Stopped | SamplerState::Closed => return,
            SamplerState::Created | SamplerState::Running => {},
        }

        // Signal the loop (a disconnected stop channel means "stop" too)
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        // Never-started samplers just drop their loop, and with it the
        // sending halves of the channels
        self.pending = None;

        // Wait for the loop to confirm its exit
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(sampler = %self.name, "sampling thread panicked");
            }
        }
        debug!(sampler = %self.name, "sampler stopped");
        self.state = SamplerState::Stopped;
    }

    /// Stop the sampler if needed, then release its channels
    pub fn close(mut self) {
        self.close_channels();
    }

    /// INTERNAL: Shared between close() and drop()
    fn close_channels(&mut self) {
        if self.state == SamplerState::Closed { return; }
        self.stop();
        self.data_rx = None;
        self.error_rx = None;
        self.state = SamplerState::Closed;
        debug!(sampler = %self.name, "sampler closed");
    }

    /// INTERNAL: Warm up and prepare the sampling loop
    ///
    /// `derive` turns a (prior, current) pair of snapshots into the output.
    /// If it does not look at the prior, `needs_prior` may be false, and
    /// the snapshot itself stands in for a missing prior.
    ///
    fn build<P, F>(mut snapshotter: Snapshotter<P>,
                   config: &Config,
                   needs_prior: bool,
                   mut derive: F) -> Result<Self, Error>
        where P: PseudoFileParser,
              F: FnMut(&Snapshot<P::Data>, &Snapshot<P::Data>)
                       -> Result<Partial<O>, Error> + Send + 'static
    {
        config.validate()?;
        let name = format!("sampler:{}", P::PATH);

        // Set up the communication channels
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (data_tx, data_rx) = mpsc::sync_channel::<O>(1);
        let (error_tx, error_rx) = mpsc::sync_channel(config.error_capacity);
        let interval = config.interval;

        // Warm-up readout, which seeds the prior snapshot. I/O errors are
        // fatal here. An incomplete snapshot is not a valid prior: its
        // errors are reported and the first clean tick seeds it instead.
        let warm_up = snapshotter.get()?;
        let mut prior = if warm_up.is_complete() {
            Some(warm_up.value)
        } else {
            let mut reporter = ErrorReporter { sender: error_tx.clone(),
                                               name: &name };
            for error in warm_up.errors {
                reporter.report(error);
            }
            None
        };

        // This is the sampling loop
        let loop_name = name.clone();
        let body = move || {
            let mut ticker = Ticker::new(interval);
            let mut reporter = ErrorReporter { sender: error_tx,
                                               name: &loop_name };
            'sampling: loop {
                // Wait for the next tick, or for the stop signal
                if !ticker.wait(&stop_rx) { break 'sampling; }
                trace!(sampler = %loop_name, "tick");

                // Acquire a snapshot. Incomplete snapshots are not published,
                // and the prior is kept so that the next delta is computed
                // against the last known-good snapshot.
                let current = match snapshotter.get() {
                    Ok(partial) if partial.is_complete() => partial.value,
                    Ok(partial) => {
                        for error in partial.errors {
                            reporter.report(error);
                        }
                        continue 'sampling;
                    },
                    Err(error) => {
                        reporter.report(error);
                        continue 'sampling;
                    },
                };

                // Without a known-good prior, there is nothing to compare
                // the current snapshot with yet
                if prior.is_none() && needs_prior {
                    trace!(sampler = %loop_name, "seeded prior snapshot");
                    prior = Some(current);
                    continue 'sampling;
                }
                let reference = prior.as_ref().unwrap_or(&current);

                // Derive the output. Rejected comparisons are not published,
                // and the current snapshot becomes the new reference.
                let output = match derive(reference, &current) {
                    Ok(partial) => {
                        for error in partial.errors {
                            reporter.report(error);
                        }
                        partial.value
                    },
                    Err(error) => {
                        reporter.report(error);
                        prior = Some(current);
                        continue 'sampling;
                    },
                };

                // Publish it, then remember the current snapshot as prior
                if !publish(&data_tx, output, &stop_rx, interval) {
                    break 'sampling;
                }
                prior = Some(current);
            }
            debug!(sampler = %loop_name, "sampling loop exited");
        };

        Ok(Self {
            state: SamplerState::Created,
            pending: Some(Box::new(body)),
            worker: None,
            stop_tx: Some(stop_tx),
            data_rx: Some(data_rx),
            error_rx: Some(error_rx),
            name,
        })
    }
}
//
impl<D: Clone + Send + 'static> Sampler<Snapshot<D>> {
    /// Build a sampler which publishes raw snapshots
    ///
    /// This is what pseudo-files which only contain gauges (memory usage,
    /// load average...) want.
    ///
    pub fn snapshots<P>(snapshotter: Snapshotter<P>, config: &Config)
        -> Result<Self, Error>
        where P: PseudoFileParser<Data = D>
    {
        Self::build(snapshotter, config, false, |_prior, current| {
            Ok(Partial::complete(current.clone()))
        })
    }
}
//
impl<O: Send + 'static> Sampler<O> {
    /// Build a sampler which publishes deltas between consecutive snapshots
    pub fn deltas<P>(snapshotter: Snapshotter<P>, config: &Config)
        -> Result<Self, Error>
        where P: PseudoFileParser,
              P::Data: DeltaComputer<Delta = O>
    {
        let clock = snapshotter.clock();
        Self::build(snapshotter, config, true, move |prior, current| {
            P::Data::delta(prior, current, clock)
        })
    }
}
//
impl<O: Send + 'static> Drop for Sampler<O> {
    fn drop(&mut self) {
        self.close_channels();
    }
}


/// INTERNAL: Fixed-rate schedule of sampling ticks
///
/// Ticks are scheduled at regular deadlines from the start of sampling, so
/// that the time spent sampling does not make the schedule drift. Deadlines
/// which were missed (because the owner did not drain the data channel, for
/// example) are skipped rather than fired in a burst.
///
struct Ticker {
    /// Time between two ticks
    interval: Duration,

    /// Deadline of the next tick
    next_deadline: Instant,
}
//
impl Ticker {
    /// Schedule the first tick one interval from now
    fn new(interval: Duration) -> Self {
        Self { interval, next_deadline: Instant::now() + interval }
    }

    /// Wait for the next tick. Return false if the stop signal was received
    /// (or its sender was dropped) in the meantime.
    fn wait(&mut self, stop_rx: &Receiver<()>) -> bool {
        let now = Instant::now();
        let timeout = self.next_deadline.saturating_duration_since(now);
        match stop_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {},
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return false,
        }

        // Schedule the next tick, skipping any deadline that already passed
        self.next_deadline += self.interval;
        let now = Instant::now();
        while self.next_deadline <= now {
            self.next_deadline += self.interval;
        }
        true
    }
}


/// INTERNAL: Publish a sample, waiting for room in the data channel while
///           keeping an ear on the stop signal. Return false if the loop
///           should exit (stop requested, or receiver gone).
fn publish<O>(data_tx: &SyncSender<O>,
              mut output: O,
              stop_rx: &Receiver<()>,
              patience: Duration) -> bool
{
    loop {
        match data_tx.try_send(output) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(returned)) => {
                output = returned;
                match stop_rx.recv_timeout(patience) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        return false;
                    },
                }
            },
        }
    }
}


/// INTERNAL: Non-blocking reporting of per-tick problems
struct ErrorReporter<'a> {
    /// Sending half of the error channel
    sender: SyncSender<Error>,

    /// Name of the sampler, for logging purposes
    name: &'a str,
}
//
impl<'a> ErrorReporter<'a> {
    /// Report an error, dropping it if the owner is not keeping up
    fn report(&mut self, error: Error) {
        warn!(sampler = %self.name, %error, "sampling failed");
        match self.sender.try_send(error) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {},
            Err(TrySendError::Full(error)) => {
                warn!(sampler = %self.name, %error,
                      "error channel is full, dropping error");
            },
        }
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use crate::clock::ClockTicks;
    use crate::config::Config;
    use crate::error::Error;
    use crate::procfs::loadavg::LoadAvgParser;
    use crate::procfs::stat::StatParser;
    use crate::snapshotter::Snapshotter;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::process::Command;
    use std::time::{Duration, Instant};
    use super::{Sampler, SamplerState};

    /// INTERNAL: Fast-ticking configuration rooted at some directory
    fn test_config(root: &Path) -> Config {
        Config {
            proc_root: root.to_owned(),
            interval: Duration::from_millis(10),
            error_capacity: 4,
        }
    }

    /// INTERNAL: How long tests are willing to wait for a sample
    const PATIENCE: Duration = Duration::from_secs(5);

    /// INTERNAL: Overwrite a file in place, without truncating it first, so
    ///           that a concurrent readout never observes it empty. The new
    ///           contents must be as long as the old ones.
    fn overwrite(path: &Path, contents: &str) {
        let mut file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    /// Check the sampler lifecycle
    #[test]
    fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 1/467 12345\n")
           .unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<LoadAvgParser>::new(dir.path(), ClockTicks::resolve())
                        .unwrap();
        let mut sampler = Sampler::snapshots(snapshotter, &config).unwrap();
        assert_eq!(sampler.state(), SamplerState::Created);

        // Start it, and get a sample
        sampler.start().unwrap();
        assert_eq!(sampler.state(), SamplerState::Running);
        assert!(matches!(sampler.start(), Err(Error::SamplerState { .. })));
        let sample = sampler.data().unwrap().recv_timeout(PATIENCE).unwrap();
        assert_eq!(sample.last_pid, 12345);

        // Stop it. Once stop() returns, the data channel drains and closes.
        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Stopped);
        let data = sampler.data().unwrap();
        while data.recv_timeout(PATIENCE).is_ok() {}
        assert!(data.try_recv().is_err());

        // Close it
        sampler.close();
    }

    /// Check that deltas are published in acquisition order
    #[test]
    fn ordered_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, "cpu  100 0 50 800\nctxt 1000\n").unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<StatParser>::new(dir.path(), ClockTicks::from_hz(100))
                        .unwrap();
        let mut sampler = Sampler::deltas(snapshotter, &config).unwrap();
        sampler.start().unwrap();

        // Nothing moved since the warm-up readout
        let delta = sampler.data().unwrap().recv_timeout(PATIENCE).unwrap();
        assert_eq!(delta.context_switches, 0);
        assert!(delta.time_delta > Duration::ZERO);

        // Context switches happened. Each delta is computed against the
        // previously published snapshot, so the sum of deltas is exact.
        overwrite(&path, "cpu  100 0 50 800\nctxt 1010\n");
        let mut total = 0;
        while total < 10 {
            let delta = sampler.data().unwrap()
                               .recv_timeout(PATIENCE).unwrap();
            total += delta.context_switches;
        }
        assert_eq!(total, 10);
        sampler.close();
    }

    /// Check that incomplete ticks are reported and skipped, and that the
    /// sampler recovers afterwards against the last known-good snapshot
    #[test]
    fn skip_bad_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, "ctxt 1000\n").unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<StatParser>::new(dir.path(), ClockTicks::from_hz(100))
                        .unwrap();
        let mut sampler = Sampler::deltas(snapshotter, &config).unwrap();

        // Corrupt the file before the sampler gets to see it
        fs::write(&path, "ctxt 10x0\n").unwrap();
        sampler.start().unwrap();
        let error = sampler.errors().unwrap().recv_timeout(PATIENCE).unwrap();
        assert!(error.is_parse_error());

        // Fix it: the next delta is computed against the warm-up snapshot
        overwrite(&path, "ctxt 1005\n");
        let delta = loop {
            let delta = sampler.data().unwrap()
                               .recv_timeout(PATIENCE).unwrap();
            if delta.context_switches > 0 { break delta; }
        };
        assert_eq!(delta.context_switches, 5);
        sampler.stop();
    }

    /// Check that an incomplete warm-up snapshot is reported, and never
    /// used as a reference for deltas
    #[test]
    fn incomplete_warm_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, "ctxt 10x0\n").unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<StatParser>::new(dir.path(), ClockTicks::from_hz(100))
                        .unwrap();
        let mut sampler = Sampler::deltas(snapshotter, &config).unwrap();
        let error = sampler.errors().unwrap().try_recv().unwrap();
        assert!(error.is_parse_error());

        // The first complete snapshot becomes the reference, without any
        // context switches being made up
        overwrite(&path, "ctxt 1005\n");
        sampler.start().unwrap();
        let delta = sampler.data().unwrap().recv_timeout(PATIENCE).unwrap();
        assert_eq!(delta.context_switches, 0);

        overwrite(&path, "ctxt 1007\n");
        let delta = loop {
            let delta = sampler.data().unwrap()
                               .recv_timeout(PATIENCE).unwrap();
            if delta.context_switches > 0 { break delta; }
        };
        assert_eq!(delta.context_switches, 2);
        assert!(sampler.errors().unwrap().try_recv().is_err());
        sampler.stop();
    }

    /// Check that readout failures are reported on every tick without
    /// stopping the sampler
    #[test]
    fn read_error_ticks() {
        // The stat file of a process can be opened while the process is
        // alive, and cannot be read anymore once it is gone
        let mut child = Command::new("sleep").arg("60").spawn().unwrap();
        let path = format!("/proc/{}/stat", child.id());
        let snapshotter =
            Snapshotter::<StatParser>::open(&path, ClockTicks::from_hz(100))
                        .unwrap();
        let config = test_config(Path::new("/proc"));
        let mut sampler = Sampler::deltas(snapshotter, &config).unwrap();
        sampler.start().unwrap();
        sampler.data().unwrap().recv_timeout(PATIENCE).unwrap();
        child.kill().unwrap();
        child.wait().unwrap();

        // Keep draining the data channel until two read errors came in
        let mut read_errors = 0;
        let deadline = Instant::now() + PATIENCE;
        while read_errors < 2 {
            assert!(Instant::now() < deadline, "No read error was reported");
            while sampler.data().unwrap().try_recv().is_ok() {}
            match sampler.errors().unwrap()
                         .recv_timeout(Duration::from_millis(10)) {
                Ok(Error::Read { path: error_path, .. }) => {
                    assert_eq!(error_path, Path::new(&path));
                    read_errors += 1;
                },
                Ok(other) => panic!("Unexpected error {:?}", other),
                Err(_) => {},
            }
        }
        assert_eq!(sampler.state(), SamplerState::Running);
        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    /// Check that counter regressions are reported but do not wedge the
    /// sampler
    #[test]
    fn counter_regression() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stat");
        fs::write(&path, "ctxt 1000\n").unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<StatParser>::new(dir.path(), ClockTicks::from_hz(100))
                        .unwrap();
        let mut sampler = Sampler::deltas(snapshotter, &config).unwrap();
        fs::write(&path, "ctxt 0010\n").unwrap();
        sampler.start().unwrap();
        let error = sampler.errors().unwrap().recv_timeout(PATIENCE).unwrap();
        assert!(matches!(error, Error::CounterRegression { .. }));

        // The regressed snapshot became the new reference
        overwrite(&path, "ctxt 0012\n");
        let delta = loop {
            let delta = sampler.data().unwrap()
                               .recv_timeout(PATIENCE).unwrap();
            if delta.context_switches > 0 { break delta; }
        };
        assert_eq!(delta.context_switches, 2);
    }

    /// Check that a stalled owner does not prevent the sampler from stopping
    #[test]
    fn stop_under_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 1/467 12345\n")
           .unwrap();
        let config = test_config(dir.path());
        let snapshotter =
            Snapshotter::<LoadAvgParser>::new(dir.path(), ClockTicks::resolve())
                        .unwrap();
        let mut sampler = Sampler::snapshots(snapshotter, &config).unwrap();
        sampler.start().unwrap();

        // Let the data channel fill up without draining it
        std::thread::sleep(Duration::from_millis(100));
        sampler.stop();
        assert_eq!(sampler.state(), SamplerState::Stopped);
    }

    /// Check that samplers can be dropped or closed in any state
    #[test]
    fn drop_in_any_state() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 1/467 12345\n")
           .unwrap();
        let config = test_config(dir.path());
        let new_sampler = || {
            let snapshotter =
                Snapshotter::<LoadAvgParser>::new(dir.path(),
                                                  ClockTicks::resolve())
                            .unwrap();
            Sampler::snapshots(snapshotter, &config).unwrap()
        };

        // Never started
        drop(new_sampler());
        let mut created = new_sampler();
        created.stop();
        assert_eq!(created.state(), SamplerState::Stopped);
        assert!(created.data().unwrap().recv().is_err());
        created.close();

        // Running
        let mut running = new_sampler();
        running.start().unwrap();
        drop(running);
    }

    /// Check that a missing file is fatal at construction time
    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let snapshotter =
            Snapshotter::<LoadAvgParser>::new(dir.path(),
                                              ClockTicks::resolve());
        assert!(matches!(snapshotter, Err(Error::Open { .. })));
    }

    /// Check that invalid configurations are rejected
    #[test]
    fn invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("loadavg"), "0.52 0.58 0.59 1/467 12345\n")
           .unwrap();
        let mut config = test_config(dir.path());
        config.interval = Duration::ZERO;
        let snapshotter =
            Snapshotter::<LoadAvgParser>::new(dir.path(), ClockTicks::resolve())
                        .unwrap();
        assert!(matches!(Sampler::snapshots(snapshotter, &config),
                         Err(Error::Config(_))));
    }
}
