//! Launch configuration for the worker subprocess.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::protocol::ProtocolVersion;

/// Receives diagnostic lines from the worker's stderr.
///
/// The drain thread calls the sink once per line for the lifetime of the
/// connection. Sinks must be cheap and must not block for long: a stalled
/// sink stalls the drain, and eventually the worker itself once its
/// stderr pipe fills up.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Configuration for launching a worker subprocess.
///
/// ```no_run
/// use sqinn::SqinnConfig;
///
/// let config = SqinnConfig::new()
///     .exe("/usr/local/bin/sqinn")
///     .db("/tmp/test.db");
/// ```
#[derive(Clone)]
pub struct SqinnConfig {
    /// Path to the worker executable. Relative names are resolved via
    /// `PATH`. An embedding layer that extracts a prebuilt binary passes
    /// the extracted path here (and usually a [`scratch_dir`]).
    ///
    /// [`scratch_dir`]: SqinnConfig::scratch_dir
    pub exe: String,
    /// The database name: a filesystem path or a special name like
    /// `":memory:"`. v2 workers receive it on the command line; v1
    /// workers open it via the `open` call.
    pub db: String,
    /// Worker log verbosity: 0 (off), 1 (info) or 2 (debug).
    pub loglevel: u8,
    /// File the worker should log to. Debugging aid, normally unset.
    pub logfile: Option<PathBuf>,
    /// Sink for the worker's stderr lines. When unset, lines go to
    /// `tracing` at debug level under the `sqinn::worker` target.
    pub log: Option<LogSink>,
    /// The wire protocol revision the worker speaks.
    pub protocol: ProtocolVersion,
    /// Override the worker's argument list entirely. Empty means "build
    /// the argument list for the configured protocol revision".
    pub extra_args: Vec<String>,
    /// How long terminate waits for the worker to exit before killing it.
    pub terminate_grace: Duration,
    /// A scratch directory to delete after the worker has exited, e.g.
    /// the temp dir an embedding layer extracted the executable into.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SqinnConfig {
    fn default() -> Self {
        Self {
            exe: "sqinn".to_string(),
            db: ":memory:".to_string(),
            loglevel: 0,
            logfile: None,
            log: None,
            protocol: ProtocolVersion::default(),
            extra_args: Vec::new(),
            terminate_grace: Duration::from_secs(5),
            scratch_dir: None,
        }
    }
}

impl std::fmt::Debug for SqinnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqinnConfig")
            .field("exe", &self.exe)
            .field("db", &self.db)
            .field("loglevel", &self.loglevel)
            .field("logfile", &self.logfile)
            .field("log", &self.log.as_ref().map(|_| "<sink>"))
            .field("protocol", &self.protocol)
            .field("extra_args", &self.extra_args)
            .field("terminate_grace", &self.terminate_grace)
            .field("scratch_dir", &self.scratch_dir)
            .finish()
    }
}

impl SqinnConfig {
    /// Create a config with defaults: the `sqinn` executable from
    /// `PATH`, an in-memory database, logging off, protocol v1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker executable path.
    pub fn exe(mut self, exe: impl Into<String>) -> Self {
        self.exe = exe.into();
        self
    }

    /// Set the database name.
    pub fn db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Set the worker log verbosity (0 off, 1 info, 2 debug).
    pub fn loglevel(mut self, level: u8) -> Self {
        self.loglevel = level;
        self
    }

    /// Set the worker log file.
    pub fn logfile(mut self, path: impl Into<PathBuf>) -> Self {
        self.logfile = Some(path.into());
        self
    }

    /// Set the stderr log sink.
    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log = Some(sink);
        self
    }

    /// Set the protocol revision.
    pub fn protocol(mut self, version: ProtocolVersion) -> Self {
        self.protocol = version;
        self
    }

    /// Replace the worker argument list.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the terminate grace period.
    pub fn terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Set a scratch directory to remove after the worker exits.
    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// The argument list for the worker, per protocol revision.
    ///
    /// v1 workers take no arguments (the database is opened over the
    /// protocol); v2 workers take `run` plus flags. An `extra_args`
    /// override wins outright.
    pub(crate) fn argv(&self) -> Vec<String> {
        if !self.extra_args.is_empty() {
            return self.extra_args.clone();
        }
        match self.protocol {
            ProtocolVersion::V1 => Vec::new(),
            ProtocolVersion::V2 => {
                let mut args = vec!["run".to_string()];
                if !self.db.is_empty() {
                    args.push("-db".to_string());
                    args.push(self.db.clone());
                }
                if self.loglevel > 0 {
                    args.push("-loglevel".to_string());
                    args.push(self.loglevel.to_string());
                }
                if let Some(logfile) = &self.logfile {
                    args.push("-logfile".to_string());
                    args.push(logfile.display().to_string());
                }
                if self.log.is_some() || self.loglevel > 0 {
                    args.push("-logstderr".to_string());
                }
                args
            }
        }
    }

    /// The effective stderr sink: the configured one, or tracing.
    pub(crate) fn sink(&self) -> LogSink {
        self.log.clone().unwrap_or_else(|| {
            Arc::new(|line: &str| {
                tracing::debug!(target: "sqinn::worker", "{line}");
            })
        })
    }
}
