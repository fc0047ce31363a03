//! The connection: a worker subprocess plus the lock that serializes
//! callers onto its pipe pair.

use std::io::{Read, Write};
use std::process::{ChildStdin, ChildStdout};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sqinn_core::error::{Error, Result};
use sqinn_core::{Row, Value, ValueType};

use crate::config::SqinnConfig;
use crate::process::{self, WorkerProcess};
use crate::protocol::ProtocolVersion;
use crate::session::Session;

/// A connection to one worker subprocess.
///
/// All calls are blocking and strictly serialized: one request/response
/// cycle is in flight at a time, so a connection is safe to share
/// between threads but never pipelines. For parallel load, launch
/// multiple connections, one worker each.
///
/// ```no_run
/// use sqinn::{SqinnConfig, SqinnConnection, Value, ValueType};
///
/// # fn main() -> sqinn::Result<()> {
/// let conn = SqinnConnection::launch(SqinnConfig::new())?;
/// conn.open(":memory:")?;
/// conn.exec_sql("CREATE TABLE users (id INTEGER, name TEXT)")?;
/// conn.exec_params(
///     "INSERT INTO users (id, name) VALUES (?, ?)",
///     2,
///     2,
///     &[
///         Value::Int32(1), Value::Text("Alice".into()),
///         Value::Int32(2), Value::Text("Bob".into()),
///     ],
/// )?;
/// let rows = conn.query_rows(
///     "SELECT id, name FROM users ORDER BY id",
///     &[],
///     &[ValueType::Int32, ValueType::Text],
/// )?;
/// assert_eq!(rows.len(), 2);
/// conn.terminate()?;
/// # Ok(())
/// # }
/// ```
pub struct SqinnConnection<W: Write = ChildStdin, R: Read = ChildStdout> {
    inner: Mutex<Inner<W, R>>,
}

impl<W: Write, R: Read> std::fmt::Debug for SqinnConnection<W, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqinnConnection").finish_non_exhaustive()
    }
}

struct Inner<W: Write, R: Read> {
    session: Session<W, R>,
    worker: Option<WorkerProcess>,
    grace: Duration,
    closed: bool,
}

impl SqinnConnection {
    /// Launch a worker subprocess and connect to it.
    ///
    /// On failure nothing is left running; see
    /// [`sqinn_core::LaunchError`].
    pub fn launch(config: SqinnConfig) -> Result<Self> {
        let spawned = process::spawn(&config)?;
        Ok(Self {
            inner: Mutex::new(Inner {
                session: Session::new(spawned.stdin, spawned.stdout, config.protocol),
                worker: Some(spawned.process),
                grace: config.terminate_grace,
                closed: false,
            }),
        })
    }
}

impl<W: Write, R: Read> SqinnConnection<W, R> {
    /// Connect over a caller-supplied transport instead of a spawned
    /// subprocess, e.g. a socket forwarded to a remote worker. The
    /// caller keeps responsibility for the peer's lifetime; terminate
    /// only says goodbye on the wire.
    pub fn attach(writer: W, reader: R, version: ProtocolVersion) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session: Session::new(writer, reader, version),
                worker: None,
                grace: Duration::from_secs(5),
                closed: false,
            }),
        }
    }

    /// Run one call while holding the connection lock.
    fn with_session<T>(&self, f: impl FnOnce(&mut Session<W, R>) -> Result<T>) -> Result<T> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Err(Error::ConnectionClosed);
        }
        f(&mut inner.session)
    }

    // ==================== Versions ====================

    /// The version string of the worker executable.
    pub fn sqinn_version(&self) -> Result<String> {
        self.with_session(Session::sqinn_version)
    }

    /// The wire protocol version number the worker speaks.
    pub fn io_version(&self) -> Result<u8> {
        self.with_session(Session::io_version)
    }

    /// The SQLite library version the worker was built with.
    pub fn sqlite_version(&self) -> Result<String> {
        self.with_session(Session::sqlite_version)
    }

    // ==================== Database lifecycle ====================

    /// Open a database. The filename can be `":memory:"` or a
    /// filesystem path. The worker keeps it open until [`close`].
    ///
    /// [`close`]: SqinnConnection::close
    pub fn open(&self, filename: &str) -> Result<()> {
        self.with_session(|s| s.open(filename))
    }

    /// Close the database opened with [`SqinnConnection::open`]. The
    /// connection stays usable: another database may be opened after.
    pub fn close(&self) -> Result<()> {
        self.with_session(Session::close)
    }

    // ==================== Statement calls ====================

    /// Prepare a statement. At most one statement may be prepared at a
    /// time; every prepared statement must be finalized with
    /// [`finalize`] before the next [`prepare`].
    ///
    /// This is a low-level call; prefer [`exec`] and [`query`].
    ///
    /// [`finalize`]: SqinnConnection::finalize
    /// [`prepare`]: SqinnConnection::prepare
    /// [`exec`]: SqinnConnection::exec
    /// [`query`]: SqinnConnection::query
    pub fn prepare(&self, sql: &str) -> Result<()> {
        self.with_session(|s| s.prepare(sql))
    }

    /// Bind the `iparam`'th parameter of the prepared statement.
    /// Parameter indexes start at 1.
    pub fn bind(&self, iparam: i32, value: &Value) -> Result<()> {
        self.with_session(|s| s.bind(iparam, value))
    }

    /// Advance the prepared statement one row. Returns true while rows
    /// remain.
    pub fn step(&self) -> Result<bool> {
        self.with_session(Session::step)
    }

    /// Reset the prepared statement to its initial state.
    pub fn reset(&self) -> Result<()> {
        self.with_session(Session::reset)
    }

    /// Rows modified by the last statement.
    pub fn changes(&self) -> Result<i32> {
        self.with_session(Session::changes)
    }

    /// Number of columns in the result set.
    pub fn column_count(&self) -> Result<i32> {
        self.with_session(Session::column_count)
    }

    /// Type of the `icol`'th result column. Column indexes start at 0.
    pub fn column_type(&self, icol: i32) -> Result<ValueType> {
        self.with_session(|s| s.column_type(icol))
    }

    /// Name of the `icol`'th result column. Column indexes start at 0.
    pub fn column_name(&self, icol: i32) -> Result<String> {
        self.with_session(|s| s.column_name(icol))
    }

    /// Fetch the `icol`'th column of the current row as `expected`,
    /// which must not be NULL. Column indexes start at 0.
    pub fn column(&self, icol: i32, expected: ValueType) -> Result<Value> {
        self.with_session(|s| s.column(icol, expected))
    }

    /// Finalize the prepared statement.
    pub fn finalize(&self) -> Result<()> {
        self.with_session(Session::finalize)
    }

    // ==================== Batch calls ====================

    /// Execute a statement `niterations` times in one round trip.
    ///
    /// `produce` is invoked once per iteration with the iteration index
    /// and a reusable `nparams`-long parameter buffer, pre-set to NULL.
    /// Returns one modified-row count per iteration, in order.
    /// `niterations == 0` performs no I/O and returns an empty vec.
    pub fn exec(
        &self,
        sql: &str,
        niterations: usize,
        nparams: usize,
        produce: impl FnMut(usize, &mut [Value]),
    ) -> Result<Vec<i32>> {
        self.with_session(|s| s.exec(sql, niterations, nparams, produce))
    }

    /// Execute a statement with a flat pre-built parameter list of
    /// exactly `niterations * nparams` values.
    pub fn exec_params(
        &self,
        sql: &str,
        niterations: usize,
        nparams: usize,
        params: &[Value],
    ) -> Result<Vec<i32>> {
        if params.len() != niterations * nparams {
            return Err(Error::contract(format!(
                "want {niterations} x {nparams} params but have {}",
                params.len()
            )));
        }
        self.exec(sql, niterations, nparams, |iteration, buffer| {
            let offset = iteration * nparams;
            buffer.clone_from_slice(&params[offset..offset + nparams]);
        })
    }

    /// Execute a statement once, without parameters. Returns the number
    /// of modified rows. Useful for DDL and transaction control:
    ///
    /// ```no_run
    /// # fn main() -> sqinn::Result<()> {
    /// # let conn = sqinn::SqinnConnection::launch(sqinn::SqinnConfig::new())?;
    /// conn.exec_sql("BEGIN IMMEDIATE")?;
    /// conn.exec_sql("CREATE TABLE t (a INTEGER)")?;
    /// conn.exec_sql("COMMIT")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn exec_sql(&self, sql: &str) -> Result<i32> {
        let changes = self.exec(sql, 1, 0, |_, _| {})?;
        Ok(changes[0])
    }

    /// Execute a statement and stream its result rows.
    ///
    /// `coltypes` declares the expected type per result column;
    /// `consume` is invoked once per row, in row order, with a values
    /// slice of `coltypes.len()` entries. Rows are delivered as they
    /// are decoded and not retained, so arbitrarily large results can
    /// be processed in bounded memory.
    pub fn query(
        &self,
        sql: &str,
        params: &[Value],
        coltypes: &[ValueType],
        consume: impl FnMut(usize, &[Value]),
    ) -> Result<()> {
        self.with_session(|s| s.query(sql, params, coltypes, consume))
    }

    /// Execute a statement and collect all result rows.
    ///
    /// Convenience over [`query`] for results known to fit in memory.
    ///
    /// [`query`]: SqinnConnection::query
    pub fn query_rows(
        &self,
        sql: &str,
        params: &[Value],
        coltypes: &[ValueType],
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.query(sql, params, coltypes, |_, values| {
            rows.push(Row::new(values.to_vec()));
        })?;
        Ok(rows)
    }

    // ==================== Shutdown ====================

    /// Terminate the connection: say goodbye to the worker (quit call
    /// or zero-length sentinel, per protocol revision), wait for it to
    /// exit within the grace period, kill it if it does not, and
    /// release pipes and scratch artifacts.
    ///
    /// Idempotent: a second terminate is a no-op returning `Ok`. Every
    /// other call after terminate fails with
    /// [`Error::ConnectionClosed`].
    pub fn terminate(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        let goodbye = if inner.session.is_broken() {
            // the stream is already dead; just reap the process
            Ok(())
        } else {
            inner.session.goodbye()
        };
        let shutdown = match inner.worker.take() {
            Some(mut worker) => worker.shutdown(inner.grace),
            None => Ok(()),
        };
        goodbye.and(shutdown)
    }
}

impl<W: Write, R: Read> Drop for SqinnConnection<W, R> {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            tracing::warn!(target: "sqinn", "terminate on drop failed: {e}");
        }
    }
}
