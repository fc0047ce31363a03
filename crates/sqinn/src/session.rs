//! The command layer: one request/response vocabulary on top of the
//! frame transport.
//!
//! A [`Session`] owns the writer and reader for one worker and performs
//! blocking call cycles: encode the request, flush it as one frame,
//! read the response frame, decode the success envelope and the results.
//! It is single-threaded; [`crate::SqinnConnection`] adds the lock that
//! serializes callers.

use std::io::{Read, Write};

use sqinn_core::error::{ApplicationError, Error, Result, TransportErrorKind};
use sqinn_core::{Value, ValueType};

use crate::protocol::{
    FrameReader, FrameWriter, FunctionCode, ProtocolVersion, read_value, write_value,
};

/// A blocking protocol session over an arbitrary byte transport.
///
/// Normally the transport is the worker's stdin/stdout pipe pair, but
/// anything `Write + Read` works, e.g. a socket forwarded to a remote
/// worker. A session performs no locking and no process supervision.
#[derive(Debug)]
pub struct Session<W: Write, R: Read> {
    writer: FrameWriter<W>,
    reader: FrameReader<R>,
    version: ProtocolVersion,
    broken: bool,
}

impl<W: Write, R: Read> Session<W, R> {
    /// Create a session over a transport speaking `version`.
    pub fn new(writer: W, reader: R, version: ProtocolVersion) -> Self {
        Self {
            writer: FrameWriter::new(writer),
            reader: FrameReader::new(reader),
            version,
            broken: false,
        }
    }

    /// The protocol revision this session speaks.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Whether an earlier transport error has poisoned this session.
    ///
    /// After a transport error the byte stream may be desynchronized;
    /// every further call fails fast. Discard the session and launch a
    /// new worker.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    // ==================== Call plumbing ====================

    /// Run one call, tracking transport health.
    fn call<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.broken {
            return Err(Error::transport(
                TransportErrorKind::Io,
                "session unusable after an earlier transport error",
            ));
        }
        match f(self) {
            Err(e) if matches!(e, Error::Transport(_)) => {
                self.broken = true;
                Err(e)
            }
            result => result,
        }
    }

    /// Resolve the wire code for a function, failing before any I/O when
    /// the negotiated revision does not carry it.
    fn begin(&mut self, function: FunctionCode) -> Result<()> {
        let Some(code) = function.wire_code(self.version) else {
            return Err(Error::contract(format!(
                "{} is not available in protocol {:?}",
                function.name(),
                self.version
            )));
        };
        self.writer.write_u8(code);
        Ok(())
    }

    /// Flush the request and decode the response envelope: a success
    /// flag, or a failure flag followed by the worker's error message.
    fn exchange(&mut self) -> Result<()> {
        self.writer.flush()?;
        let ok = self.reader.read_bool()?;
        if ok {
            Ok(())
        } else {
            let message = self.reader.read_str()?;
            self.reader.expect_drained()?;
            Err(Error::Application(ApplicationError { message }))
        }
    }

    /// Finish a call: the response frame must be fully consumed.
    fn finish(&mut self) -> Result<()> {
        self.reader.expect_drained()
    }

    // ==================== Version calls ====================

    /// The version string of the worker executable.
    pub fn sqinn_version(&mut self) -> Result<String> {
        self.call(|s| {
            s.begin(FunctionCode::SqinnVersion)?;
            s.exchange()?;
            let version = s.reader.read_str()?;
            s.finish()?;
            Ok(version)
        })
    }

    /// The wire protocol version number the worker speaks, >= 1.
    pub fn io_version(&mut self) -> Result<u8> {
        self.call(|s| {
            s.begin(FunctionCode::IoVersion)?;
            s.exchange()?;
            let version = s.reader.read_u8()?;
            s.finish()?;
            Ok(version)
        })
    }

    /// The SQLite library version the worker was built with.
    pub fn sqlite_version(&mut self) -> Result<String> {
        self.call(|s| {
            s.begin(FunctionCode::SqliteVersion)?;
            s.exchange()?;
            let version = s.reader.read_str()?;
            s.finish()?;
            Ok(version)
        })
    }

    // ==================== Database lifecycle ====================

    /// Open a database. The filename can be `":memory:"` or a path.
    pub fn open(&mut self, filename: &str) -> Result<()> {
        self.call(|s| {
            s.begin(FunctionCode::Open)?;
            s.writer.write_str(filename);
            s.exchange()?;
            s.finish()
        })
    }

    /// Close the database opened with [`Session::open`].
    pub fn close(&mut self) -> Result<()> {
        self.call(|s| {
            s.begin(FunctionCode::Close)?;
            s.exchange()?;
            s.finish()
        })
    }

    // ==================== Statement calls ====================

    /// Prepare a statement. The worker allows only one prepared
    /// statement at a time; preparing while another statement is active
    /// fails with an application error.
    pub fn prepare(&mut self, sql: &str) -> Result<()> {
        self.call(|s| {
            s.begin(FunctionCode::Prepare)?;
            s.writer.write_str(sql);
            s.exchange()?;
            s.finish()
        })
    }

    /// Bind the `iparam`'th parameter, counting from 1.
    pub fn bind(&mut self, iparam: i32, value: &Value) -> Result<()> {
        if iparam < 1 {
            return Err(Error::contract(format!(
                "bind parameter index must be >= 1 but was {iparam}"
            )));
        }
        self.call(|s| {
            s.begin(FunctionCode::Bind)?;
            s.writer.write_i32(iparam);
            write_value(&mut s.writer, value);
            s.exchange()?;
            s.finish()
        })
    }

    /// Advance the statement. Returns true while rows remain.
    pub fn step(&mut self) -> Result<bool> {
        self.call(|s| {
            s.begin(FunctionCode::Step)?;
            s.exchange()?;
            let more = s.reader.read_bool()?;
            s.finish()?;
            Ok(more)
        })
    }

    /// Reset the statement to its initial state.
    pub fn reset(&mut self) -> Result<()> {
        self.call(|s| {
            s.begin(FunctionCode::Reset)?;
            s.exchange()?;
            s.finish()
        })
    }

    /// Rows modified by the last statement.
    pub fn changes(&mut self) -> Result<i32> {
        self.call(|s| {
            s.begin(FunctionCode::Changes)?;
            s.exchange()?;
            let changes = s.reader.read_i32()?;
            s.finish()?;
            Ok(changes)
        })
    }

    /// Number of columns in the result set.
    pub fn column_count(&mut self) -> Result<i32> {
        self.call(|s| {
            s.begin(FunctionCode::ColumnCount)?;
            s.exchange()?;
            let count = s.reader.read_i32()?;
            s.finish()?;
            Ok(count)
        })
    }

    /// Type of the `icol`'th result column, counting from 0.
    pub fn column_type(&mut self, icol: i32) -> Result<ValueType> {
        self.call(|s| {
            s.begin(FunctionCode::ColumnType)?;
            s.writer.write_i32(icol);
            s.exchange()?;
            let tag = s.reader.read_u8()?;
            s.finish()?;
            ValueType::from_tag(tag).ok_or_else(|| {
                Error::transport(
                    TransportErrorKind::Decode,
                    format!("unknown column type tag {tag}"),
                )
            })
        })
    }

    /// Name of the `icol`'th result column, counting from 0.
    pub fn column_name(&mut self, icol: i32) -> Result<String> {
        self.call(|s| {
            s.begin(FunctionCode::ColumnName)?;
            s.writer.write_i32(icol);
            s.exchange()?;
            let name = s.reader.read_str()?;
            s.finish()?;
            Ok(name)
        })
    }

    /// Fetch the `icol`'th column of the current row, counting from 0.
    /// `expected` declares the column type; the worker answers with that
    /// type or NULL.
    pub fn column(&mut self, icol: i32, expected: ValueType) -> Result<Value> {
        if expected == ValueType::Null {
            return Err(Error::contract("NULL is not a valid column type"));
        }
        self.call(|s| {
            s.begin(FunctionCode::Column)?;
            s.writer.write_i32(icol);
            s.writer.write_u8(expected.tag());
            s.exchange()?;
            let value = read_value(&mut s.reader, expected)?;
            s.finish()?;
            Ok(value)
        })
    }

    /// Finalize the statement prepared with [`Session::prepare`].
    pub fn finalize(&mut self) -> Result<()> {
        self.call(|s| {
            s.begin(FunctionCode::Finalize)?;
            s.exchange()?;
            s.finish()
        })
    }

    // ==================== Batch calls ====================

    /// Execute a statement `niterations` times in one round trip,
    /// binding `nparams` parameters per iteration.
    ///
    /// `produce` is invoked exactly once per iteration with the
    /// iteration index and a reusable `nparams`-long buffer, pre-set to
    /// NULL, to fill with that iteration's parameters. Returns the
    /// modified-row count per iteration, in iteration order.
    ///
    /// `niterations == 0` is a no-op: no bytes are written and the
    /// producer is never invoked.
    pub fn exec(
        &mut self,
        sql: &str,
        niterations: usize,
        nparams: usize,
        mut produce: impl FnMut(usize, &mut [Value]),
    ) -> Result<Vec<i32>> {
        if niterations == 0 {
            return Ok(Vec::new());
        }
        let iterations = int_arg("niterations", niterations)?;
        let params = int_arg("nparams", nparams)?;
        self.call(|s| {
            s.begin(FunctionCode::Exec)?;
            s.writer.write_str(sql);
            s.writer.write_i32(iterations);
            s.writer.write_i32(params);
            let mut buffer = vec![Value::Null; nparams];
            for iteration in 0..niterations {
                buffer.fill(Value::Null);
                produce(iteration, &mut buffer);
                for value in &buffer {
                    write_value(&mut s.writer, value);
                }
            }
            s.exchange()?;
            let mut changes = Vec::with_capacity(niterations);
            for _ in 0..niterations {
                changes.push(s.reader.read_i32()?);
            }
            s.finish()?;
            Ok(changes)
        })
    }

    /// Execute a statement and stream its result rows.
    ///
    /// `params` binds the statement's parameters; `coltypes` declares
    /// the expected type of each result column (there is no dynamic
    /// type discovery on this path). `consume` is invoked exactly once
    /// per row, in row order, with the row index and a values slice of
    /// `coltypes.len()` entries. Rows are handed over as they are
    /// decoded; nothing is buffered, so callers that need all rows must
    /// collect them (see [`crate::SqinnConnection::query_rows`]).
    pub fn query(
        &mut self,
        sql: &str,
        params: &[Value],
        coltypes: &[ValueType],
        mut consume: impl FnMut(usize, &[Value]),
    ) -> Result<()> {
        if coltypes.is_empty() {
            return Err(Error::contract("query needs at least one column type"));
        }
        if coltypes.contains(&ValueType::Null) {
            return Err(Error::contract("NULL is not a valid column type"));
        }
        if params.iter().any(Value::is_null) {
            return Err(Error::contract("NULL parameters are not allowed in query"));
        }
        let nparams = int_arg("params", params.len())?;
        let ncols = int_arg("coltypes", coltypes.len())?;
        self.call(|s| {
            s.begin(FunctionCode::Query)?;
            s.writer.write_str(sql);
            s.writer.write_i32(nparams);
            for param in params {
                write_value(&mut s.writer, param);
            }
            s.writer.write_i32(ncols);
            for coltype in coltypes {
                s.writer.write_u8(coltype.tag());
            }
            s.exchange()?;
            let mut values = vec![Value::Null; coltypes.len()];
            let mut irow = 0_usize;
            while s.reader.read_bool()? {
                for (value, coltype) in values.iter_mut().zip(coltypes) {
                    *value = read_value(&mut s.reader, *coltype)?;
                }
                consume(irow, &values);
                irow += 1;
            }
            s.finish()
        })
    }

    // ==================== Shutdown ====================

    /// Say goodbye to the worker: the zero-length sentinel on revisions
    /// that use it, an explicit quit call otherwise. After this the
    /// session must not be used again.
    pub fn goodbye(&mut self) -> Result<()> {
        if self.version.uses_sentinel_shutdown() {
            if self.broken {
                // best effort: the pipe may already be gone
                return Ok(());
            }
            self.writer.write_sentinel()
        } else {
            self.call(|s| {
                s.begin(FunctionCode::Quit)?;
                s.exchange()?;
                s.finish()
            })
        }
    }
}

fn int_arg(name: &str, value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::contract(format!("{name} of {value} exceeds the protocol limit")))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    /// Build a scripted peer: every expected response frame is
    /// pre-encoded into one byte stream the session will read from.
    #[derive(Default)]
    struct Script {
        bytes: Vec<u8>,
    }

    impl Script {
        fn frame(mut self, payload: &[u8]) -> Self {
            self.bytes
                .extend_from_slice(&(payload.len() as i32).to_be_bytes());
            self.bytes.extend_from_slice(payload);
            self
        }

        fn ok(self, results: &[u8]) -> Self {
            let mut payload = vec![1_u8];
            payload.extend_from_slice(results);
            self.frame(&payload)
        }

        fn fail(self, message: &str) -> Self {
            let mut payload = vec![0_u8];
            payload.extend_from_slice(&(message.len() as i32 + 1).to_be_bytes());
            payload.extend_from_slice(message.as_bytes());
            payload.push(0);
            self.frame(&payload)
        }

        fn session(self) -> Session<Vec<u8>, Cursor<Vec<u8>>> {
            Session::new(Vec::new(), Cursor::new(self.bytes), ProtocolVersion::V1)
        }
    }

    fn encoded_str(s: &str) -> Vec<u8> {
        let mut out = (s.len() as i32 + 1).to_be_bytes().to_vec();
        out.extend_from_slice(s.as_bytes());
        out.push(0);
        out
    }

    /// The single request frame the session wrote.
    fn sent(session: &Session<Vec<u8>, Cursor<Vec<u8>>>) -> &[u8] {
        session.writer.get_ref()
    }

    #[test]
    fn open_request_layout() {
        let mut s = Script::default().ok(&[]).session();
        s.open("/tmp/test.db").unwrap();

        let mut want = Vec::new();
        let payload_len = 1 + 4 + "/tmp/test.db".len() + 1;
        want.extend_from_slice(&(payload_len as i32).to_be_bytes());
        want.push(10); // Open
        want.extend_from_slice(&encoded_str("/tmp/test.db"));
        assert_eq!(sent(&s), want.as_slice());
    }

    #[test]
    fn bind_request_layout() {
        let mut s = Script::default().ok(&[]).session();
        s.bind(2, &Value::Int64(-5)).unwrap();

        let mut want = Vec::new();
        want.extend_from_slice(&14_i32.to_be_bytes()); // 1 + 4 + 1 + 8
        want.push(12); // Bind
        want.extend_from_slice(&2_i32.to_be_bytes());
        want.push(2); // Int64 tag
        want.extend_from_slice(&(-5_i64).to_be_bytes());
        assert_eq!(sent(&s), want.as_slice());
    }

    #[test]
    fn bind_index_below_one_is_a_contract_violation() {
        let mut s = Script::default().session();
        let err = s.bind(0, &Value::Int32(1)).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
        assert!(sent(&s).is_empty());
    }

    #[test]
    fn step_decodes_more_flag() {
        let mut s = Script::default().ok(&[1]).ok(&[0]).session();
        assert!(s.step().unwrap());
        assert!(!s.step().unwrap());
    }

    #[test]
    fn changes_decodes_count() {
        let mut s = Script::default().ok(&7_i32.to_be_bytes()).session();
        assert_eq!(s.changes().unwrap(), 7);
    }

    #[test]
    fn version_calls_decode_strings() {
        let mut s = Script::default()
            .ok(&encoded_str("1.2.3"))
            .ok(&[2])
            .ok(&encoded_str("3.46.0"))
            .session();
        assert_eq!(s.sqinn_version().unwrap(), "1.2.3");
        assert_eq!(s.io_version().unwrap(), 2);
        assert_eq!(s.sqlite_version().unwrap(), "3.46.0");
    }

    #[test]
    fn column_type_decodes_tag() {
        let mut s = Script::default().ok(&[4]).session();
        assert_eq!(s.column_type(0).unwrap(), ValueType::Text);
    }

    #[test]
    fn column_enforces_declared_type() {
        // worker answers Text where Int32 was declared
        let mut results = vec![4_u8];
        results.extend_from_slice(&encoded_str("oops"));
        let mut s = Script::default().ok(&results).session();
        let err = s.column(0, ValueType::Int32).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(s.is_broken());
    }

    #[test]
    fn worker_failure_is_an_application_error() {
        let mut s = Script::default()
            .fail("no such table: users")
            .ok(&[])
            .session();
        let err = s.prepare("SELECT * FROM users").unwrap_err();
        match err {
            Error::Application(e) => assert_eq!(e.message, "no such table: users"),
            other => panic!("want application error, got {other}"),
        }
        // the session survives an application error
        assert!(!s.is_broken());
        s.prepare("SELECT 1").unwrap();
    }

    #[test]
    fn exec_request_and_response() {
        let mut results = Vec::new();
        results.extend_from_slice(&1_i32.to_be_bytes());
        results.extend_from_slice(&1_i32.to_be_bytes());
        let mut s = Script::default().ok(&results).session();

        let mut produced = Vec::new();
        let changes = s
            .exec("INSERT INTO t(a,b) VALUES(?,?)", 2, 2, |iteration, params| {
                produced.push(iteration);
                assert_eq!(params.len(), 2);
                params[0] = Value::Int32(iteration as i32 + 1);
                params[1] = Value::Text(format!("name-{iteration}"));
            })
            .unwrap();
        assert_eq!(changes, vec![1, 1]);
        assert_eq!(produced, vec![0, 1]);

        // request: code, sql, niterations, nparams, 2x2 tagged values
        let sql = "INSERT INTO t(a,b) VALUES(?,?)";
        let mut want = vec![51_u8];
        want.extend_from_slice(&encoded_str(sql));
        want.extend_from_slice(&2_i32.to_be_bytes());
        want.extend_from_slice(&2_i32.to_be_bytes());
        for iteration in 0..2 {
            want.push(1); // Int32 tag
            want.extend_from_slice(&(iteration as i32 + 1).to_be_bytes());
            want.push(4); // Text tag
            want.extend_from_slice(&encoded_str(&format!("name-{iteration}")));
        }
        let mut framed = (want.len() as i32).to_be_bytes().to_vec();
        framed.extend_from_slice(&want);
        assert_eq!(sent(&s), framed.as_slice());
    }

    #[test]
    fn exec_zero_iterations_is_a_no_op() {
        let mut s = Script::default().session();
        let mut calls = 0;
        let changes = s
            .exec("UPDATE t SET a=?", 0, 1, |_, _| calls += 1)
            .unwrap();
        assert!(changes.is_empty());
        assert_eq!(calls, 0);
        assert!(sent(&s).is_empty());
    }

    #[test]
    fn exec_without_params_still_produces_per_iteration() {
        let mut results = Vec::new();
        for _ in 0..3 {
            results.extend_from_slice(&0_i32.to_be_bytes());
        }
        let mut s = Script::default().ok(&results).session();
        let mut calls = 0;
        let changes = s
            .exec("VACUUM", 3, 0, |_, params| {
                assert!(params.is_empty());
                calls += 1;
            })
            .unwrap();
        assert_eq!(changes, vec![0, 0, 0]);
        assert_eq!(calls, 3);
    }

    #[test]
    fn query_streams_rows_in_order() {
        let mut results = Vec::new();
        for (id, name) in [(1_i32, "x"), (2, "y")] {
            results.push(1); // row present
            results.push(1); // Int32 tag
            results.extend_from_slice(&id.to_be_bytes());
            results.push(4); // Text tag
            results.extend_from_slice(&encoded_str(name));
        }
        results.push(0); // no more rows
        let mut s = Script::default().ok(&results).session();

        let mut rows = Vec::new();
        s.query(
            "SELECT a,b FROM t ORDER BY a",
            &[],
            &[ValueType::Int32, ValueType::Text],
            |irow, values| {
                assert_eq!(values.len(), 2);
                rows.push((irow, values.to_vec()));
            },
        )
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 0);
        assert_eq!(rows[0].1, vec![Value::Int32(1), Value::Text("x".into())]);
        assert_eq!(rows[1].0, 1);
        assert_eq!(rows[1].1, vec![Value::Int32(2), Value::Text("y".into())]);
    }

    #[test]
    fn query_request_layout() {
        let mut s = Script::default().ok(&[0]).session();
        s.query(
            "SELECT a FROM t WHERE b=?",
            &[Value::Int32(5)],
            &[ValueType::Int64],
            |_, _| {},
        )
        .unwrap();

        let sql = "SELECT a FROM t WHERE b=?";
        let mut want = vec![52_u8];
        want.extend_from_slice(&encoded_str(sql));
        want.extend_from_slice(&1_i32.to_be_bytes());
        want.push(1); // Int32 tag
        want.extend_from_slice(&5_i32.to_be_bytes());
        want.extend_from_slice(&1_i32.to_be_bytes());
        want.push(2); // Int64 column tag
        let mut framed = (want.len() as i32).to_be_bytes().to_vec();
        framed.extend_from_slice(&want);
        assert_eq!(sent(&s), framed.as_slice());
    }

    #[test]
    fn query_preconditions_fail_before_io() {
        let mut s = Script::default().session();

        let err = s.query("SELECT 1", &[], &[], |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::Contract(_)));

        let err = s
            .query("SELECT 1", &[], &[ValueType::Null], |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::Contract(_)));

        let err = s
            .query("SELECT 1", &[Value::Null], &[ValueType::Int32], |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::Contract(_)));

        assert!(sent(&s).is_empty());
        assert!(!s.is_broken());
    }

    #[test]
    fn transport_error_breaks_the_session() {
        // truncated response: envelope only, then nothing for the count
        let mut s = Script::default().ok(&[]).session();
        let err = s.changes().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(s.is_broken());

        let err = s.changes().unwrap_err();
        match err {
            Error::Transport(t) => assert!(t.message.contains("earlier transport error")),
            other => panic!("want transport error, got {other}"),
        }
    }

    #[test]
    fn trailing_response_bytes_break_the_session() {
        let mut s = Script::default().ok(&[1, 9]).session();
        let err = s.step().unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(s.is_broken());
    }

    #[test]
    fn v1_goodbye_is_the_sentinel() {
        let mut s = Script::default().session();
        s.goodbye().unwrap();
        assert_eq!(sent(&s), [0, 0, 0, 0]);
    }

    #[test]
    fn v2_goodbye_is_a_quit_call() {
        let script = Script::default().ok(&[]);
        let mut s = Session::new(
            Vec::new(),
            Cursor::new(script.bytes),
            ProtocolVersion::V2,
        );
        s.goodbye().unwrap();
        assert_eq!(s.writer.get_ref().as_slice(), [0, 0, 0, 1, 9]);
    }

    #[test]
    fn v2_rejects_the_statement_vocabulary_before_io() {
        let mut s = Session::new(
            Vec::new(),
            Cursor::new(Vec::new()),
            ProtocolVersion::V2,
        );
        let err = s.prepare("SELECT 1").unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
        assert!(s.writer.get_ref().is_empty());
        assert!(!s.is_broken());
    }
}
