//! Protocol revisions and function codes.
//!
//! The numeric codes are a contract with the worker executable and must
//! stay stable per revision. All version differences live in the lookup
//! table below; the command layer never touches raw code bytes.

/// A wire protocol revision spoken by a worker executable.
///
/// The revisions differ in their function-code assignments and in how a
/// connection says goodbye: v1 terminates with a zero-length request
/// sentinel, v2 with an explicit [`FunctionCode::Quit`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// First revision: full statement-level vocabulary, sentinel shutdown.
    #[default]
    V1,
    /// Second revision: batch calls only, explicit quit command.
    V2,
}

impl ProtocolVersion {
    /// Whether this revision terminates with the zero-length sentinel
    /// (as opposed to a quit call).
    pub const fn uses_sentinel_shutdown(self) -> bool {
        matches!(self, ProtocolVersion::V1)
    }
}

/// A protocol function, independent of its per-revision wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionCode {
    /// Worker executable version string
    SqinnVersion,
    /// Wire protocol version number
    IoVersion,
    /// SQLite library version string
    SqliteVersion,
    /// Terminate the worker (v2 only; v1 uses the sentinel)
    Quit,
    /// Open a database
    Open,
    /// Prepare a statement
    Prepare,
    /// Bind one parameter of the prepared statement
    Bind,
    /// Advance the prepared statement one row
    Step,
    /// Reset the prepared statement
    Reset,
    /// Rows modified by the last statement
    Changes,
    /// Fetch one column of the current row
    Column,
    /// Finalize the prepared statement
    Finalize,
    /// Close the database
    Close,
    /// Number of result columns
    ColumnCount,
    /// Type of one result column
    ColumnType,
    /// Name of one result column
    ColumnName,
    /// Batched bind+step execution
    Exec,
    /// Bind + stream result rows
    Query,
}

impl FunctionCode {
    /// The wire code of this function in the given revision, or `None`
    /// when the revision does not carry the function.
    pub const fn wire_code(self, version: ProtocolVersion) -> Option<u8> {
        match version {
            ProtocolVersion::V1 => match self {
                FunctionCode::SqinnVersion => Some(1),
                FunctionCode::IoVersion => Some(2),
                FunctionCode::SqliteVersion => Some(3),
                FunctionCode::Quit => None,
                FunctionCode::Open => Some(10),
                FunctionCode::Prepare => Some(11),
                FunctionCode::Bind => Some(12),
                FunctionCode::Step => Some(13),
                FunctionCode::Reset => Some(14),
                FunctionCode::Changes => Some(15),
                FunctionCode::Column => Some(16),
                FunctionCode::Finalize => Some(17),
                FunctionCode::Close => Some(18),
                FunctionCode::ColumnCount => Some(19),
                FunctionCode::ColumnType => Some(20),
                FunctionCode::ColumnName => Some(21),
                FunctionCode::Exec => Some(51),
                FunctionCode::Query => Some(52),
            },
            ProtocolVersion::V2 => match self {
                FunctionCode::Exec => Some(1),
                FunctionCode::Query => Some(2),
                FunctionCode::Quit => Some(9),
                _ => None,
            },
        }
    }

    /// Function name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            FunctionCode::SqinnVersion => "SqinnVersion",
            FunctionCode::IoVersion => "IoVersion",
            FunctionCode::SqliteVersion => "SqliteVersion",
            FunctionCode::Quit => "Quit",
            FunctionCode::Open => "Open",
            FunctionCode::Prepare => "Prepare",
            FunctionCode::Bind => "Bind",
            FunctionCode::Step => "Step",
            FunctionCode::Reset => "Reset",
            FunctionCode::Changes => "Changes",
            FunctionCode::Column => "Column",
            FunctionCode::Finalize => "Finalize",
            FunctionCode::Close => "Close",
            FunctionCode::ColumnCount => "ColumnCount",
            FunctionCode::ColumnType => "ColumnType",
            FunctionCode::ColumnName => "ColumnName",
            FunctionCode::Exec => "Exec",
            FunctionCode::Query => "Query",
        }
    }
}
