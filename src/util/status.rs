use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Code {
    /// Bad schema: empty family list, duplicate family, invalid options
    Schema,
    /// Operation referenced a family the table never declared
    UnknownFamily,
    /// Operation is illegal in the table's current state
    TableState,
    /// A stored record or block failed to decode or verify
    Corruption,
    /// The storage environment failed
    IOError,
    InvalidArgument,
    /// Catalog lookup of a table name that does not exist
    NotFound,
}

#[derive(Debug, Clone)]
pub struct Status {
    code: Code,
    message: Option<String>,
}

impl Status {
    pub fn new(code: Code, msg: impl Into<String>) -> Self {
        Status {
            code,
            message: Some(msg.into()),
        }
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Status::new(Code::Schema, msg)
    }

    pub fn unknown_family(family: &str) -> Self {
        Status::new(
            Code::UnknownFamily,
            format!("column family '{family}' is not declared"),
        )
    }

    pub fn table_state(msg: impl Into<String>) -> Self {
        Status::new(Code::TableState, msg)
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Status::new(Code::Corruption, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Status::new(Code::IOError, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Status::new(Code::InvalidArgument, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Status::new(Code::NotFound, msg)
    }

    pub fn is_schema_error(&self) -> bool {
        self.code == Code::Schema
    }

    pub fn is_unknown_family(&self) -> bool {
        self.code == Code::UnknownFamily
    }

    pub fn is_table_state_error(&self) -> bool {
        self.code == Code::TableState
    }

    pub fn is_corruption(&self) -> bool {
        self.code == Code::Corruption
    }

    pub fn is_io_error(&self) -> bool {
        self.code == Code::IOError
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.code == Code::InvalidArgument
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Code::NotFound
    }

    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{:?}: {}", self.code, msg),
            None => write!(f, "{:?}", self.code),
        }
    }
}

impl std::error::Error for Status {}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        Status::io_error(err.to_string())
    }
}

impl From<serde_json::Error> for Status {
    fn from(err: serde_json::Error) -> Self {
        Status::corruption(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Status>;
