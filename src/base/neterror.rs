use thiserror::Error;

/// Broad family an error belongs to.
///
/// Connection errors abort a send before any exchange completes, message
/// errors describe a protocol-level failure of the exchange itself, and logic
/// errors describe misuse or misconfiguration detected before bytes are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Connection,
    Message,
    Logic,
}

/// Sub-code carried by message-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageErrorCode {
    MalformedResponse,
    Timeout,
    TooManyRedirects,
    NonHttpRedirect,
    ReadError,
    WriteError,
}

/// Sub-code carried by logic-level errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicErrorCode {
    Misconfiguration,
    MissingValue,
    InvalidArgument,
    NonRewindableBody,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection to {host}:{port} failed: {reason}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        reason: String,
    },
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Unable to resolve {domain}: {reason}")]
    NameNotResolvedFor { domain: String, reason: String },
    #[error("Address invalid")]
    AddressInvalid,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("SSL handshake with {host} failed: {reason}")]
    SslHandshakeFailed { host: String, reason: String },
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,
    #[error("SOCKS connection failed: {0}")]
    SocksConnectionFailed(String),
    #[error("Proxy connection failed")]
    ProxyConnectionFailed,

    // Message Errors
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    #[error("Request timed out")]
    TimedOut,
    #[error("Maximum ({0}) redirects followed")]
    TooManyRedirects(u32),
    #[error("Refusing to redirect to a non-HTTP URL {0}")]
    NonHttpRedirect(String),
    #[error("Error reading data: {0}")]
    ReadError(String),
    #[error("Error writing request: {0}")]
    WriteError(String),
    #[error("Connection closed before the response was complete")]
    ConnectionClosed,
    #[error("{0}")]
    Aborted(String),

    // Logic Errors
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
    #[error("Missing value: {0}")]
    MissingValue(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid header name '{0}'")]
    InvalidHeaderName(String),
    #[error("Configuration parameter '{0}' is unknown")]
    UnknownConfigKey(String),
    #[error("Body cannot be rewound: {0}")]
    NonRewindableBody(String),

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::ConnectionRefused => -102,
            NetError::ConnectionReset => -101,
            NetError::ConnectionFailed => -104,
            NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved => -105,
            NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError => -107,
            NetError::SslHandshakeFailed { .. } => -107,
            NetError::AddressInvalid => -108,
            NetError::TunnelConnectionFailed => -111,
            NetError::SocksConnectionFailed(_) => -120,
            NetError::ProxyConnectionFailed => -130,

            NetError::MalformedResponse(_) => -320,
            NetError::TimedOut => -301,
            NetError::TooManyRedirects(_) => -310,
            NetError::NonHttpRedirect(_) => -311,
            NetError::ReadError(_) => -340,
            NetError::WriteError(_) => -341,
            NetError::ConnectionClosed => -324,
            NetError::Aborted(_) => -342,

            NetError::Misconfiguration(_) => -900,
            NetError::MissingValue(_) => -901,
            NetError::InvalidArgument(_) => -902,
            NetError::InvalidHeaderName(_) => -903,
            NetError::UnknownConfigKey(_) => -904,
            NetError::NonRewindableBody(_) => -905,

            NetError::Unknown(code) => *code,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.as_i32() {
            -199..=-100 => ErrorCategory::Connection,
            -399..=-300 => ErrorCategory::Message,
            -999..=-900 => ErrorCategory::Logic,
            _ => ErrorCategory::Message,
        }
    }

    /// Sub-code for message-level errors, `None` for the other categories.
    pub fn message_code(&self) -> Option<MessageErrorCode> {
        match self {
            NetError::MalformedResponse(_) => Some(MessageErrorCode::MalformedResponse),
            NetError::TimedOut => Some(MessageErrorCode::Timeout),
            NetError::TooManyRedirects(_) => Some(MessageErrorCode::TooManyRedirects),
            NetError::NonHttpRedirect(_) => Some(MessageErrorCode::NonHttpRedirect),
            NetError::ReadError(_) | NetError::ConnectionClosed | NetError::Aborted(_) => {
                Some(MessageErrorCode::ReadError)
            }
            NetError::WriteError(_) => Some(MessageErrorCode::WriteError),
            _ => None,
        }
    }

    /// Sub-code for logic-level errors, `None` for the other categories.
    pub fn logic_code(&self) -> Option<LogicErrorCode> {
        match self {
            NetError::Misconfiguration(_) => Some(LogicErrorCode::Misconfiguration),
            NetError::MissingValue(_) => Some(LogicErrorCode::MissingValue),
            NetError::InvalidArgument(_)
            | NetError::InvalidHeaderName(_)
            | NetError::UnknownConfigKey(_) => Some(LogicErrorCode::InvalidArgument),
            NetError::NonRewindableBody(_) => Some(LogicErrorCode::NonRewindableBody),
            _ => None,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.category() == ErrorCategory::Connection
    }

    pub fn is_message_error(&self) -> bool {
        self.category() == ErrorCategory::Message
    }

    pub fn is_logic_error(&self) -> bool {
        self.category() == ErrorCategory::Logic
    }

    pub fn connection_failed_to(host: &str, port: u16, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => NetError::TimedOut,
            _ => NetError::ConnectionFailedTo {
                host: host.to_string(),
                port,
                reason: err.to_string(),
            },
        }
    }

    pub fn dns_failed(domain: &str, err: std::io::Error) -> Self {
        NetError::NameNotResolvedFor {
            domain: domain.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -108 => NetError::AddressInvalid,
            -111 => NetError::TunnelConnectionFailed,
            -130 => NetError::ProxyConnectionFailed,

            -301 => NetError::TimedOut,
            -324 => NetError::ConnectionClosed,

            _ => NetError::Unknown(code),
        }
    }
}
