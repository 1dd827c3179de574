/// The current state of a logical send.
///
/// One physical exchange walks `Building` through `Done`; redirects and
/// digest retries loop back to `Building` through their own states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// No send in progress.
    #[default]
    Idle,

    /// Serializing the request line, headers and body framing.
    Building,

    /// Establishing the transport connection.
    Connecting,

    /// Writing the request head and streaming the body.
    Sending,

    /// Waiting for the status line (TTFB).
    AwaitingStatusLine,

    /// Reading the header block.
    ReceivingHeaders,

    /// Reading the response body.
    ReceivingBody,

    /// Following a `Location` header.
    Redirecting,

    /// Answering a Digest challenge.
    Reauthenticating,

    /// The final response is ready.
    Done,
}

impl LoadState {
    /// Whether the state belongs to the network-facing part of an exchange.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            LoadState::Connecting
                | LoadState::Sending
                | LoadState::AwaitingStatusLine
                | LoadState::ReceivingHeaders
                | LoadState::ReceivingBody
        )
    }
}
