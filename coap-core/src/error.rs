use coap_msg::to_bytes::MessageToBytesError;
use coap_msg::{Code, MessageParseError};

/// The context an error occurred in, attached to [`Error`] for logging.
#[derive(Debug, Clone, Copy)]
pub enum When {
  /// Polling the socket for a datagram
  Polling,
  /// Sending a message
  Sending,
  /// Dispatching a request to a resource handler
  Dispatching,
}

/// An error encountered inside the endpoint core, together with the
/// context it happened in.
#[derive(Debug)]
pub struct Error {
  /// What happened
  pub what: What,
  /// What we were doing when it happened
  pub when: When,
}

impl Error {
  /// Attach a `when` to a `what`.
  pub fn new(when: When, what: What) -> Self {
    Error { when, what }
  }
}

/// §7 error kinds, each carrying enough to decide whether (and how) to
/// reply.
#[derive(Debug)]
pub enum What {
  /// Header or token couldn't be parsed; reply RST if a MID was recovered,
  /// else drop silently.
  ProtocolMalformed(MessageParseError),
  /// An unrecognized option had its critical bit set; reply `4.02`.
  OptionError,
  /// Target resource doesn't exist; reply `4.04`.
  NotFound,
  /// Resource exists but has no handler for the method; reply `4.05`.
  MethodNotAllowed,
  /// `Accept` option named a format the resource can't produce; reply
  /// `4.06`.
  NotAcceptable,
  /// `If-Match`/`If-None-Match` precondition failed; reply `4.12`.
  PreconditionFailed,
  /// Blockwise body exceeded what the server will buffer; reply `4.13`.
  EntityTooLarge,
  /// A handler panicked or returned an opaque failure; reply `5.00`.
  InternalError,
  /// Upstream proxy target did not respond in time; reply `5.04`.
  GatewayTimeout,
  /// `Proxy-Uri` named a scheme other than `coap`/`coaps`; reply `5.05`.
  ProxyingNotSupported,
  /// A CON was retransmitted `MAX_RETRANSMIT` times with no ACK/RST.
  /// Internal only — propagated to the originator or observer/blockwise
  /// cleanup, never itself serialized onto the wire.
  TransmissionTimeout,
  /// The datagram didn't serialize (token too long); internal only.
  ToBytes(MessageToBytesError),
  /// The socket itself errored.
  SockError(std::io::Error),
}

impl What {
  /// The response code this error should be surfaced to a peer as, if any.
  /// `TransmissionTimeout`, `ToBytes` and `SockError` never reach the wire
  /// directly — they're handled internally (exchange teardown, log and
  /// drop) rather than turned into a reply.
  pub fn response_code(&self) -> Option<Code> {
    match self {
      | What::ProtocolMalformed(_) => Some(Code::BAD_REQUEST),
      | What::OptionError => Some(Code::BAD_OPTION),
      | What::NotFound => Some(Code::NOT_FOUND),
      | What::MethodNotAllowed => Some(Code::METHOD_NOT_ALLOWED),
      | What::NotAcceptable => Some(Code::NOT_ACCEPTABLE),
      | What::PreconditionFailed => Some(Code::PRECONDITION_FAILED),
      | What::EntityTooLarge => Some(Code::REQUEST_ENTITY_TOO_LARGE),
      | What::InternalError => Some(Code::INTERNAL_SERVER_ERROR),
      | What::GatewayTimeout => Some(Code::GATEWAY_TIMEOUT),
      | What::ProxyingNotSupported => Some(Code::PROXYING_NOT_SUPPORTED),
      | What::TransmissionTimeout | What::ToBytes(_) | What::SockError(_) => None,
    }
  }
}
