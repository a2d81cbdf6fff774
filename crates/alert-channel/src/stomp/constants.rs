//! Byte and header constants shared by the STOMP encoder and decoder.

/// Frame terminator
pub(crate) const NULL: u8 = 0;
/// Newline byte
pub(crate) const LF: u8 = b'\n';
/// Carriage return byte
pub(crate) const CR: u8 = b'\r';

/// Protocol versions offered in `CONNECT`.
pub(crate) const ACCEPT_VERSION: &str = "1.2,1.1";

pub(crate) const HEADER_ACCEPT_VERSION: &str = "accept-version";
pub(crate) const HEADER_HOST: &str = "host";
pub(crate) const HEADER_HEART_BEAT: &str = "heart-beat";
pub(crate) const HEADER_ID: &str = "id";
pub(crate) const HEADER_DESTINATION: &str = "destination";
pub(crate) const HEADER_SUBSCRIPTION: &str = "subscription";
pub(crate) const HEADER_CONTENT_LENGTH: &str = "content-length";
pub(crate) const HEADER_MESSAGE: &str = "message";
pub(crate) const HEADER_RECEIPT: &str = "receipt";
