//! STOMP heart-beat negotiation.

use std::time::Duration;

use crate::error::{ChannelError, ChannelResult};

/// Negotiated heartbeat intervals for one session. A zero duration disables
/// that direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heartbeat {
    /// How often this client must send something.
    pub outgoing: Duration,
    /// How often the server promised to send something.
    pub incoming: Duration,
}

impl Heartbeat {
    /// Both directions disabled.
    pub const DISABLED: Self = Self {
        outgoing: Duration::ZERO,
        incoming: Duration::ZERO,
    };

    /// Value for the `heart-beat` header of `CONNECT`, offering the same
    /// interval in both directions.
    pub fn header_value(interval: Duration) -> String {
        let ms = interval.as_millis();
        format!("{ms},{ms}")
    }

    /// Parse a `heart-beat` header into `(cx, cy)` milliseconds.
    pub fn parse_header(value: &str) -> ChannelResult<(u64, u64)> {
        let (x, y) = value
            .split_once(',')
            .ok_or_else(|| ChannelError::protocol(format!("invalid heart-beat: {value}")))?;
        let parse = |s: &str| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| ChannelError::protocol(format!("invalid heart-beat: {value}")))
        };
        Ok((parse(x)?, parse(y)?))
    }

    /// Combine what the client offered in `CONNECT` with what the server
    /// answered in `CONNECTED`.
    ///
    /// Each direction is disabled when either side sent 0, otherwise it is the
    /// larger of the two values.
    pub fn negotiate(client: (u64, u64), server: (u64, u64)) -> Self {
        let (cx, cy) = client;
        let (sx, sy) = server;
        let pick = |a: u64, b: u64| {
            if a == 0 || b == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(a.max(b))
            }
        };
        Self {
            outgoing: pick(cx, sy),
            incoming: pick(sx, cy),
        }
    }

    /// Inbound silence after which the server is considered gone.
    pub fn incoming_deadline(&self) -> Option<Duration> {
        (!self.incoming.is_zero()).then(|| self.incoming * 2)
    }

    pub fn is_disabled(&self) -> bool {
        self.outgoing.is_zero() && self.incoming.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_value() {
        assert_eq!(Heartbeat::header_value(Duration::from_secs(4)), "4000,4000");
        assert_eq!(Heartbeat::header_value(Duration::ZERO), "0,0");
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(Heartbeat::parse_header("10000, 5000").unwrap(), (10000, 5000));
        assert!(Heartbeat::parse_header("10000").is_err());
        assert!(Heartbeat::parse_header("a,b").is_err());
    }

    #[test]
    fn test_negotiate_takes_larger_interval() {
        let hb = Heartbeat::negotiate((4000, 4000), (10000, 2000));
        assert_eq!(hb.outgoing, Duration::from_millis(4000));
        assert_eq!(hb.incoming, Duration::from_millis(10000));
        assert_eq!(hb.incoming_deadline(), Some(Duration::from_millis(20000)));
    }

    #[test]
    fn test_negotiate_zero_disables_direction() {
        let hb = Heartbeat::negotiate((4000, 4000), (0, 4000));
        assert_eq!(hb.outgoing, Duration::from_millis(4000));
        assert!(hb.incoming.is_zero());
        assert_eq!(hb.incoming_deadline(), None);

        assert!(Heartbeat::negotiate((0, 0), (10000, 10000)).is_disabled());
    }
}
