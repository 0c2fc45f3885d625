use std::time::{Duration, Instant};

use crate::packet::OpenPacket;

/// Live handshake state for one connection.
///
/// Created from the `OPEN` packet of a successful handshake and destroyed on
/// close; a closed session is terminal and a new connection starts from a
/// fresh one. Intervals are converted from the wire's milliseconds.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-issued session id, replayed on every subsequent request.
    pub sid: String,
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    /// Transports the server is willing to upgrade to.
    pub upgrades: Vec<String>,
    /// Server-side frame size bound, when the server advertises one.
    pub max_payload: Option<u64>,
    last_send: Instant,
}

impl Session {
    pub fn new(open: OpenPacket) -> Self {
        Self {
            sid: open.sid,
            ping_interval: Duration::from_millis(open.ping_interval),
            ping_timeout: Duration::from_millis(open.ping_timeout),
            upgrades: open.upgrades,
            max_payload: open.max_payload,
            last_send: Instant::now(),
        }
    }

    /// Total time the server may stay silent before the session is dead.
    pub fn timeout(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }

    /// Whether the quiet period warrants a heartbeat.
    pub fn needs_heartbeat(&self, now: Instant) -> bool {
        now.duration_since(self.last_send) >= self.ping_interval
    }

    /// Reset the heartbeat clock. Called after every send.
    pub fn touch(&mut self) {
        self.last_send = Instant::now();
    }

    /// Whether the server advertised an upgrade to the given transport.
    pub fn supports(&self, transport: &str) -> bool {
        self.upgrades.iter().any(|u| u == transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(OpenPacket {
            sid: "sid".to_string(),
            upgrades: vec!["websocket".to_string()],
            ping_interval: 25000,
            ping_timeout: 20000,
            max_payload: None,
        })
    }

    #[test]
    fn timeout_is_interval_plus_ping_timeout() {
        assert_eq!(session().timeout(), Duration::from_secs(45));
    }

    #[test]
    fn heartbeat_due_after_one_quiet_interval() {
        let mut session = session();
        let now = Instant::now();
        assert!(!session.needs_heartbeat(now));
        assert!(session.needs_heartbeat(now + Duration::from_secs(25)));

        session.touch();
        assert!(!session.needs_heartbeat(Instant::now()));
    }

    #[test]
    fn upgrade_lookup() {
        let session = session();
        assert!(session.supports("websocket"));
        assert!(!session.supports("webtransport"));
    }
}
