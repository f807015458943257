//! Socket monitor events.
//!
//! libzmq reports socket lifecycle on an inproc PAIR endpoint. The first
//! frame of every monitor message starts with a native-endian `u16` event id
//! followed by a `u32` value; the second frame is the peer endpoint.

use crate::application::ports::TransportEvent;

/// Events requested from the monitor.
pub const MONITOR_EVENTS: i32 = 0xFFFF;

const EVENT_CONNECTED: u16 = 0x0001;
const EVENT_CONNECT_DELAYED: u16 = 0x0002;
const EVENT_CONNECT_RETRIED: u16 = 0x0004;
const EVENT_DISCONNECTED: u16 = 0x0200;

/// Event id of a monitor message, if the first frame is long enough.
#[must_use]
pub fn event_id(frames: &[Vec<u8>]) -> Option<u16> {
    let [lo, hi, ..] = frames.first()?.as_slice() else {
        return None;
    };
    Some(u16::from_ne_bytes([*lo, *hi]))
}

/// Transport signal for a monitor event id; other events are ignored.
#[must_use]
pub const fn to_signal(event: u16) -> Option<TransportEvent> {
    match event {
        EVENT_CONNECTED => Some(TransportEvent::Connected),
        EVENT_CONNECT_DELAYED => Some(TransportEvent::ConnectDelayed),
        EVENT_DISCONNECTED => Some(TransportEvent::Disconnected),
        _ => None,
    }
}

/// Whether the event is a reconnect attempt (logged only).
#[must_use]
pub const fn is_retry(event: u16) -> bool {
    event == EVENT_CONNECT_RETRIED
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn frame(event: u16) -> Vec<Vec<u8>> {
        let mut first = event.to_ne_bytes().to_vec();
        first.extend_from_slice(&7_u32.to_ne_bytes());
        vec![first, b"tcp://127.0.0.1:5555".to_vec()]
    }

    #[test_case(0x0001, Some(TransportEvent::Connected) ; "connected")]
    #[test_case(0x0002, Some(TransportEvent::ConnectDelayed) ; "connect delayed")]
    #[test_case(0x0200, Some(TransportEvent::Disconnected) ; "disconnected")]
    #[test_case(0x0080, None ; "closed")]
    #[test_case(0x0004, None ; "retried")]
    fn maps_monitor_events(event: u16, expected: Option<TransportEvent>) {
        let id = event_id(&frame(event)).unwrap();
        assert_eq!(to_signal(id), expected);
    }

    #[test]
    fn short_frames_are_ignored() {
        assert_eq!(event_id(&[]), None);
        assert_eq!(event_id(&[vec![1]]), None);
    }

    #[test]
    fn retry_detection() {
        assert!(is_retry(0x0004));
        assert!(!is_retry(0x0001));
    }
}
