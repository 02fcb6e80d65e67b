//! Visit (session) counters and timestamp formatting.

use super::entities::UserState;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Wall-clock format shared by session fields and target parameter history
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inactivity gap after which the next event opens a new visit
pub const SESSION_TIMEOUT_SECS: i64 = 30 * 60;

/// Format `now` as `yyyy-MM-dd HH:mm:ss` (UTC).
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Advance the visit counters for an event observed at `now`.
///
/// - first event ever: `nrv=1`, `tvc=1`, `pviv=0`
/// - gap since the last event above the timeout: `nrv=0`, `tvc+1`, `pviv=0`
/// - events with a page name (other than tracking pixels) bump `pviv`
pub fn advance_session(user: &mut UserState, counts_as_page_view: bool, now: DateTime<Utc>) {
    let now_string = format_timestamp(now);

    match user.last_event_time.as_deref() {
        None => {
            user.nrv = 1;
            user.tvc = 1;
            user.pviv = 0;
            user.last_visit_time = Some(now_string.clone());
        }
        Some(last) => {
            let expired = match parse_timestamp(last) {
                Some(last) => (now - last).num_seconds() > SESSION_TIMEOUT_SECS,
                // Unreadable history starts a new visit
                None => true,
            };
            if expired {
                user.nrv = 0;
                user.tvc += 1;
                user.pviv = 0;
                user.last_visit_time = Some(now_string.clone());
            }
        }
    }

    if counts_as_page_view {
        user.pviv += 1;
    }
    user.last_event_time = Some(now_string);
}
