use serde::{Deserialize, Serialize};

use crate::{secs_between, ItemId};

/// Client-side timer kept only for live display. The server's item record is
/// the source of truth; this value is rebuilt from it with [`TimerState::sync`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub active_item: Option<ItemId>,
    pub started_at_unix: Option<i64>,
    pub accumulated_secs: u64,
    pub running: bool,
}

impl TimerState {
    /// Rebuild from the server snapshot of `item_id`.
    ///
    /// A running item takes its start from the server, so time that passed
    /// while the client was closed is counted.
    pub fn sync(item_id: ItemId, is_running: bool, duration_secs: u64, server_running_since_unix: Option<i64>) -> Self {
        let started_at_unix = if is_running { server_running_since_unix } else { None };
        Self {
            active_item: Some(item_id),
            started_at_unix,
            accumulated_secs: duration_secs,
            running: is_running && started_at_unix.is_some(),
        }
    }

    pub fn elapsed_secs(&self, now_unix: i64) -> u64 {
        match (self.running, self.started_at_unix) {
            (true, Some(start)) => self.accumulated_secs + secs_between(start, now_unix),
            _ => self.accumulated_secs,
        }
    }

    /// Optimistic local start, replaced by the next `sync`.
    pub fn start(&mut self, item_id: ItemId, now_unix: i64) {
        if self.active_item.as_ref() != Some(&item_id) {
            self.accumulated_secs = 0;
        }
        self.active_item = Some(item_id);
        self.started_at_unix = Some(now_unix);
        self.running = true;
    }

    /// Optimistic local pause.
    pub fn stop(&mut self, now_unix: i64) {
        self.accumulated_secs = self.elapsed_secs(now_unix);
        self.started_at_unix = None;
        self.running = false;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_tracking(&self, item_id: &ItemId) -> bool {
        self.active_item.as_ref() == Some(item_id)
    }
}

/// `HH:MM:SS`, hours are not wrapped.
pub fn format_hms(total_secs: u64) -> String {
    let h = total_secs / 3600;
    let m = (total_secs % 3600) / 60;
    let s = total_secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000;

    #[test]
    fn running_item_counts_time_while_closed() {
        let state = TimerState::sync(ItemId::from_str("i1"), true, 120, Some(T));
        assert_eq!(state.elapsed_secs(T + 30), 150);
    }

    #[test]
    fn stopped_item_takes_server_duration_verbatim() {
        let state = TimerState::sync(ItemId::from_str("i1"), false, 120, Some(T));
        assert_eq!(state.started_at_unix, None);
        assert_eq!(state.elapsed_secs(T + 999), 120);
    }

    #[test]
    fn skewed_clock_never_goes_negative() {
        let state = TimerState::sync(ItemId::from_str("i1"), true, 10, Some(T));
        assert_eq!(state.elapsed_secs(T - 60), 10);
    }

    #[test]
    fn local_start_stop_accumulates() {
        let mut state = TimerState::default();
        let id = ItemId::from_str("i1");
        state.start(id.clone(), T);
        state.stop(T + 45);
        state.start(id.clone(), T + 100);
        assert_eq!(state.elapsed_secs(T + 115), 60);
        assert!(state.is_tracking(&id));
    }

    #[test]
    fn formats_hours_minutes_seconds() {
        assert_eq!(format_hms(0), "00:00:00");
        assert_eq!(format_hms(3_725), "01:02:05");
        assert_eq!(format_hms(100 * 3600), "100:00:00");
    }
}
