/// Indicator outputs on the dashboard.
///
/// The core pushes logical state into an [`Indicator`]; nothing flows back.
/// Firmware maps each configured trap to a slot with two LEDs (connected,
/// triggered) using the pin table in `board`.
use crate::identity::TrapIdentity;
use crate::liveness::TrapLivenessRecord;

pub trait Indicator {
    fn set_connected(&mut self, id: TrapIdentity, connected: bool);
    fn set_triggered(&mut self, id: TrapIdentity, triggered: bool);
}

/// Drive both signals for one trap from a record snapshot.
pub fn render<I: Indicator + ?Sized>(indicator: &mut I, id: TrapIdentity, record: &TrapLivenessRecord) {
    indicator.set_connected(id, record.connected);
    indicator.set_triggered(id, record.triggered);
}

/// Redraw every trap from a full snapshot. Run on each watchdog period so the
/// outputs converge on the records even if an event was lost.
pub fn render_all<I: Indicator + ?Sized>(indicator: &mut I, records: &[(TrapIdentity, TrapLivenessRecord)]) {
    for (id, record) in records {
        render(indicator, *id, record);
    }
}

/// Slot index of `id` in a configured identity list.
///
/// Slots follow configuration order so LED positions stay stable across
/// reboots.
pub fn slot_of(ids: &[TrapIdentity], id: &TrapIdentity) -> Option<usize> {
    ids.iter().position(|known| known == id)
}
