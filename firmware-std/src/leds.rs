//! Indicator LEDs driven through ESP-IDF GPIO.
//!
//! One (connected, triggered) LED pair per configured trap, in slot order.

use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};

use trapwatch::identity::TrapIdentity;
use trapwatch::indicator::{self, Indicator};
use trapwatch::liveness::MAX_TRAPS;

type Led = PinDriver<'static, AnyOutputPin, Output>;

pub struct LedPanel {
    ids: heapless::Vec<TrapIdentity, MAX_TRAPS>,
    leds: heapless::Vec<(Led, Led), MAX_TRAPS>,
}

impl LedPanel {
    pub fn new(
        ids: &[TrapIdentity],
        pins: impl IntoIterator<Item = (AnyOutputPin, AnyOutputPin)>,
    ) -> anyhow::Result<Self> {
        let mut leds = heapless::Vec::new();
        for (connected, triggered) in pins {
            let pair = (PinDriver::output(connected)?, PinDriver::output(triggered)?);
            if leds.push(pair).is_err() {
                break;
            }
        }
        if leds.len() < ids.len() {
            log::warn!(
                "{} traps configured but only {} indicator slots on this board",
                ids.len(),
                leds.len()
            );
        }
        Ok(Self {
            ids: ids.iter().copied().take(MAX_TRAPS).collect(),
            leds,
        })
    }

    fn slot(&mut self, id: TrapIdentity) -> Option<&mut (Led, Led)> {
        let i = indicator::slot_of(&self.ids, &id)?;
        self.leds.get_mut(i)
    }
}

fn set(led: &mut Led, on: bool) {
    let result = if on { led.set_high() } else { led.set_low() };
    if let Err(e) = result {
        log::error!("LED write failed: {:?}", e);
    }
}

impl Indicator for LedPanel {
    fn set_connected(&mut self, id: TrapIdentity, connected: bool) {
        if let Some((led, _)) = self.slot(id) {
            set(led, connected);
        }
    }

    fn set_triggered(&mut self, id: TrapIdentity, triggered: bool) {
        if let Some((_, led)) = self.slot(id) {
            set(led, triggered);
        }
    }
}
