/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments for both node roles,
/// selected at compile time via feature flags. The firmware binaries pick the
/// matching `esp_hal::peripherals::GPIOn` types with the same features and
/// log these numbers at boot.

/// ESP32 GPIOs routed to the RTC domain (usable as ext0 wake sources).
pub const ESP32_RTC_GPIOS: &[u8] = &[
    0, 2, 4, 12, 13, 14, 15, 25, 26, 27, 32, 33, 34, 35, 36, 37, 38, 39,
];

/// ESP32-S3 GPIOs routed to the RTC domain.
pub const ESP32S3_RTC_GPIOS: &[u8] = &[
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21,
];

/// Whether `pin` appears in an RTC GPIO table.
pub const fn is_rtc_gpio(table: &[u8], pin: u8) -> bool {
    let mut i = 0;
    while i < table.len() {
        if table[i] == pin {
            return true;
        }
        i += 1;
    }
    false
}

#[cfg(feature = "board-devkit")]
mod hw {
    /// Trap: reed/hammer switch, pulled down, high when the trap has fired.
    /// Must be an RTC GPIO so it can serve as an ext0 wake source.
    pub const SENSOR_PIN: u8 = 4;
    /// Trap: on-board LED mirroring the sensor while awake
    pub const STATUS_LED_PIN: u8 = 2;
    /// Dashboard: (connected LED, triggered LED) per trap slot
    pub const INDICATOR_PINS: &[(u8, u8)] = &[(27, 33), (25, 26)];
    /// Dashboard: UART0 RX for host commands
    pub const CONSOLE_RX_PIN: u8 = 3;
    pub const RTC_GPIOS: &[u8] = super::ESP32_RTC_GPIOS;
    pub const BOARD_NAME: &str = "esp32_devkit";
}

#[cfg(feature = "board-xiao")]
mod hw {
    pub const SENSOR_PIN: u8 = 1;
    pub const STATUS_LED_PIN: u8 = 21; // user LED, active low
    pub const INDICATOR_PINS: &[(u8, u8)] = &[(3, 4), (5, 6)];
    pub const CONSOLE_RX_PIN: u8 = 44;
    pub const RTC_GPIOS: &[u8] = super::ESP32S3_RTC_GPIOS;
    pub const BOARD_NAME: &str = "xiao_esp32s3";
}

#[cfg(not(any(feature = "board-devkit", feature = "board-xiao")))]
mod hw {
    pub const INDICATOR_PINS: &[(u8, u8)] = &[];
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;

#[cfg(any(feature = "board-devkit", feature = "board-xiao"))]
const _: () = assert!(is_rtc_gpio(RTC_GPIOS, SENSOR_PIN), "trap sensor must be an RTC GPIO");
