//! Gateway-side mailbox filled from the radio driver's receive callback

use core::cell::Cell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use super::MacAddress;
use crate::reading::ReadingRecord;

/// A decoded record and the address of the node that sent it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReceivedReading {
    pub sender: MacAddress,
    pub record: ReadingRecord,
}

/// Single-slot mailbox between the receive callback and the poll loop.
///
/// The callback is the only producer and the poll loop the only consumer.
/// If a second frame arrives before the loop drains the slot, the newer
/// reading replaces the older one.
///
/// `new` is `const` so the receiver can live in a `static` that the driver's
/// callback can reach.
pub struct RadioReceiver {
    mailbox: Signal<CriticalSectionRawMutex, ReceivedReading>,
    dropped: Mutex<CriticalSectionRawMutex, Cell<u32>>,
}

impl RadioReceiver {
    pub const fn new() -> Self {
        Self {
            mailbox: Signal::new(),
            dropped: Mutex::new(Cell::new(0)),
        }
    }

    /// Receive callback body. Copies the frame and raises the flag; nothing
    /// else may happen here.
    ///
    /// Returns `false` if the frame was not exactly one record long.
    pub fn on_receive(&self, sender: [u8; 6], frame: &[u8]) -> bool {
        match ReadingRecord::from_frame(frame) {
            Some(record) => {
                self.mailbox.signal(ReceivedReading {
                    sender: MacAddress(sender),
                    record,
                });
                true
            }
            None => {
                self.dropped.lock(|count| count.set(count.get().wrapping_add(1)));
                false
            }
        }
    }

    /// Drain the slot if a reading is waiting.
    pub fn try_take(&self) -> Option<ReceivedReading> {
        self.mailbox.try_take()
    }

    pub fn has_reading(&self) -> bool {
        self.mailbox.signaled()
    }

    /// Wait for the next reading.
    pub async fn wait(&self) -> ReceivedReading {
        self.mailbox.wait().await
    }

    /// Frames rejected for having the wrong length since startup.
    pub fn dropped_frames(&self) -> u32 {
        self.dropped.lock(|count| count.get())
    }
}

impl Default for RadioReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::RECORD_SIZE;

    const SENDER: [u8; 6] = [0x24, 0x0a, 0xc4, 0x01, 0x02, 0x03];

    fn record(tilt: f32) -> ReadingRecord {
        ReadingRecord {
            tilt,
            temperature: 18.25,
            battery_millivolts: 3012,
            sleep_interval_secs: 30,
        }
    }

    #[test]
    fn test_wire_round_trip_is_bit_identical() {
        let receiver = RadioReceiver::new();
        let sent = ReadingRecord {
            tilt: 33.3,
            temperature: -0.1,
            battery_millivolts: -1,
            sleep_interval_secs: i32::MAX,
        };

        assert!(receiver.on_receive(SENDER, &sent.to_bytes()));
        let received = receiver.try_take().unwrap();

        assert_eq!(received.sender, MacAddress(SENDER));
        assert_eq!(received.record.tilt.to_bits(), sent.tilt.to_bits());
        assert_eq!(
            received.record.temperature.to_bits(),
            sent.temperature.to_bits()
        );
        assert_eq!(received.record.battery_millivolts, sent.battery_millivolts);
        assert_eq!(received.record.sleep_interval_secs, sent.sleep_interval_secs);
    }

    #[test]
    fn test_slot_is_drained_once() {
        let receiver = RadioReceiver::new();
        receiver.on_receive(SENDER, &record(40.0).to_bytes());

        assert!(receiver.has_reading());
        assert!(receiver.try_take().is_some());
        assert!(receiver.try_take().is_none());
    }

    #[test]
    fn test_latest_reading_wins() {
        let receiver = RadioReceiver::new();
        receiver.on_receive(SENDER, &record(40.0).to_bytes());
        receiver.on_receive(SENDER, &record(41.0).to_bytes());

        assert_eq!(receiver.try_take().unwrap().record.tilt, 41.0);
    }

    #[test]
    fn test_wrong_length_is_dropped() {
        let receiver = RadioReceiver::new();
        let bytes = record(40.0).to_bytes();

        assert!(!receiver.on_receive(SENDER, &bytes[..RECORD_SIZE - 1]));
        assert!(!receiver.on_receive(SENDER, &[0u8; RECORD_SIZE + 4]));
        assert!(receiver.try_take().is_none());
        assert_eq!(receiver.dropped_frames(), 2);
    }
}
