//! codec.rs
//! Fixed 4-byte payload codec for actuator command and feedback frames.
//!
//! Wire layout (lossy bit selection, not a round-trip codec):
//! - byte 0..2: low 16 bits of the pressure setpoint, little-endian
//! - byte 2..4: high 16 bits of the rate-of-change word, little-endian
//!
//! Bits 16..32 of `pressure` and bits 0..16 of `rate` are never transmitted.
//! Feedback frames reuse the same layout, so `decode` recovers exactly the
//! two u16 values a well-formed peer produced with `encode`.

/// Payload size shared by command and feedback frames.
pub const PAYLOAD_LEN: usize = 4;

/// One discrete message on the bus: a device address plus the fixed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub address: u16,
    pub payload: [u8; PAYLOAD_LEN],
}

impl Frame {
    /// Builds a command frame for `address` from a raw (pressure, rate) pair.
    pub fn command(address: u16, pressure: u32, rate: u32) -> Self {
        Self {
            address,
            payload: encode(pressure, rate),
        }
    }

    /// Decoded view of the payload: (low16 of pressure, high16 of rate).
    #[inline]
    pub fn values(&self) -> (u16, u16) {
        decode(&self.payload)
    }
}

/// Packs a (pressure, rate) pair into the 4-byte payload.
///
/// Never fails; out-of-band bits of either input are discarded, not rejected.
/// The exact bit selection is load-bearing for wire compatibility.
#[inline]
pub fn encode(pressure: u32, rate: u32) -> [u8; PAYLOAD_LEN] {
    [
        (pressure & 0xFF) as u8,
        ((pressure >> 8) & 0xFF) as u8,
        ((rate >> 16) & 0xFF) as u8,
        ((rate >> 24) & 0xFF) as u8,
    ]
}

/// Unpacks a payload into its two little-endian u16 values.
///
/// `decode(&encode(p, r)) == ((p & 0xFFFF) as u16, ((r >> 16) & 0xFFFF) as u16)`
/// for all u32 inputs; no other bits are recoverable.
#[inline]
pub fn decode(payload: &[u8; PAYLOAD_LEN]) -> (u16, u16) {
    let value1 = u16::from_le_bytes([payload[0], payload[1]]);
    let value2 = u16::from_le_bytes([payload[2], payload[3]]);
    (value1, value2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_low_pressure_and_high_rate() {
        // Reference vector: setpoint 200, counter 1 in the rate high word.
        assert_eq!(encode(200, 0x0001_0000), [0xC8, 0x00, 0x01, 0x00]);
    }

    #[test]
    fn decodes_reference_payload() {
        assert_eq!(decode(&[0xC8, 0x00, 0x01, 0x00]), (200, 1));
    }

    #[test]
    fn round_trip_masks_untransmitted_bits() {
        let cases: [(u32, u32); 6] = [
            (0, 0),
            (200, 0xFFFF_0000),
            (0xFFFF, 0x0001_0000),
            (0x0005_00C8, 0x1234_5678),
            (u32::MAX, u32::MAX),
            (0xDEAD_BEEF, 0x0BAD_F00D),
        ];
        for (pressure, rate) in cases {
            let expected = ((pressure & 0xFFFF) as u16, ((rate >> 16) & 0xFFFF) as u16);
            assert_eq!(decode(&encode(pressure, rate)), expected);
        }
    }

    #[test]
    fn high_pressure_bits_never_reach_the_wire() {
        assert_eq!(encode(0x0005_00C8, 0), encode(0x00C8, 0));
    }

    #[test]
    fn low_rate_bits_never_reach_the_wire() {
        assert_eq!(encode(0, 0x0001_FFFF), encode(0, 0x0001_0000));
    }

    #[test]
    fn command_frame_carries_address_and_values() {
        let frame = Frame::command(0x123, 200, 0x0002_0000);
        assert_eq!(frame.address, 0x123);
        assert_eq!(frame.values(), (200, 2));
    }
}
