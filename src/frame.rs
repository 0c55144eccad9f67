//! ==============================================================================
//! frame.rs - gauge query frames and response decoding
//! ==============================================================================
//!
//! purpose:
//!     builds the two fixed query frames and turns raw response bytes into a
//!     pressure reading.
//!
//! wire format (query, 13 bytes):
//!
//!     [addr][0x17][0x00 0x9A][0x00 0x02][0x00 0x00][0x00 0x00][0x00][crc-lo][crc-hi]
//!       |     |       |          |          |          |        |
//!       |     |       |          |          +----------+--------+- empty write half
//!       |     |       |          +- read 2 registers (one f32)
//!       |     |       +- starting at register 0x009A
//!       |     +- read/write multiple registers
//!       +- gauge address (1 or 2)
//!
//! wire format (response):
//!     bytes 3..7 hold the reading as a little-endian f32. anything shorter
//!     than 7 bytes means the gauge did not answer in time.
//!
//! note:
//!     the response crc trailer is NOT checked unless strict mode is asked for
//!     (see `decode_response_strict`).
//!
//! relationships:
//!     - uses: crc.rs
//!     - used by: scheduler.rs, transport.rs (simulated gauges)
//!
//! ==============================================================================

use std::fmt;

use crate::crc::{crc16_modbus, has_valid_crc};

/// read/write multiple registers
pub const FUNCTION_CODE: u8 = 0x17;
/// first register holding the measurement
pub const READ_REGISTER: u16 = 0x009A;
/// two 16-bit registers = one f32
pub const READ_COUNT: u16 = 0x0002;
/// bytes before the crc trailer
pub const QUERY_BODY_LEN: usize = 11;
pub const QUERY_FRAME_LEN: usize = QUERY_BODY_LEN + 2;

/// offset of the f32 payload inside a response
pub const VALUE_OFFSET: usize = 3;
/// shortest response that carries a reading
pub const MIN_RESPONSE_LEN: usize = VALUE_OFFSET + 4;

/// a complete outbound query
pub type Frame = [u8; QUERY_FRAME_LEN];

/// the two gauge controllers on the line
///
/// a closed set: the controllers are strapped to addresses 1 and 2 and no
/// other address is ever queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GaugeAddress {
    First = 0x01,
    Second = 0x02,
}

impl GaugeAddress {
    pub const ALL: [GaugeAddress; 2] = [GaugeAddress::First, GaugeAddress::Second];

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for GaugeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gauge {}", self.as_byte())
    }
}

/// build the query frame for one gauge
pub fn build_query(address: GaugeAddress) -> Frame {
    let [reg_hi, reg_lo] = READ_REGISTER.to_be_bytes();
    let [count_hi, count_lo] = READ_COUNT.to_be_bytes();

    let mut frame: Frame = [0; QUERY_FRAME_LEN];
    frame[..6].copy_from_slice(&[
        address.as_byte(),
        FUNCTION_CODE,
        reg_hi,
        reg_lo,
        count_hi,
        count_lo,
    ]);
    // frame[6..11] stays zero: write start, write count, byte count

    let crc = crc16_modbus(&frame[..QUERY_BODY_LEN]);
    frame[QUERY_BODY_LEN..].copy_from_slice(&crc.to_le_bytes());
    frame
}

/// decode a response into a reading, `None` when too short to hold one
pub fn decode_response(bytes: &[u8]) -> Option<f64> {
    let raw: [u8; 4] = bytes
        .get(VALUE_OFFSET..MIN_RESPONSE_LEN)?
        .try_into()
        .ok()?;
    Some(round_reading(f32::from_le_bytes(raw)))
}

/// strict variant: additionally rejects responses whose crc trailer is wrong
///
/// only used when
/// `protocol.verify_response_crc` is set.
pub fn decode_response_strict(bytes: &[u8]) -> Option<f64> {
    if !has_valid_crc(bytes) {
        return None;
    }
    decode_response(bytes)
}

/// keep four significant digits, the precision the gauges report (`%.3e`)
pub fn round_reading(value: f32) -> f64 {
    let value = f64::from(value);
    format!("{:.3e}", value).parse().unwrap_or(value)
}

/// hex dump for debug logs, e.g. `01 17 00 9a ...`
pub fn describe_frame(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| hex::encode([*byte]))
        .collect::<Vec<_>>()
        .join(" ")
}

/// build a response the way a gauge would answer, used by the simulator and tests
pub fn encode_response(address: GaugeAddress, value: f32) -> Vec<u8> {
    let mut response = vec![address.as_byte(), FUNCTION_CODE, 4];
    response.extend_from_slice(&value.to_le_bytes());
    let crc = crc16_modbus(&response);
    response.extend_from_slice(&crc.to_le_bytes());
    response
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::{crc16, MODBUS_SEED};

    #[test]
    fn test_query_frames_on_the_wire() {
        assert_eq!(
            build_query(GaugeAddress::First),
            [0x01, 0x17, 0x00, 0x9A, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3A, 0xA6]
        );
        assert_eq!(
            build_query(GaugeAddress::Second),
            [0x02, 0x17, 0x00, 0x9A, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x35, 0xE2]
        );
    }

    #[test]
    fn test_trailer_reproduced_from_body() {
        for address in GaugeAddress::ALL {
            let frame = build_query(address);
            let crc = crc16(&frame[..QUERY_BODY_LEN], MODBUS_SEED);
            assert_eq!(frame[QUERY_BODY_LEN..], crc.to_le_bytes());
            assert!(has_valid_crc(&frame));
        }
    }

    #[test]
    fn test_templates_differ_only_in_address() {
        let first = build_query(GaugeAddress::First);
        let second = build_query(GaugeAddress::Second);
        assert_eq!(first[1..QUERY_BODY_LEN], second[1..QUERY_BODY_LEN]);
        assert_ne!(first[0], second[0]);
    }

    #[test]
    fn test_short_responses_have_no_reading() {
        for len in 0..MIN_RESPONSE_LEN {
            let bytes = vec![0xAB; len];
            assert_eq!(decode_response(&bytes), None, "len {}", len);
        }
    }

    #[test]
    fn test_decode_recovers_value() {
        let value = 1.234e-5_f32;
        let mut response = vec![0x01, 0x17, 0x04];
        response.extend_from_slice(&value.to_le_bytes());

        let decoded = decode_response(&response).unwrap();
        assert!((decoded - 1.234e-5).abs() < 1e-12, "got {}", decoded);
        // same bytes, same answer
        assert_eq!(decode_response(&response), decode_response(&response));
    }

    #[test]
    fn test_decode_rounds_to_device_precision() {
        let response = encode_response(GaugeAddress::Second, 1013.7);
        assert_eq!(decode_response(&response), Some(1014.0));

        let response = encode_response(GaugeAddress::First, 2.5e-3);
        let decoded = decode_response(&response).unwrap();
        assert!(((decoded - 2.5e-3) / 2.5e-3).abs() < 5e-4);
    }

    #[test]
    fn test_decode_ignores_trailer_by_default() {
        let mut response = encode_response(GaugeAddress::First, 4.2e-7);
        let last = response.len() - 1;
        response[last] ^= 0xFF;

        assert!(decode_response(&response).is_some());
        assert_eq!(decode_response_strict(&response), None);
    }

    #[test]
    fn test_strict_accepts_good_trailer() {
        let response = encode_response(GaugeAddress::Second, 7.5e-2);
        assert_eq!(decode_response_strict(&response), decode_response(&response));
    }

    #[test]
    fn test_describe_frame() {
        assert_eq!(describe_frame(&[0x01, 0x17, 0x9A]), "01 17 9a");
        assert_eq!(describe_frame(&[]), "");

        let query = build_query(GaugeAddress::Second);
        let dump = describe_frame(&query);
        assert_eq!(dump.split(' ').count(), QUERY_FRAME_LEN);
        assert_eq!(dump.replace(' ', ""), hex::encode(query));
    }
}
