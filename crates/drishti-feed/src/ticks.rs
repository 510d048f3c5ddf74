//! Binary ticker-packet codec and the subscription payload.
//!
//! Feed frames carry one or more packets, each with an 8-byte header:
//! response code (u8), message length (u16, big-endian, includes the
//! header), exchange segment (u8), and security id (u32, big-endian).
//! A ticker packet (code 2) is 16 bytes: header + LTP (f32) + last trade
//! time (u32 epoch seconds).

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

use drishti_models::Tick;

/// Ticker response code on the wire.
pub const CODE_TICKER: u8 = 2;

/// Subscription request code for ticker packets.
pub const SUBSCRIBE_TICKER: u8 = 15;

const HEADER_LEN: usize = 8;
const TICKER_LEN: usize = 16;

/// One instrument in a subscription request.
#[derive(Debug, Clone, Serialize)]
pub struct Instrument {
    #[serde(rename = "ExchangeSegment")]
    pub exchange_segment: String,
    #[serde(rename = "SecurityId")]
    pub security_id: String,
}

/// Ticker subscription payload.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    #[serde(rename = "RequestCode")]
    pub request_code: u8,
    #[serde(rename = "InstrumentCount")]
    pub instrument_count: usize,
    #[serde(rename = "InstrumentList")]
    pub instrument_list: Vec<Instrument>,
}

impl SubscribeRequest {
    pub fn ticker(instruments: Vec<Instrument>) -> Self {
        Self {
            request_code: SUBSCRIBE_TICKER,
            instrument_count: instruments.len(),
            instrument_list: instruments,
        }
    }
}

/// Parse all ticker packets in a frame. Non-ticker packets are skipped via
/// their length field; truncated or unknown-token packets are counted as
/// dropped.
pub fn parse_frame(data: &[u8], known: &[u32]) -> (Vec<Tick>, u32) {
    let mut ticks = Vec::new();
    let mut dropped = 0u32;
    let mut offset = 0usize;

    while offset + HEADER_LEN <= data.len() {
        let code = data[offset];
        let msg_len = BigEndian::read_u16(&data[offset + 1..offset + 3]) as usize;
        if msg_len < HEADER_LEN || offset + msg_len > data.len() {
            dropped += 1;
            break;
        }

        if code == CODE_TICKER && msg_len >= TICKER_LEN {
            let security_id = BigEndian::read_u32(&data[offset + 4..offset + 8]);
            if known.contains(&security_id) {
                let ltp = BigEndian::read_f32(&data[offset + 8..offset + 12]) as f64;
                let ts = BigEndian::read_u32(&data[offset + 12..offset + 16]) as i64;
                ticks.push(Tick {
                    security_id,
                    ltp,
                    ts,
                    qty: 0,
                });
            } else {
                dropped += 1;
            }
        }

        offset += msg_len;
    }

    (ticks, dropped)
}

/// Encode one ticker packet (used by tests and the replay tooling).
pub fn encode_ticker(security_id: u32, segment: u8, ltp: f32, ts: u32) -> Vec<u8> {
    let mut buf = vec![0u8; TICKER_LEN];
    buf[0] = CODE_TICKER;
    BigEndian::write_u16(&mut buf[1..3], TICKER_LEN as u16);
    buf[3] = segment;
    BigEndian::write_u32(&mut buf[4..8], security_id);
    BigEndian::write_f32(&mut buf[8..12], ltp);
    BigEndian::write_u32(&mut buf[12..16], ts);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_round_trip() {
        let frame = encode_ticker(13, 0, 24_013.5, 1_700_000_100);
        let (ticks, dropped) = parse_frame(&frame, &[13]);
        assert_eq!(dropped, 0);
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].security_id, 13);
        assert_eq!(ticks[0].ts, 1_700_000_100);
        assert!((ticks[0].ltp - 24_013.5).abs() < 1e-3);
    }

    #[test]
    fn multiple_packets_in_one_frame() {
        let mut frame = encode_ticker(13, 0, 100.0, 600);
        frame.extend(encode_ticker(25, 0, 200.0, 605));
        let (ticks, dropped) = parse_frame(&frame, &[13, 25]);
        assert_eq!(ticks.len(), 2);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn unknown_token_counts_as_dropped() {
        let frame = encode_ticker(99, 0, 100.0, 600);
        let (ticks, dropped) = parse_frame(&frame, &[13]);
        assert!(ticks.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn truncated_frame_stops_cleanly() {
        let mut frame = encode_ticker(13, 0, 100.0, 600);
        frame.truncate(12);
        let (ticks, dropped) = parse_frame(&frame, &[13]);
        assert!(ticks.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn non_ticker_packets_are_skipped() {
        let mut other = vec![0u8; 24];
        other[0] = 4; // some other response code
        BigEndian::write_u16(&mut other[1..3], 24);
        let mut frame = other;
        frame.extend(encode_ticker(13, 0, 101.0, 610));
        let (ticks, dropped) = parse_frame(&frame, &[13]);
        assert_eq!(ticks.len(), 1);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn subscribe_payload_shape() {
        let req = SubscribeRequest::ticker(vec![Instrument {
            exchange_segment: "IDX_I".into(),
            security_id: "13".into(),
        }]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["RequestCode"], 15);
        assert_eq!(json["InstrumentCount"], 1);
        assert_eq!(json["InstrumentList"][0]["ExchangeSegment"], "IDX_I");
        assert_eq!(json["InstrumentList"][0]["SecurityId"], "13");
    }
}
