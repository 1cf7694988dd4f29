//! Binary response parsing.
//!
//! Parsers take the payload after the packet-type byte and produce the
//! typed structures in [`crate::types`]. Absent telemetry values use
//! per-field sentinels so one fixed-size metrics packet covers every
//! hardware variant.

use bytes::Buf;

use crate::error::ProtocolError;
use crate::types::{
    BleInfo, ChannelList, DeviceMetrics, LinkMetrics, MessageType, NodeInfo, TextMessage,
};

/// Sentinel for absent signed 16-bit fields.
const I16_UNKNOWN: i16 = 0x7fff;

/// Sentinel for absent unsigned 16-bit fields.
const U16_UNKNOWN: u16 = 0xffff;

/// Sentinel for absent unsigned 32-bit fields.
const U32_UNKNOWN: u32 = 0xffff_ffff;

/// SNR scaling factor (raw value is dB multiplied by 4).
const SNR_SCALE: f32 = 4.0;

/// Airtime and temperature scaling factor (raw value multiplied by 100).
const CENTI_SCALE: f32 = 100.0;

fn malformed(what: &str, data: &[u8]) -> ProtocolError {
    ProtocolError::Malformed {
        reason: format!("{what} truncated at {} bytes", data.len()),
    }
}

/// Reads a length-prefixed UTF-8 string.
fn read_string(cursor: &mut std::io::Cursor<&[u8]>) -> Option<String> {
    if cursor.remaining() < 1 {
        return None;
    }
    let len = cursor.get_u8() as usize;
    if cursor.remaining() < len {
        return None;
    }
    let mut raw = vec![0u8; len];
    cursor.copy_to_slice(&mut raw);
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// Parses a `NodeInfo` response.
///
/// Format:
/// ```text
/// [node_num:4LE] [fw:str] [model:str] [name:str]
/// [ble_flag:1] (if 1: [mac:6] [ble_name:str])
/// ```
/// where `str` is a u8 length prefix followed by UTF-8 bytes.
pub fn parse_node_info(data: &[u8]) -> Result<NodeInfo, ProtocolError> {
    if data.len() < 4 {
        return Err(malformed("NodeInfo", data));
    }

    let mut cursor = std::io::Cursor::new(data);
    let node_num = cursor.get_u32_le();

    let firmware = read_string(&mut cursor).ok_or_else(|| malformed("NodeInfo firmware", data))?;
    let hw_model = read_string(&mut cursor).ok_or_else(|| malformed("NodeInfo model", data))?;
    let node_name = read_string(&mut cursor)
        .ok_or_else(|| malformed("NodeInfo name", data))
        .map(|name| if name.is_empty() { None } else { Some(name) })?;

    let ble = if cursor.remaining() >= 1 && cursor.get_u8() == 1 {
        if cursor.remaining() < 6 {
            return Err(malformed("NodeInfo ble", data));
        }
        let mut mac = [0u8; 6];
        cursor.copy_to_slice(&mut mac);
        let ble_name = read_string(&mut cursor).filter(|name| !name.is_empty());
        Some(BleInfo {
            mac: format_mac(&mac),
            name: ble_name,
        })
    } else {
        None
    };

    Ok(NodeInfo {
        node_num,
        firmware,
        hw_model,
        node_name,
        ble,
    })
}

/// Formats a 6-byte MAC address as colon-separated lowercase hex.
fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| hex::encode([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

/// Parses a `Channels` response.
///
/// Format: `[count:1]` followed by `count` length-prefixed names. The
/// first name is the primary channel.
pub fn parse_channels(data: &[u8]) -> Result<ChannelList, ProtocolError> {
    if data.is_empty() {
        return Err(malformed("Channels", data));
    }

    let mut cursor = std::io::Cursor::new(data);
    let count = cursor.get_u8() as usize;

    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        let name = read_string(&mut cursor).ok_or_else(|| malformed("Channels entry", data))?;
        names.push(name);
    }

    Ok(ChannelList { names })
}

/// Parses a `Metrics` response into link and device telemetry.
///
/// Format (15 bytes, all little-endian):
/// ```text
/// [rssi:i16] [snr_x4:i16] [air_util_x100:u16]
/// [battery:u8] [voltage_mv:u16] [temp_x100:i16] [uptime:u32]
/// ```
pub fn parse_metrics(data: &[u8]) -> Result<(LinkMetrics, DeviceMetrics), ProtocolError> {
    if data.len() < 15 {
        return Err(malformed("Metrics", data));
    }

    let mut cursor = std::io::Cursor::new(data);

    let rssi = cursor.get_i16_le();
    let snr = cursor.get_i16_le();
    let air_util = cursor.get_u16_le();
    let battery = cursor.get_u8();
    let voltage = cursor.get_u16_le();
    let temperature = cursor.get_i16_le();
    let uptime = cursor.get_u32_le();

    let link = LinkMetrics {
        rssi: (rssi != I16_UNKNOWN).then(|| f32::from(rssi)),
        snr: (snr != I16_UNKNOWN).then(|| f32::from(snr) / SNR_SCALE),
        air_util: (air_util != U16_UNKNOWN).then(|| f32::from(air_util) / CENTI_SCALE),
    };

    let device = DeviceMetrics {
        battery_level: (battery != 0xff).then(|| f32::from(battery)),
        voltage: (voltage != U16_UNKNOWN).then(|| f32::from(voltage) / 1000.0),
        temperature: (temperature != I16_UNKNOWN).then(|| f32::from(temperature) / CENTI_SCALE),
        uptime_secs: (uptime != U32_UNKNOWN).then_some(uptime),
    };

    Ok((link, device))
}

/// Parses a `Routing` response (routing table size as u16 LE).
pub fn parse_routing_count(data: &[u8]) -> Result<usize, ProtocolError> {
    if data.len() < 2 {
        return Err(malformed("Routing", data));
    }
    Ok(u16::from_le_bytes([data[0], data[1]]) as usize)
}

/// Parses a `TextMessage` response or push.
///
/// Format:
/// ```text
/// [sender:4LE] [gateway:4LE, 0 = none] [port:1] [rx_time:4LE] [text...]
/// ```
pub fn parse_text_message(data: &[u8]) -> Result<TextMessage, ProtocolError> {
    if data.len() < 13 {
        return Err(malformed("TextMessage", data));
    }

    let mut cursor = std::io::Cursor::new(data);
    let sender = cursor.get_u32_le();
    let gateway = cursor.get_u32_le();
    let port = cursor.get_u8();
    let rx_time = cursor.get_u32_le();

    let text = String::from_utf8_lossy(&data[13..]).into_owned();

    Ok(TextMessage {
        text,
        sender: format!("!{sender:08x}"),
        gateway: (gateway != 0).then(|| format!("!{gateway:08x}")),
        message_type: MessageType::from_byte(port),
        rx_time,
    })
}
