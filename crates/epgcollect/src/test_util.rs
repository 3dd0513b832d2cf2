//! テスト用のセクションとパケットの組み立て。

use chrono::NaiveDateTime;
use dvbsi::packet::Packet;
use dvbsi::Pid;

use crate::model::StationKey;

/// セクションシンタクスを持つセクションをCRC付きで組み立てる。
pub fn section(
    table_id: u8,
    table_id_extension: u16,
    section_number: u8,
    last_section_number: u8,
    body: &[u8],
) -> Vec<u8> {
    let len = 5 + body.len() + 4;
    let mut data = vec![table_id, 0xB0 | (len >> 8) as u8, len as u8];
    data.extend_from_slice(&table_id_extension.to_be_bytes());
    data.push(0xC1);
    data.push(section_number);
    data.push(last_section_number);
    data.extend_from_slice(body);
    let crc = dvbsi::crc::calc32(&data);
    data.extend_from_slice(&crc.to_be_bytes());
    data
}

/// セクションを`pid`のTSパケット列に分割する。
pub fn packets(pid: Pid, cc: &mut u8, sections: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for section in sections {
        let mut payload = vec![0x00];
        payload.extend_from_slice(section);
        for (i, chunk) in payload.chunks(184).enumerate() {
            let packet = Packet::with_payload(pid, i == 0, *cc, chunk);
            *cc = (*cc + 1) & 0x0F;
            out.extend_from_slice(&packet.0);
        }
    }
    out
}

/// PATのセクションを組み立てる。
pub fn pat(transport_stream_id: u16, programs: &[(u16, u16)]) -> Vec<u8> {
    let mut body = vec![0x00, 0x00, 0xE0, 0x10];
    for &(program_number, pid) in programs {
        body.extend_from_slice(&program_number.to_be_bytes());
        body.extend_from_slice(&(0xE000 | pid).to_be_bytes());
    }
    section(0x00, transport_stream_id, 0, 0, &body)
}

/// EITのイベント。
pub struct Event<'a> {
    pub event_id: u16,
    pub start_time: NaiveDateTime,
    pub duration: [u8; 3],
    pub descriptors: &'a [u8],
}

/// EITのセクションを組み立てる。
pub fn eit(table_id: u8, key: StationKey, section_number: u8, events: &[Event]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&key.transport_stream_id.to_be_bytes());
    body.extend_from_slice(&key.original_network_id.to_be_bytes());
    body.extend_from_slice(&[section_number, table_id]);
    for event in events {
        body.extend_from_slice(&event.event_id.to_be_bytes());
        body.extend_from_slice(&dvbsi::time::encode_utc(event.start_time).unwrap());
        body.extend_from_slice(&event.duration);
        let len = event.descriptors.len() as u16;
        body.extend_from_slice(&(0x8000 | len).to_be_bytes());
        body.extend_from_slice(event.descriptors);
    }
    section(table_id, key.service_id, section_number, section_number, &body)
}

/// 短形式イベント記述子を組み立てる。
pub fn short_event(name: &str, text: &str) -> Vec<u8> {
    let mut data = vec![0x4D, (5 + name.len() + text.len()) as u8];
    data.extend_from_slice(b"eng");
    data.push(name.len() as u8);
    data.extend_from_slice(name.as_bytes());
    data.push(text.len() as u8);
    data.extend_from_slice(text.as_bytes());
    data
}
