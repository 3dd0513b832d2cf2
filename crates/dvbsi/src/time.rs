//! MPEG2-TSにおける日付時刻。

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::bytes::{read_bcd_digit, to_bcd_digit, BytesExt};

/// 修正ユリウス日の起点（1858-11-17）。
fn mjd_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1858, 11, 17).unwrap()
}

/// GPS時刻の起点（1980-01-06 00:00:00 UTC）。
fn gps_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 6)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// `data`から修正ユリウス日を読み取る。
#[inline]
pub fn read_mjd(data: &[u8; 2]) -> NaiveDate {
    mjd_epoch() + Duration::days(data.read_be_16() as i64)
}

/// `data`から修正ユリウス日と時分秒のBCDからなるUTCの日付時刻を読み取る。
///
/// 未定義値（全ビット1）や範囲外の時分秒は`None`となる。
pub fn read_utc(data: &[u8; 5]) -> Option<NaiveDateTime> {
    if data.iter().all(|&b| b == 0xFF) {
        return None;
    }

    let date = read_mjd(&[data[0], data[1]]);
    let hour = read_bcd_digit(data[2]);
    let minute = read_bcd_digit(data[3]);
    let second = read_bcd_digit(data[4]);
    let Some(time) = NaiveTime::from_hms_opt(hour.into(), minute.into(), second.into()) else {
        log::debug!("invalid time {:02X}{:02X}{:02X}", data[2], data[3], data[4]);
        return None;
    };

    Some(date.and_time(time))
}

/// `dt`を修正ユリウス日と時分秒のBCDに変換する。
///
/// 修正ユリウス日が16ビットに収まらない日付は`None`となる。
pub fn encode_utc(dt: NaiveDateTime) -> Option<[u8; 5]> {
    let mjd = u16::try_from((dt.date() - mjd_epoch()).num_days()).ok()?;
    let [hi, lo] = mjd.to_be_bytes();
    Some([
        hi,
        lo,
        to_bcd_digit(dt.hour() as u8),
        to_bcd_digit(dt.minute() as u8),
        to_bcd_digit(dt.second() as u8),
    ])
}

/// `hhmmss`形式のBCDから継続時間を読み取る。
///
/// 未定義値（全ビット1）は`None`となる。
pub fn read_bcd_duration(data: &[u8; 3]) -> Option<Duration> {
    if data.iter().all(|&b| b == 0xFF) {
        return None;
    }

    Some(Duration::seconds(data.read_bcd_second() as i64))
}

/// GPS秒をUTCの日付時刻に変換する。
///
/// `gps_utc_offset`はGPS時刻とUTCのうるう秒による差分。
#[inline]
pub fn gps_to_utc(gps_seconds: u32, gps_utc_offset: u8) -> NaiveDateTime {
    gps_epoch() + Duration::seconds(gps_seconds as i64 - gps_utc_offset as i64)
}

/// `dt`を最も近い分に丸める。
pub fn round_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    let truncated = dt - Duration::seconds(dt.second() as i64);
    let truncated = truncated - Duration::nanoseconds(truncated.nanosecond() as i64);
    if dt.second() >= 30 {
        truncated + Duration::minutes(1)
    } else {
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_read_utc() {
        // MJD = 45218, HMS = 12:34:56
        assert_eq!(read_mjd(&[0xB0, 0xA2]), NaiveDate::from_ymd_opt(1982, 9, 6).unwrap());
        assert_eq!(
            read_utc(&[0xB0, 0xA2, 0x12, 0x34, 0x56]),
            Some(dt(1982, 9, 6, 12, 34, 56)),
        );
        assert_eq!(read_utc(&[0xFF; 5]), None);
        assert_eq!(read_utc(&[0xB0, 0xA2, 0x25, 0x00, 0x00]), None);
    }

    #[test]
    fn test_encode_utc() {
        let t = dt(2024, 1, 1, 20, 0, 0);
        assert_eq!(read_utc(&encode_utc(t).unwrap()), Some(t));
        assert_eq!(
            encode_utc(dt(1982, 9, 6, 12, 34, 56)),
            Some([0xB0, 0xA2, 0x12, 0x34, 0x56]),
        );

        // 修正ユリウス日は2038-04-22までしか表せない
        assert_eq!(encode_utc(dt(2038, 4, 22, 0, 0, 0)), Some([0xFF, 0xFF, 0x00, 0x00, 0x00]));
        assert_eq!(encode_utc(dt(2038, 4, 23, 0, 0, 0)), None);
        assert_eq!(encode_utc(dt(1858, 11, 16, 0, 0, 0)), None);
    }

    #[test]
    fn test_duration() {
        assert_eq!(read_bcd_duration(&[0x01, 0x45, 0x30]), Some(Duration::seconds(6330)));
        assert_eq!(read_bcd_duration(&[0xFF; 3]), None);
    }

    #[test]
    fn test_gps() {
        assert_eq!(gps_to_utc(0, 0), dt(1980, 1, 6, 0, 0, 0));
        assert_eq!(gps_to_utc(86400 + 18, 18), dt(1980, 1, 7, 0, 0, 0));
    }

    #[test]
    fn test_round_to_minute() {
        assert_eq!(round_to_minute(dt(2024, 1, 1, 19, 59, 45)), dt(2024, 1, 1, 20, 0, 0));
        assert_eq!(round_to_minute(dt(2024, 1, 1, 20, 0, 29)), dt(2024, 1, 1, 20, 0, 0));
    }
}
