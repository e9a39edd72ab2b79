//! 셀 값을 SQL 리터럴로 변환
//!
//! 선언된 컬럼 타입만으로는 부족하고, 디코더가 넘겨준 런타임 표현을 같이 봐야 합니다.
//! 같은 `datetime` 컬럼도 엔진에 따라 구조화된 시각 또는 epoch 밀리초 정수로 옵니다.
//!
//! | 표현              | `timestamp`      | `datetime`      | `date`          | 기타 |
//! |-------------------|------------------|-----------------|-----------------|------|
//! | `DateTime`        | 로컬, 전체 형식  | UTC, 전체 형식  | UTC, 날짜만     | UTC, 날짜만 |
//! | `Int` (epoch ms)  | 로컬, 전체 형식  | UTC, 전체 형식  | UTC, 날짜만     | 숫자 그대로 |
//!
//! NaN과 무한대 실수는 SQL 리터럴이 없으므로 `NULL`로 씁니다.

use crate::events::CellValue;
use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const PATTERN_FULL: &str = "%Y-%m-%d %H:%M:%S";
const PATTERN_ONLY_DATE: &str = "%Y-%m-%d";

/// 문자열 리터럴 인용 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiteralQuoting {
    /// 작은따옴표로 감싸기만 함 (값 안의 따옴표는 그대로)
    #[default]
    Verbatim,
    /// 따옴표와 백슬래시를 이스케이프
    Escaped,
}

/// `timestamp` 값을 표시할 로컬 시간대
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZone {
    /// 프로세스의 시스템 시간대
    System,
    Fixed(FixedOffset),
}

#[derive(Debug, Clone, Copy)]
pub struct ValueCodec {
    zone: SessionZone,
    quoting: LiteralQuoting,
}

impl Default for ValueCodec {
    fn default() -> Self {
        ValueCodec::new(SessionZone::System, LiteralQuoting::default())
    }
}

impl ValueCodec {
    pub fn new(zone: SessionZone, quoting: LiteralQuoting) -> Self {
        ValueCodec { zone, quoting }
    }

    /// 값 하나를 SQL 리터럴로 변환
    pub fn encode(&self, value: &CellValue, data_type: &str) -> String {
        match value {
            CellValue::Null => "NULL".to_string(),
            CellValue::String(s) => self.quote(s),
            CellValue::Bytes(bytes) => self.quote(&String::from_utf8_lossy(bytes)),
            CellValue::DateTime(dt) => self.quote(&self.format_native(dt, data_type)),
            CellValue::Int(millis) => match self.format_epoch(*millis, data_type) {
                Some(text) => self.quote(&text),
                None => millis.to_string(),
            },
            CellValue::UInt(u) => u.to_string(),
            CellValue::Float(f) if !f.is_finite() => "NULL".to_string(),
            CellValue::Double(d) if !d.is_finite() => "NULL".to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Double(d) => d.to_string(),
            CellValue::Decimal(d) => d.clone(),
            CellValue::Time(t) => self.quote(t),
            CellValue::Json(json) => self.quote(&json.to_string()),
        }
    }

    fn quote(&self, text: &str) -> String {
        match self.quoting {
            LiteralQuoting::Verbatim => format!("'{}'", text),
            LiteralQuoting::Escaped => {
                let mut out = String::with_capacity(text.len() + 2);
                out.push('\'');
                for ch in text.chars() {
                    match ch {
                        '\'' => out.push_str("''"),
                        '\\' => out.push_str("\\\\"),
                        '\0' => out.push_str("\\0"),
                        _ => out.push(ch),
                    }
                }
                out.push('\'');
                out
            }
        }
    }

    fn format_native(&self, dt: &DateTime<Utc>, data_type: &str) -> String {
        if data_type.eq_ignore_ascii_case("timestamp") {
            self.format_local(dt, PATTERN_FULL)
        } else if data_type.eq_ignore_ascii_case("datetime") {
            dt.format(PATTERN_FULL).to_string()
        } else {
            dt.format(PATTERN_ONLY_DATE).to_string()
        }
    }

    /// 정수 epoch 밀리초로 인코딩된 날짜 (MariaDB 등)
    fn format_epoch(&self, millis: i64, data_type: &str) -> Option<String> {
        let is_date = data_type.eq_ignore_ascii_case("date");
        let is_datetime = data_type.eq_ignore_ascii_case("datetime");
        let is_timestamp = data_type.eq_ignore_ascii_case("timestamp");
        if !(is_date || is_datetime || is_timestamp) {
            return None;
        }

        let dt = Utc.timestamp_millis_opt(millis).single()?;
        Some(if is_date {
            dt.format(PATTERN_ONLY_DATE).to_string()
        } else if is_datetime {
            dt.format(PATTERN_FULL).to_string()
        } else {
            self.format_local(&dt, PATTERN_FULL)
        })
    }

    fn format_local(&self, dt: &DateTime<Utc>, pattern: &str) -> String {
        match self.zone {
            SessionZone::System => dt.with_timezone(&Local).format(pattern).to_string(),
            SessionZone::Fixed(offset) => dt.with_timezone(&offset).format(pattern).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kst() -> ValueCodec {
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        ValueCodec::new(SessionZone::Fixed(offset), LiteralQuoting::Verbatim)
    }

    // 2020-01-01T00:00:00Z
    const NEW_YEAR_2020_MS: i64 = 1_577_836_800_000;

    #[test]
    fn test_text_is_quoted_verbatim() {
        let codec = kst();
        assert_eq!(codec.encode(&CellValue::String("O'Brien".to_string()), "varchar"), "'O'Brien'");
        assert_eq!(codec.encode(&CellValue::Bytes(b"abc".to_vec()), "blob"), "'abc'");
    }

    #[test]
    fn test_text_escaped() {
        let codec = ValueCodec::new(SessionZone::System, LiteralQuoting::Escaped);
        assert_eq!(
            codec.encode(&CellValue::String("O'Brien\\".to_string()), "varchar"),
            "'O''Brien\\\\'"
        );
    }

    #[test]
    fn test_epoch_encoded_temporal() {
        let codec = kst();
        assert_eq!(
            codec.encode(&CellValue::Int(NEW_YEAR_2020_MS), "datetime"),
            "'2020-01-01 00:00:00'"
        );
        assert_eq!(codec.encode(&CellValue::Int(NEW_YEAR_2020_MS), "DATE"), "'2020-01-01'");
        assert_eq!(
            codec.encode(&CellValue::Int(NEW_YEAR_2020_MS), "timestamp"),
            "'2020-01-01 09:00:00'"
        );
        assert_eq!(
            codec.encode(&CellValue::Int(NEW_YEAR_2020_MS), "bigint"),
            NEW_YEAR_2020_MS.to_string()
        );
    }

    #[test]
    fn test_native_temporal() {
        let codec = kst();
        let dt = Utc.with_ymd_and_hms(2020, 1, 1, 20, 30, 0).unwrap();
        let value = CellValue::DateTime(dt);
        assert_eq!(codec.encode(&value, "timestamp"), "'2020-01-02 05:30:00'");
        assert_eq!(codec.encode(&value, "datetime"), "'2020-01-01 20:30:00'");
        assert_eq!(codec.encode(&value, "date"), "'2020-01-01'");
        assert_eq!(codec.encode(&value, "year"), "'2020-01-01'");
    }

    #[test]
    fn test_non_finite_floats_are_null() {
        let codec = kst();
        assert_eq!(codec.encode(&CellValue::Double(f64::NAN), "double"), "NULL");
        assert_eq!(codec.encode(&CellValue::Double(f64::INFINITY), "double"), "NULL");
        assert_eq!(codec.encode(&CellValue::Float(f32::NEG_INFINITY), "float"), "NULL");
        assert_eq!(codec.encode(&CellValue::Float(0.1), "float"), "0.1");
    }

    #[test]
    fn test_everything_else_unquoted() {
        let codec = kst();
        assert_eq!(codec.encode(&CellValue::Int(42), "int"), "42");
        assert_eq!(codec.encode(&CellValue::UInt(7), "int"), "7");
        assert_eq!(codec.encode(&CellValue::Decimal("10.50".to_string()), "decimal"), "10.50");
        assert_eq!(codec.encode(&CellValue::Double(1.5), "double"), "1.5");
        assert_eq!(codec.encode(&CellValue::Null, "int"), "NULL");
    }
}
