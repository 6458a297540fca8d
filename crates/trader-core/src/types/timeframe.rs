//! 캔들스틱 데이터를 위한 타임프레임 정의.
//!
//! 타임프레임 문자열("1m", "5m", "1h", "1d", "1w" 등)을 초/분/밀리초로 변환하고,
//! 임의의 시각에 대해 거래소 캔들 경계(이전/다음 캔들 시작 시각)를 계산합니다.
//!
//! 경계 계산은 모두 정수 밀리초 연산으로 수행됩니다:
//!
//! ```text
//! previous = floor(at_ms / interval_ms) * interval_ms
//! next     = previous + interval_ms
//! ```
//!
//! `at`이 정확히 경계에 있으면 `previous == at`이고, `next`는 항상 `at`보다 큽니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{TraderError, TraderResult};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// 타임프레임 단위.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeframeUnit {
    /// 초 (`s`)
    Second,
    /// 분 (`m`)
    Minute,
    /// 시간 (`h`)
    Hour,
    /// 일 (`d`)
    Day,
    /// 주 (`w`)
    Week,
    /// 월 (`M`, 30일 고정)
    Month,
    /// 년 (`y`, 365일 고정)
    Year,
}

impl TimeframeUnit {
    /// 단위 하나의 초 단위 길이.
    pub const fn secs(self) -> u64 {
        match self {
            TimeframeUnit::Second => 1,
            TimeframeUnit::Minute => SECS_PER_MINUTE,
            TimeframeUnit::Hour => SECS_PER_HOUR,
            TimeframeUnit::Day => SECS_PER_DAY,
            TimeframeUnit::Week => 7 * SECS_PER_DAY,
            TimeframeUnit::Month => 30 * SECS_PER_DAY,
            TimeframeUnit::Year => 365 * SECS_PER_DAY,
        }
    }

    /// 문자열 접미사.
    pub const fn suffix(self) -> char {
        match self {
            TimeframeUnit::Second => 's',
            TimeframeUnit::Minute => 'm',
            TimeframeUnit::Hour => 'h',
            TimeframeUnit::Day => 'd',
            TimeframeUnit::Week => 'w',
            TimeframeUnit::Month => 'M',
            TimeframeUnit::Year => 'y',
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(TimeframeUnit::Second),
            'm' => Some(TimeframeUnit::Minute),
            'h' => Some(TimeframeUnit::Hour),
            'd' => Some(TimeframeUnit::Day),
            'w' => Some(TimeframeUnit::Week),
            'M' => Some(TimeframeUnit::Month),
            'y' => Some(TimeframeUnit::Year),
            _ => None,
        }
    }
}

/// 캔들스틱 타임프레임.
///
/// `<양의 정수><단위>` 형식의 문자열 하나로 표현되며, 직렬화도 같은 문자열을 사용합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    amount: u32,
    unit: TimeframeUnit,
}

impl Timeframe {
    /// 1분봉
    pub const M1: Timeframe = Timeframe::from_parts(1, TimeframeUnit::Minute);
    /// 3분봉
    pub const M3: Timeframe = Timeframe::from_parts(3, TimeframeUnit::Minute);
    /// 5분봉
    pub const M5: Timeframe = Timeframe::from_parts(5, TimeframeUnit::Minute);
    /// 15분봉
    pub const M15: Timeframe = Timeframe::from_parts(15, TimeframeUnit::Minute);
    /// 30분봉
    pub const M30: Timeframe = Timeframe::from_parts(30, TimeframeUnit::Minute);
    /// 1시간봉
    pub const H1: Timeframe = Timeframe::from_parts(1, TimeframeUnit::Hour);
    /// 2시간봉
    pub const H2: Timeframe = Timeframe::from_parts(2, TimeframeUnit::Hour);
    /// 4시간봉
    pub const H4: Timeframe = Timeframe::from_parts(4, TimeframeUnit::Hour);
    /// 6시간봉
    pub const H6: Timeframe = Timeframe::from_parts(6, TimeframeUnit::Hour);
    /// 8시간봉
    pub const H8: Timeframe = Timeframe::from_parts(8, TimeframeUnit::Hour);
    /// 12시간봉
    pub const H12: Timeframe = Timeframe::from_parts(12, TimeframeUnit::Hour);
    /// 일봉
    pub const D1: Timeframe = Timeframe::from_parts(1, TimeframeUnit::Day);
    /// 3일봉
    pub const D3: Timeframe = Timeframe::from_parts(3, TimeframeUnit::Day);
    /// 주봉
    pub const W1: Timeframe = Timeframe::from_parts(1, TimeframeUnit::Week);
    /// 월봉 (30일 근사값)
    pub const MN1: Timeframe = Timeframe::from_parts(1, TimeframeUnit::Month);

    const fn from_parts(amount: u32, unit: TimeframeUnit) -> Self {
        Self { amount, unit }
    }

    /// 새 타임프레임을 생성합니다.
    ///
    /// `amount`가 0이거나 밀리초 길이가 `i64` 범위를 넘으면 에러를 반환합니다.
    pub fn new(amount: u32, unit: TimeframeUnit) -> TraderResult<Self> {
        if amount == 0 {
            return Err(TraderError::InvalidInput(format!(
                "타임프레임 길이는 0일 수 없습니다: 0{}",
                unit.suffix()
            )));
        }
        let millis = u64::from(amount)
            .checked_mul(unit.secs())
            .and_then(|secs| secs.checked_mul(1000))
            .filter(|ms| i64::try_from(*ms).is_ok());
        if millis.is_none() {
            return Err(TraderError::InvalidInput(format!(
                "타임프레임이 너무 깁니다: {}{}",
                amount,
                unit.suffix()
            )));
        }
        Ok(Self { amount, unit })
    }

    /// 타임프레임 문자열을 파싱합니다.
    ///
    /// 인식할 수 없는 문자열은 기본값으로 대체하지 않고 항상 에러입니다.
    pub fn parse(s: &str) -> TraderResult<Self> {
        let invalid = || TraderError::InvalidInput(format!("Invalid timeframe: {:?}", s));

        let unit_char = s.chars().last().ok_or_else(invalid)?;
        let unit = TimeframeUnit::from_suffix(unit_char).ok_or_else(invalid)?;
        let digits = &s[..s.len() - unit_char.len_utf8()];
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(amount, unit).map_err(|_| invalid())
    }

    /// 단위 개수.
    pub fn amount(&self) -> u32 {
        self.amount
    }

    /// 단위.
    pub fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    /// 이 타임프레임의 기간을 반환합니다.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    /// 이 타임프레임의 초 단위 값을 반환합니다.
    pub fn as_secs(&self) -> u64 {
        u64::from(self.amount) * self.unit.secs()
    }

    /// 이 타임프레임의 분 단위 값을 반환합니다 (내림).
    pub fn as_minutes(&self) -> u64 {
        self.as_secs() / 60
    }

    /// 이 타임프레임의 밀리초 단위 값을 반환합니다.
    pub fn as_millis(&self) -> u64 {
        self.as_secs() * 1000
    }

    /// `at` 이전(또는 같은) 가장 가까운 캔들 시작 시각.
    pub fn previous_boundary(&self, at: DateTime<Utc>) -> TraderResult<DateTime<Utc>> {
        let step = self.step_millis()?;
        let at_ms = at.timestamp_millis();
        from_millis(at_ms - at_ms.rem_euclid(step))
    }

    /// `at` 이후(엄격히 큰) 가장 가까운 캔들 시작 시각.
    ///
    /// `at`이 경계에 있으면 다음 경계를 반환합니다. 방금 닫힌 캔들을
    /// 두 번 세지 않기 위함입니다.
    pub fn next_boundary(&self, at: DateTime<Utc>) -> TraderResult<DateTime<Utc>> {
        let step = self.step_millis()?;
        let at_ms = at.timestamp_millis();
        let prev = at_ms - at_ms.rem_euclid(step);
        let next = prev.checked_add(step).ok_or_else(out_of_range)?;
        from_millis(next)
    }

    /// `at`이 정확히 캔들 경계에 있는지 확인합니다.
    pub fn is_boundary(&self, at: DateTime<Utc>) -> bool {
        match self.step_millis() {
            Ok(step) => at.timestamp_millis().rem_euclid(step) == 0,
            Err(_) => false,
        }
    }

    /// `[since, until)` 구간을 덮는 캔들 개수.
    ///
    /// `since`는 이전 경계로 내림 정렬된 뒤 계산됩니다.
    pub fn candles_between(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> TraderResult<u64> {
        if until <= since {
            return Ok(0);
        }
        let start = self.previous_boundary(since)?;
        let span = (until - start).num_milliseconds();
        let step = self.step_millis()?;
        Ok(((span + step - 1) / step) as u64)
    }

    // `new`이 밀리초 길이가 i64에 들어가는 값만 허용하므로 실패하지 않음
    fn step_millis(&self) -> TraderResult<i64> {
        i64::try_from(self.as_millis()).map_err(|_| out_of_range())
    }
}

fn out_of_range() -> TraderError {
    TraderError::InvalidInput("타임스탬프가 표현 가능한 범위를 벗어났습니다".to_string())
}

fn from_millis(ms: i64) -> TraderResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(out_of_range)
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = TraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TraderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}

/// 타임프레임 문자열을 초 단위로 변환합니다.
pub fn timeframe_to_seconds(timeframe: &str) -> TraderResult<u64> {
    Ok(Timeframe::parse(timeframe)?.as_secs())
}

/// 타임프레임 문자열을 분 단위로 변환합니다.
pub fn timeframe_to_minutes(timeframe: &str) -> TraderResult<u64> {
    Ok(Timeframe::parse(timeframe)?.as_minutes())
}

/// 타임프레임 문자열을 밀리초 단위로 변환합니다.
pub fn timeframe_to_msecs(timeframe: &str) -> TraderResult<u64> {
    Ok(Timeframe::parse(timeframe)?.as_millis())
}

/// 마지막으로 열린 캔들의 시작 시각. `date`가 없으면 현재 UTC 시각 기준.
pub fn timeframe_to_prev_date(
    timeframe: &str,
    date: Option<DateTime<Utc>>,
) -> TraderResult<DateTime<Utc>> {
    Timeframe::parse(timeframe)?.previous_boundary(date.unwrap_or_else(Utc::now))
}

/// 다음 캔들의 시작 시각. `date`가 없으면 현재 UTC 시각 기준.
pub fn timeframe_to_next_date(
    timeframe: &str,
    date: Option<DateTime<Utc>>,
) -> TraderResult<DateTime<Utc>> {
    Timeframe::parse(timeframe)?.next_boundary(date.unwrap_or_else(Utc::now))
}
