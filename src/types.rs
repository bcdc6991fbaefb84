//! Host representations of Oracle values

use crate::{Result, Error, lob::Lob, rset::Rset};
use std::{convert::TryFrom, fmt, sync::Arc};

/**
    Date and time with an optional time zone offset.

    Values fetched from DATE and TIMESTAMP columns carry the session time zone offset.
    Values bound without an offset are interpreted in the session time zone.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub year: i16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub nanosecond: u32,
    /// Offset from UTC as (hours, minutes)
    pub tz: Option<(i8, i8)>,
}

impl Timestamp {
    pub fn new(year: i16, month: u8, day: u8, hour: u8, minute: u8, second: u8, nanosecond: u32) -> Self {
        Self { year, month, day, hour, minute, second, nanosecond, tz: None }
    }

    pub fn date(year: i16, month: u8, day: u8) -> Self {
        Self::new(year, month, day, 0, 0, 0, 0)
    }

    pub fn with_tz(mut self, hours: i8, minutes: i8) -> Self {
        self.tz = Some((hours, minutes));
        self
    }

    /// Returns the `+hh:mm` form of the offset, which is how OCI accepts zones.
    pub(crate) fn tz_text(&self) -> Option<String> {
        self.tz.map(|(h, m)| {
            let sign = if h < 0 || m < 0 { '-' } else { '+' };
            format!("{}{:02}:{:02}", sign, h.unsigned_abs(), m.unsigned_abs())
        })
    }

    fn epoch_nanos(&self) -> i128 {
        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        let secs = days * 86_400 + self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64;
        secs as i128 * 1_000_000_000 + self.nanosecond as i128
    }

    fn from_epoch_nanos(nanos: i128, tz: Option<(i8, i8)>) -> Self {
        let secs = nanos.div_euclid(1_000_000_000) as i64;
        let nanosecond = nanos.rem_euclid(1_000_000_000) as u32;
        let days = secs.div_euclid(86_400);
        let rem = secs.rem_euclid(86_400);
        let (year, month, day) = civil_from_days(days);
        Self {
            year: year as i16, month: month as u8, day: day as u8,
            hour: (rem / 3600) as u8, minute: (rem % 3600 / 60) as u8, second: (rem % 60) as u8,
            nanosecond, tz,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02} {:02}:{:02}:{:02}", self.year, self.month, self.day, self.hour, self.minute, self.second)?;
        if self.nanosecond > 0 {
            write!(f, ".{:09}", self.nanosecond)?;
        }
        if let Some(tz) = self.tz_text() {
            write!(f, " {}", tz)?;
        }
        Ok(())
    }
}

// Howard Hinnant's civil calendar algorithms
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
    (y, m, d)
}

/// INTERVAL YEAR TO MONTH value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntervalYM {
    pub years: i32,
    pub months: i32,
}

impl IntervalYM {
    pub fn new(years: i32, months: i32) -> Self {
        Self { years, months }
    }

    /**
        Returns the timestamp moved by this interval. Days past the end of the target month roll
        over into the next one.

        # Example
        ```
        use ora::{IntervalYM, Timestamp};

        let ts = Timestamp::date(2023, 1, 31);
        assert_eq!(IntervalYM::new(0, 1).shift(&ts), Timestamp::date(2023, 3, 3));
        assert_eq!(IntervalYM::new(1, -2).shift(&ts), Timestamp::date(2023, 12, 1));
        ```
    */
    pub fn shift(&self, ts: &Timestamp) -> Timestamp {
        let months = ts.year as i64 * 12 + (ts.month as i64 - 1) + self.years as i64 * 12 + self.months as i64;
        let year = months.div_euclid(12);
        let month = months.rem_euclid(12) + 1;
        let days = days_from_civil(year, month, 1) + ts.day as i64 - 1;
        let (year, month, day) = civil_from_days(days);
        Timestamp { year: year as i16, month: month as u8, day: day as u8, ..*ts }
    }
}

/// INTERVAL DAY TO SECOND value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntervalDS {
    pub days: i32,
    pub hours: i32,
    pub minutes: i32,
    pub seconds: i32,
    pub nanoseconds: i32,
}

impl IntervalDS {
    pub fn new(days: i32, hours: i32, minutes: i32, seconds: i32, nanoseconds: i32) -> Self {
        Self { days, hours, minutes, seconds, nanoseconds }
    }

    /// Returns the length of the interval in nanoseconds.
    pub fn as_nanos(&self) -> i128 {
        let secs = self.days as i128 * 86_400 + self.hours as i128 * 3600 + self.minutes as i128 * 60 + self.seconds as i128;
        secs * 1_000_000_000 + self.nanoseconds as i128
    }

    /**
        Returns the timestamp moved by this interval.

        # Example
        ```
        use ora::{IntervalDS, Timestamp};

        let ts = Timestamp::new(2023, 12, 31, 23, 0, 0, 0);
        assert_eq!(IntervalDS::new(0, 1, 30, 0, 0).shift(&ts), Timestamp::new(2024, 1, 1, 0, 30, 0, 0));
        ```
    */
    pub fn shift(&self, ts: &Timestamp) -> Timestamp {
        Timestamp::from_epoch_nanos(ts.epoch_nanos() + self.as_nanos(), ts.tz)
    }
}

impl From<std::time::Duration> for IntervalDS {
    fn from(dur: std::time::Duration) -> Self {
        let secs = dur.as_secs();
        Self {
            days: (secs / 86_400) as i32,
            hours: (secs % 86_400 / 3600) as i32,
            minutes: (secs % 3600 / 60) as i32,
            seconds: (secs % 60) as i32,
            nanoseconds: dur.subsec_nanos() as i32,
        }
    }
}

/// BFILE locator: a directory alias and a file name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bfile {
    pub dir: String,
    pub name: String,
}

impl Bfile {
    pub fn new(dir: &str, name: &str) -> Self {
        Self { dir: dir.to_string(), name: name.to_string() }
    }
}

/// A fetched column value
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    I64(i64), I32(i32), I16(i16), I8(i8),
    U64(u64), U32(u32), U16(u16), U8(u8),
    F64(f64), F32(f32),
    /// NUMBER as decimal text, for values that do not fit the native types
    Num(String),
    Str(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Time(Timestamp),
    IntervalYM(IntervalYM),
    IntervalDS(IntervalDS),
    Bfile(Bfile),
    Lob(Lob),
    Rset(Rset),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::I64(_) | Value::I32(_) | Value::I16(_) | Value::I8(_) |
            Value::U64(_) | Value::U32(_) | Value::U16(_) | Value::U8(_) => "integer",
            Value::F64(_) | Value::F32(_) => "float",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "timestamp",
            Value::IntervalYM(_) => "year-month interval",
            Value::IntervalDS(_) => "day-second interval",
            Value::Bfile(_) => "BFILE",
            Value::Lob(_) => "LOB",
            Value::Rset(_) => "result set",
        }
    }

    fn mismatch<T>(&self, target: &str) -> Result<T> {
        Err( Error::msg(format!("cannot convert {} to {}", self.kind(), target)) )
    }
}

/// Conversion of a fetched value into a host type
pub trait FromValue : Sized {
    fn from_value(val: Value) -> Result<Self>;
}

impl FromValue for Value {
    fn from_value(val: Value) -> Result<Self> {
        Ok(val)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(val: Value) -> Result<Self> {
        match val {
            Value::Null => Ok(None),
            val => T::from_value(val).map(Some),
        }
    }
}

fn out_of_range<T>(target: &str) -> Result<T> {
    Err( Error::msg(format!("value is out of range for {}", target)) )
}

macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(val: Value) -> Result<Self> {
                    let target = stringify!($t);
                    match val {
                        Value::I64(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::I32(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::I16(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::I8(v)  => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::U64(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::U32(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::U16(v) => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::U8(v)  => <$t>::try_from(v).or_else(|_| out_of_range(target)),
                        Value::F64(v) if v.fract() == 0.0 && v >= <$t>::MIN as f64 && v <= <$t>::MAX as f64 => Ok(v as $t),
                        Value::F32(v) if v.fract() == 0.0 && v as f64 >= <$t>::MIN as f64 && v as f64 <= <$t>::MAX as f64 => Ok(v as $t),
                        Value::Num(ref txt) | Value::Str(ref txt) => txt.trim().parse::<$t>()
                            .map_err(|_| Error::msg(format!("cannot parse {:?} as {}", txt, target))),
                        val => val.mismatch(target),
                    }
                }
            }
        )+
    };
}

impl_from_value_int!{ i64, i32, i16, i8, u64, u32, u16, u8 }

macro_rules! impl_from_value_float {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(val: Value) -> Result<Self> {
                    match val {
                        Value::F64(v) => Ok(v as $t),
                        Value::F32(v) => Ok(v as $t),
                        Value::I64(v) => Ok(v as $t),
                        Value::I32(v) => Ok(v as $t),
                        Value::I16(v) => Ok(v as $t),
                        Value::I8(v)  => Ok(v as $t),
                        Value::U64(v) => Ok(v as $t),
                        Value::U32(v) => Ok(v as $t),
                        Value::U16(v) => Ok(v as $t),
                        Value::U8(v)  => Ok(v as $t),
                        Value::Num(ref txt) | Value::Str(ref txt) => txt.trim().parse::<$t>()
                            .map_err(|_| Error::msg(format!("cannot parse {:?} as {}", txt, stringify!($t)))),
                        val => val.mismatch(stringify!($t)),
                    }
                }
            }
        )+
    };
}

impl_from_value_float!{ f64, f32 }

impl FromValue for String {
    fn from_value(val: Value) -> Result<Self> {
        match val {
            Value::Str(s) | Value::Num(s) => Ok(s),
            Value::I64(v) => Ok(v.to_string()),
            Value::I32(v) => Ok(v.to_string()),
            Value::I16(v) => Ok(v.to_string()),
            Value::I8(v)  => Ok(v.to_string()),
            Value::U64(v) => Ok(v.to_string()),
            Value::U32(v) => Ok(v.to_string()),
            Value::U16(v) => Ok(v.to_string()),
            Value::U8(v)  => Ok(v.to_string()),
            Value::F64(v) => Ok(v.to_string()),
            Value::F32(v) => Ok(v.to_string()),
            Value::Time(ts) => Ok(ts.to_string()),
            Value::Lob(lob) => lob.read_to_string(),
            val => val.mismatch("String"),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(val: Value) -> Result<Self> {
        match val {
            Value::Bytes(v) => Ok(v),
            Value::Str(s) => Ok(s.into_bytes()),
            Value::Lob(lob) => lob.read_to_end(),
            val => val.mismatch("Vec<u8>"),
        }
    }
}

impl FromValue for bool {
    fn from_value(val: Value) -> Result<Self> {
        match val {
            Value::Bool(v) => Ok(v),
            val => val.mismatch("bool"),
        }
    }
}

macro_rules! impl_from_value_variant {
    ($($t:ident => $variant:ident),+) => {
        $(
            impl FromValue for $t {
                fn from_value(val: Value) -> Result<Self> {
                    match val {
                        Value::$variant(v) => Ok(v),
                        val => val.mismatch(stringify!($t)),
                    }
                }
            }
        )+
    };
}

impl_from_value_variant!{
    Timestamp  => Time,
    IntervalYM => IntervalYM,
    IntervalDS => IntervalDS,
    Bfile      => Bfile,
    Lob        => Lob,
    Rset       => Rset
}

/// Column position by index or by name
pub trait ColumnIndex {
    fn position(&self, names: &[String]) -> Option<usize>;
}

impl ColumnIndex for usize {
    fn position(&self, names: &[String]) -> Option<usize> {
        if *self < names.len() { Some(*self) } else { None }
    }
}

impl ColumnIndex for &str {
    fn position(&self, names: &[String]) -> Option<usize> {
        names.iter().position(|name| name.eq_ignore_ascii_case(self))
    }
}

/// A fetched row
#[derive(Debug, Clone)]
pub struct Row {
    names: Arc<Vec<String>>,
    vals: Vec<Value>,
}

impl Row {
    pub(crate) fn new(names: Arc<Vec<String>>, vals: Vec<Value>) -> Self {
        Self { names, vals }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.vals
    }

    pub fn into_values(self) -> Vec<Value> {
        self.vals
    }

    fn index(&self, idx: impl ColumnIndex) -> Result<usize> {
        idx.position(&self.names).ok_or_else(|| Error::new("no such column"))
    }

    /**
        Returns the column value converted into `T`.

        `Option<T>` maps NULL to `None`; a plain `T` reports NULL as an error.
    */
    pub fn get<T: FromValue>(&self, idx: impl ColumnIndex) -> Result<T> {
        let pos = self.index(idx)?;
        T::from_value(self.vals[pos].clone())
    }

    /// Moves the column value out of the row, leaving NULL in its place.
    pub fn take<T: FromValue>(&mut self, idx: impl ColumnIndex) -> Result<T> {
        let pos = self.index(idx)?;
        T::from_value(std::mem::replace(&mut self.vals[pos], Value::Null))
    }

    pub fn is_null(&self, idx: impl ColumnIndex) -> Result<bool> {
        let pos = self.index(idx)?;
        Ok( self.vals[pos].is_null() )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(vals: Vec<Value>) -> Row {
        let names = (0..vals.len()).map(|i| format!("C{}", i)).collect();
        Row::new(Arc::new(names), vals)
    }

    #[test]
    fn numeric_conversions() {
        let row = row(vec![Value::I64(42), Value::Num("12345678901234567890123".to_string()), Value::F64(3.0), Value::Null]);
        assert_eq!(row.get::<i64>(0).unwrap(), 42);
        assert_eq!(row.get::<u8>(0).unwrap(), 42);
        assert_eq!(row.get::<f32>(0).unwrap(), 42.0);
        assert!(row.get::<i64>(1).is_err());
        assert_eq!(row.get::<String>(1).unwrap(), "12345678901234567890123");
        assert_eq!(row.get::<i32>(2).unwrap(), 3);
        assert_eq!(row.get::<Option<i32>>(3).unwrap(), None);
        assert!(row.get::<i32>(3).is_err());
        assert!(row.get::<i32>(4).is_err());
    }

    #[test]
    fn range_checks() {
        assert!(i8::from_value(Value::I64(300)).is_err());
        assert!(u32::from_value(Value::I32(-1)).is_err());
        assert!(i64::from_value(Value::F64(1.5)).is_err());
        assert_eq!(u64::from_value(Value::Num(" 18446744073709551615 ".to_string())).unwrap(), u64::MAX);
    }

    #[test]
    fn columns_by_name() {
        let row = Row::new(Arc::new(vec!["ID".to_string(), "NAME".to_string()]), vec![Value::I64(1), Value::Str("one".to_string())]);
        assert_eq!(row.get::<String>("name").unwrap(), "one");
        assert_eq!(row.get::<i32>("ID").unwrap(), 1);
        assert!(row.get::<i32>("missing").is_err());
        assert!(row.get::<i32>(2).is_err());
    }

    #[test]
    fn take_leaves_null() {
        let mut row = row(vec![Value::Str("x".to_string())]);
        assert_eq!(row.take::<String>(0).unwrap(), "x");
        assert!(row.is_null(0).unwrap());
    }

    #[test]
    fn timestamps() {
        let ts = Timestamp::new(2024, 2, 29, 13, 5, 9, 120_000_000).with_tz(-5, -30);
        assert_eq!(ts.tz_text().unwrap(), "-05:30");
        assert_eq!(ts.to_string(), "2024-02-29 13:05:09.120000000 -05:30");
        assert_eq!(Timestamp::date(1, 1, 1).with_tz(0, 0).tz_text().unwrap(), "+00:00");
    }

    #[test]
    fn interval_shifts() {
        let ts = Timestamp::date(2024, 2, 29);
        assert_eq!(IntervalYM::new(1, 0).shift(&ts), Timestamp::date(2025, 3, 1));
        assert_eq!(IntervalYM::new(0, -14).shift(&ts), Timestamp::date(2022, 12, 29));
        let ds = IntervalDS::new(-1, 0, 0, 0, -1);
        assert_eq!(ds.shift(&ts), Timestamp::new(2024, 2, 27, 23, 59, 59, 999_999_999));
        assert_eq!(IntervalDS::from(std::time::Duration::from_millis(90_061_500)), IntervalDS::new(1, 1, 1, 1, 500_000_000));
    }

    #[test]
    fn civil_round_trip() {
        for days in [-719_468i64, -1, 0, 1, 19_000, 2_932_896].iter() {
            let (y, m, d) = civil_from_days(*days);
            assert_eq!(days_from_civil(y, m, d), *days);
        }
        assert_eq!(days_from_civil(1970, 1, 1), 0);
    }
}
