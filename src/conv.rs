//! Conversions between OCI native values and host values

use crate::{
    Result, Error,
    oci::*,
    cfg::ColumnType,
    types::{Value, Timestamp, IntervalYM, IntervalDS},
};
use libc::c_void;

/// Stores a numeric or decimal text value into an OCI NUMBER.
pub(crate) fn to_number(val: &Value, num: &mut OCINumber, err: *mut OCIError) -> Result<()> {
    // integers go through an 8-byte staging value
    match *val {
        Value::I64(v) => number_from_int(v, true, num, err),
        Value::I32(v) => number_from_int(v as i64, true, num, err),
        Value::I16(v) => number_from_int(v as i64, true, num, err),
        Value::I8(v)  => number_from_int(v as i64, true, num, err),
        Value::U64(v) => number_from_int(v, false, num, err),
        Value::U32(v) => number_from_int(v as u64, false, num, err),
        Value::U16(v) => number_from_int(v as u64, false, num, err),
        Value::U8(v)  => number_from_int(v as u64, false, num, err),
        Value::F64(v) => number_from_real(v, num, err),
        Value::F32(v) => number_from_real(v as f64, num, err),
        Value::Num(ref txt) => number_from_text(txt, num, err),
        _ => Err( Error::msg(format!("{:?} is not a number", val)) ),
    }
}

/// Converts an OCI NUMBER into the numeric host type `gct`.
pub(crate) fn from_number(num: &OCINumber, gct: ColumnType, err: *mut OCIError) -> Result<Value> {
    let val = match gct.base() {
        ColumnType::I64 => Value::I64(number_to_int::<i64>(num, true, err)?),
        ColumnType::I32 => Value::I32(number_to_int::<i32>(num, true, err)?),
        ColumnType::I16 => Value::I16(number_to_int::<i16>(num, true, err)?),
        ColumnType::I8  => Value::I8(number_to_int::<i8>(num, true, err)?),
        ColumnType::U64 => Value::U64(number_to_int::<u64>(num, false, err)?),
        ColumnType::U32 => Value::U32(number_to_int::<u32>(num, false, err)?),
        ColumnType::U16 => Value::U16(number_to_int::<u16>(num, false, err)?),
        ColumnType::U8  => Value::U8(number_to_int::<u8>(num, false, err)?),
        ColumnType::F64 => Value::F64(number_to_real::<f64>(num, err)?),
        ColumnType::F32 => Value::F32(number_to_real::<f64>(num, err)? as f32),
        ColumnType::Str => Value::Str(number_to_text(num, err)?),
        _ => Value::Num(number_to_text(num, err)?),
    };
    Ok(val)
}

/// Returns the zero value that a non-nullable host type reports for SQL NULL.
pub(crate) fn zero_value(gct: ColumnType) -> Value {
    match gct {
        ColumnType::I64 => Value::I64(0),
        ColumnType::I32 => Value::I32(0),
        ColumnType::I16 => Value::I16(0),
        ColumnType::I8  => Value::I8(0),
        ColumnType::U64 => Value::U64(0),
        ColumnType::U32 => Value::U32(0),
        ColumnType::U16 => Value::U16(0),
        ColumnType::U8  => Value::U8(0),
        ColumnType::F64 => Value::F64(0.0),
        ColumnType::F32 => Value::F32(0.0),
        ColumnType::Num => Value::Num("0".to_string()),
        ColumnType::Str => Value::Str(String::new()),
        ColumnType::Bool => Value::Bool(false),
        ColumnType::Bin => Value::Bytes(Vec::new()),
        ColumnType::Time => Value::Time(Timestamp::default()),
        _ => Value::Null,
    }
}

/// Sets a TIMESTAMP WITH TIME ZONE descriptor. Values without an offset take the session zone.
pub(crate) fn to_datetime(ts: &Timestamp, dt: *mut OCIDateTime, usr: *mut OCISession, err: *mut OCIError) -> Result<()> {
    let tz = ts.tz_text();
    let (tz_ptr, tz_len) = match &tz {
        Some(txt) => (txt.as_ptr(), txt.len()),
        None => (std::ptr::null(), 0),
    };
    catch!{err =>
        OCIDateTimeConstruct(
            usr as *mut c_void, err, dt,
            ts.year, ts.month, ts.day, ts.hour, ts.minute, ts.second, ts.nanosecond,
            tz_ptr, tz_len
        )
    }
    Ok(())
}

pub(crate) fn from_datetime(dt: *const OCIDateTime, usr: *mut OCISession, err: *mut OCIError) -> Result<Timestamp> {
    let hndl = usr as *mut c_void;
    let mut ts = Timestamp::default();
    catch!{err =>
        OCIDateTimeGetDate(hndl, err, dt, &mut ts.year, &mut ts.month, &mut ts.day)
    }
    catch!{err =>
        OCIDateTimeGetTime(hndl, err, dt, &mut ts.hour, &mut ts.minute, &mut ts.second, &mut ts.nanosecond)
    }
    let mut tz_hour = 0i8;
    let mut tz_min = 0i8;
    // DATE and plain TIMESTAMP values have no zone
    let res = unsafe { OCIDateTimeGetTimeZoneOffset(hndl, err, dt, &mut tz_hour, &mut tz_min) };
    if res == OCI_SUCCESS {
        ts.tz = Some((tz_hour, tz_min));
    }
    Ok(ts)
}

pub(crate) fn to_interval_ym(val: &IntervalYM, iv: *mut OCIInterval, usr: *mut OCISession, err: *mut OCIError) -> Result<()> {
    catch!{err =>
        OCIIntervalSetYearMonth(usr as *mut c_void, err, val.years, val.months, iv)
    }
    Ok(())
}

pub(crate) fn from_interval_ym(iv: *const OCIInterval, usr: *mut OCISession, err: *mut OCIError) -> Result<IntervalYM> {
    let mut val = IntervalYM::default();
    catch!{err =>
        OCIIntervalGetYearMonth(usr as *mut c_void, err, &mut val.years, &mut val.months, iv)
    }
    Ok(val)
}

pub(crate) fn to_interval_ds(val: &IntervalDS, iv: *mut OCIInterval, usr: *mut OCISession, err: *mut OCIError) -> Result<()> {
    catch!{err =>
        OCIIntervalSetDaySecond(
            usr as *mut c_void, err,
            val.days, val.hours, val.minutes, val.seconds, val.nanoseconds, iv
        )
    }
    Ok(())
}

pub(crate) fn from_interval_ds(iv: *const OCIInterval, usr: *mut OCISession, err: *mut OCIError) -> Result<IntervalDS> {
    let mut val = IntervalDS::default();
    catch!{err =>
        OCIIntervalGetDaySecond(
            usr as *mut c_void, err,
            &mut val.days, &mut val.hours, &mut val.minutes, &mut val.seconds, &mut val.nanoseconds, iv
        )
    }
    Ok(val)
}

/// Trims trailing blanks that CHAR columns are padded with.
pub(crate) fn rtrim(txt: &str) -> &str {
    txt.trim_end_matches(' ')
}

/// Decodes a single character column against the configured runes.
pub(crate) fn to_bool(bytes: &[u8], true_rune: char) -> bool {
    let mut buf = [0u8; 4];
    bytes == true_rune.encode_utf8(&mut buf).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runes() {
        assert!(to_bool(b"1", '1'));
        assert!(!to_bool(b"0", '1'));
        assert!(to_bool("é".as_bytes(), 'é'));
        assert!(!to_bool(b"", 'Y'));
    }

    #[test]
    fn zero_values() {
        assert_eq!(format!("{:?}", zero_value(ColumnType::I32)), "I32(0)");
        assert!(zero_value(ColumnType::OraI32).is_null());
        assert!(zero_value(ColumnType::Lob).is_null());
        assert_eq!(rtrim("abc   "), "abc");
    }
}
