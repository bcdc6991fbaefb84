//! Host values bound to statement placeholders

use crate::{
    Result, Error,
    oci::*,
    cfg::{ColumnType, StmtCfg},
    conv,
    drv::DRV,
    lob::{Lob, LobKind},
    rset::Rset,
    ses::OciSes,
    types::{Value, Timestamp, IntervalYM, IntervalDS, Bfile, FromValue},
};
use libc::c_void;
use std::{io, mem, ptr, sync::Arc};

/// Value type of a bind, used for typed NULLs and to size array and output buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    I64, I32, I16, I8, U64, U32, U16, U8, F64, F32,
    /// Decimal number given as text
    Num,
    Str, Bool, Bytes, Time, IntervalYM, IntervalDS,
    Blob, Clob, Bfile,
}

impl Kind {
    /// Returns the kind of a value. NULL and result sets have none.
    pub fn of(val: &Value) -> Option<Kind> {
        let kind = match val {
            Value::I64(_) => Kind::I64,
            Value::I32(_) => Kind::I32,
            Value::I16(_) => Kind::I16,
            Value::I8(_)  => Kind::I8,
            Value::U64(_) => Kind::U64,
            Value::U32(_) => Kind::U32,
            Value::U16(_) => Kind::U16,
            Value::U8(_)  => Kind::U8,
            Value::F64(_) => Kind::F64,
            Value::F32(_) => Kind::F32,
            Value::Num(_) => Kind::Num,
            Value::Str(_) => Kind::Str,
            Value::Bool(_) => Kind::Bool,
            Value::Bytes(_) => Kind::Bytes,
            Value::Time(_) => Kind::Time,
            Value::IntervalYM(_) => Kind::IntervalYM,
            Value::IntervalDS(_) => Kind::IntervalDS,
            Value::Bfile(_) => Kind::Bfile,
            Value::Lob(lob) => match lob.kind() {
                LobKind::Clob => Kind::Clob,
                LobKind::Blob => Kind::Blob,
                LobKind::Bfile => Kind::Bfile,
            },
            Value::Null | Value::Rset(_) => return None,
        };
        Some(kind)
    }

    fn is_numeric(self) -> bool {
        use Kind::*;
        matches!(self, I64 | I32 | I16 | I8 | U64 | U32 | U16 | U8 | F64 | F32 | Num)
    }

    pub(crate) fn sqlt(self) -> u16 {
        match self {
            k if k.is_numeric() => SQLT_VNU,
            Kind::Str => SQLT_CHR,
            Kind::Bool => SQLT_AFC,
            Kind::Bytes => SQLT_LBI,
            Kind::Time => SQLT_TIMESTAMP_TZ,
            Kind::IntervalYM => SQLT_INTERVAL_YM,
            Kind::IntervalDS => SQLT_INTERVAL_DS,
            Kind::Blob => SQLT_BLOB,
            Kind::Clob => SQLT_CLOB,
            _ => SQLT_BFILE,
        }
    }

    /// Host type that a numeric output value is converted into.
    fn number_type(self) -> ColumnType {
        match self {
            Kind::I64 => ColumnType::I64,
            Kind::I32 => ColumnType::I32,
            Kind::I16 => ColumnType::I16,
            Kind::I8  => ColumnType::I8,
            Kind::U64 => ColumnType::U64,
            Kind::U32 => ColumnType::U32,
            Kind::U16 => ColumnType::U16,
            Kind::U8  => ColumnType::U8,
            Kind::F64 => ColumnType::F64,
            Kind::F32 => ColumnType::F32,
            _ => ColumnType::Num,
        }
    }
}

/// Host types that can be bound by value
pub trait ToVal {
    fn kind() -> Kind where Self: Sized;
    fn to_val(&self) -> Value;
}

macro_rules! impl_to_val {
    ($($t:ty => $kind:ident),+) => {
        $(
            impl ToVal for $t {
                fn kind() -> Kind { Kind::$kind }
                fn to_val(&self) -> Value { Value::$kind(self.clone()) }
            }
        )+
    };
}

impl_to_val!{
    i64 => I64, i32 => I32, i16 => I16, i8 => I8,
    u64 => U64, u32 => U32, u16 => U16, u8 => U8,
    f64 => F64, f32 => F32,
    String => Str, bool => Bool, Vec<u8> => Bytes,
    Timestamp => Time, IntervalYM => IntervalYM, IntervalDS => IntervalDS
}

impl ToVal for &str {
    fn kind() -> Kind { Kind::Str }
    fn to_val(&self) -> Value { Value::Str(self.to_string()) }
}

impl<T: ToVal> ToVal for Option<T> {
    fn kind() -> Kind { T::kind() }
    fn to_val(&self) -> Value {
        self.as_ref().map_or(Value::Null, ToVal::to_val)
    }
}

/// Arrays bound for array DML: one element per iteration
pub trait ArrayArg {
    fn kind(&self) -> Kind;
    fn len(&self) -> usize;
    fn value(&self, idx: usize) -> Value;
}

impl<T: ToVal> ArrayArg for &[T] {
    fn kind(&self) -> Kind { T::kind() }
    fn len(&self) -> usize { <[T]>::len(self) }
    fn value(&self, idx: usize) -> Value { self[idx].to_val() }
}

impl<T: ToVal> ArrayArg for Vec<T> {
    fn kind(&self) -> Kind { T::kind() }
    fn len(&self) -> usize { Vec::len(self) }
    fn value(&self, idx: usize) -> Value { self[idx].to_val() }
}

impl<T: ToVal, const N: usize> ArrayArg for [T; N] {
    fn kind(&self) -> Kind { T::kind() }
    fn len(&self) -> usize { N }
    fn value(&self, idx: usize) -> Value { self[idx].to_val() }
}

/// Output and input/output placeholders. The value is sent in and replaced after execute.
pub trait OutArg {
    fn kind(&self) -> Kind;
    fn value(&self) -> Value;
    fn set(&mut self, val: Value) -> Result<()>;
}

impl<T: ToVal + FromValue> OutArg for T {
    fn kind(&self) -> Kind { T::kind() }
    fn value(&self) -> Value { self.to_val() }
    fn set(&mut self, val: Value) -> Result<()> {
        *self = T::from_value(val)?;
        Ok(())
    }
}

/**
    A statement argument.

    Scalars, strings, timestamps and the other value types convert into `Arg` with `into()`.
    A reference to a slice, an array or a `Vec` binds an array for array DML, a `&mut`
    reference binds an output placeholder.

    # Example
    ```no_run
    use ora::Arg;

    # let env = ora::Env::open()?;
    # let ses = env.connect("scott/tiger@localhost/orcl")?;
    let ids = [1i64, 2, 3];
    let names = ["one", "two", "three"];
    let stmt = ses.prep("INSERT INTO t (id, name) VALUES (:1, :2)")?;
    let rows = stmt.exe(&mut [(&ids).into(), (&names).into()])?;
    assert_eq!(rows, 3);

    let mut total = 0i64;
    let stmt = ses.prep("BEGIN SELECT count(*) INTO :1 FROM t; END;")?;
    stmt.exe(&mut [(&mut total).into()])?;
    # Ok::<(),ora::Error>(())
    ```
*/
pub enum Arg<'a> {
    Val(Value),
    /// NULL of a specific type
    NullOf(Kind),
    Out(&'a mut dyn OutArg),
    Array(Box<dyn ArrayArg + 'a>),
    /// Streams the reader into a temporary LOB
    Lob { reader: Box<dyn io::Read + 'a>, clob: bool },
    /// REF CURSOR output, set to the opened result set after execute
    Cursor(&'a mut Option<Rset>),
    /// Values of one type bound as an array
    List(Vec<Arg<'a>>),
}

impl<'a> Arg<'a> {
    /// NULL bound as a character value.
    pub fn null() -> Self {
        Arg::Val(Value::Null)
    }

    /// Binds the reader's content as a BLOB.
    pub fn blob(reader: impl io::Read + 'a) -> Self {
        Arg::Lob { reader: Box::new(reader), clob: false }
    }

    /// Binds the reader's UTF-8 content as a CLOB.
    pub fn clob(reader: impl io::Read + 'a) -> Self {
        Arg::Lob { reader: Box::new(reader), clob: true }
    }
}

macro_rules! impl_from_for_arg {
    ($($t:ty),+) => {
        $(
            impl<'a> From<$t> for Arg<'a> {
                fn from(val: $t) -> Self {
                    Arg::Val(val.to_val())
                }
            }
        )+
    };
}

impl_from_for_arg!{ i64, i32, i16, i8, u64, u32, u16, u8, f64, f32, String, bool, Vec<u8>, Timestamp, IntervalYM, IntervalDS }

impl<'a> From<&str> for Arg<'a> {
    fn from(val: &str) -> Self {
        Arg::Val(Value::Str(val.to_string()))
    }
}

impl<'a> From<Value> for Arg<'a> {
    fn from(val: Value) -> Self {
        Arg::Val(val)
    }
}

impl<'a> From<Bfile> for Arg<'a> {
    fn from(val: Bfile) -> Self {
        Arg::Val(Value::Bfile(val))
    }
}

impl<'a> From<Lob> for Arg<'a> {
    fn from(val: Lob) -> Self {
        Arg::Val(Value::Lob(val))
    }
}

impl<'a, T: ToVal> From<Option<T>> for Arg<'a> {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => Arg::Val(val.to_val()),
            None => Arg::NullOf(T::kind()),
        }
    }
}

impl<'a, T: ToVal> From<&'a [T]> for Arg<'a> {
    fn from(vals: &'a [T]) -> Self {
        Arg::Array(Box::new(vals))
    }
}

impl<'a, T: ToVal> From<&'a Vec<T>> for Arg<'a> {
    fn from(vals: &'a Vec<T>) -> Self {
        Arg::Array(Box::new(vals.as_slice()))
    }
}

impl<'a, T: ToVal, const N: usize> From<&'a [T; N]> for Arg<'a> {
    fn from(vals: &'a [T; N]) -> Self {
        Arg::Array(Box::new(&vals[..]))
    }
}

impl<'a, T: OutArg> From<&'a mut T> for Arg<'a> {
    fn from(out: &'a mut T) -> Self {
        Arg::Out(out)
    }
}

/// Native memory a bind points OCI to. Element buffers are heap allocated, so moving a
/// `Slot` does not move what OCI reads and writes.
enum Data {
    Null,
    Bytes(Vec<u8>),
    Time(Vec<Descriptor<OCITimestampTZ>>),
    YearMonth(Vec<Descriptor<OCIIntervalYearToMonth>>),
    DaySecond(Vec<Descriptor<OCIIntervalDayToSecond>>),
    Lobs { _lobs: Vec<Option<Lob>>, locs: Vec<Ptr<OCILobLocator>> },
    Cursor(Box<Handle<OCIStmt>>),
}

struct Slot {
    sqlt: u16,
    width: usize,
    data: Data,
    inds: Vec<i16>,
    lens: Vec<u32>,
    rcs: Vec<u16>,
}

impl Slot {
    fn new(sqlt: u16, width: usize, data: Data, n: usize) -> Self {
        Self { sqlt, width, data, inds: vec![OCI_IND_NULL; n.max(1)], lens: vec![0; n.max(1)], rcs: vec![0; n.max(1)] }
    }

    fn value_ptr(&mut self) -> *mut c_void {
        match &mut self.data {
            Data::Null => ptr::null_mut(),
            Data::Bytes(buf) => buf.as_mut_ptr() as _,
            Data::Time(descs) => descs.as_mut_ptr() as _,
            Data::YearMonth(descs) => descs.as_mut_ptr() as _,
            Data::DaySecond(descs) => descs.as_mut_ptr() as _,
            Data::Lobs { locs, .. } => locs.as_mut_ptr() as _,
            Data::Cursor(stmt) => stmt.as_ptr() as *mut c_void,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Role {
    In,
    Array(usize),
    Out(Kind),
    Cursor,
}

struct Bind {
    hndl: Ptr<OCIBind>,
    role: Role,
    slot: Slot,
}

/// Native binds of one execute. Lives until the next execute of the statement.
pub(crate) struct Binds {
    binds: Vec<Bind>,
    iters: u32,
}

const PTR_SIZE : usize = mem::size_of::<*mut c_void>();

/// Builds the native buffers for `vals`, all of kind `kind`. `out_size` reserves room for
/// output values of variable length.
fn marshal(kind: Kind, vals: &[Value], out_size: Option<usize>, ses: &Arc<OciSes>, cfg: &StmtCfg) -> Result<Slot> {
    let n = vals.len();
    let usr = ses.usr();
    let err = ses.err();
    let env = ses.env();
    let slot = match kind {
        k if k.is_numeric() => {
            let width = OCINumber::SIZE;
            let mut buf = vec![0u8; width * n.max(1)];
            let mut slot_inds = vec![OCI_IND_NULL; n.max(1)];
            let mut slot_lens = vec![0u32; n.max(1)];
            for (i, val) in vals.iter().enumerate() {
                if val.is_null() {
                    continue;
                }
                let mut num = OCINumber { bytes: [0; OCINumber::SIZE] };
                conv::to_number(val, &mut num, err)?;
                buf[i * width..(i + 1) * width].copy_from_slice(&num.bytes);
                slot_inds[i] = OCI_IND_NOTNULL;
                slot_lens[i] = width as u32;
            }
            let mut slot = Slot::new(SQLT_VNU, width, Data::Bytes(buf), n);
            slot.inds = slot_inds;
            slot.lens = slot_lens;
            return Ok(slot);
        }
        Kind::Str | Kind::Bytes | Kind::Bool => {
            let mut tbuf = [0u8; 4];
            let mut fbuf = [0u8; 4];
            let true_rune = cfg.true_rune().encode_utf8(&mut tbuf).as_bytes().to_vec();
            let false_rune = cfg.false_rune().encode_utf8(&mut fbuf).as_bytes().to_vec();
            let bytes_of = |val: &Value| -> Result<Option<Vec<u8>>> {
                match val {
                    Value::Null => Ok(None),
                    Value::Str(s) => Ok(Some(s.as_bytes().to_vec())),
                    Value::Bytes(b) => Ok(Some(b.clone())),
                    Value::Bool(true) => Ok(Some(true_rune.clone())),
                    Value::Bool(false) => Ok(Some(false_rune.clone())),
                    val => Err( Error::InvalidBind(format!("{:?} in a {:?} bind", val, kind)) ),
                }
            };
            let items = vals.iter().map(bytes_of).collect::<Result<Vec<_>>>()?;
            let mut width = items.iter().flatten().map(Vec::len).max().unwrap_or(0);
            if let Some(size) = out_size {
                width = width.max(size);
            }
            let width = width.max(1);
            let mut buf = vec![0u8; width * n.max(1)];
            let mut slot = Slot::new(kind.sqlt(), width, Data::Null, n);
            for (i, item) in items.iter().enumerate() {
                if let Some(bytes) = item {
                    buf[i * width..i * width + bytes.len()].copy_from_slice(bytes);
                    slot.inds[i] = OCI_IND_NOTNULL;
                    slot.lens[i] = bytes.len() as u32;
                }
            }
            slot.data = Data::Bytes(buf);
            slot
        }
        Kind::Time => {
            let mut descs = Vec::with_capacity(n.max(1));
            let mut slot = Slot::new(SQLT_TIMESTAMP_TZ, PTR_SIZE, Data::Null, n);
            for (i, val) in vals.iter().enumerate() {
                let desc = Descriptor::<OCITimestampTZ>::new(env)?;
                match val {
                    Value::Time(ts) => {
                        conv::to_datetime(ts, desc.get(), usr, err)?;
                        slot.inds[i] = OCI_IND_NOTNULL;
                        slot.lens[i] = PTR_SIZE as u32;
                    }
                    Value::Null => {}
                    val => return Err( Error::InvalidBind(format!("{:?} in a timestamp bind", val)) ),
                }
                descs.push(desc);
            }
            if descs.is_empty() {
                descs.push(Descriptor::new(env)?);
            }
            slot.data = Data::Time(descs);
            slot
        }
        Kind::IntervalYM => {
            let mut descs = Vec::with_capacity(n.max(1));
            let mut slot = Slot::new(SQLT_INTERVAL_YM, PTR_SIZE, Data::Null, n);
            for (i, val) in vals.iter().enumerate() {
                let desc = Descriptor::<OCIIntervalYearToMonth>::new(env)?;
                match val {
                    Value::IntervalYM(iv) => {
                        conv::to_interval_ym(iv, desc.get(), usr, err)?;
                        slot.inds[i] = OCI_IND_NOTNULL;
                        slot.lens[i] = PTR_SIZE as u32;
                    }
                    Value::Null => {}
                    val => return Err( Error::InvalidBind(format!("{:?} in an interval bind", val)) ),
                }
                descs.push(desc);
            }
            if descs.is_empty() {
                descs.push(Descriptor::new(env)?);
            }
            slot.data = Data::YearMonth(descs);
            slot
        }
        Kind::IntervalDS => {
            let mut descs = Vec::with_capacity(n.max(1));
            let mut slot = Slot::new(SQLT_INTERVAL_DS, PTR_SIZE, Data::Null, n);
            for (i, val) in vals.iter().enumerate() {
                let desc = Descriptor::<OCIIntervalDayToSecond>::new(env)?;
                match val {
                    Value::IntervalDS(iv) => {
                        conv::to_interval_ds(iv, desc.get(), usr, err)?;
                        slot.inds[i] = OCI_IND_NOTNULL;
                        slot.lens[i] = PTR_SIZE as u32;
                    }
                    Value::Null => {}
                    val => return Err( Error::InvalidBind(format!("{:?} in an interval bind", val)) ),
                }
                descs.push(desc);
            }
            if descs.is_empty() {
                descs.push(Descriptor::new(env)?);
            }
            slot.data = Data::DaySecond(descs);
            slot
        }
        Kind::Blob | Kind::Clob | Kind::Bfile => {
            let mut lobs = Vec::with_capacity(n.max(1));
            let mut locs = Vec::with_capacity(n.max(1));
            let mut slot = Slot::new(kind.sqlt(), PTR_SIZE, Data::Null, n);
            for (i, val) in vals.iter().enumerate() {
                let lob = match val {
                    Value::Lob(lob) => Some(lob.clone()),
                    Value::Bfile(file) => Some(Lob::bfile(ses.clone(), file, cfg.lob_buffer_size())?),
                    Value::Null => None,
                    val => return Err( Error::InvalidBind(format!("{:?} in a LOB bind", val)) ),
                };
                match &lob {
                    Some(lob) => {
                        locs.push(Ptr::new(lob.locator()));
                        slot.inds[i] = OCI_IND_NOTNULL;
                        slot.lens[i] = PTR_SIZE as u32;
                    }
                    None => locs.push(Ptr::null()),
                }
                lobs.push(lob);
            }
            if locs.is_empty() {
                locs.push(Ptr::null());
            }
            slot.data = Data::Lobs { _lobs: lobs, locs };
            slot
        }
        _ => return Err( Error::UnsupportedBind(format!("{:?}", kind)) ),
    };
    Ok(slot)
}

/// Binds NULL of the given kind: no buffer, only the indicator.
fn null_slot(kind: Kind) -> Slot {
    Slot::new(kind.sqlt(), 0, Data::Null, 1)
}

/// Copies the reader into a new temporary LOB in chunks of `lob_buffer_size`.
fn stream_to_temp_lob<R: io::Read + ?Sized>(reader: &mut R, clob: bool, ses: &Arc<OciSes>, cfg: &StmtCfg) -> Result<Lob> {
    let lob = Lob::temp(ses.clone(), clob, cfg.lob_buffer_size())?;
    let mut writer = lob.writer();
    let size = cfg.lob_buffer_size();
    let mut buf = DRV.arena.get(size);
    buf.resize(size, 0);
    let res = (|| -> Result<()> {
        loop {
            let mut filled = 0;
            while filled < size {
                match reader.read(&mut buf[filled..]) {
                    Ok(0) => break,
                    Ok(n) => filled += n,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err( Error::msg(format!("LOB source read failed: {}", err)) ),
                }
            }
            if filled == 0 {
                break;
            }
            writer.write_chunk(&buf[..filled])?;
            log::trace!("LOB bind wrote {} bytes", filled);
            if filled < size {
                break;
            }
        }
        Ok( io::Write::flush(&mut writer)? )
    })();
    DRV.arena.put(buf);
    res.map(|_| lob)
}

/// Flattens a list argument into values of a single kind.
fn list_values(items: &[Arg]) -> Result<(Kind, Vec<Value>)> {
    let mut kind = None;
    let mut vals = Vec::with_capacity(items.len());
    for item in items {
        let (item_kind, val) = match item {
            Arg::Val(val) => (Kind::of(val), val.clone()),
            Arg::NullOf(k) => (Some(*k), Value::Null),
            _ => return Err( Error::UnsupportedBind("only values can be bound as list elements".to_string()) ),
        };
        if let Value::Rset(_) = val {
            return Err( Error::UnsupportedBind("result set in a list".to_string()) );
        }
        match (kind, item_kind) {
            (None, k) => kind = k,
            (Some(k), Some(ik)) if k != ik => {
                return Err( Error::InvalidBind(format!("list mixes {:?} and {:?} values", k, ik)) );
            }
            _ => {}
        }
        vals.push(val);
    }
    Ok( (kind.unwrap_or(Kind::Str), vals) )
}

impl Binds {
    /**
        Marshals `args` and binds them to the statement placeholders by position.

        With `returning` the last placeholder is bound as an `i64` output that captures the key
        of an `INSERT ... RETURNING`, whatever the last argument is. The caller holds the session
        call lock.
    */
    pub(crate) fn new(stmt: *mut OCIStmt, ses: &Arc<OciSes>, cfg: &StmtCfg, args: &mut [Arg], returning: bool) -> Result<Self> {
        let mut binds = Vec::with_capacity(args.len());
        let mut iters : Option<usize> = None;
        let num_args = args.len();
        for (idx, arg) in args.iter_mut().enumerate() {
            let (role, slot) = match arg {
                _ if returning && idx + 1 == num_args => {
                    (Role::Out(Kind::I64), marshal(Kind::I64, &[Value::Null], None, ses, cfg)?)
                }
                Arg::Val(Value::Null) => (Role::In, null_slot(Kind::Str)),
                Arg::Val(Value::Rset(_)) => return Err( Error::UnsupportedBind("result set as an input value".to_string()) ),
                Arg::Val(val) => {
                    let kind = Kind::of(val).ok_or_else(|| Error::UnsupportedBind(format!("{:?}", val)))?;
                    (Role::In, marshal(kind, std::slice::from_ref(val), None, ses, cfg)?)
                }
                Arg::NullOf(kind) => (Role::In, null_slot(*kind)),
                Arg::Out(out) => {
                    let kind = out.kind();
                    let val = out.value();
                    let size = match kind {
                        Kind::Str | Kind::Bytes => Some(cfg.string_ptr_buffer_size()),
                        Kind::Bool => Some(4),
                        _ => None,
                    };
                    (Role::Out(kind), marshal(kind, std::slice::from_ref(&val), size, ses, cfg)?)
                }
                Arg::Array(arr) if arr.kind() == Kind::U8 && cfg.byte_slice() == ColumnType::Bin => {
                    let bytes = (0..arr.len()).map(|i| u8::from_value(arr.value(i))).collect::<Result<Vec<u8>>>()?;
                    (Role::In, marshal(Kind::Bytes, &[Value::Bytes(bytes)], None, ses, cfg)?)
                }
                Arg::Array(arr) => {
                    let n = arr.len();
                    let vals : Vec<Value> = (0..n).map(|i| arr.value(i)).collect();
                    iters = Some(n);
                    (Role::Array(n), marshal(arr.kind(), &vals, None, ses, cfg)?)
                }
                Arg::List(items) => {
                    let (kind, vals) = list_values(items)?;
                    let n = vals.len();
                    iters = Some(n);
                    (Role::Array(n), marshal(kind, &vals, None, ses, cfg)?)
                }
                Arg::Lob { reader, clob } => {
                    let lob = stream_to_temp_lob(reader.as_mut(), *clob, ses, cfg)?;
                    let kind = if *clob { Kind::Clob } else { Kind::Blob };
                    (Role::In, marshal(kind, &[Value::Lob(lob)], None, ses, cfg)?)
                }
                Arg::Cursor(_) => {
                    let stmt = Handle::<OCIStmt>::new(ses.env())?;
                    let mut slot = Slot::new(SQLT_RSET, 0, Data::Cursor(Box::new(stmt)), 1);
                    slot.inds[0] = OCI_IND_NOTNULL;
                    (Role::Cursor, slot)
                }
            };
            log::trace!("bind {} as {:?} (SQLT {})", binds.len() + 1, role, slot.sqlt);
            binds.push(Bind { hndl: Ptr::null(), role, slot });
        }
        let iters = iters.unwrap_or(1);
        for bind in binds.iter() {
            if let Role::Array(len) = bind.role {
                if len < iters {
                    return Err( Error::InvalidBind(format!("array of {} elements for {} iterations", len, iters)) );
                }
            }
        }
        let err = ses.err();
        for (pos, bind) in binds.iter_mut().enumerate() {
            let width = bind.slot.width;
            let sqlt = bind.slot.sqlt;
            let valuep = bind.slot.value_ptr();
            let hndl = bind.hndl.as_mut_ptr();
            let slot = &mut bind.slot;
            catch!{err =>
                OCIBindByPos2(
                    stmt, hndl, err, (pos + 1) as u32,
                    valuep, width as i64, sqlt,
                    slot.inds.as_mut_ptr() as *mut c_void, slot.lens.as_mut_ptr(), slot.rcs.as_mut_ptr(),
                    0, ptr::null_mut(), OCI_DEFAULT
                )
            }
            if iters > 1 {
                let is_array = matches!(bind.role, Role::Array(_));
                bind_array_of_struct(bind.hndl.get(), err, if is_array { width } else { 0 }, is_array)?;
            }
        }
        Ok( Self { binds, iters: iters as u32 } )
    }

    /// Number of times a DML statement is executed: the length of the last array bound, or 1.
    pub(crate) fn iters(&self) -> u32 {
        self.iters
    }

    pub(crate) fn has_out(&self) -> bool {
        self.binds.iter().any(|bind| matches!(bind.role, Role::Out(_) | Role::Cursor))
    }

    /// Takes the statement handle a REF CURSOR placeholder was opened into.
    pub(crate) fn take_cursor(&mut self, pos: usize) -> Option<Handle<OCIStmt>> {
        let bind = self.binds.get_mut(pos)?;
        if bind.role != Role::Cursor {
            return None;
        }
        match mem::replace(&mut bind.slot.data, Data::Null) {
            Data::Cursor(stmt) => Some(*stmt),
            other => {
                bind.slot.data = other;
                None
            }
        }
    }

    /// Reads the output value of the placeholder at `pos`. The caller holds the session call lock.
    fn out_value(&self, pos: usize, kind: Kind, ses: &OciSes, cfg: &StmtCfg) -> Result<Value> {
        let slot = &self.binds[pos].slot;
        if slot.inds[0] == OCI_IND_NULL {
            return Ok(Value::Null);
        }
        let len = slot.lens[0] as usize;
        let val = match &slot.data {
            Data::Bytes(buf) if kind.is_numeric() => {
                let mut num = OCINumber { bytes: [0; OCINumber::SIZE] };
                num.bytes.copy_from_slice(&buf[..OCINumber::SIZE]);
                conv::from_number(&num, kind.number_type(), ses.err())?
            }
            Data::Bytes(buf) => {
                let bytes = &buf[..len.min(buf.len())];
                match kind {
                    Kind::Str => Value::Str(String::from_utf8_lossy(bytes).into_owned()),
                    Kind::Bool => Value::Bool(conv::to_bool(bytes, cfg.true_rune())),
                    _ => Value::Bytes(bytes.to_vec()),
                }
            }
            Data::Time(descs) => Value::Time(conv::from_datetime(descs[0].get(), ses.usr(), ses.err())?),
            Data::YearMonth(descs) => Value::IntervalYM(conv::from_interval_ym(descs[0].get(), ses.usr(), ses.err())?),
            Data::DaySecond(descs) => Value::IntervalDS(conv::from_interval_ds(descs[0].get(), ses.usr(), ses.err())?),
            _ => Value::Null,
        };
        Ok(val)
    }

    /// Returns the key captured by a `returning` bind. The caller holds the session call lock.
    pub(crate) fn returned_key(&self, ses: &OciSes, cfg: &StmtCfg) -> Result<Option<i64>> {
        match self.binds.last() {
            Some(bind) if bind.role == Role::Out(Kind::I64) => {
                let val = self.out_value(self.binds.len() - 1, Kind::I64, ses, cfg)?;
                Option::<i64>::from_value(val)
            }
            _ => Ok(None),
        }
    }

    /// Writes output values back into the `Out` arguments. The caller holds the session call lock.
    pub(crate) fn write_back(&self, args: &mut [Arg], ses: &OciSes, cfg: &StmtCfg) -> Result<()> {
        for (pos, arg) in args.iter_mut().enumerate() {
            if let (Arg::Out(out), Role::Out(kind)) = (arg, self.binds[pos].role) {
                let val = self.out_value(pos, kind, ses, cfg)?;
                out.set(val)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_variants() {
        assert!(matches!(Arg::from(5i32), Arg::Val(Value::I32(5))));
        assert!(matches!(Arg::from("x"), Arg::Val(Value::Str(_))));
        assert!(matches!(Arg::from(None::<f64>), Arg::NullOf(Kind::F64)));
        assert!(matches!(Arg::from(Some(1.5f64)), Arg::Val(Value::F64(_))));
        let ids = vec![1i64, 2, 3];
        match Arg::from(&ids) {
            Arg::Array(arr) => {
                assert_eq!(arr.kind(), Kind::I64);
                assert_eq!(arr.len(), 3);
                assert!(matches!(arr.value(2), Value::I64(3)));
            }
            _ => panic!("expected an array bind"),
        }
        let names = ["a", "b"];
        let arg = Arg::from(&names);
        assert!(matches!(&arg, Arg::Array(arr) if arr.len() == 2 && arr.kind() == Kind::Str));
        let arg = Arg::from(&ids[1..]);
        assert!(matches!(&arg, Arg::Array(arr) if arr.len() == 2 && matches!(arr.value(0), Value::I64(2))));

        let mut out = 0u32;
        let arg = Arg::from(&mut out);
        match &arg {
            Arg::Out(out) => assert_eq!(out.kind(), Kind::U32),
            _ => panic!("expected an output bind"),
        }
    }

    #[test]
    fn nullable_arrays() {
        let vals = [Some("a"), None, Some("c")];
        let arr : &dyn ArrayArg = &vals;
        assert_eq!(arr.kind(), Kind::Str);
        assert!(arr.value(1).is_null());
    }

    #[test]
    fn out_args_take_values() -> Result<()> {
        let mut num = 0i64;
        OutArg::set(&mut num, Value::I64(42))?;
        assert_eq!(num, 42);
        let mut txt : Option<String> = Some("x".to_string());
        OutArg::set(&mut txt, Value::Null)?;
        assert_eq!(txt, None);
        let mut small = 0u8;
        assert!(OutArg::set(&mut small, Value::I64(300)).is_err());
        Ok(())
    }

    #[test]
    fn lists_must_be_homogeneous() {
        let list = vec![Arg::from(1i64), Arg::from(2i64), Arg::NullOf(Kind::I64)];
        let (kind, vals) = list_values(&list).unwrap();
        assert_eq!(kind, Kind::I64);
        assert_eq!(vals.len(), 3);

        let mixed = vec![Arg::from(1i64), Arg::from("two")];
        assert!(matches!(list_values(&mixed), Err(Error::InvalidBind(_))));

        let mut out = 0i64;
        let nested = vec![Arg::from(&mut out)];
        assert!(matches!(list_values(&nested), Err(Error::UnsupportedBind(_))));

        let nulls = vec![Arg::null(), Arg::null()];
        assert_eq!(list_values(&nulls).map(|(kind, _)| kind).ok(), Some(Kind::Str));
    }

    #[test]
    fn sql_types() {
        assert_eq!(Kind::I8.sqlt(), SQLT_VNU);
        assert_eq!(Kind::Num.sqlt(), SQLT_VNU);
        assert_eq!(Kind::Str.sqlt(), SQLT_CHR);
        assert_eq!(Kind::Bool.sqlt(), SQLT_AFC);
        assert_eq!(Kind::Bytes.sqlt(), SQLT_LBI);
        assert_eq!(Kind::Time.sqlt(), SQLT_TIMESTAMP_TZ);
        assert_eq!(Kind::Bfile.sqlt(), SQLT_BFILE);
        assert_eq!(Kind::of(&Value::Null), None);
        assert_eq!(Kind::of(&Value::Num("1.5".to_string())), Some(Kind::Num));
    }
}
