//! Large objects: BLOB, CLOB and BFILE

use crate::{
    Result, Error,
    oci::*,
    drv::DRV,
    ses::OciSes,
    types::Bfile,
};
use std::{fmt, io, sync::{Arc, atomic::{AtomicBool, Ordering}}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LobKind {
    Blob, Clob, Bfile,
}

pub(crate) enum Locator {
    Lob(Descriptor<OCILobLocator>),
    File(Descriptor<OCIBFileLocator>),
}

impl Locator {
    fn get(&self) -> *mut OCILobLocator {
        match self {
            Locator::Lob(loc) => loc.get(),
            Locator::File(loc) => loc.get(),
        }
    }
}

struct LobInner {
    loc: Locator,
    kind: LobKind,
    temp: bool,
    opened: AtomicBool,
    buf_size: usize,
    ses: Arc<OciSes>,
}

impl Drop for LobInner {
    fn drop(&mut self) {
        let loc = self.loc.get();
        if self.opened.load(Ordering::Acquire) {
            let res = match self.kind {
                LobKind::Bfile => self.ses.call(|svc, errp| unsafe { OCILobFileClose(svc, errp, loc) }),
                _ => self.ses.call(|svc, errp| unsafe { OCILobClose(svc, errp, loc) }),
            };
            if let Err(err) = res {
                log::warn!("LOB close: {}", err);
            }
        }
        if self.temp {
            if let Err(err) = self.ses.call(|svc, errp| unsafe { OCILobFreeTemporary(svc, errp, loc) }) {
                log::warn!("temporary LOB free: {}", err);
            }
        }
    }
}

/**
    A BLOB, CLOB or BFILE locator fetched from the database or created for a bind.

    Offsets and lengths are in bytes for BLOB and BFILE values and in characters for CLOB values.
    Reads and writes of a CLOB exchange UTF-8 text.

    # Example
    ```no_run
    use std::io::Read;
    use ora::{ColumnType, Lob};

    # let env = ora::Env::open()?;
    # let ses = env.connect("scott/tiger@localhost/orcl")?;
    let stmt = ses.prep_with("SELECT doc FROM docs WHERE id = :1", &[ColumnType::Lob])?;
    let rset = stmt.qry(&mut [42.into()])?;
    if let Some(row) = rset.next_row()? {
        let lob : Option<Lob> = row.get(0)?;
        if let Some(lob) = lob {
            let mut text = String::new();
            lob.reader().read_to_string(&mut text).map_err(|e| ora::Error::msg(e.to_string()))?;
        }
    }
    # Ok::<(),ora::Error>(())
    ```
*/
#[derive(Clone)]
pub struct Lob {
    inner: Arc<LobInner>,
}

impl fmt::Debug for Lob {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lob({:?}{})", self.inner.kind, if self.inner.temp { ", temporary" } else { "" })
    }
}

impl Lob {
    pub(crate) fn from_locator(loc: Locator, kind: LobKind, ses: Arc<OciSes>, buf_size: usize) -> Self {
        let inner = LobInner { loc, kind, temp: false, opened: AtomicBool::new(false), buf_size, ses };
        Self { inner: Arc::new(inner) }
    }

    /// Creates an empty temporary LOB. It is freed when the last clone is dropped.
    pub(crate) fn temp(ses: Arc<OciSes>, clob: bool, buf_size: usize) -> Result<Self> {
        let loc = Descriptor::<OCILobLocator>::new(ses.env())?;
        let ptr = loc.get();
        let (lob_type, form) = if clob { (OCI_TEMP_CLOB, SQLCS_IMPLICIT) } else { (OCI_TEMP_BLOB, 0) };
        ses.call(|svc, errp| unsafe {
            OCILobCreateTemporary(svc, errp, ptr, 0, form, lob_type, 1, OCI_DURATION_SESSION)
        })?;
        let kind = if clob { LobKind::Clob } else { LobKind::Blob };
        let inner = LobInner { loc: Locator::Lob(loc), kind, temp: true, opened: AtomicBool::new(false), buf_size, ses };
        Ok( Self { inner: Arc::new(inner) } )
    }

    /// Creates a BFILE locator that points to `file`.
    pub(crate) fn bfile(ses: Arc<OciSes>, file: &Bfile, buf_size: usize) -> Result<Self> {
        let mut loc = Descriptor::<OCIBFileLocator>::new(ses.env())?;
        let env = ses.env();
        let locp = loc.as_mut_ptr();
        ses.call(|_svc, errp| unsafe {
            OCILobFileSetName(
                env, errp, locp,
                file.dir.as_ptr(), file.dir.len() as u16,
                file.name.as_ptr(), file.name.len() as u16
            )
        })?;
        Ok( Self::from_locator(Locator::File(loc), LobKind::Bfile, ses, buf_size) )
    }

    pub(crate) fn kind(&self) -> LobKind {
        self.inner.kind
    }

    /// Returns the native locator.
    pub(crate) fn locator(&self) -> *mut OCILobLocator {
        self.inner.loc.get()
    }

    pub fn is_clob(&self) -> bool {
        self.inner.kind == LobKind::Clob
    }

    pub fn is_bfile(&self) -> bool {
        self.inner.kind == LobKind::Bfile
    }

    pub fn is_temporary(&self) -> bool {
        self.inner.temp
    }

    /// Returns the directory alias and file name of a BFILE.
    pub fn bfile_name(&self) -> Result<Bfile> {
        if self.inner.kind != LobKind::Bfile {
            return Err( Error::new("not a BFILE") );
        }
        let mut dir = vec![0u8; 30];
        let mut name = vec![0u8; 255];
        let mut dir_len = dir.len() as u16;
        let mut name_len = name.len() as u16;
        let env = self.inner.ses.env();
        let loc = self.locator();
        self.inner.ses.call(|_svc, errp| unsafe {
            OCILobFileGetName(env, errp, loc, dir.as_mut_ptr(), &mut dir_len, name.as_mut_ptr(), &mut name_len)
        })?;
        dir.truncate(dir_len as usize);
        name.truncate(name_len as usize);
        Ok( Bfile {
            dir: String::from_utf8_lossy(&dir).into_owned(),
            name: String::from_utf8_lossy(&name).into_owned(),
        } )
    }

    /// Returns the length in bytes, or in characters for a CLOB.
    pub fn len(&self) -> Result<u64> {
        let mut len = 0u64;
        let loc = self.locator();
        self.inner.ses.call(|svc, errp| unsafe { OCILobGetLength2(svc, errp, loc, &mut len) })?;
        Ok(len)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok( self.len()? == 0 )
    }

    /// Returns the chunk size to use for efficient writes.
    pub fn chunk_size(&self) -> Result<u32> {
        let mut size = 0u32;
        let loc = self.locator();
        self.inner.ses.call(|svc, errp| unsafe { OCILobGetChunkSize(svc, errp, loc, &mut size) })?;
        Ok(size)
    }

    /**
        Opens the LOB. Opening is optional; it saves the server from updating indexes and
        triggers on every write until `close`. A BFILE is opened read only and must be open to be read,
        so reads open it when needed.
    */
    pub fn open(&self) -> Result<()> {
        if self.inner.opened.load(Ordering::Acquire) {
            return Ok(());
        }
        let loc = self.locator();
        match self.inner.kind {
            LobKind::Bfile => self.inner.ses.call(|svc, errp| unsafe { OCILobFileOpen(svc, errp, loc, OCI_FILE_READONLY) })?,
            _ => self.inner.ses.call(|svc, errp| unsafe { OCILobOpen(svc, errp, loc, OCI_LOB_READWRITE) })?,
        };
        self.inner.opened.store(true, Ordering::Release);
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if !self.inner.opened.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let loc = self.locator();
        match self.inner.kind {
            LobKind::Bfile => self.inner.ses.call(|svc, errp| unsafe { OCILobFileClose(svc, errp, loc) })?,
            _ => self.inner.ses.call(|svc, errp| unsafe { OCILobClose(svc, errp, loc) })?,
        };
        Ok(())
    }

    /// Asks the server whether the LOB is open.
    pub fn is_open(&self) -> Result<bool> {
        if self.inner.kind == LobKind::Bfile {
            return Ok( self.inner.opened.load(Ordering::Acquire) );
        }
        let mut flag = 0i32;
        let loc = self.locator();
        self.inner.ses.call(|svc, errp| unsafe { OCILobIsOpen(svc, errp, loc, &mut flag) })?;
        Ok( flag != 0 )
    }

    fn csform(&self) -> u8 {
        if self.inner.kind == LobKind::Clob { SQLCS_IMPLICIT } else { 0 }
    }

    /// Reads from `offset` into `buf`. Returns the number of bytes and the number of units
    /// (characters for a CLOB) read; (0, 0) past the end.
    fn read_units(&self, offset: u64, buf: &mut [u8]) -> Result<(usize, u64)> {
        if buf.is_empty() {
            return Ok((0, 0));
        }
        if self.inner.kind == LobKind::Bfile {
            self.open()?;
        }
        // a UTF-8 character takes at most 4 bytes
        let (mut byte_amt, mut char_amt) = if self.is_clob() {
            if buf.len() < 4 {
                return Err( Error::new("CLOB reads need a buffer of at least 4 bytes") );
            }
            (0, (buf.len() / 4) as u64)
        } else {
            (buf.len() as u64, 0)
        };
        let loc = self.locator();
        let csform = self.csform();
        let res = self.inner.ses.call(|svc, errp| unsafe {
            OCILobRead2(
                svc, errp, loc, &mut byte_amt, &mut char_amt, offset + 1,
                buf.as_mut_ptr(), buf.len() as u64, OCI_ONE_PIECE,
                std::ptr::null_mut(), std::ptr::null(), 0, csform
            )
        })?;
        if res == OCI_NO_DATA {
            return Ok((0, 0));
        }
        let units = if self.is_clob() { char_amt } else { byte_amt };
        Ok( (byte_amt as usize, units) )
    }

    /// Reads from `offset` into `buf` and returns the number of bytes read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.read_units(offset, buf).map(|(bytes, _)| bytes)
    }

    fn write_units(&self, offset: u64, data: &[u8]) -> Result<(usize, u64)> {
        if data.is_empty() {
            return Ok((0, 0));
        }
        if self.inner.kind == LobKind::Bfile {
            return Err( Error::new("BFILE is read only") );
        }
        let mut byte_amt = data.len() as u64;
        let mut char_amt = 0u64;
        let loc = self.locator();
        let csform = self.csform();
        self.inner.ses.call(|svc, errp| unsafe {
            OCILobWrite2(
                svc, errp, loc, &mut byte_amt, &mut char_amt, offset + 1,
                data.as_ptr(), data.len() as u64, OCI_ONE_PIECE,
                std::ptr::null_mut(), std::ptr::null(), 0, csform
            )
        })?;
        let units = if self.is_clob() { char_amt } else { byte_amt };
        Ok( (byte_amt as usize, units) )
    }

    /// Writes `data` at `offset` and returns the number of bytes written. CLOB data must be whole UTF-8 text.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<usize> {
        if self.is_clob() && std::str::from_utf8(data).is_err() {
            return Err( Error::new("CLOB data is not valid UTF-8") );
        }
        self.write_units(offset, data).map(|(bytes, _)| bytes)
    }

    /// Truncates the LOB to `len` bytes, or characters for a CLOB.
    pub fn trim(&self, len: u64) -> Result<()> {
        let loc = self.locator();
        self.inner.ses.call(|svc, errp| unsafe { OCILobTrim2(svc, errp, loc, len) })?;
        Ok(())
    }

    /// Returns a reader that streams the LOB from the start in chunks of `lob_buffer_size`.
    pub fn reader(&self) -> LobReader {
        LobReader { lob: self.clone(), offset: 0, chunk: Vec::new(), pos: 0, eof: false }
    }

    /// Returns a writer that writes from the start of the LOB.
    pub fn writer(&self) -> LobWriter {
        LobWriter { lob: self.clone(), offset: 0, pending: Vec::new() }
    }

    /// Reads the whole LOB.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = DRV.arena.get(self.inner.buf_size);
        buf.resize(self.inner.buf_size, 0);
        let mut offset = 0;
        let res = loop {
            match self.read_units(offset, &mut buf) {
                Ok((0, _)) => break Ok(()),
                Ok((bytes, units)) => {
                    data.extend_from_slice(&buf[..bytes]);
                    offset += units;
                }
                Err(err) => break Err(err),
            }
        };
        DRV.arena.put(buf);
        res.map(|_| data)
    }

    /// Reads the whole CLOB as text.
    pub fn read_to_string(&self) -> Result<String> {
        let data = self.read_to_end()?;
        String::from_utf8(data).map_err(|err| Error::msg(format!("LOB content is not UTF-8: {}", err)))
    }
}

/**
    Streams a LOB with `std::io::Read`.

    Each refill makes one server round trip of up to `lob_buffer_size` bytes.
*/
pub struct LobReader {
    lob: Lob,
    offset: u64,
    chunk: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl LobReader {
    fn refill(&mut self) -> Result<()> {
        let size = self.lob.inner.buf_size;
        if self.chunk.capacity() < size {
            DRV.arena.put(std::mem::take(&mut self.chunk));
            self.chunk = DRV.arena.get(size);
        }
        self.chunk.resize(size, 0);
        let (bytes, units) = self.lob.read_units(self.offset, &mut self.chunk)?;
        log::trace!("LOB read {} bytes at {}", bytes, self.offset);
        self.chunk.truncate(bytes);
        self.pos = 0;
        self.offset += units;
        if bytes == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

impl io::Read for LobReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.chunk.len() {
            if self.eof {
                return Ok(0);
            }
            self.refill()?;
        }
        let len = buf.len().min(self.chunk.len() - self.pos);
        buf[..len].copy_from_slice(&self.chunk[self.pos..self.pos + len]);
        self.pos += len;
        Ok(len)
    }
}

impl Drop for LobReader {
    fn drop(&mut self) {
        DRV.arena.put(std::mem::take(&mut self.chunk));
    }
}

/**
    Writes a LOB with `std::io::Write`.

    Every `write` makes one server round trip. For a CLOB, a UTF-8 sequence split between two
    writes is held back until it is complete; `flush` fails if an incomplete one remains.
*/
pub struct LobWriter {
    lob: Lob,
    offset: u64,
    pending: Vec<u8>,
}

/// Returns the length of the longest prefix of `data` that ends on a UTF-8 boundary,
/// or an error if the data is not UTF-8 apart from an incomplete trailing sequence.
pub(crate) fn utf8_prefix_len(data: &[u8]) -> std::result::Result<usize, std::str::Utf8Error> {
    match std::str::from_utf8(data) {
        Ok(_) => Ok(data.len()),
        Err(err) if err.error_len().is_none() => Ok(err.valid_up_to()),
        Err(err) => Err(err),
    }
}

impl LobWriter {
    /// Writes `data` and returns the number of bytes of `data` consumed.
    pub(crate) fn write_chunk(&mut self, data: &[u8]) -> Result<usize> {
        if !self.lob.is_clob() {
            let (bytes, units) = self.lob.write_units(self.offset, data)?;
            self.offset += units;
            return Ok(bytes);
        }
        self.pending.extend_from_slice(data);
        let len = utf8_prefix_len(&self.pending).map_err(|err| Error::msg(format!("CLOB data is not UTF-8: {}", err)))?;
        if len > 0 {
            let (_, units) = self.lob.write_units(self.offset, &self.pending[..len])?;
            self.offset += units;
            self.pending.drain(..len);
        }
        Ok(data.len())
    }

    /// Returns the LOB the writer writes to.
    pub fn lob(&self) -> &Lob {
        &self.lob
    }
}

impl io::Write for LobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok( self.write_chunk(buf)? )
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err( io::Error::new(io::ErrorKind::InvalidData, "incomplete UTF-8 sequence at the end of CLOB data") )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_boundaries() {
        let text = "añb€";
        let bytes = text.as_bytes();
        assert_eq!(utf8_prefix_len(bytes), Ok(bytes.len()));
        // cut inside the euro sign
        assert_eq!(utf8_prefix_len(&bytes[..bytes.len() - 1]), Ok(4));
        // cut inside the n with tilde
        assert_eq!(utf8_prefix_len(&bytes[..2]), Ok(1));
        assert!(utf8_prefix_len(&[0x61, 0xff, 0x62]).is_err());
    }
}
