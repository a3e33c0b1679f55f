use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};

use crate::dtype::Sf2Error;

/// Byte source the soundfont parser pulls from. Only forward motion is
/// needed: exact reads and skips. A short read or a failed skip is a format
/// error and aborts the load.
pub trait Stream {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Sf2Error>;
    fn skip(&mut self, count: u32) -> Result<(), Sf2Error>;

    fn read_u8(&mut self) -> Result<u8, Sf2Error> {
        let mut buf = [0_u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }
    fn read_i8(&mut self) -> Result<i8, Sf2Error> {
        Ok(self.read_u8()? as i8)
    }
    fn read_u16(&mut self) -> Result<u16, Sf2Error> {
        let mut buf = [0_u8; 2];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u16(&buf))
    }
    fn read_i16(&mut self) -> Result<i16, Sf2Error> {
        Ok(self.read_u16()? as i16)
    }
    fn read_u32(&mut self) -> Result<u32, Sf2Error> {
        let mut buf = [0_u8; 4];
        self.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }
    fn read_fourcc(&mut self) -> Result<[u8; 4], Sf2Error> {
        let mut buf = [0_u8; 4];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Stream over an in-memory soundfont image.
pub struct MemoryStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> MemoryStream<'a> {
    pub fn new(data: &'a [u8]) -> MemoryStream<'a> {
        MemoryStream { data, pos: 0 }
    }
}

impl Stream for MemoryStream<'_> {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Sf2Error> {
        let end = self.pos.checked_add(buf.len()).ok_or(Sf2Error::Truncated)?;
        if end > self.data.len() {
            return Err(Sf2Error::Truncated);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn skip(&mut self, count: u32) -> Result<(), Sf2Error> {
        let end = self
            .pos
            .checked_add(count as usize)
            .ok_or(Sf2Error::Truncated)?;
        if end > self.data.len() {
            return Err(Sf2Error::Truncated);
        }
        self.pos = end;
        Ok(())
    }
}

/// Buffered stream over a soundfont file on disk.
pub struct FileStream {
    inner: BufReader<File>,
}

impl FileStream {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<FileStream, Sf2Error> {
        Ok(FileStream {
            inner: BufReader::new(File::open(path)?),
        })
    }
}

impl Stream for FileStream {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Sf2Error> {
        self.inner
            .read_exact(buf)
            .map_err(|_| Sf2Error::Truncated)
    }

    fn skip(&mut self, count: u32) -> Result<(), Sf2Error> {
        // Seeking past EOF is not an error by itself; the next read fails
        // instead, which the parser treats the same way.
        self.inner
            .seek_relative(count as i64)
            .map_err(|_| Sf2Error::Truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_stream_reads_and_skips() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let mut stream = MemoryStream::new(&data);
        assert_eq!(stream.read_u16().unwrap(), 0x0201);
        assert!(stream.skip(2).is_ok());
        assert_eq!(stream.read_u16().unwrap(), 0x0605);
        assert!(matches!(stream.read_u8(), Err(Sf2Error::Truncated)));
    }

    #[test]
    fn memory_stream_rejects_overlong_skip() {
        let data = [0_u8; 4];
        let mut stream = MemoryStream::new(&data);
        assert!(matches!(stream.skip(5), Err(Sf2Error::Truncated)));
        // A failed skip must not move the cursor.
        assert!(stream.skip(4).is_ok());
    }
}
