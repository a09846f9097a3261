use std::{
    io::{Read, Seek, SeekFrom, Write},
    rc::Rc,
};

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    PackageVersion, StructRegistry,
};

/// Default bound on the character count of any string read from a save.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

/// A stream paired with the state every codec needs: the active [`PackageVersion`] and the struct
/// registry. Used for both reading and writing.
#[derive(Debug)]
pub struct SaveGameArchive<S> {
    stream: S,
    version: PackageVersion,
    structs: Rc<StructRegistry>,
    max_string_length: usize,
    depth: usize,
}

impl<S> SaveGameArchive<S> {
    pub fn new(stream: S, version: PackageVersion) -> Self {
        Self::with_structs(stream, version, Rc::new(StructRegistry::builtin()))
    }
    pub fn with_structs(stream: S, version: PackageVersion, structs: Rc<StructRegistry>) -> Self {
        Self {
            stream,
            version,
            structs,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            depth: 0,
        }
    }
    pub fn set_max_string_length(&mut self, max_string_length: usize) {
        self.max_string_length = max_string_length;
    }
    pub(crate) fn set_version(&mut self, version: PackageVersion) {
        self.version = version;
    }
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<R: Read> Read for SaveGameArchive<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}
impl<S: Seek> Seek for SaveGameArchive<S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.stream.seek(pos)
    }
}
impl<W: Write> Write for SaveGameArchive<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl<R: Read + Seek> ArchiveReader for SaveGameArchive<R> {
    fn version(&self) -> PackageVersion {
        self.version
    }
    fn structs(&self) -> &StructRegistry {
        &self.structs
    }
    fn max_string_length(&self) -> usize {
        self.max_string_length
    }
    fn depth(&mut self) -> &mut usize {
        &mut self.depth
    }
}
impl<W: Write + Seek> ArchiveWriter for SaveGameArchive<W> {
    fn version(&self) -> PackageVersion {
        self.version
    }
}

/// Gives any forward-only reader the limited seeking the decoder needs (position queries and
/// rewinding after a lookahead) by keeping everything read so far in memory.
pub(crate) struct SeekReader<R: Read> {
    inner: R,
    buffer: Vec<u8>,
    position: usize,
    reached_eof: bool,
}

impl<R: Read> SeekReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: vec![],
            position: 0,
            reached_eof: false,
        }
    }
    fn fill(&mut self, wanted: usize) -> std::io::Result<()> {
        let mut chunk = [0; 8192];
        while !self.reached_eof && self.buffer.len() < wanted {
            let limit = chunk.len().min(wanted - self.buffer.len());
            let read = self.inner.read(&mut chunk[..limit])?;
            if read == 0 {
                self.reached_eof = true;
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }
}

impl<R: Read> Read for SeekReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.fill(self.position + buf.len())?;
        let available = self.buffer.len().saturating_sub(self.position);
        let count = buf.len().min(available);
        buf[..count].copy_from_slice(&self.buffer[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

impl<R: Read> Seek for SeekReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => {
                self.fill(usize::MAX)?;
                self.buffer.len() as i64 + offset
            }
        };
        if target < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cannot seek to a negative position",
            ));
        }
        let target = target as usize;
        self.fill(target)?;
        self.position = target.min(self.buffer.len());
        Ok(self.position as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom};

    use super::SeekReader;

    #[test]
    fn rewinds_and_reports_end() {
        let data: Vec<u8> = (0..20).collect();
        let mut reader = SeekReader::new(&data[..]);
        let mut buf = [0; 4];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(reader.stream_position().unwrap(), 4);
        reader.seek(SeekFrom::Current(-2)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4, 5]);
        assert_eq!(reader.seek(SeekFrom::End(0)).unwrap(), 20);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
