use std::io::{Read, Seek, SeekFrom, Write};

use crate::{
    fstring::{read_fstring, write_fstring},
    Error, FString, PackageVersion, Result, StructRegistry,
};

/// A readable save stream that also knows the layout version and struct decoders in effect.
///
/// Both archive traits are object safe so that host extensions ([`crate::CustomStruct`],
/// [`crate::SaveClass`]) can receive `&mut dyn ArchiveReader`.
pub trait ArchiveReader: Read + Seek {
    fn version(&self) -> PackageVersion;
    fn structs(&self) -> &StructRegistry;
    fn max_string_length(&self) -> usize;
    /// How many nested structures (type names, property lists, texts) are being decoded.
    fn depth(&mut self) -> &mut usize;

    fn read_fstring(&mut self) -> Result<Option<FString>> {
        let max = self.max_string_length();
        read_fstring(self, max)
    }
    /// Reads a string that must be present.
    fn read_string(&mut self) -> Result<FString> {
        self.read_fstring()?
            .ok_or_else(|| Error::MalformedString("unexpected null string".into()))
    }
}

pub trait ArchiveWriter: Write + Seek {
    fn version(&self) -> PackageVersion;

    fn write_fstring(&mut self, value: Option<&FString>) -> Result<()> {
        write_fstring(self, value)
    }
    fn write_string(&mut self, value: &FString) -> Result<()> {
        write_fstring(self, Some(value))
    }
}

impl<T: ArchiveReader + ?Sized> ArchiveReader for &mut T {
    fn version(&self) -> PackageVersion {
        (**self).version()
    }
    fn structs(&self) -> &StructRegistry {
        (**self).structs()
    }
    fn max_string_length(&self) -> usize {
        (**self).max_string_length()
    }
    fn depth(&mut self) -> &mut usize {
        (**self).depth()
    }
}

impl<T: ArchiveWriter + ?Sized> ArchiveWriter for &mut T {
    fn version(&self) -> PackageVersion {
        (**self).version()
    }
}

/// Deepest nesting of type names, property lists and texts accepted on read.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Runs `f` one nesting level deeper, failing instead of recursing past [`MAX_NESTING_DEPTH`].
pub(crate) fn nested<A: ArchiveReader + ?Sized, T>(
    ar: &mut A,
    f: impl FnOnce(&mut A) -> Result<T>,
) -> Result<T> {
    if *ar.depth() >= MAX_NESTING_DEPTH {
        return Err(Error::Other(format!(
            "structures nested deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }
    *ar.depth() += 1;
    let result = f(ar);
    *ar.depth() -= 1;
    result
}

/// Reads `len` bytes, checking first that the stream holds that many.
pub(crate) fn read_bytes<A: ArchiveReader + ?Sized>(ar: &mut A, len: usize) -> Result<Vec<u8>> {
    let position = ar.stream_position()?;
    let end = ar.seek(SeekFrom::End(0))?;
    ar.seek(SeekFrom::Start(position))?;
    let remaining = end.saturating_sub(position);
    if len as u64 > remaining {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("{len} bytes requested but only {remaining} remain"),
        )));
    }
    let mut data = vec![0; len];
    ar.read_exact(&mut data)?;
    Ok(data)
}

/// Converts an item count to the `i32` stored on disk.
pub(crate) fn item_count(what: &str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::Other(format!("{what} has too many items ({len})")))
}
