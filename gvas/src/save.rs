//! The file envelope: header, save class, property list and host-defined save classes.

use std::{
    collections::HashMap,
    io::{Cursor, Read, Seek, SeekFrom, Write},
    rc::Rc,
};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    archive::{ArchiveReader, ArchiveWriter},
    context::{SaveGameArchive, SeekReader, DEFAULT_MAX_STRING_LENGTH},
    fstring::{read_fstring, write_fstring},
    CustomFormats, EngineVersion, Error, FString, PackageVersion, ParseError, PropertyList,
    Result, StructRegistry,
};

const MAGIC: [u8; 4] = *b"GVAS";

/// Save game versions whose header layout is known. Version 3 adds the UE5 object version.
const SAVE_GAME_VERSIONS: std::ops::RangeInclusive<i32> = 2..=3;

/// Host-defined handling for a save class whose data does not follow the standard layout.
///
/// The custom header, when present, sits right after the save class name. Its size must be
/// known before the data is written since the header is written last, into space reserved for
/// it up front.
pub trait SaveClass: std::fmt::Debug {
    fn has_custom_header(&self) -> bool {
        false
    }
    /// When set, [`SaveClass::read_data`] and [`SaveClass::write_data`] replace the property
    /// list.
    fn has_custom_data(&self) -> bool {
        false
    }
    /// Bytes [`SaveClass::write_header`] will write.
    fn header_size(&self) -> u64 {
        0
    }
    fn read_header(&mut self, _ar: &mut dyn ArchiveReader) -> Result<()> {
        Ok(())
    }
    /// Called after the data has been written, positioned at the start of the reserved header.
    /// `data_length` is the size of everything written after the header.
    fn write_header(&self, _ar: &mut dyn ArchiveWriter, _data_length: u64) -> Result<()> {
        Ok(())
    }
    fn read_data(&mut self, _ar: &mut dyn ArchiveReader) -> Result<()> {
        Ok(())
    }
    fn write_data(&self, _ar: &mut dyn ArchiveWriter) -> Result<()> {
        Ok(())
    }
}

/// Maps exact save class paths to custom handlers.
#[derive(Debug, Clone, Default)]
pub struct SaveClassRegistry {
    classes: HashMap<String, fn() -> Box<dyn SaveClass>>,
}

impl SaveClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` for every class path given. Fails without changing the registry if
    /// any path is already taken.
    pub fn register(
        &mut self,
        class_paths: &[&str],
        factory: fn() -> Box<dyn SaveClass>,
    ) -> Result<()> {
        if let Some(taken) = class_paths
            .iter()
            .find(|path| self.classes.contains_key(**path))
        {
            return Err(Error::ExtensibilityConflict(format!("save class {taken}")));
        }
        for path in class_paths {
            self.classes.insert((*path).to_owned(), factory);
        }
        Ok(())
    }

    /// A fresh handler for `class_path`, if one is registered.
    pub fn resolve(&self, class_path: &str) -> Option<Box<dyn SaveClass>> {
        self.classes.get(class_path).map(|factory| factory())
    }
}

/// Everything before the save class name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveGameHeader {
    pub save_game_version: i32,
    pub package_version: PackageVersion,
    pub engine_version: EngineVersion,
    pub custom_formats: CustomFormats,
}

impl SaveGameHeader {
    #[instrument(name = "SaveGameHeader_read", skip_all)]
    fn read<R: Read + ?Sized>(r: &mut R, max_string_length: usize) -> Result<Self> {
        let mut magic = [0; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let save_game_version = r.read_i32::<LE>()?;
        if !SAVE_GAME_VERSIONS.contains(&save_game_version) {
            return Err(Error::UnsupportedSaveGameVersion(save_game_version));
        }
        let ue4 = r.read_u32::<LE>()?;
        let ue5 = if save_game_version >= 3 {
            r.read_u32::<LE>()?
        } else {
            0
        };
        Ok(Self {
            save_game_version,
            package_version: PackageVersion::new(ue4, ue5),
            engine_version: EngineVersion::read(r, max_string_length)?,
            custom_formats: CustomFormats::read(r)?,
        })
    }

    fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        if !SAVE_GAME_VERSIONS.contains(&self.save_game_version) {
            return Err(Error::UnsupportedSaveGameVersion(self.save_game_version));
        }
        if self.save_game_version < 3 && self.package_version.ue5.0 != 0 {
            return Err(Error::Other(format!(
                "save game version {} cannot store a UE5 object version",
                self.save_game_version
            )));
        }
        w.write_all(&MAGIC)?;
        w.write_i32::<LE>(self.save_game_version)?;
        w.write_u32::<LE>(self.package_version.ue4.0)?;
        if self.save_game_version >= 3 {
            w.write_u32::<LE>(self.package_version.ue5.0)?;
        }
        self.engine_version.write(w)?;
        self.custom_formats.write(w)?;
        Ok(())
    }
}

/// A decoded save file.
#[derive(Debug, Serialize, Deserialize)]
pub struct SaveGame {
    pub header: SaveGameHeader,
    pub save_class: FString,
    /// Empty when a custom save class reads the data itself.
    pub properties: PropertyList,
    /// Handler for the save class, when one was registered. Written back by [`SaveGame::write`].
    #[serde(skip)]
    pub custom: Option<Box<dyn SaveClass>>,
}

impl SaveGame {
    /// An empty save using the standard property list layout.
    pub fn new(header: SaveGameHeader, save_class: impl Into<FString>) -> Self {
        Self {
            header,
            save_class: save_class.into(),
            properties: PropertyList::default(),
            custom: None,
        }
    }

    /// Reads a save with the built-in struct decoders and no custom save classes.
    pub fn read<R: Read>(reader: R) -> Result<Self, ParseError> {
        SaveReader::new().read(reader)
    }

    /// Reads a save with the given struct decoders.
    pub fn read_with<R: Read>(reader: R, structs: StructRegistry) -> Result<Self, ParseError> {
        SaveReader::new().structs(structs).read(reader)
    }

    /// Encodes the save into memory, then hands the bytes to `writer` in one piece, so the
    /// writer need not be seekable.
    #[instrument(name = "SaveGame_write", skip_all)]
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut ar = SaveGameArchive::new(Cursor::new(vec![]), self.header.package_version);
        self.header.write(&mut ar)?;
        write_fstring(&mut ar, Some(&self.save_class))?;
        if ArchiveWriter::version(&ar).complete_type_name() {
            ar.write_u8(0)?;
        }

        let custom = self.custom.as_deref();
        let header_start = ar.stream_position()?;
        let header_size = match custom {
            Some(custom) if custom.has_custom_header() => {
                let size = custom.header_size();
                ar.write_all(&vec![0; size as usize])?;
                Some(size)
            }
            _ => None,
        };

        let data_start = ar.stream_position()?;
        match custom {
            Some(custom) if custom.has_custom_data() => custom.write_data(&mut ar)?,
            _ => {
                self.properties.write(&mut ar)?;
                ar.write_i32::<LE>(0)?;
            }
        }
        let data_end = ar.stream_position()?;

        if let (Some(custom), Some(declared)) = (custom, header_size) {
            ar.seek(SeekFrom::Start(header_start))?;
            custom.write_header(&mut ar, data_end - data_start)?;
            let written = ar.stream_position()? - header_start;
            if written != declared {
                return Err(Error::CustomHeaderSizeMismatch {
                    save_class: self.save_class.to_string(),
                    declared,
                    written,
                });
            }
            ar.seek(SeekFrom::Start(data_end))?;
        }

        writer.write_all(ar.into_inner().get_ref())?;
        Ok(())
    }
}

/// Decoding options for [`SaveGame`].
#[derive(Debug, Clone)]
pub struct SaveReader {
    structs: Option<Rc<StructRegistry>>,
    save_classes: Rc<SaveClassRegistry>,
    max_string_length: usize,
}

impl Default for SaveReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveReader {
    pub fn new() -> Self {
        Self {
            structs: None,
            save_classes: Rc::default(),
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }
    /// Struct decoders to use instead of [`StructRegistry::builtin`].
    pub fn structs(mut self, structs: StructRegistry) -> Self {
        self.structs = Some(Rc::new(structs));
        self
    }
    /// Shares an already populated registry between readers.
    pub fn shared_structs(mut self, structs: Rc<StructRegistry>) -> Self {
        self.structs = Some(structs);
        self
    }
    pub fn save_classes(mut self, save_classes: SaveClassRegistry) -> Self {
        self.save_classes = Rc::new(save_classes);
        self
    }
    /// Upper bound on the character count of any string in the save.
    pub fn max_string_length(mut self, max_string_length: usize) -> Self {
        self.max_string_length = max_string_length;
        self
    }

    #[instrument(name = "SaveReader_read", skip_all)]
    pub fn read<S: Read>(self, stream: S) -> Result<SaveGame, ParseError> {
        let structs = self
            .structs
            .unwrap_or_else(|| Rc::new(StructRegistry::builtin()));
        let mut ar = SaveGameArchive::with_structs(
            SeekReader::new(stream),
            PackageVersion::default(),
            structs,
        );
        ar.set_max_string_length(self.max_string_length);

        let result = read_save(&mut ar, &self.save_classes);
        result.map_err(|error| ParseError {
            offset: ar.stream_position().map_or(0, |offset| offset as usize),
            error,
        })
    }
}

fn read_save<S: Read + Seek>(
    ar: &mut SaveGameArchive<S>,
    save_classes: &SaveClassRegistry,
) -> Result<SaveGame> {
    let max_string_length = ar.max_string_length();
    let header = SaveGameHeader::read(ar, max_string_length)?;
    ar.set_version(header.package_version);
    debug!(
        "save game version {}, package version {:?}",
        header.save_game_version, header.package_version
    );

    let save_class = read_fstring(ar, max_string_length)?
        .ok_or_else(|| Error::MalformedString("save class name is null".into()))?;
    if ArchiveReader::version(ar).complete_type_name() {
        let reserved = ar.read_u8()?;
        if reserved != 0 {
            return Err(Error::Other(format!(
                "reserved byte after the save class is {reserved:#04x}"
            )));
        }
    }

    let mut custom = save_classes.resolve(save_class.as_str());
    if let Some(custom) = custom.as_deref_mut() {
        debug!("using custom handler for save class {save_class}");
        if custom.has_custom_header() {
            custom.read_header(ar)?;
        }
    }

    let properties = match custom.as_deref_mut() {
        Some(custom) if custom.has_custom_data() => {
            custom.read_data(ar)?;
            PropertyList::default()
        }
        _ => {
            let properties = PropertyList::read(ar)?;
            let trailer = ar.read_i32::<LE>()?;
            if trailer != 0 {
                return Err(Error::Other(format!(
                    "property list is followed by {trailer} instead of 0"
                )));
            }
            let mut rest = vec![];
            ar.read_to_end(&mut rest)?;
            if !rest.is_empty() {
                return Err(Error::TrailingData(rest.len()));
            }
            properties
        }
    };

    Ok(SaveGame {
        header,
        save_class,
        properties,
        custom,
    })
}
