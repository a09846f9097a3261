/*!
A library for reading and writing Unreal Engine save files (commonly referred to
as GVAS) as a tree of typed properties.

Every property keeps enough of its on-disk form (type name, tag flags, string
encodings) that a save read and written back unchanged comes out byte for byte
identical. Structs without a registered decoder are kept as nested property
lists, or as raw bytes when the engine serialized them natively.

# Example

```
use gvas::{CustomFormats, EngineVersion, PackageVersion, Property, SaveGame, SaveGameHeader};

let header = SaveGameHeader {
    save_game_version: 3,
    package_version: PackageVersion::new(522, 1012),
    engine_version: EngineVersion {
        major: 5,
        minor: 5,
        patch: 0,
        build: 0,
        build_id: Some("++UE5+Release-5.5".into()),
    },
    custom_formats: CustomFormats::default(),
};
let mut save = SaveGame::new(header, "/Script/Game.GameSave");
save.properties.insert("Score", Property::Int(42))?;

let mut bytes = vec![];
save.write(&mut bytes)?;

let save = SaveGame::read(&bytes[..])?;
assert!(matches!(save.properties["Score"], Property::Int(42)));
# Ok::<(), Box<dyn std::error::Error>>(())
```

Struct types the engine serializes natively need a decoder in the
[`StructRegistry`] handed to [`SaveReader`]; save classes with their own layout
are handled by a [`SaveClass`] registered in a [`SaveClassRegistry`].
*/

pub mod archive;
mod collections;
mod context;
mod error;
mod fstring;
mod property;
mod save;
mod structs;
mod tag;
mod text;
mod type_name;
pub mod types;
mod version;

#[cfg(test)]
mod tests;

pub use archive::{ArchiveReader, ArchiveWriter, MAX_NESTING_DEPTH};
pub use collections::{ByteArray, MapEntry, PropertyArray, ValueVec};
pub use context::{SaveGameArchive, DEFAULT_MAX_STRING_LENGTH};
pub use error::{Error, ErrorKind, ParseError};
pub use fstring::{read_fstring, write_fstring, FString, FStringEncoding};
pub use property::{Byte, Property, PropertyHeader, PropertyKind, ValueContext};
pub use save::{SaveClass, SaveClassRegistry, SaveGame, SaveGameHeader, SaveReader};
pub use structs::{CustomStruct, CustomStructClone, StructData, StructKind, StructRegistry};
pub use tag::{EPropertyTagFlags, FPropertyTag, PropertyKey, PropertyList};
pub use text::{
    FormatArgument, FormatArgumentValue, NumberFormattingOptions, Text, TextFlags, TextHistory,
};
pub use type_name::FPropertyTypeName;
pub use types::{
    Color, Delegate, Double, FGuid, Float, GameplayTagContainer, IntPoint, IntVector,
    LinearColor, Quat, Rotator, SoftObjectPath, Vector, Vector2D,
};
pub use version::{
    CustomFormatData, CustomFormats, EngineVersion, ObjectVersion, ObjectVersionUE5,
    PackageVersion,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;
