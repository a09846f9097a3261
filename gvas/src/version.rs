use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    fstring::{read_fstring, write_fstring},
    FGuid, FString, Result,
};

/// UE4-era object version (`EUnrealEngineObjectUE4Version`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectVersion(pub u32);

impl ObjectVersion {
    pub const ARRAY_PROPERTY_INNER_TAGS: Self = Self(500);
    pub const PROPERTY_GUID_IN_PROPERTY_TAG: Self = Self(503);
    pub const CORRECT_LICENSEE_FLAG: Self = Self(522);
}

/// UE5-era object version (`EUnrealEngineObjectUE5Version`). Zero in files written by UE4.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectVersionUE5(pub u32);

impl ObjectVersionUE5 {
    pub const INITIAL_VERSION: Self = Self(1000);
    pub const LARGE_WORLD_COORDINATES: Self = Self(1004);
    pub const FSOFTOBJECTPATH_REMOVE_ASSET_PATH_FNAMES: Self = Self(1007);
    pub const PROPERTY_TAG_EXTENSION_AND_OVERRIDABLE_SERIALIZATION: Self = Self(1011);
    pub const PROPERTY_TAG_COMPLETE_TYPE_NAME: Self = Self(1012);
}

/// The pair of object versions that selects the binary layout of everything after the header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageVersion {
    pub ue4: ObjectVersion,
    pub ue5: ObjectVersionUE5,
}

impl PackageVersion {
    pub fn new(ue4: u32, ue5: u32) -> Self {
        Self {
            ue4: ObjectVersion(ue4),
            ue5: ObjectVersionUE5(ue5),
        }
    }
    /// Tags carry a full [`crate::FPropertyTypeName`] and a flags byte.
    pub fn complete_type_name(&self) -> bool {
        *self >= ObjectVersionUE5::PROPERTY_TAG_COMPLETE_TYPE_NAME
    }
    pub fn large_world_coordinates(&self) -> bool {
        *self >= ObjectVersionUE5::LARGE_WORLD_COORDINATES
    }
    pub fn remove_asset_path_fnames(&self) -> bool {
        *self >= ObjectVersionUE5::FSOFTOBJECTPATH_REMOVE_ASSET_PATH_FNAMES
    }
    pub fn property_guid_in_tag(&self) -> bool {
        *self >= ObjectVersion::PROPERTY_GUID_IN_PROPERTY_TAG
    }
    pub fn array_inner_tags(&self) -> bool {
        *self >= ObjectVersion::ARRAY_PROPERTY_INNER_TAGS
    }
}

impl PartialEq<ObjectVersion> for PackageVersion {
    fn eq(&self, other: &ObjectVersion) -> bool {
        self.ue4 == *other
    }
}
impl PartialOrd<ObjectVersion> for PackageVersion {
    fn partial_cmp(&self, other: &ObjectVersion) -> Option<std::cmp::Ordering> {
        self.ue4.partial_cmp(other)
    }
}
impl PartialEq<ObjectVersionUE5> for PackageVersion {
    fn eq(&self, other: &ObjectVersionUE5) -> bool {
        self.ue5 == *other
    }
}
impl PartialOrd<ObjectVersionUE5> for PackageVersion {
    fn partial_cmp(&self, other: &ObjectVersionUE5) -> Option<std::cmp::Ordering> {
        self.ue5.partial_cmp(other)
    }
}

/// Engine build that wrote the file. Informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u32,
    pub build_id: Option<FString>,
}

impl EngineVersion {
    #[instrument(name = "EngineVersion_read", skip_all)]
    pub(crate) fn read<R: Read + ?Sized>(r: &mut R, max_string_length: usize) -> Result<Self> {
        Ok(Self {
            major: r.read_u16::<LE>()?,
            minor: r.read_u16::<LE>()?,
            patch: r.read_u16::<LE>()?,
            build: r.read_u32::<LE>()?,
            build_id: read_fstring(r, max_string_length)?,
        })
    }
    pub(crate) fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_u16::<LE>(self.major)?;
        w.write_u16::<LE>(self.minor)?;
        w.write_u16::<LE>(self.patch)?;
        w.write_u32::<LE>(self.build)?;
        write_fstring(w, self.build_id.as_ref())?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFormatData {
    pub id: FGuid,
    pub value: i32,
}

/// The custom version table from the file header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFormats {
    pub version: i32,
    pub entries: Vec<CustomFormatData>,
}

impl CustomFormats {
    #[instrument(name = "CustomFormats_read", skip_all)]
    pub(crate) fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let version = r.read_i32::<LE>()?;
        let count = r.read_u32::<LE>()?;
        let entries = (0..count)
            .map(|_| {
                Ok(CustomFormatData {
                    id: FGuid::read(r)?,
                    value: r.read_i32::<LE>()?,
                })
            })
            .collect::<Result<_>>()?;
        Ok(Self { version, entries })
    }
    pub(crate) fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<LE>(self.version)?;
        w.write_u32::<LE>(self.entries.len() as u32)?;
        for entry in &self.entries {
            entry.id.write(w)?;
            w.write_i32::<LE>(entry.value)?;
        }
        Ok(())
    }
}
