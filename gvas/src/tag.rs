//! The tag envelope around every top-level property, and `None`-terminated property lists.

use std::io::SeekFrom;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use indexmap::IndexMap;
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use tracing::instrument;

use crate::{
    archive::{nested, ArchiveReader, ArchiveWriter},
    collections::payload_size,
    property::NONE,
    Error, FGuid, FPropertyTypeName, FString, Property, PropertyHeader, PropertyKind, Result,
    StructData, ValueContext,
};

bitflags::bitflags! {
    /// Flags byte of complete type name tags.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EPropertyTagFlags: u8 {
        const HasArrayIndex = 0x01;
        const HasPropertyGuid = 0x02;
        const HasPropertyExtensions = 0x04;
        const HasBinaryOrNativeSerialize = 0x08;
        const BoolTrue = 0x10;
        const SkippedSerialize = 0x20;
    }
}

/// A named property with its type, tag metadata and value.
///
/// Equality compares the logical property (name, array index, property guid and value). The
/// stored type name, size and flags depend on the layout the tag was read from and are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FPropertyTag {
    pub name: FString,
    /// The type as stored. Old layouts only store the outer name.
    pub type_name: FPropertyTypeName,
    /// Payload size as read. Recomputed on write.
    pub size: i32,
    pub array_index: i32,
    pub flags: EPropertyTagFlags,
    /// Property guid of old layouts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_guid: Option<FGuid>,
    pub value: Property,
}

impl FPropertyTag {
    /// A tag for a value built in code. Fails for struct values whose type cannot be named.
    pub fn new(name: impl Into<FString>, value: Property) -> Result<Self> {
        let type_name = value.type_name()?;
        let mut flags = EPropertyTagFlags::empty();
        if let Property::Struct { value: data, .. } = &value {
            if data.is_native() {
                flags |= EPropertyTagFlags::HasBinaryOrNativeSerialize;
            }
        }
        Ok(Self {
            name: name.into(),
            type_name,
            size: 0,
            array_index: 0,
            flags,
            property_guid: None,
            value,
        })
    }

    pub fn with_array_index(mut self, array_index: i32) -> Self {
        self.array_index = array_index;
        self
    }

    pub fn key(&self) -> PropertyKey {
        PropertyKey(self.array_index, self.name.to_string())
    }

    /// Reads one tag and its value. Returns `None` at the terminating `None` tag.
    #[instrument(name = "FPropertyTag_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Option<Self>> {
        let name = ar.read_string()?;
        if name == NONE {
            return Ok(None);
        }
        let type_name = FPropertyTypeName::read(ar)?;
        let size = ar.read_i32::<LE>()?;

        let (header, array_index, flags, property_guid) = if ar.version().complete_type_name() {
            let mut header = PropertyHeader::from_type_name(&type_name)?;
            let bits = ar.read_u8()?;
            let flags = EPropertyTagFlags::from_bits(bits)
                .ok_or_else(|| Error::Other(format!("unknown property tag flags {bits:#04x}")))?;
            check_flags(flags, &name)?;
            let array_index = if flags.contains(EPropertyTagFlags::HasArrayIndex) {
                ar.read_i32::<LE>()?
            } else {
                0
            };
            if let PropertyHeader::Bool(value) = &mut header {
                *value = flags.contains(EPropertyTagFlags::BoolTrue);
            }
            (header, array_index, flags, None)
        } else {
            let kind = PropertyKind::from_type_name(type_name.name.as_str())?;
            let array_index = ar.read_i32::<LE>()?;
            let header = PropertyHeader::read_header(ar, kind)?;
            let property_guid = if ar.version().property_guid_in_tag() && ar.read_u8()? != 0 {
                Some(FGuid::read(ar)?)
            } else {
                None
            };
            (header, array_index, EPropertyTagFlags::empty(), property_guid)
        };

        let start = ar.stream_position()?;
        let ctx = ValueContext {
            name: name.as_str(),
            size,
            flags,
        };
        let value = Property::read_value(ar, &header, ctx)?;
        let actual = (ar.stream_position()? - start) as i64;
        if actual != i64::from(size) {
            return Err(Error::SizeMismatch {
                name: name.into_string(),
                declared: size.into(),
                actual,
            });
        }

        Ok(Some(Self {
            name,
            type_name,
            size,
            array_index,
            flags,
            property_guid,
            value,
        }))
    }

    /// Writes the tag with a placeholder size, then the value, then patches the size.
    #[instrument(name = "FPropertyTag_write", skip_all)]
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_string(&self.name)?;
        self.type_name.write(ar)?;
        let size_offset = ar.stream_position()?;
        ar.write_i32::<LE>(0)?;

        if ar.version().complete_type_name() {
            let header = PropertyHeader::from_type_name(&self.type_name)?;
            if !header.same_shape(&self.value.header()) {
                return Err(self.type_mismatch());
            }
            let mut flags = self.flags;
            flags.set(
                EPropertyTagFlags::BoolTrue,
                matches!(self.value, Property::Bool(true)),
            );
            if self.array_index != 0 {
                flags |= EPropertyTagFlags::HasArrayIndex;
            }
            check_flags(flags, &self.name)?;
            ar.write_u8(flags.bits())?;
            if flags.contains(EPropertyTagFlags::HasArrayIndex) {
                ar.write_i32::<LE>(self.array_index)?;
            }
        } else {
            if PropertyKind::from_type_name(self.type_name.name.as_str())? != self.value.kind() {
                return Err(self.type_mismatch());
            }
            ar.write_i32::<LE>(self.array_index)?;
            self.value.header().write_header(ar)?;
            if ar.version().property_guid_in_tag() {
                match &self.property_guid {
                    Some(guid) => {
                        ar.write_u8(1)?;
                        guid.write(ar)?;
                    }
                    None => ar.write_u8(0)?,
                }
            }
        }

        let data_start = ar.stream_position()?;
        self.value.write_value(ar, self.name.as_str())?;
        let data_end = ar.stream_position()?;
        ar.seek(SeekFrom::Start(size_offset))?;
        ar.write_i32::<LE>(payload_size(self.name.as_str(), data_end - data_start)?)?;
        ar.seek(SeekFrom::Start(data_end))?;
        Ok(())
    }

    fn type_mismatch(&self) -> Error {
        Error::Other(format!(
            "{} holds a {} value but is typed {}",
            self.name,
            self.value.kind(),
            self.type_name
        ))
    }
}

impl PartialEq for FPropertyTag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.array_index == other.array_index
            && self.property_guid == other.property_guid
            && self.value == other.value
    }
}

fn check_flags(flags: EPropertyTagFlags, name: &FString) -> Result<()> {
    if flags.contains(EPropertyTagFlags::HasPropertyGuid) {
        return Err(Error::NotSupported(format!("property guid on {name}")));
    }
    if flags.contains(EPropertyTagFlags::HasPropertyExtensions) {
        return Err(Error::NotSupported(format!("property extensions on {name}")));
    }
    Ok(())
}

/// Identifies a property within a list by name and array index. Serialized as `name_index`.
#[derive(Debug, Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyKey(pub i32, pub String);

impl From<String> for PropertyKey {
    fn from(value: String) -> Self {
        Self(0, value)
    }
}
impl From<&str> for PropertyKey {
    fn from(value: &str) -> Self {
        Self(0, value.to_owned())
    }
}
impl From<(&str, i32)> for PropertyKey {
    fn from((name, index): (&str, i32)) -> Self {
        Self(index, name.to_owned())
    }
}

struct PropertyKeyVisitor;
impl Visitor<'_> for PropertyKeyVisitor {
    type Value = PropertyKey;
    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a property name and array index joined by '_', e.g. Score_0")
    }
    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        let (name, index) = value
            .rsplit_once('_')
            .ok_or_else(|| E::custom("property key does not contain a '_'"))?;
        let index = index.parse().map_err(E::custom)?;
        Ok(PropertyKey(index, name.to_owned()))
    }
}
impl<'de> Deserialize<'de> for PropertyKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(PropertyKeyVisitor)
    }
}
impl Serialize for PropertyKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}_{}", self.1, self.0))
    }
}

/// Properties in stream order, keyed by name and array index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyList(pub IndexMap<PropertyKey, FPropertyTag>);

impl PropertyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads tags up to and including the `None` terminator.
    #[instrument(name = "PropertyList_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        nested(ar, |ar| {
            let mut properties = Self::default();
            while let Some(tag) = FPropertyTag::read(ar)? {
                let key = tag.key();
                if properties.0.insert(key.clone(), tag).is_some() {
                    return Err(Error::Other(format!(
                        "property {}[{}] appears twice",
                        key.1, key.0
                    )));
                }
            }
            Ok(properties)
        })
    }

    #[instrument(name = "PropertyList_write", skip_all)]
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        for tag in self.0.values() {
            tag.write(ar)?;
        }
        ar.write_string(&FString::new(NONE))?;
        Ok(())
    }

    /// Appends a tag, replacing any tag with the same name and array index in place.
    pub fn push(&mut self, tag: FPropertyTag) -> Option<FPropertyTag> {
        self.0.insert(tag.key(), tag)
    }

    /// Builds a tag for `value` and appends it.
    pub fn insert(&mut self, name: &str, value: Property) -> Result<Option<FPropertyTag>> {
        Ok(self.push(FPropertyTag::new(name, value)?))
    }

    pub fn get(&self, key: impl Into<PropertyKey>) -> Option<&FPropertyTag> {
        self.0.get(&key.into())
    }

    pub fn get_mut(&mut self, key: impl Into<PropertyKey>) -> Option<&mut FPropertyTag> {
        self.0.get_mut(&key.into())
    }

    /// Removes a tag, keeping the order of the rest.
    pub fn remove(&mut self, key: impl Into<PropertyKey>) -> Option<FPropertyTag> {
        self.0.shift_remove(&key.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &FPropertyTag> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The struct payload of a struct property, if `key` names one.
    pub fn struct_data(&self, key: impl Into<PropertyKey>) -> Option<&StructData> {
        match self.get(key).map(|tag| &tag.value) {
            Some(Property::Struct { value, .. }) => Some(value),
            _ => None,
        }
    }
}

impl<K> std::ops::Index<K> for PropertyList
where
    K: Into<PropertyKey>,
{
    type Output = Property;
    fn index(&self, index: K) -> &Self::Output {
        &self.0[&index.into()].value
    }
}
impl<K> std::ops::IndexMut<K> for PropertyList
where
    K: Into<PropertyKey>,
{
    fn index_mut(&mut self, index: K) -> &mut Property {
        &mut self.0[&index.into()].value
    }
}
impl<'a> IntoIterator for &'a PropertyList {
    type Item = &'a FPropertyTag;
    type IntoIter = indexmap::map::Values<'a, PropertyKey, FPropertyTag>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.values()
    }
}
