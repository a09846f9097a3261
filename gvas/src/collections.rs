//! Array, set and map payloads. Items carry no tag of their own.

use std::io::SeekFrom;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::{
    archive::{item_count, read_bytes, ArchiveReader, ArchiveWriter},
    fstring::read_fstring,
    property::{read_struct_item, Byte, PropertyHeader, NONE},
    Double, Error, FGuid, FString, Float, PackageVersion, Property, PropertyKind, Result,
    StructData, StructKind,
};

/// Bound on the strings peeked at when guessing the shape of an untyped map key.
const KEY_PEEK_MAX_STRING: usize = 1024;

/// Vectorized [`Byte`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteArray {
    Byte(Vec<u8>),
    Label(Vec<Option<FString>>),
}

/// Items of a simple kind, stored without the per-item variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueVec {
    Int(Vec<i32>),
    Int64(Vec<i64>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Float(Vec<Float>),
    Double(Vec<Double>),
    Bool(Vec<bool>),
    Byte(ByteArray),
    Enum(Vec<Option<FString>>),
    Str(Vec<Option<FString>>),
    Name(Vec<Option<FString>>),
    Object(Vec<Option<FString>>),
}

impl ValueVec {
    pub fn kind(&self) -> PropertyKind {
        match self {
            ValueVec::Int(_) => PropertyKind::Int,
            ValueVec::Int64(_) => PropertyKind::Int64,
            ValueVec::UInt32(_) => PropertyKind::UInt32,
            ValueVec::UInt64(_) => PropertyKind::UInt64,
            ValueVec::Float(_) => PropertyKind::Float,
            ValueVec::Double(_) => PropertyKind::Double,
            ValueVec::Bool(_) => PropertyKind::Bool,
            ValueVec::Byte(_) => PropertyKind::Byte,
            ValueVec::Enum(_) => PropertyKind::Enum,
            ValueVec::Str(_) => PropertyKind::Str,
            ValueVec::Name(_) => PropertyKind::Name,
            ValueVec::Object(_) => PropertyKind::Object,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ValueVec::Int(v) => v.len(),
            ValueVec::Int64(v) => v.len(),
            ValueVec::UInt32(v) => v.len(),
            ValueVec::UInt64(v) => v.len(),
            ValueVec::Float(v) => v.len(),
            ValueVec::Double(v) => v.len(),
            ValueVec::Bool(v) => v.len(),
            ValueVec::Byte(ByteArray::Byte(v)) => v.len(),
            ValueVec::Byte(ByteArray::Label(v)) => v.len(),
            ValueVec::Enum(v) | ValueVec::Str(v) | ValueVec::Name(v) | ValueVec::Object(v) => {
                v.len()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads `count` items taking up `data_size` bytes. Byte items are raw bytes when each one
    /// takes exactly a byte and enum labels otherwise.
    #[instrument(name = "ValueVec_read", skip_all)]
    fn read<A: ArchiveReader + ?Sized>(
        ar: &mut A,
        kind: PropertyKind,
        count: usize,
        data_size: i64,
    ) -> Result<Self> {
        fn items<A: ArchiveReader + ?Sized, T>(
            ar: &mut A,
            count: usize,
            f: impl Fn(&mut A) -> Result<T>,
        ) -> Result<Vec<T>> {
            (0..count).map(|_| f(ar)).collect()
        }
        Ok(match kind {
            PropertyKind::Int => ValueVec::Int(items(ar, count, |ar| Ok(ar.read_i32::<LE>()?))?),
            PropertyKind::Int64 => {
                ValueVec::Int64(items(ar, count, |ar| Ok(ar.read_i64::<LE>()?))?)
            }
            PropertyKind::UInt32 => {
                ValueVec::UInt32(items(ar, count, |ar| Ok(ar.read_u32::<LE>()?))?)
            }
            PropertyKind::UInt64 => {
                ValueVec::UInt64(items(ar, count, |ar| Ok(ar.read_u64::<LE>()?))?)
            }
            PropertyKind::Float => {
                ValueVec::Float(items(ar, count, |ar| Ok(ar.read_f32::<LE>()?.into()))?)
            }
            PropertyKind::Double => {
                ValueVec::Double(items(ar, count, |ar| Ok(ar.read_f64::<LE>()?.into()))?)
            }
            PropertyKind::Bool => ValueVec::Bool(items(ar, count, |ar| Ok(ar.read_u8()? != 0))?),
            PropertyKind::Byte if data_size == count as i64 => {
                ValueVec::Byte(ByteArray::Byte(read_bytes(ar, count)?))
            }
            PropertyKind::Byte => {
                ValueVec::Byte(ByteArray::Label(items(ar, count, |ar| ar.read_fstring())?))
            }
            PropertyKind::Enum => ValueVec::Enum(items(ar, count, |ar| ar.read_fstring())?),
            PropertyKind::Str => ValueVec::Str(items(ar, count, |ar| ar.read_fstring())?),
            PropertyKind::Name => ValueVec::Name(items(ar, count, |ar| ar.read_fstring())?),
            PropertyKind::Object => ValueVec::Object(items(ar, count, |ar| ar.read_fstring())?),
            other => {
                return Err(Error::Other(format!("{other} is not a simple property kind")))
            }
        })
    }

    fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        match self {
            ValueVec::Int(v) => v.iter().try_for_each(|i| ar.write_i32::<LE>(*i))?,
            ValueVec::Int64(v) => v.iter().try_for_each(|i| ar.write_i64::<LE>(*i))?,
            ValueVec::UInt32(v) => v.iter().try_for_each(|i| ar.write_u32::<LE>(*i))?,
            ValueVec::UInt64(v) => v.iter().try_for_each(|i| ar.write_u64::<LE>(*i))?,
            ValueVec::Float(v) => v.iter().try_for_each(|i| ar.write_f32::<LE>((*i).into()))?,
            ValueVec::Double(v) => v.iter().try_for_each(|i| ar.write_f64::<LE>((*i).into()))?,
            ValueVec::Bool(v) => v.iter().try_for_each(|i| ar.write_u8(*i as u8))?,
            ValueVec::Byte(ByteArray::Byte(v)) => ar.write_all(v)?,
            ValueVec::Byte(ByteArray::Label(v))
            | ValueVec::Enum(v)
            | ValueVec::Str(v)
            | ValueVec::Name(v)
            | ValueVec::Object(v) => {
                for item in v {
                    ar.write_fstring(item.as_ref())?;
                }
            }
        }
        Ok(())
    }
}

/// The items of an array or set property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyArray {
    /// Items of a simple kind.
    Simple(ValueVec),
    /// Struct items, which share one struct type and guid.
    Struct {
        struct_type: Option<FString>,
        guid: FGuid,
        items: Vec<StructData>,
    },
    /// Items of any other kind, each decoded without a header.
    Complex {
        item_kind: PropertyKind,
        items: Vec<Property>,
    },
}

impl Default for PropertyArray {
    fn default() -> Self {
        PropertyArray::Simple(ValueVec::Int(vec![]))
    }
}

impl PropertyArray {
    pub fn item_kind(&self) -> PropertyKind {
        match self {
            PropertyArray::Simple(values) => values.kind(),
            PropertyArray::Struct { .. } => PropertyKind::Struct,
            PropertyArray::Complex { item_kind, .. } => *item_kind,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PropertyArray::Simple(values) => values.len(),
            PropertyArray::Struct { items, .. } => items.len(),
            PropertyArray::Complex { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn item_header(&self) -> PropertyHeader {
        match self {
            PropertyArray::Struct {
                struct_type,
                guid,
                items,
            } => PropertyHeader::Struct {
                struct_type: struct_type.clone().or_else(|| {
                    items
                        .first()
                        .and_then(StructData::type_name)
                        .map(FString::new)
                }),
                guid: *guid,
            },
            other => PropertyHeader::from_item_kind(other.item_kind())
                .unwrap_or(PropertyHeader::Other(other.item_kind())),
        }
    }

    /// Reads `count` items occupying `data_size` bytes, for the array or set `name`.
    #[instrument(name = "PropertyArray_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader + ?Sized>(
        ar: &mut A,
        item: &PropertyHeader,
        name: &str,
        count: i32,
        data_size: i64,
    ) -> Result<Self> {
        let count = usize::try_from(count)
            .map_err(|_| Error::Other(format!("{name} has a negative item count {count}")))?;
        let kind = item.kind();
        if kind.is_container() {
            return Err(Error::NotSupported(format!("{kind} nested in {name}")));
        }
        if let PropertyHeader::Struct { struct_type, guid } = item {
            let (struct_type, guid) = if ar.version().complete_type_name() {
                (struct_type.clone(), *guid)
            } else if ar.version().array_inner_tags() {
                return read_prototyped_structs(ar, name, count);
            } else {
                (None, FGuid::nil())
            };
            let items = (0..count)
                .map(|_| read_struct_item(ar, struct_type.as_ref(), name))
                .collect::<Result<_>>()?;
            return Ok(PropertyArray::Struct {
                struct_type,
                guid,
                items,
            });
        }
        if kind.is_simple() {
            Ok(PropertyArray::Simple(ValueVec::read(
                ar, kind, count, data_size,
            )?))
        } else {
            let items = (0..count)
                .map(|_| Property::read_plain(ar, kind))
                .collect::<Result<_>>()?;
            Ok(PropertyArray::Complex {
                item_kind: kind,
                items,
            })
        }
    }

    /// Writes the items; the caller has already written the count.
    #[instrument(name = "PropertyArray_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A, name: &str) -> Result<()> {
        match self {
            PropertyArray::Simple(values) => values.write(ar)?,
            PropertyArray::Struct { guid, items, .. } => {
                let version = ar.version();
                if !version.complete_type_name() && version.array_inner_tags() {
                    write_prototyped_structs(ar, name, self.item_header(), guid, items)?;
                } else {
                    for item in items {
                        item.write(ar)?;
                    }
                }
            }
            PropertyArray::Complex { items, .. } => {
                for item in items {
                    item.write_plain(ar)?;
                }
            }
        }
        Ok(())
    }
}

/// Old layouts precede struct items with a single tag naming the struct type, whose size covers
/// all items.
fn write_prototyped_structs<A: ArchiveWriter + ?Sized>(
    ar: &mut A,
    name: &str,
    header: PropertyHeader,
    guid: &FGuid,
    items: &[StructData],
) -> Result<()> {
    let PropertyHeader::Struct {
        struct_type: Some(struct_type),
        ..
    } = header
    else {
        return Err(Error::Other(format!(
            "struct items of {name} need a struct type"
        )));
    };
    ar.write_string(&FString::new(name))?;
    ar.write_string(&FString::new(PropertyKind::Struct.type_name()))?;
    let size_offset = ar.stream_position()?;
    ar.write_i32::<LE>(0)?;
    ar.write_i32::<LE>(0)?;
    ar.write_string(&struct_type)?;
    guid.write(ar)?;
    if ar.version().property_guid_in_tag() {
        ar.write_u8(0)?;
    }
    let data_start = ar.stream_position()?;
    for item in items {
        item.write(ar)?;
    }
    let data_end = ar.stream_position()?;
    ar.seek(SeekFrom::Start(size_offset))?;
    ar.write_i32::<LE>(payload_size(name, data_end - data_start)?)?;
    ar.seek(SeekFrom::Start(data_end))?;
    Ok(())
}

pub(crate) fn payload_size(name: &str, size: u64) -> Result<i32> {
    i32::try_from(size).map_err(|_| Error::Other(format!("{name} is too large ({size} bytes)")))
}

#[instrument(skip_all)]
fn read_prototyped_structs<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    name: &str,
    count: usize,
) -> Result<PropertyArray> {
    ar.read_string()?;
    let type_name = ar.read_string()?;
    if type_name != PropertyKind::Struct.type_name() {
        return Err(Error::Other(format!(
            "struct items of {name} are described by a {type_name} tag"
        )));
    }
    let size = ar.read_i32::<LE>()?;
    ar.read_i32::<LE>()?;
    let struct_type = ar.read_string()?;
    let guid = FGuid::read(ar)?;
    if ar.version().property_guid_in_tag() && ar.read_u8()? != 0 {
        return Err(Error::NotSupported(format!(
            "property guid on the struct items of {name}"
        )));
    }
    let start = ar.stream_position()?;
    let items = (0..count)
        .map(|_| read_struct_item(ar, Some(&struct_type), name))
        .collect::<Result<_>>()?;
    let actual = ar.stream_position()? - start;
    if actual != size as u64 {
        return Err(Error::SizeMismatch {
            name: name.to_owned(),
            declared: size.into(),
            actual: actual as i64,
        });
    }
    Ok(PropertyArray::Struct {
        struct_type: Some(struct_type),
        guid,
        items,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Property,
    pub value: Property,
}

impl MapEntry {
    pub fn new(key: Property, value: Property) -> Self {
        Self { key, value }
    }
}

#[instrument(name = "Map_read", skip_all)]
pub(crate) fn read_map<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    key: &PropertyHeader,
    value: &PropertyHeader,
    name: &str,
) -> Result<Property> {
    let removed = ar.read_i32::<LE>()?;
    if removed != 0 {
        return Err(Error::NotSupported(format!(
            "map {name} removes {removed} entries"
        )));
    }
    let count = ar.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::Other(format!("{name} has a negative entry count {count}")));
    }
    let entries = (0..count)
        .map(|_| {
            Ok(MapEntry {
                key: read_map_item(ar, key, name, true)?,
                value: read_map_item(ar, value, name, false)?,
            })
        })
        .collect::<Result<_>>()?;
    Ok(Property::Map {
        key_type: key.kind(),
        value_type: value.kind(),
        entries,
    })
}

pub(crate) fn write_map<A: ArchiveWriter + ?Sized>(
    ar: &mut A,
    entries: &[MapEntry],
    name: &str,
) -> Result<()> {
    ar.write_i32::<LE>(0)?;
    ar.write_i32::<LE>(item_count(name, entries.len())?)?;
    for entry in entries {
        write_map_item(ar, &entry.key, name)?;
        write_map_item(ar, &entry.value, name)?;
    }
    Ok(())
}

/// Registry path under which untyped struct keys or values of map `name` are looked up.
fn map_item_path(name: &str, is_key: bool) -> String {
    format!("{name}.{}", if is_key { "Key" } else { "Value" })
}

/// Byte keys and values of maps are enum labels when an enum is named and in every old-layout
/// map, raw bytes otherwise.
fn map_byte_is_label(version: PackageVersion, enum_type: &Option<FString>) -> bool {
    enum_type.is_some() || !version.complete_type_name()
}

/// Everything before the first `:` of an `Enum::Value` label.
fn enum_type_of(label: &Option<FString>) -> Option<FString> {
    let label = label.as_ref()?;
    let (enum_type, _) = label.as_str().split_once(':')?;
    Some(FString::with_encoding(enum_type, label.encoding()))
}

fn read_map_item<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    header: &PropertyHeader,
    name: &str,
    is_key: bool,
) -> Result<Property> {
    Ok(match header {
        PropertyHeader::Bool(_) => Property::Bool(ar.read_u8()? != 0),
        PropertyHeader::Byte(enum_type) if map_byte_is_label(ar.version(), enum_type) => {
            let label = ar.read_fstring()?;
            Property::Byte {
                enum_type: enum_type.clone().or_else(|| enum_type_of(&label)),
                value: Byte::Label(label),
            }
        }
        PropertyHeader::Byte(_) => Property::Byte {
            enum_type: None,
            value: Byte::Byte(ar.read_u8()?),
        },
        PropertyHeader::Enum(enum_type) => {
            let value = ar.read_fstring()?;
            Property::Enum {
                enum_type: enum_type.clone().or_else(|| enum_type_of(&value)),
                value,
            }
        }
        PropertyHeader::Struct { struct_type, guid } => {
            let path = map_item_path(name, is_key);
            let value = match struct_type {
                Some(_) => read_struct_item(ar, struct_type.as_ref(), &path)?,
                None if is_key => read_untyped_key(ar, &path, name)?,
                None => read_struct_item(ar, None, &path)?,
            };
            Property::Struct {
                struct_type: struct_type.clone(),
                guid: *guid,
                value,
            }
        }
        PropertyHeader::Array(_) | PropertyHeader::Set(_) | PropertyHeader::Map { .. } => {
            return Err(Error::NotSupported(format!(
                "{} nested in map {name}",
                header.kind()
            )))
        }
        PropertyHeader::Other(kind) => Property::read_plain(ar, *kind)?,
    })
}

/// Old layouts do not name the struct type of map keys. A kind registered for `path` wins.
/// Otherwise a key that starts with a property tag (a name string followed by a `*Property` type
/// string) is a property list, anything else is taken to be a guid. Guid is the only native key
/// type seen in practice; other native key structs need a registration.
fn read_untyped_key<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    path: &str,
    name: &str,
) -> Result<StructData> {
    if let Some(kind) = ar.structs().resolve_property(path) {
        return kind.read(ar);
    }
    let start = ar.stream_position()?;
    let looks_like_tag = peek_tag(ar).unwrap_or(false);
    ar.seek(SeekFrom::Start(start))?;
    if looks_like_tag {
        Ok(StructData::Properties(crate::PropertyList::read(ar)?))
    } else {
        warn!("struct key type of map {name} is unknown, reading it as a guid");
        StructKind::Guid.read(ar)
    }
}

fn peek_tag<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<bool> {
    let Some(tag_name) = read_fstring(ar, KEY_PEEK_MAX_STRING)? else {
        return Ok(false);
    };
    if tag_name == NONE {
        return Ok(true);
    }
    Ok(read_fstring(ar, KEY_PEEK_MAX_STRING)?
        .is_some_and(|type_name| type_name.as_str().ends_with("Property")))
}

fn write_map_item<A: ArchiveWriter + ?Sized>(
    ar: &mut A,
    item: &Property,
    name: &str,
) -> Result<()> {
    match item {
        Property::Byte { enum_type, value } => {
            match (map_byte_is_label(ar.version(), enum_type), value) {
                (true, Byte::Label(label)) => ar.write_fstring(label.as_ref())?,
                (false, Byte::Byte(value)) => ar.write_u8(*value)?,
                (true, Byte::Byte(_)) => {
                    return Err(Error::Other(format!(
                        "map {name} holds a raw byte where this layout stores an enum label"
                    )))
                }
                (false, Byte::Label(_)) => {
                    return Err(Error::Other(format!(
                        "map {name} holds an enum label without an enum type"
                    )))
                }
            }
        }
        Property::Enum { value, .. } => ar.write_fstring(value.as_ref())?,
        Property::Struct { value, .. } => value.write(ar)?,
        Property::Array(_) | Property::Set(_) | Property::Map { .. } => {
            return Err(Error::NotSupported(format!(
                "{} nested in map {name}",
                item.kind()
            )))
        }
        other => other.write_plain(ar)?,
    }
    Ok(())
}
