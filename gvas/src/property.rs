//! Property values, their kinds, and the per-kind header codecs.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
    archive::{item_count, read_bytes, ArchiveReader, ArchiveWriter},
    collections::{read_map, write_map, MapEntry, PropertyArray},
    structs::struct_package,
    types::{read_delegates, write_delegates},
    Delegate, Double, EPropertyTagFlags, Error, FGuid, FPropertyTypeName, FString, Float,
    PropertyList, Result, SoftObjectPath, StructData, Text,
};

const CORE_UOBJECT: &str = "/Script/CoreUObject";

/// Every property type this crate can decode, named after the engine's `*Property` classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PropertyKind {
    Array,
    Bool,
    Byte,
    Double,
    Enum,
    Float,
    Int64,
    Int,
    Map,
    MulticastDelegate,
    MulticastInlineDelegate,
    Name,
    Object,
    Set,
    SoftObject,
    Str,
    Struct,
    Text,
    UInt32,
    UInt64,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 20] = [
        PropertyKind::Array,
        PropertyKind::Bool,
        PropertyKind::Byte,
        PropertyKind::Double,
        PropertyKind::Enum,
        PropertyKind::Float,
        PropertyKind::Int64,
        PropertyKind::Int,
        PropertyKind::Map,
        PropertyKind::MulticastDelegate,
        PropertyKind::MulticastInlineDelegate,
        PropertyKind::Name,
        PropertyKind::Object,
        PropertyKind::Set,
        PropertyKind::SoftObject,
        PropertyKind::Str,
        PropertyKind::Struct,
        PropertyKind::Text,
        PropertyKind::UInt32,
        PropertyKind::UInt64,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            PropertyKind::Array => "ArrayProperty",
            PropertyKind::Bool => "BoolProperty",
            PropertyKind::Byte => "ByteProperty",
            PropertyKind::Double => "DoubleProperty",
            PropertyKind::Enum => "EnumProperty",
            PropertyKind::Float => "FloatProperty",
            PropertyKind::Int64 => "Int64Property",
            PropertyKind::Int => "IntProperty",
            PropertyKind::Map => "MapProperty",
            PropertyKind::MulticastDelegate => "MulticastDelegateProperty",
            PropertyKind::MulticastInlineDelegate => "MulticastInlineDelegateProperty",
            PropertyKind::Name => "NameProperty",
            PropertyKind::Object => "ObjectProperty",
            PropertyKind::Set => "SetProperty",
            PropertyKind::SoftObject => "SoftObjectProperty",
            PropertyKind::Str => "StrProperty",
            PropertyKind::Struct => "StructProperty",
            PropertyKind::Text => "TextProperty",
            PropertyKind::UInt32 => "UInt32Property",
            PropertyKind::UInt64 => "UInt64Property",
        }
    }

    pub fn from_type_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
            .ok_or_else(|| Error::UnknownPropertyType(name.to_owned()))
    }

    /// Simple kinds hold one scalar or string; arrays of them are stored as flat value lists.
    pub fn is_simple(self) -> bool {
        matches!(
            self,
            PropertyKind::Bool
                | PropertyKind::Byte
                | PropertyKind::Double
                | PropertyKind::Enum
                | PropertyKind::Float
                | PropertyKind::Int
                | PropertyKind::Int64
                | PropertyKind::Name
                | PropertyKind::Object
                | PropertyKind::Str
                | PropertyKind::UInt32
                | PropertyKind::UInt64
        )
    }

    pub(crate) fn is_container(self) -> bool {
        matches!(
            self,
            PropertyKind::Array | PropertyKind::Set | PropertyKind::Map
        )
    }
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// The type facts that accompany a value: item types, struct and enum names, the bool value.
///
/// Old layouts store these in per-kind header fields after the tag; the complete type name
/// layout stores them as type name parameters. Both decode to the same header.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyHeader {
    Array(Box<PropertyHeader>),
    Set(Box<PropertyHeader>),
    Map {
        key: Box<PropertyHeader>,
        value: Box<PropertyHeader>,
    },
    Struct {
        struct_type: Option<FString>,
        guid: FGuid,
    },
    Byte(Option<FString>),
    Enum(Option<FString>),
    Bool(bool),
    Other(PropertyKind),
}

impl PropertyHeader {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyHeader::Array(_) => PropertyKind::Array,
            PropertyHeader::Set(_) => PropertyKind::Set,
            PropertyHeader::Map { .. } => PropertyKind::Map,
            PropertyHeader::Struct { .. } => PropertyKind::Struct,
            PropertyHeader::Byte(_) => PropertyKind::Byte,
            PropertyHeader::Enum(_) => PropertyKind::Enum,
            PropertyHeader::Bool(_) => PropertyKind::Bool,
            PropertyHeader::Other(kind) => *kind,
        }
    }

    /// Header for a collection item known only by its kind, as in old-layout array headers.
    pub(crate) fn from_item_kind(kind: PropertyKind) -> Result<Self> {
        Ok(match kind {
            PropertyKind::Array | PropertyKind::Set | PropertyKind::Map => {
                return Err(Error::NotSupported(format!("{kind} nested in a container")))
            }
            PropertyKind::Struct => PropertyHeader::Struct {
                struct_type: None,
                guid: FGuid::nil(),
            },
            PropertyKind::Byte => PropertyHeader::Byte(None),
            PropertyKind::Enum => PropertyHeader::Enum(None),
            PropertyKind::Bool => PropertyHeader::Bool(false),
            other => PropertyHeader::Other(other),
        })
    }

    /// Derives the header from a complete type name.
    pub fn from_type_name(type_name: &FPropertyTypeName) -> Result<Self> {
        let kind = PropertyKind::from_type_name(type_name.name.as_str())?;
        let parameter = |index: usize| {
            type_name.parameter(index).ok_or_else(|| {
                Error::Other(format!("type name {type_name} lacks parameter {index}"))
            })
        };
        Ok(match kind {
            PropertyKind::Array => {
                PropertyHeader::Array(Box::new(Self::from_type_name(parameter(0)?)?))
            }
            PropertyKind::Set => {
                PropertyHeader::Set(Box::new(Self::from_type_name(parameter(0)?)?))
            }
            PropertyKind::Map => PropertyHeader::Map {
                key: Box::new(Self::from_type_name(parameter(0)?)?),
                value: Box::new(Self::from_type_name(parameter(1)?)?),
            },
            PropertyKind::Struct => PropertyHeader::Struct {
                struct_type: Some(parameter(0)?.name.clone()),
                guid: match type_name.parameter(1) {
                    Some(guid) => FGuid::parse_str(guid.name.as_str())?,
                    None => FGuid::nil(),
                },
            },
            PropertyKind::Byte => {
                PropertyHeader::Byte(type_name.parameter(0).map(|p| p.name.clone()))
            }
            PropertyKind::Enum => {
                PropertyHeader::Enum(type_name.parameter(0).map(|p| p.name.clone()))
            }
            PropertyKind::Bool => PropertyHeader::Bool(false),
            other => PropertyHeader::Other(other),
        })
    }

    /// Synthesizes the complete type name for this header.
    pub fn to_type_name(&self) -> Result<FPropertyTypeName> {
        let kind = self.kind().type_name();
        Ok(match self {
            PropertyHeader::Array(item) | PropertyHeader::Set(item) => {
                FPropertyTypeName::with_parameters(kind, vec![item.to_type_name()?])
            }
            PropertyHeader::Map { key, value } => FPropertyTypeName::with_parameters(
                kind,
                vec![key.to_type_name()?, value.to_type_name()?],
            ),
            PropertyHeader::Struct { struct_type, guid } => {
                let struct_type = struct_type.as_ref().ok_or_else(|| {
                    Error::Other("cannot name a StructProperty without a struct type".into())
                })?;
                let mut parameters = vec![FPropertyTypeName::with_parameters(
                    struct_type.clone(),
                    vec![FPropertyTypeName::new(struct_package(struct_type.as_str()))],
                )];
                if !guid.is_nil() {
                    parameters.push(FPropertyTypeName::new(guid.to_string()));
                }
                FPropertyTypeName::with_parameters(kind, parameters)
            }
            PropertyHeader::Byte(Some(enum_type)) => FPropertyTypeName::with_parameters(
                kind,
                vec![enum_parameter(enum_type)],
            ),
            PropertyHeader::Enum(Some(enum_type)) => FPropertyTypeName::with_parameters(
                kind,
                vec![
                    enum_parameter(enum_type),
                    FPropertyTypeName::new(PropertyKind::Byte.type_name()),
                ],
            ),
            _ => FPropertyTypeName::new(kind),
        })
    }

    /// Whether `other` describes the same type. Missing struct and enum names match anything.
    pub fn same_shape(&self, other: &PropertyHeader) -> bool {
        fn names_match(a: &Option<FString>, b: &Option<FString>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }
        match (self, other) {
            (PropertyHeader::Array(a), PropertyHeader::Array(b))
            | (PropertyHeader::Set(a), PropertyHeader::Set(b)) => a.same_shape(b),
            (
                PropertyHeader::Map { key, value },
                PropertyHeader::Map {
                    key: other_key,
                    value: other_value,
                },
            ) => key.same_shape(other_key) && value.same_shape(other_value),
            (
                PropertyHeader::Struct { struct_type, .. },
                PropertyHeader::Struct {
                    struct_type: other, ..
                },
            ) => names_match(struct_type, other),
            (PropertyHeader::Byte(a), PropertyHeader::Byte(b))
            | (PropertyHeader::Enum(a), PropertyHeader::Enum(b)) => names_match(a, b),
            (PropertyHeader::Bool(_), PropertyHeader::Bool(_)) => true,
            (PropertyHeader::Other(a), PropertyHeader::Other(b)) => a == b,
            _ => false,
        }
    }

    /// Reads the old-layout header fields that follow the tag's size and array index.
    #[instrument(name = "PropertyHeader_read", skip_all)]
    pub fn read_header<A: ArchiveReader + ?Sized>(ar: &mut A, kind: PropertyKind) -> Result<Self> {
        Ok(match kind {
            PropertyKind::Bool => PropertyHeader::Bool(ar.read_u8()? != 0),
            PropertyKind::Byte => PropertyHeader::Byte(read_enum_name(ar)?),
            PropertyKind::Enum => PropertyHeader::Enum(read_enum_name(ar)?),
            PropertyKind::Array => PropertyHeader::Array(Box::new(read_item_header(ar)?)),
            PropertyKind::Set => PropertyHeader::Set(Box::new(read_item_header(ar)?)),
            PropertyKind::Map => PropertyHeader::Map {
                key: Box::new(read_item_header(ar)?),
                value: Box::new(read_item_header(ar)?),
            },
            PropertyKind::Struct => PropertyHeader::Struct {
                struct_type: Some(ar.read_string()?),
                guid: FGuid::read(ar)?,
            },
            other => PropertyHeader::Other(other),
        })
    }

    #[instrument(name = "PropertyHeader_write", skip_all)]
    pub fn write_header<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        match self {
            PropertyHeader::Bool(value) => ar.write_u8(*value as u8)?,
            PropertyHeader::Byte(name) | PropertyHeader::Enum(name) => {
                ar.write_string(name.as_ref().unwrap_or(&FString::new(NONE)))?
            }
            PropertyHeader::Array(item) | PropertyHeader::Set(item) => {
                ar.write_string(&FString::new(item.kind().type_name()))?
            }
            PropertyHeader::Map { key, value } => {
                ar.write_string(&FString::new(key.kind().type_name()))?;
                ar.write_string(&FString::new(value.kind().type_name()))?;
            }
            PropertyHeader::Struct { struct_type, guid } => {
                let struct_type = struct_type.as_ref().ok_or_else(|| {
                    Error::Other("cannot write a StructProperty without a struct type".into())
                })?;
                ar.write_string(struct_type)?;
                guid.write(ar)?;
            }
            PropertyHeader::Other(_) => {}
        }
        Ok(())
    }
}

pub(crate) const NONE: &str = "None";

fn enum_parameter(enum_type: &FString) -> FPropertyTypeName {
    FPropertyTypeName::with_parameters(
        enum_type.clone(),
        vec![FPropertyTypeName::new(CORE_UOBJECT)],
    )
}

fn read_enum_name<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Option<FString>> {
    let name = ar.read_string()?;
    Ok((name != NONE).then_some(name))
}

fn read_item_header<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<PropertyHeader> {
    let name = ar.read_string()?;
    PropertyHeader::from_item_kind(PropertyKind::from_type_name(name.as_str())?)
}

/// Just a plain byte, or an enum in which case the variant is its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Byte {
    Byte(u8),
    Label(Option<FString>),
}

/// What the surrounding tag tells a value decoder.
#[derive(Debug, Clone, Copy)]
pub struct ValueContext<'a> {
    /// Name of the property, used for struct lookups by property name.
    pub name: &'a str,
    /// Declared payload size.
    pub size: i32,
    pub flags: EPropertyTagFlags,
}

/// A property value. Each variant carries everything needed to re-encode it except the tag's
/// name, array index and exact stored type name, which live in [`crate::FPropertyTag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    Array(PropertyArray),
    Bool(bool),
    Byte {
        enum_type: Option<FString>,
        value: Byte,
    },
    Double(Double),
    Enum {
        enum_type: Option<FString>,
        value: Option<FString>,
    },
    Float(Float),
    Int64(i64),
    Int(i32),
    Map {
        key_type: PropertyKind,
        value_type: PropertyKind,
        entries: Vec<MapEntry>,
    },
    MulticastDelegate(Vec<Delegate>),
    MulticastInlineDelegate(Vec<Delegate>),
    Name(Option<FString>),
    Object(Option<FString>),
    Set(PropertyArray),
    SoftObject(SoftObjectPath),
    Str(Option<FString>),
    Struct {
        struct_type: Option<FString>,
        guid: FGuid,
        value: StructData,
    },
    Text(Text),
    UInt32(u32),
    UInt64(u64),
}

impl Property {
    /// A default value of the given kind.
    pub fn empty(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Array => Property::Array(PropertyArray::default()),
            PropertyKind::Bool => Property::Bool(false),
            PropertyKind::Byte => Property::Byte {
                enum_type: None,
                value: Byte::Byte(0),
            },
            PropertyKind::Double => Property::Double(Double::default()),
            PropertyKind::Enum => Property::Enum {
                enum_type: None,
                value: None,
            },
            PropertyKind::Float => Property::Float(Float::default()),
            PropertyKind::Int64 => Property::Int64(0),
            PropertyKind::Int => Property::Int(0),
            PropertyKind::Map => Property::Map {
                key_type: PropertyKind::Str,
                value_type: PropertyKind::Str,
                entries: vec![],
            },
            PropertyKind::MulticastDelegate => Property::MulticastDelegate(vec![]),
            PropertyKind::MulticastInlineDelegate => Property::MulticastInlineDelegate(vec![]),
            PropertyKind::Name => Property::Name(None),
            PropertyKind::Object => Property::Object(None),
            PropertyKind::Set => Property::Set(PropertyArray::default()),
            PropertyKind::SoftObject => Property::SoftObject(SoftObjectPath::default()),
            PropertyKind::Str => Property::Str(None),
            PropertyKind::Struct => Property::Struct {
                struct_type: None,
                guid: FGuid::nil(),
                value: StructData::Properties(PropertyList::default()),
            },
            PropertyKind::Text => Property::Text(Text::base(None, None, None)),
            PropertyKind::UInt32 => Property::UInt32(0),
            PropertyKind::UInt64 => Property::UInt64(0),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Property::Array(_) => PropertyKind::Array,
            Property::Bool(_) => PropertyKind::Bool,
            Property::Byte { .. } => PropertyKind::Byte,
            Property::Double(_) => PropertyKind::Double,
            Property::Enum { .. } => PropertyKind::Enum,
            Property::Float(_) => PropertyKind::Float,
            Property::Int64(_) => PropertyKind::Int64,
            Property::Int(_) => PropertyKind::Int,
            Property::Map { .. } => PropertyKind::Map,
            Property::MulticastDelegate(_) => PropertyKind::MulticastDelegate,
            Property::MulticastInlineDelegate(_) => PropertyKind::MulticastInlineDelegate,
            Property::Name(_) => PropertyKind::Name,
            Property::Object(_) => PropertyKind::Object,
            Property::Set(_) => PropertyKind::Set,
            Property::SoftObject(_) => PropertyKind::SoftObject,
            Property::Str(_) => PropertyKind::Str,
            Property::Struct { .. } => PropertyKind::Struct,
            Property::Text(_) => PropertyKind::Text,
            Property::UInt32(_) => PropertyKind::UInt32,
            Property::UInt64(_) => PropertyKind::UInt64,
        }
    }

    pub fn is_simple(&self) -> bool {
        self.kind().is_simple()
    }

    /// The header describing this value, with struct names taken from the payload where the
    /// value itself does not record one.
    pub fn header(&self) -> PropertyHeader {
        match self {
            Property::Array(array) => PropertyHeader::Array(Box::new(array.item_header())),
            Property::Set(array) => PropertyHeader::Set(Box::new(array.item_header())),
            Property::Map {
                key_type,
                value_type,
                entries,
            } => {
                let first = entries.first();
                PropertyHeader::Map {
                    key: Box::new(item_header(*key_type, first.map(|e| &e.key))),
                    value: Box::new(item_header(*value_type, first.map(|e| &e.value))),
                }
            }
            Property::Struct {
                struct_type,
                guid,
                value,
            } => PropertyHeader::Struct {
                struct_type: struct_type
                    .clone()
                    .or_else(|| value.type_name().map(FString::new)),
                guid: *guid,
            },
            Property::Byte { enum_type, .. } => PropertyHeader::Byte(enum_type.clone()),
            Property::Enum { enum_type, .. } => PropertyHeader::Enum(enum_type.clone()),
            Property::Bool(value) => PropertyHeader::Bool(*value),
            other => PropertyHeader::Other(other.kind()),
        }
    }

    /// The complete type name for this value, as written by the newest layout.
    pub fn type_name(&self) -> Result<FPropertyTypeName> {
        self.header().to_type_name()
    }

    /// Decodes the payload of a top-level property described by `header`.
    #[instrument(name = "Property_read", skip_all, fields(property = ctx.name))]
    pub fn read_value<A: ArchiveReader + ?Sized>(
        ar: &mut A,
        header: &PropertyHeader,
        ctx: ValueContext,
    ) -> Result<Self> {
        Ok(match header {
            PropertyHeader::Bool(value) => Property::Bool(*value),
            PropertyHeader::Byte(enum_type) => Property::Byte {
                enum_type: enum_type.clone(),
                value: if ctx.size == 1 {
                    Byte::Byte(ar.read_u8()?)
                } else {
                    Byte::Label(ar.read_fstring()?)
                },
            },
            PropertyHeader::Enum(enum_type) => Property::Enum {
                enum_type: enum_type.clone(),
                value: ar.read_fstring()?,
            },
            PropertyHeader::Struct { struct_type, guid } => Property::Struct {
                struct_type: struct_type.clone(),
                guid: *guid,
                value: read_struct_value(ar, struct_type.as_ref(), ctx)?,
            },
            PropertyHeader::Array(item) => {
                let count = ar.read_i32::<LE>()?;
                Property::Array(PropertyArray::read(
                    ar,
                    item,
                    ctx.name,
                    count,
                    i64::from(ctx.size) - 4,
                )?)
            }
            PropertyHeader::Set(item) => {
                let removed = ar.read_i32::<LE>()?;
                if removed != 0 {
                    return Err(Error::NotSupported(format!(
                        "set {} removes {removed} items",
                        ctx.name
                    )));
                }
                let count = ar.read_i32::<LE>()?;
                Property::Set(PropertyArray::read(
                    ar,
                    item,
                    ctx.name,
                    count,
                    i64::from(ctx.size) - 8,
                )?)
            }
            PropertyHeader::Map { key, value } => read_map(ar, key, value, ctx.name)?,
            PropertyHeader::Other(kind) => Self::read_plain(ar, *kind)?,
        })
    }

    /// Encodes the payload of a top-level property.
    #[instrument(name = "Property_write", skip_all, fields(property = name))]
    pub fn write_value<A: ArchiveWriter + ?Sized>(&self, ar: &mut A, name: &str) -> Result<()> {
        match self {
            Property::Bool(_) => {}
            Property::Byte { value, .. } => match value {
                Byte::Byte(value) => ar.write_u8(*value)?,
                Byte::Label(label) => ar.write_fstring(label.as_ref())?,
            },
            Property::Enum { value, .. } => ar.write_fstring(value.as_ref())?,
            Property::Struct { value, .. } => value.write(ar)?,
            Property::Array(array) => {
                ar.write_i32::<LE>(item_count(name, array.len())?)?;
                array.write(ar, name)?;
            }
            Property::Set(array) => {
                ar.write_i32::<LE>(0)?;
                ar.write_i32::<LE>(item_count(name, array.len())?)?;
                array.write(ar, name)?;
            }
            Property::Map { entries, .. } => write_map(ar, entries, name)?,
            other => other.write_plain(ar)?,
        }
        Ok(())
    }

    /// Reads a value whose encoding does not depend on any header fields.
    pub(crate) fn read_plain<A: ArchiveReader + ?Sized>(
        ar: &mut A,
        kind: PropertyKind,
    ) -> Result<Self> {
        Ok(match kind {
            PropertyKind::Bool => Property::Bool(ar.read_u8()? != 0),
            PropertyKind::Double => Property::Double(ar.read_f64::<LE>()?.into()),
            PropertyKind::Float => Property::Float(ar.read_f32::<LE>()?.into()),
            PropertyKind::Int64 => Property::Int64(ar.read_i64::<LE>()?),
            PropertyKind::Int => Property::Int(ar.read_i32::<LE>()?),
            PropertyKind::UInt32 => Property::UInt32(ar.read_u32::<LE>()?),
            PropertyKind::UInt64 => Property::UInt64(ar.read_u64::<LE>()?),
            PropertyKind::Name => Property::Name(ar.read_fstring()?),
            PropertyKind::Object => Property::Object(ar.read_fstring()?),
            PropertyKind::Str => Property::Str(ar.read_fstring()?),
            PropertyKind::SoftObject => Property::SoftObject(SoftObjectPath::read(ar)?),
            PropertyKind::Text => Property::Text(Text::read(ar)?),
            PropertyKind::MulticastDelegate => Property::MulticastDelegate(read_delegates(ar)?),
            PropertyKind::MulticastInlineDelegate => {
                Property::MulticastInlineDelegate(read_delegates(ar)?)
            }
            other => {
                return Err(Error::NotSupported(format!(
                    "{other} cannot be read without its header"
                )))
            }
        })
    }

    pub(crate) fn write_plain<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        match self {
            Property::Bool(value) => ar.write_u8(*value as u8)?,
            Property::Double(value) => ar.write_f64::<LE>((*value).into())?,
            Property::Float(value) => ar.write_f32::<LE>((*value).into())?,
            Property::Int64(value) => ar.write_i64::<LE>(*value)?,
            Property::Int(value) => ar.write_i32::<LE>(*value)?,
            Property::UInt32(value) => ar.write_u32::<LE>(*value)?,
            Property::UInt64(value) => ar.write_u64::<LE>(*value)?,
            Property::Name(value) | Property::Object(value) | Property::Str(value) => {
                ar.write_fstring(value.as_ref())?
            }
            Property::SoftObject(value) => value.write(ar)?,
            Property::Text(value) => value.write(ar)?,
            Property::MulticastDelegate(value) | Property::MulticastInlineDelegate(value) => {
                write_delegates(ar, value)?
            }
            other => {
                return Err(Error::NotSupported(format!(
                    "{} cannot be written without its header",
                    other.kind()
                )))
            }
        }
        Ok(())
    }
}

/// Header for a map key or value, filling in names from a sample entry when there is one.
fn item_header(kind: PropertyKind, sample: Option<&Property>) -> PropertyHeader {
    match sample {
        Some(sample) if sample.kind() == kind => match sample.header() {
            PropertyHeader::Bool(_) => PropertyHeader::Bool(false),
            header => header,
        },
        _ => PropertyHeader::from_item_kind(kind).unwrap_or(PropertyHeader::Other(kind)),
    }
}

/// Picks the decoder for a top-level struct payload.
fn read_struct_value<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    struct_type: Option<&FString>,
    ctx: ValueContext,
) -> Result<StructData> {
    if ctx.name == "FGuid" {
        return Ok(StructData::Guid(FGuid::read(ar)?));
    }
    if ctx.size == 0 {
        return Ok(StructData::Raw(vec![]));
    }
    let kind = match struct_type {
        Some(struct_type) => ar.structs().resolve_type(struct_type.as_str()),
        None => {
            let kind = ar.structs().resolve_property(ctx.name);
            if let Some(kind) = kind {
                debug!("struct kind for {} resolved by property name: {kind:?}", ctx.name);
            }
            kind
        }
    };
    match kind {
        Some(kind) => kind.read(ar),
        None if ctx.flags.contains(EPropertyTagFlags::HasBinaryOrNativeSerialize) => {
            debug!(
                "keeping natively serialized struct {:?} ({} bytes) as raw data",
                struct_type.map(FString::as_str),
                ctx.size
            );
            Ok(StructData::Raw(read_bytes(ar, ctx.size.max(0) as usize)?))
        }
        None => Ok(StructData::Properties(PropertyList::read(ar)?)),
    }
}

/// Picks the decoder for a struct stored inside a collection, where no size is available.
pub(crate) fn read_struct_item<A: ArchiveReader + ?Sized>(
    ar: &mut A,
    struct_type: Option<&FString>,
    property_name: &str,
) -> Result<StructData> {
    let kind = match struct_type {
        Some(struct_type) => ar.structs().resolve_type(struct_type.as_str()),
        None => ar.structs().resolve_property(property_name),
    };
    match kind {
        Some(kind) => kind.read(ar),
        None => Ok(StructData::Properties(PropertyList::read(ar)?)),
    }
}
