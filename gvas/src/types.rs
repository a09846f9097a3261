//! Plain data shapes shared by struct payloads and property values.

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use tracing::instrument;

use crate::{
    archive::{item_count, ArchiveReader, ArchiveWriter},
    Error, FString, FStringEncoding, Result,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FGuid {
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl FGuid {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }
    pub fn nil() -> Self {
        Self::default()
    }
    pub fn is_nil(&self) -> bool {
        *self == Self::nil()
    }
    /// Parses 32 hex digits, with or without hyphens.
    pub fn parse_str(s: &str) -> Result<Self> {
        let s = s.replace('-', "");
        if s.len() != 32 || !s.is_ascii() {
            return Err(Error::Other(format!("invalid GUID string {s:?}")));
        }
        let part = |i: usize| {
            u32::from_str_radix(&s[i * 8..i * 8 + 8], 16)
                .map_err(|_| Error::Other(format!("invalid hex in GUID {s:?}")))
        };
        Ok(Self {
            a: part(0)?,
            b: part(1)?,
            c: part(2)?,
            d: part(3)?,
        })
    }
    #[instrument(name = "FGuid_read", skip_all)]
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            a: r.read_u32::<LE>()?,
            b: r.read_u32::<LE>()?,
            c: r.read_u32::<LE>()?,
            d: r.read_u32::<LE>()?,
        })
    }
    #[instrument(name = "FGuid_write", skip_all)]
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_u32::<LE>(self.a)?;
        w.write_u32::<LE>(self.b)?;
        w.write_u32::<LE>(self.c)?;
        w.write_u32::<LE>(self.d)?;
        Ok(())
    }
}

impl std::fmt::Display for FGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:04x}{:08x}",
            self.a,
            self.b >> 16,
            self.b & 0xffff,
            self.c >> 16,
            self.c & 0xffff,
            self.d,
        )
    }
}

impl Serialize for FGuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FGuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FGuidVisitor;
        impl Visitor<'_> for FGuidVisitor {
            type Value = FGuid;
            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter
                    .write_str("a GUID string in the form xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx")
            }
            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FGuid::parse_str(value).map_err(E::custom)
            }
        }
        deserializer.deserialize_str(FGuidVisitor)
    }
}

/// `f32` wrapper whose serde form spells out NaN and infinities, which JSON cannot hold.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Float(pub f32);
/// `f64` counterpart of [`Float`].
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Double(pub f64);

macro_rules! float_newtype {
    ($name:ident, $ty:ty, $other:ty, $serialize:ident) => {
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
        impl From<$ty> for $name {
            fn from(value: $ty) -> Self {
                Self(value)
            }
        }
        impl From<$other> for $name {
            fn from(value: $other) -> Self {
                Self(value as $ty)
            }
        }
        impl From<$name> for $ty {
            fn from(value: $name) -> Self {
                value.0
            }
        }
        impl From<$name> for $other {
            fn from(value: $name) -> Self {
                value.0 as $other
            }
        }
        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let value = self.0;
                let sign = if value.is_sign_negative() { "-" } else { "" };
                if value.is_nan() {
                    serializer.serialize_str(&format!("{sign}NaN"))
                } else if value.is_infinite() {
                    serializer.serialize_str(&format!("{sign}Infinity"))
                } else {
                    serializer.$serialize(value)
                }
            }
        }
        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct FloatVisitor;
                impl Visitor<'_> for FloatVisitor {
                    type Value = $ty;
                    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                        formatter.write_str("a number or one of NaN, -NaN, Infinity, -Infinity")
                    }
                    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E> {
                        Ok(value as $ty)
                    }
                    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E> {
                        Ok(value as $ty)
                    }
                    fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E> {
                        Ok(value as $ty)
                    }
                    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
                    where
                        E: serde::de::Error,
                    {
                        match value {
                            "NaN" => Ok(<$ty>::NAN),
                            "-NaN" => Ok(-<$ty>::NAN),
                            "Infinity" => Ok(<$ty>::INFINITY),
                            "-Infinity" => Ok(<$ty>::NEG_INFINITY),
                            _ => Err(E::custom(format!(
                                "unexpected string {value:?} in place of a number"
                            ))),
                        }
                    }
                }
                Ok(Self(deserializer.deserialize_any(FloatVisitor)?))
            }
        }
    };
}
float_newtype!(Float, f32, f64, serialize_f32);
float_newtype!(Double, f64, f32, serialize_f64);

/// Engine math types whose components are `f32` on disk before large world coordinates and `f64`
/// from then on.
macro_rules! lwc_struct {
    ($(#[$meta:meta])* $name:ident { $($field:ident),+ }) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: Double,)+
        }
        impl $name {
            #[instrument(skip_all)]
            pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
                if ar.version().large_world_coordinates() {
                    Ok(Self { $($field: ar.read_f64::<LE>()?.into(),)+ })
                } else {
                    Ok(Self { $($field: ar.read_f32::<LE>()?.into(),)+ })
                }
            }
            pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
                if ar.version().large_world_coordinates() {
                    $(ar.write_f64::<LE>(self.$field.into())?;)+
                } else {
                    $(ar.write_f32::<LE>(self.$field.into())?;)+
                }
                Ok(())
            }
        }
    };
}

lwc_struct!(Vector { x, y, z });
lwc_struct!(Vector2D { x, y });
lwc_struct!(Quat { x, y, z, w });
lwc_struct!(
    /// Rotation in degrees.
    Rotator { pitch, yaw, roll }
);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}
impl Color {
    #[instrument(name = "Color_read", skip_all)]
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            r: r.read_u8()?,
            g: r.read_u8()?,
            b: r.read_u8()?,
            a: r.read_u8()?,
        })
    }
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[self.r, self.g, self.b, self.a])?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearColor {
    pub r: Float,
    pub g: Float,
    pub b: Float,
    pub a: Float,
}
impl LinearColor {
    #[instrument(name = "LinearColor_read", skip_all)]
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            r: r.read_f32::<LE>()?.into(),
            g: r.read_f32::<LE>()?.into(),
            b: r.read_f32::<LE>()?.into(),
            a: r.read_f32::<LE>()?.into(),
        })
    }
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_f32::<LE>(self.r.into())?;
        w.write_f32::<LE>(self.g.into())?;
        w.write_f32::<LE>(self.b.into())?;
        w.write_f32::<LE>(self.a.into())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}
impl IntPoint {
    #[instrument(name = "IntPoint_read", skip_all)]
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            x: r.read_i32::<LE>()?,
            y: r.read_i32::<LE>()?,
        })
    }
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<LE>(self.x)?;
        w.write_i32::<LE>(self.y)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntVector {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}
impl IntVector {
    #[instrument(name = "IntVector_read", skip_all)]
    pub fn read<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        Ok(Self {
            x: r.read_i32::<LE>()?,
            y: r.read_i32::<LE>()?,
            z: r.read_i32::<LE>()?,
        })
    }
    pub fn write<W: Write + ?Sized>(&self, w: &mut W) -> Result<()> {
        w.write_i32::<LE>(self.x)?;
        w.write_i32::<LE>(self.y)?;
        w.write_i32::<LE>(self.z)?;
        Ok(())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Box {
    pub min: Vector,
    pub max: Vector,
    pub is_valid: bool,
}
impl Box {
    #[instrument(name = "Box_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            min: Vector::read(ar)?,
            max: Vector::read(ar)?,
            is_valid: ar.read_u8()? != 0,
        })
    }
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        self.min.write(ar)?;
        self.max.write(ar)?;
        ar.write_u8(self.is_valid as u8)?;
        Ok(())
    }
}

/// Reference to an asset, possibly not loaded.
///
/// Older files store `package.asset` as one string; from
/// [`crate::ObjectVersionUE5::FSOFTOBJECTPATH_REMOVE_ASSET_PATH_FNAMES`] on the two halves are
/// separate strings. Either way the sub-path string follows.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftObjectPath {
    pub package_name: Option<FString>,
    pub asset_name: Option<FString>,
    pub sub_path: Option<FString>,
}
impl SoftObjectPath {
    #[instrument(name = "SoftObjectPath_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        let (package_name, asset_name) = if ar.version().remove_asset_path_fnames() {
            (ar.read_fstring()?, ar.read_fstring()?)
        } else {
            match ar.read_fstring()? {
                Some(path) => match path.as_str().find('.') {
                    Some(index) if index > 0 => {
                        let encoding = path.encoding();
                        let (package, asset) = path.as_str().split_at(index);
                        (
                            Some(FString::with_encoding(package, encoding)),
                            Some(FString::with_encoding(&asset[1..], encoding)),
                        )
                    }
                    _ => (Some(path), None),
                },
                None => (None, None),
            }
        };
        Ok(Self {
            package_name,
            asset_name,
            sub_path: ar.read_fstring()?,
        })
    }
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        if ar.version().remove_asset_path_fnames() {
            ar.write_fstring(self.package_name.as_ref())?;
            ar.write_fstring(self.asset_name.as_ref())?;
        } else {
            match (&self.package_name, &self.asset_name) {
                (package, Some(asset)) => {
                    let package = package.as_ref().map(FString::as_str).unwrap_or_default();
                    let encoding = if asset.encoding() == FStringEncoding::Utf16
                        || self
                            .package_name
                            .as_ref()
                            .is_some_and(|p| p.encoding() == FStringEncoding::Utf16)
                    {
                        FStringEncoding::Utf16
                    } else {
                        FStringEncoding::SingleByte
                    };
                    let joined = FString::with_encoding(format!("{package}.{asset}"), encoding);
                    ar.write_fstring(Some(&joined))?;
                }
                (package, None) => ar.write_fstring(package.as_ref())?,
            }
        }
        ar.write_fstring(self.sub_path.as_ref())?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameplayTagContainer {
    pub tags: Vec<Option<FString>>,
}
impl GameplayTagContainer {
    #[instrument(name = "GameplayTagContainer_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        let count = ar.read_u32::<LE>()?;
        let tags = (0..count)
            .map(|_| ar.read_fstring())
            .collect::<Result<_>>()?;
        Ok(Self { tags })
    }
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.tags.len() as u32)?;
        for tag in &self.tags {
            ar.write_fstring(tag.as_ref())?;
        }
        Ok(())
    }
}

/// A bound function: the object it is bound to and the function name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub object: Option<FString>,
    pub function: Option<FString>,
}
impl Delegate {
    #[instrument(name = "Delegate_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            object: ar.read_fstring()?,
            function: ar.read_fstring()?,
        })
    }
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_fstring(self.object.as_ref())?;
        ar.write_fstring(self.function.as_ref())?;
        Ok(())
    }
}

#[instrument(skip_all)]
pub(crate) fn read_delegates<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Vec<Delegate>> {
    let count = ar.read_i32::<LE>()?;
    if count < 0 {
        return Err(Error::Other(format!("negative delegate count {count}")));
    }
    (0..count).map(|_| Delegate::read(ar)).collect()
}
pub(crate) fn write_delegates<A: ArchiveWriter + ?Sized>(
    ar: &mut A,
    delegates: &[Delegate],
) -> Result<()> {
    ar.write_i32::<LE>(item_count("delegate list", delegates.len())?)?;
    for delegate in delegates {
        delegate.write(ar)?;
    }
    Ok(())
}
