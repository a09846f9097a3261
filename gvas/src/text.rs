//! Localized text (`FText`) and its history variants.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    archive::{item_count, nested, ArchiveReader, ArchiveWriter},
    Double, Error, FString, Float, Result,
};

bitflags::bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TextFlags: u32 {
        const Transient = 0x01;
        const CultureInvariant = 0x02;
        const ConvertedProperty = 0x04;
        const Immutable = 0x08;
        const InitializedFromString = 0x10;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub flags: TextFlags,
    pub history: TextHistory,
}

/// Where a piece of text came from. The numeric history type precedes each variant on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextHistory {
    // -1
    None {
        has_culture_invariant: bool,
        culture_invariant: Option<FString>,
    },
    // 0
    Base {
        namespace: Option<FString>,
        key: Option<FString>,
        source_string: Option<FString>,
    },
    // 3
    ArgumentFormat {
        format_text: Box<Text>,
        arguments: Vec<FormatArgument>,
    },
    // 4
    AsNumber {
        source_value: FormatArgumentValue,
        format_options: Option<NumberFormattingOptions>,
        target_culture: Option<FString>,
    },
    // 7
    AsDate {
        source_date_time: u64,
        date_style: i8,
        time_zone: Option<FString>,
        target_culture: Option<FString>,
    },
    // 9
    AsDateTime {
        ticks: i64,
        date_style: i8,
        time_style: i8,
        time_zone: Option<FString>,
        target_culture: Option<FString>,
    },
    // 11
    StringTableEntry {
        table_id: Option<FString>,
        key: Option<FString>,
    },
}

impl Text {
    /// Plain localizable text with no culture-specific formatting.
    pub fn base(
        namespace: Option<FString>,
        key: Option<FString>,
        source_string: Option<FString>,
    ) -> Self {
        Self {
            flags: TextFlags::empty(),
            history: TextHistory::Base {
                namespace,
                key,
                source_string,
            },
        }
    }

    #[instrument(name = "Text_read", skip_all)]
    pub fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        let flags = TextFlags::from_bits_retain(ar.read_u32::<LE>()?);
        let history_type = ar.read_i8()?;
        let history = match history_type {
            -1 => {
                let has_culture_invariant = ar.read_i32::<LE>()? != 0;
                TextHistory::None {
                    has_culture_invariant,
                    culture_invariant: if has_culture_invariant {
                        ar.read_fstring()?
                    } else {
                        None
                    },
                }
            }
            0 => TextHistory::Base {
                namespace: ar.read_fstring()?,
                key: ar.read_fstring()?,
                source_string: ar.read_fstring()?,
            },
            3 => {
                let format_text = Box::new(nested(ar, Text::read)?);
                let count = ar.read_i32::<LE>()?;
                if count < 0 {
                    return Err(Error::Other(format!("negative format argument count {count}")));
                }
                let arguments = (0..count)
                    .map(|_| FormatArgument::read(ar))
                    .collect::<Result<_>>()?;
                TextHistory::ArgumentFormat {
                    format_text,
                    arguments,
                }
            }
            4 => TextHistory::AsNumber {
                source_value: FormatArgumentValue::read(ar, true)?,
                format_options: if ar.read_u32::<LE>()? != 0 {
                    Some(NumberFormattingOptions::read(ar)?)
                } else {
                    None
                },
                target_culture: ar.read_fstring()?,
            },
            7 => TextHistory::AsDate {
                source_date_time: ar.read_u64::<LE>()?,
                date_style: ar.read_i8()?,
                time_zone: ar.read_fstring()?,
                target_culture: ar.read_fstring()?,
            },
            9 => TextHistory::AsDateTime {
                ticks: ar.read_i64::<LE>()?,
                date_style: ar.read_i8()?,
                time_style: ar.read_i8()?,
                time_zone: ar.read_fstring()?,
                target_culture: ar.read_fstring()?,
            },
            11 => TextHistory::StringTableEntry {
                table_id: ar.read_fstring()?,
                key: ar.read_fstring()?,
            },
            other => {
                return Err(Error::NotSupported(format!(
                    "text history type {other}"
                )))
            }
        };
        Ok(Self { flags, history })
    }

    #[instrument(name = "Text_write", skip_all)]
    pub fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.flags.bits())?;
        match &self.history {
            TextHistory::None {
                has_culture_invariant,
                culture_invariant,
            } => {
                ar.write_i8(-1)?;
                ar.write_i32::<LE>(*has_culture_invariant as i32)?;
                if *has_culture_invariant {
                    ar.write_fstring(culture_invariant.as_ref())?;
                }
            }
            TextHistory::Base {
                namespace,
                key,
                source_string,
            } => {
                ar.write_i8(0)?;
                ar.write_fstring(namespace.as_ref())?;
                ar.write_fstring(key.as_ref())?;
                ar.write_fstring(source_string.as_ref())?;
            }
            TextHistory::ArgumentFormat {
                format_text,
                arguments,
            } => {
                ar.write_i8(3)?;
                format_text.write(ar)?;
                ar.write_i32::<LE>(item_count("format text", arguments.len())?)?;
                for argument in arguments {
                    argument.write(ar)?;
                }
            }
            TextHistory::AsNumber {
                source_value,
                format_options,
                target_culture,
            } => {
                ar.write_i8(4)?;
                source_value.write(ar, true)?;
                ar.write_u32::<LE>(format_options.is_some() as u32)?;
                if let Some(options) = format_options {
                    options.write(ar)?;
                }
                ar.write_fstring(target_culture.as_ref())?;
            }
            TextHistory::AsDate {
                source_date_time,
                date_style,
                time_zone,
                target_culture,
            } => {
                ar.write_i8(7)?;
                ar.write_u64::<LE>(*source_date_time)?;
                ar.write_i8(*date_style)?;
                ar.write_fstring(time_zone.as_ref())?;
                ar.write_fstring(target_culture.as_ref())?;
            }
            TextHistory::AsDateTime {
                ticks,
                date_style,
                time_style,
                time_zone,
                target_culture,
            } => {
                ar.write_i8(9)?;
                ar.write_i64::<LE>(*ticks)?;
                ar.write_i8(*date_style)?;
                ar.write_i8(*time_style)?;
                ar.write_fstring(time_zone.as_ref())?;
                ar.write_fstring(target_culture.as_ref())?;
            }
            TextHistory::StringTableEntry { table_id, key } => {
                ar.write_i8(11)?;
                ar.write_fstring(table_id.as_ref())?;
                ar.write_fstring(key.as_ref())?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatArgument {
    pub name: Option<FString>,
    pub value: FormatArgumentValue,
}

impl FormatArgument {
    /// Named arguments switch to 64-bit integers together with large world coordinates.
    #[instrument(name = "FormatArgument_read", skip_all)]
    fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        let wide = ar.version().large_world_coordinates();
        Ok(Self {
            name: ar.read_fstring()?,
            value: FormatArgumentValue::read(ar, wide)?,
        })
    }
    fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        let wide = ar.version().large_world_coordinates();
        ar.write_fstring(self.name.as_ref())?;
        self.value.write(ar, wide)
    }
}

/// A value substituted into formatted text. Integers are kept at 64 bits in memory whatever their
/// width on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormatArgumentValue {
    Int(i64),
    UInt(u64),
    Float(Float),
    Double(Double),
    Text(Box<Text>),
    Gender(u8),
}

impl FormatArgumentValue {
    #[instrument(name = "FormatArgumentValue_read", skip_all)]
    fn read<A: ArchiveReader + ?Sized>(ar: &mut A, wide: bool) -> Result<Self> {
        let type_ = ar.read_u8()?;
        Ok(match type_ {
            0 if wide => Self::Int(ar.read_i64::<LE>()?),
            0 => Self::Int(ar.read_i32::<LE>()?.into()),
            1 if wide => Self::UInt(ar.read_u64::<LE>()?),
            1 => Self::UInt(ar.read_u32::<LE>()?.into()),
            2 => Self::Float(ar.read_f32::<LE>()?.into()),
            3 => Self::Double(ar.read_f64::<LE>()?.into()),
            4 => Self::Text(Box::new(nested(ar, Text::read)?)),
            5 => Self::Gender(ar.read_u8()?),
            _ => {
                return Err(Error::NotSupported(format!(
                    "format argument type 0x{type_:x}"
                )))
            }
        })
    }
    fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A, wide: bool) -> Result<()> {
        match self {
            Self::Int(value) => {
                ar.write_u8(0)?;
                if wide {
                    ar.write_i64::<LE>(*value)?;
                } else {
                    ar.write_i32::<LE>(narrow(*value)?)?;
                }
            }
            Self::UInt(value) => {
                ar.write_u8(1)?;
                if wide {
                    ar.write_u64::<LE>(*value)?;
                } else {
                    ar.write_u32::<LE>(narrow(*value)?)?;
                }
            }
            Self::Float(value) => {
                ar.write_u8(2)?;
                ar.write_f32::<LE>((*value).into())?;
            }
            Self::Double(value) => {
                ar.write_u8(3)?;
                ar.write_f64::<LE>((*value).into())?;
            }
            Self::Text(value) => {
                ar.write_u8(4)?;
                value.write(ar)?;
            }
            Self::Gender(value) => {
                ar.write_u8(5)?;
                ar.write_u8(*value)?;
            }
        }
        Ok(())
    }
}

fn narrow<T, U>(value: T) -> Result<U>
where
    T: Copy + std::fmt::Display,
    U: TryFrom<T>,
{
    U::try_from(value).map_err(|_| {
        Error::Other(format!(
            "format argument {value} does not fit in 32 bits for this version"
        ))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberFormattingOptions {
    pub always_sign: bool,
    pub use_grouping: bool,
    pub rounding_mode: i8,
    pub minimum_integral_digits: i32,
    pub maximum_integral_digits: i32,
    pub minimum_fractional_digits: i32,
    pub maximum_fractional_digits: i32,
}

impl NumberFormattingOptions {
    fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            always_sign: ar.read_u32::<LE>()? != 0,
            use_grouping: ar.read_u32::<LE>()? != 0,
            rounding_mode: ar.read_i8()?,
            minimum_integral_digits: ar.read_i32::<LE>()?,
            maximum_integral_digits: ar.read_i32::<LE>()?,
            minimum_fractional_digits: ar.read_i32::<LE>()?,
            maximum_fractional_digits: ar.read_i32::<LE>()?,
        })
    }
    fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.always_sign as u32)?;
        ar.write_u32::<LE>(self.use_grouping as u32)?;
        ar.write_i8(self.rounding_mode)?;
        ar.write_i32::<LE>(self.minimum_integral_digits)?;
        ar.write_i32::<LE>(self.maximum_integral_digits)?;
        ar.write_i32::<LE>(self.minimum_fractional_digits)?;
        ar.write_i32::<LE>(self.maximum_fractional_digits)?;
        Ok(())
    }
}
