//! Self-describing arguments of verbose payloads.
//!
//! Every argument starts with a 32-bit `type_info` word (in payload byte
//! order) followed by a type specific layout:
//!
//! ```text
//! string     : u16 len, [VARI: u16 name_len, name], data(len)
//! bool       : [VARI: u16 name_len, name], u8
//! sint/uint  : [VARI: u16 name_len, u16 unit_len, name, unit],
//!              [FIXP: f32 quantization, offset(4|8|16)], value
//! float      : [VARI: u16 name_len, u16 unit_len, name, unit], value
//! raw        : u16 len, [VARI: u16 name_len, name], data(len)
//! trace info : u16 len, data(len)
//! ```
//!
//! Arrays and structures are not supported and decode as corrupt content.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::protocol::type_info as ti;

/// Character coding (`SCOD`) of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coding {
    #[default]
    Ascii,
    Utf8,
    Hex,
    Bin,
    Reserved(u8),
}

impl Coding {
    fn from_type_info(word: u32) -> Self {
        match ((word & ti::SCOD) >> ti::SCOD_SHIFT) as u8 {
            0 => Self::Ascii,
            1 => Self::Utf8,
            2 => Self::Hex,
            3 => Self::Bin,
            other => Self::Reserved(other),
        }
    }

    fn bits(self) -> u32 {
        let raw = match self {
            Self::Ascii => 0,
            Self::Utf8 => 1,
            Self::Hex => 2,
            Self::Bin => 3,
            Self::Reserved(bits) => u32::from(bits & 0x07),
        };
        raw << ti::SCOD_SHIFT
    }
}

/// Typed value of one argument.
///
/// 16 and 128 bit floats have no native Rust type and keep their raw bits.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    F16(u16),
    F32(f32),
    F64(f64),
    F128(u128),
    String(Bytes),
    Raw(Bytes),
    TraceInfo(Bytes),
}

impl Value {
    fn type_bits(&self) -> u32 {
        match self {
            Self::Bool(_) => ti::BOOL | ti::TYLE_8BIT,
            Self::I8(_) => ti::SINT | ti::TYLE_8BIT,
            Self::I16(_) => ti::SINT | ti::TYLE_16BIT,
            Self::I32(_) => ti::SINT | ti::TYLE_32BIT,
            Self::I64(_) => ti::SINT | ti::TYLE_64BIT,
            Self::I128(_) => ti::SINT | ti::TYLE_128BIT,
            Self::U8(_) => ti::UINT | ti::TYLE_8BIT,
            Self::U16(_) => ti::UINT | ti::TYLE_16BIT,
            Self::U32(_) => ti::UINT | ti::TYLE_32BIT,
            Self::U64(_) => ti::UINT | ti::TYLE_64BIT,
            Self::U128(_) => ti::UINT | ti::TYLE_128BIT,
            Self::F16(_) => ti::FLOA | ti::TYLE_16BIT,
            Self::F32(_) => ti::FLOA | ti::TYLE_32BIT,
            Self::F64(_) => ti::FLOA | ti::TYLE_64BIT,
            Self::F128(_) => ti::FLOA | ti::TYLE_128BIT,
            Self::String(_) => ti::STRG,
            Self::Raw(_) => ti::RAWD,
            Self::TraceInfo(_) => ti::TRAI,
        }
    }

    fn is_integer(&self) -> bool {
        self.type_bits() & (ti::SINT | ti::UINT) != 0
    }

    fn has_unit(&self) -> bool {
        self.type_bits() & (ti::SINT | ti::UINT | ti::FLOA) != 0
    }
}

/// Name and unit attached when the `VARI` flag is set.
///
/// Only numeric arguments carry a unit on the wire; for the other kinds it
/// must stay empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VarInfo {
    pub name: Bytes,
    pub unit: Bytes,
}

/// Fixed-point description of an integer argument.
///
/// The offset is carried verbatim and never applied to the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPoint {
    pub quantization: f32,
    pub offset: i128,
}

/// One verbose argument.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub value: Value,
    pub var_info: Option<VarInfo>,
    pub fixed_point: Option<FixedPoint>,
    pub coding: Coding,
}

impl Argument {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            var_info: None,
            fixed_point: None,
            coding: Coding::default(),
        }
    }

    /// A NUL terminated string argument, as logging libraries emit them.
    pub fn string(text: &str) -> Self {
        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(0);
        Self {
            coding: Coding::Utf8,
            ..Self::new(Value::String(Bytes::from(data)))
        }
    }

    pub fn raw(data: impl Into<Bytes>) -> Self {
        Self::new(Value::Raw(data.into()))
    }

    /// Attach a NUL terminated variable name.
    pub fn with_name(mut self, name: &str) -> Self {
        let info = self.var_info.get_or_insert_with(VarInfo::default);
        info.name = nul_terminated(name);
        self
    }

    /// Attach a NUL terminated unit (numeric arguments only).
    pub fn with_unit(mut self, unit: &str) -> Self {
        let info = self.var_info.get_or_insert_with(VarInfo::default);
        info.unit = nul_terminated(unit);
        self
    }

    pub fn with_fixed_point(mut self, quantization: f32, offset: i128) -> Self {
        self.fixed_point = Some(FixedPoint {
            quantization,
            offset,
        });
        self
    }

    pub fn with_coding(mut self, coding: Coding) -> Self {
        self.coding = coding;
        self
    }

    /// The `type_info` word describing this argument.
    pub fn type_info(&self) -> u32 {
        let mut word = self.value.type_bits() | self.coding.bits();
        if self.var_info.is_some() {
            word |= ti::VARI;
        }
        if self.fixed_point.is_some() {
            word |= ti::FIXP;
        }
        word
    }

    /// Variable name without NUL padding, if any.
    pub fn name(&self) -> Option<String> {
        self.var_info.as_ref().map(|info| text_of(&info.name))
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hex = matches!(self.coding, Coding::Hex);
        match &self.value {
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::I8(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::I128(v) => write!(f, "{v}"),
            Value::U8(v) if hex => write!(f, "0x{v:02x}"),
            Value::U16(v) if hex => write!(f, "0x{v:04x}"),
            Value::U32(v) if hex => write!(f, "0x{v:08x}"),
            Value::U64(v) if hex => write!(f, "0x{v:016x}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::U64(v) => write!(f, "{v}"),
            Value::U128(v) => write!(f, "0x{v:032x}"),
            Value::F16(bits) => write!(f, "f16:0x{bits:04x}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::F128(bits) => write!(f, "f128:0x{bits:032x}"),
            Value::String(data) => f.write_str(&text_of(data)),
            Value::Raw(data) | Value::TraceInfo(data) => {
                for (i, byte) in data.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

fn nul_terminated(text: &str) -> Bytes {
    let mut data = Vec::with_capacity(text.len() + 1);
    data.extend_from_slice(text.as_bytes());
    data.push(0);
    Bytes::from(data)
}

fn text_of(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Bounds-checked reader over a payload in its declared byte order.
pub(crate) struct WireCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    big_endian: bool,
}

impl<'a> WireCursor<'a> {
    pub(crate) fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Self {
            buf,
            pos: 0,
            big_endian,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FrameError::content(format!(
                "argument needs {n} bytes, {} left",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let raw = self.array()?;
        Ok(if self.big_endian {
            u16::from_be_bytes(raw)
        } else {
            u16::from_le_bytes(raw)
        })
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let raw = self.array()?;
        Ok(if self.big_endian {
            u32::from_be_bytes(raw)
        } else {
            u32::from_le_bytes(raw)
        })
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let raw = self.array()?;
        Ok(if self.big_endian {
            u64::from_be_bytes(raw)
        } else {
            u64::from_le_bytes(raw)
        })
    }

    pub(crate) fn u128(&mut self) -> Result<u128> {
        let raw = self.array()?;
        Ok(if self.big_endian {
            u128::from_be_bytes(raw)
        } else {
            u128::from_le_bytes(raw)
        })
    }

    fn bytes(&mut self, n: usize) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.take(n)?))
    }
}

/// Writer counterpart of [`WireCursor`].
pub(crate) struct WireWriter<'a> {
    dst: &'a mut BytesMut,
    big_endian: bool,
}

impl<'a> WireWriter<'a> {
    pub(crate) fn new(dst: &'a mut BytesMut, big_endian: bool) -> Self {
        Self { dst, big_endian }
    }

    pub(crate) fn u8(&mut self, v: u8) {
        self.dst.put_u8(v);
    }

    pub(crate) fn u16(&mut self, v: u16) {
        if self.big_endian {
            self.dst.put_u16(v)
        } else {
            self.dst.put_u16_le(v)
        }
    }

    pub(crate) fn u32(&mut self, v: u32) {
        if self.big_endian {
            self.dst.put_u32(v)
        } else {
            self.dst.put_u32_le(v)
        }
    }

    pub(crate) fn u64(&mut self, v: u64) {
        if self.big_endian {
            self.dst.put_u64(v)
        } else {
            self.dst.put_u64_le(v)
        }
    }

    pub(crate) fn u128(&mut self, v: u128) {
        if self.big_endian {
            self.dst.put_u128(v)
        } else {
            self.dst.put_u128_le(v)
        }
    }

    pub(crate) fn slice(&mut self, data: &[u8]) {
        self.dst.put_slice(data);
    }

    fn len16(&mut self, data: &[u8], what: &str) -> Result<()> {
        let len = u16::try_from(data.len())
            .map_err(|_| FrameError::encode(format!("{what} longer than 65535 bytes")))?;
        self.u16(len);
        Ok(())
    }
}

/// Decode exactly `noar` arguments filling the whole payload.
pub fn decode_arguments(payload: &[u8], noar: u8, big_endian: bool) -> Result<Vec<Argument>> {
    let mut cursor = WireCursor::new(payload, big_endian);
    let mut args = Vec::with_capacity(usize::from(noar));
    for _ in 0..noar {
        args.push(decode_argument(&mut cursor)?);
    }
    if cursor.remaining() != 0 {
        return Err(FrameError::content(format!(
            "{} trailing bytes after {noar} arguments",
            cursor.remaining()
        )));
    }
    Ok(args)
}

fn decode_argument(cursor: &mut WireCursor<'_>) -> Result<Argument> {
    let word = cursor.u32()?;
    let coding = Coding::from_type_info(word);
    let vari = word & ti::VARI != 0;
    let tyle = word & ti::TYLE;

    if word & (ti::ARAY | ti::STRU) != 0 {
        return Err(FrameError::content(format!(
            "unsupported argument type 0x{word:08x}"
        )));
    }

    let mut argument = if word & ti::STRG != 0 {
        let len = usize::from(cursor.u16()?);
        let var_info = vari.then(|| read_name(cursor)).transpose()?;
        let data = cursor.bytes(len)?;
        Argument {
            var_info,
            ..Argument::new(Value::String(data))
        }
    } else if word & ti::BOOL != 0 {
        let var_info = vari.then(|| read_name(cursor)).transpose()?;
        let value = cursor.u8()? != 0;
        Argument {
            var_info,
            ..Argument::new(Value::Bool(value))
        }
    } else if word & (ti::SINT | ti::UINT) != 0 {
        let var_info = vari.then(|| read_name_and_unit(cursor)).transpose()?;
        let fixed_point = if word & ti::FIXP != 0 {
            let quantization = f32::from_bits(cursor.u32()?);
            let offset = match tyle {
                ti::TYLE_8BIT | ti::TYLE_16BIT | ti::TYLE_32BIT => i128::from(cursor.u32()? as i32),
                ti::TYLE_64BIT => i128::from(cursor.u64()? as i64),
                ti::TYLE_128BIT => cursor.u128()? as i128,
                _ => return Err(invalid_length(word)),
            };
            Some(FixedPoint {
                quantization,
                offset,
            })
        } else {
            None
        };
        let value = decode_integer(cursor, word)?;
        Argument {
            var_info,
            fixed_point,
            ..Argument::new(value)
        }
    } else if word & ti::FLOA != 0 {
        let var_info = vari.then(|| read_name_and_unit(cursor)).transpose()?;
        let value = match tyle {
            ti::TYLE_16BIT => Value::F16(cursor.u16()?),
            ti::TYLE_32BIT => Value::F32(f32::from_bits(cursor.u32()?)),
            ti::TYLE_64BIT => Value::F64(f64::from_bits(cursor.u64()?)),
            ti::TYLE_128BIT => Value::F128(cursor.u128()?),
            _ => return Err(invalid_length(word)),
        };
        Argument {
            var_info,
            ..Argument::new(value)
        }
    } else if word & ti::RAWD != 0 {
        let len = usize::from(cursor.u16()?);
        let var_info = vari.then(|| read_name(cursor)).transpose()?;
        let data = cursor.bytes(len)?;
        Argument {
            var_info,
            ..Argument::new(Value::Raw(data))
        }
    } else if word & ti::TRAI != 0 {
        let len = usize::from(cursor.u16()?);
        Argument::new(Value::TraceInfo(cursor.bytes(len)?))
    } else {
        return Err(FrameError::content(format!(
            "unknown argument type 0x{word:08x}"
        )));
    };

    argument.coding = coding;
    Ok(argument)
}

fn decode_integer(cursor: &mut WireCursor<'_>, word: u32) -> Result<Value> {
    let signed = word & ti::SINT != 0;
    let value = match (word & ti::TYLE, signed) {
        (ti::TYLE_8BIT, true) => Value::I8(cursor.u8()? as i8),
        (ti::TYLE_8BIT, false) => Value::U8(cursor.u8()?),
        (ti::TYLE_16BIT, true) => Value::I16(cursor.u16()? as i16),
        (ti::TYLE_16BIT, false) => Value::U16(cursor.u16()?),
        (ti::TYLE_32BIT, true) => Value::I32(cursor.u32()? as i32),
        (ti::TYLE_32BIT, false) => Value::U32(cursor.u32()?),
        (ti::TYLE_64BIT, true) => Value::I64(cursor.u64()? as i64),
        (ti::TYLE_64BIT, false) => Value::U64(cursor.u64()?),
        (ti::TYLE_128BIT, true) => Value::I128(cursor.u128()? as i128),
        (ti::TYLE_128BIT, false) => Value::U128(cursor.u128()?),
        _ => return Err(invalid_length(word)),
    };
    Ok(value)
}

fn read_name(cursor: &mut WireCursor<'_>) -> Result<VarInfo> {
    let name_len = usize::from(cursor.u16()?);
    Ok(VarInfo {
        name: cursor.bytes(name_len)?,
        unit: Bytes::new(),
    })
}

fn read_name_and_unit(cursor: &mut WireCursor<'_>) -> Result<VarInfo> {
    let name_len = usize::from(cursor.u16()?);
    let unit_len = usize::from(cursor.u16()?);
    Ok(VarInfo {
        name: cursor.bytes(name_len)?,
        unit: cursor.bytes(unit_len)?,
    })
}

fn invalid_length(word: u32) -> FrameError {
    FrameError::content(format!(
        "invalid type length {} in 0x{word:08x}",
        word & ti::TYLE
    ))
}

/// Encode arguments in payload byte order.
pub fn encode_arguments(args: &[Argument], big_endian: bool, dst: &mut BytesMut) -> Result<()> {
    let mut writer = WireWriter::new(dst, big_endian);
    for arg in args {
        encode_argument(arg, &mut writer)?;
    }
    Ok(())
}

fn encode_argument(arg: &Argument, w: &mut WireWriter<'_>) -> Result<()> {
    if arg.fixed_point.is_some() && !arg.value.is_integer() {
        return Err(FrameError::encode("fixed point is only valid on integers"));
    }
    if let Some(info) = &arg.var_info {
        if !arg.value.has_unit() && !info.unit.is_empty() {
            return Err(FrameError::encode("unit is only valid on numeric arguments"));
        }
        if matches!(arg.value, Value::TraceInfo(_)) {
            return Err(FrameError::encode("trace info arguments carry no name"));
        }
    }

    w.u32(arg.type_info());

    match &arg.value {
        Value::String(data) | Value::Raw(data) => {
            w.len16(data, "argument data")?;
            write_name(arg.var_info.as_ref(), w)?;
            w.slice(data);
        }
        Value::TraceInfo(data) => {
            w.len16(data, "trace info")?;
            w.slice(data);
        }
        Value::Bool(v) => {
            write_name(arg.var_info.as_ref(), w)?;
            w.u8(u8::from(*v));
        }
        value => {
            if let Some(info) = &arg.var_info {
                w.len16(&info.name, "argument name")?;
                w.len16(&info.unit, "argument unit")?;
                w.slice(&info.name);
                w.slice(&info.unit);
            }
            if let Some(fixed) = arg.fixed_point {
                w.u32(fixed.quantization.to_bits());
                match value {
                    Value::I64(_) | Value::U64(_) => {
                        let offset = i64::try_from(fixed.offset)
                            .map_err(|_| FrameError::encode("fixed point offset exceeds 64 bits"))?;
                        w.u64(offset as u64);
                    }
                    Value::I128(_) | Value::U128(_) => w.u128(fixed.offset as u128),
                    _ => {
                        let offset = i32::try_from(fixed.offset)
                            .map_err(|_| FrameError::encode("fixed point offset exceeds 32 bits"))?;
                        w.u32(offset as u32);
                    }
                }
            }
            write_number(value, w);
        }
    }
    Ok(())
}

fn write_name(info: Option<&VarInfo>, w: &mut WireWriter<'_>) -> Result<()> {
    if let Some(info) = info {
        w.len16(&info.name, "argument name")?;
        w.slice(&info.name);
    }
    Ok(())
}

fn write_number(value: &Value, w: &mut WireWriter<'_>) {
    match *value {
        Value::I8(v) => w.u8(v as u8),
        Value::U8(v) => w.u8(v),
        Value::I16(v) => w.u16(v as u16),
        Value::U16(v) | Value::F16(v) => w.u16(v),
        Value::I32(v) => w.u32(v as u32),
        Value::U32(v) => w.u32(v),
        Value::F32(v) => w.u32(v.to_bits()),
        Value::I64(v) => w.u64(v as u64),
        Value::U64(v) => w.u64(v),
        Value::F64(v) => w.u64(v.to_bits()),
        Value::I128(v) => w.u128(v as u128),
        Value::U128(v) | Value::F128(v) => w.u128(v),
        Value::Bool(_) | Value::String(_) | Value::Raw(_) | Value::TraceInfo(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(args: Vec<Argument>, big_endian: bool) {
        let mut buf = BytesMut::new();
        encode_arguments(&args, big_endian, &mut buf).unwrap();
        let decoded = decode_arguments(&buf, args.len() as u8, big_endian).unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn string_layout_little_endian() {
        let mut buf = BytesMut::new();
        encode_arguments(&[Argument::string("hi")], false, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x82, 0x00, 0x00, 0x03, 0x00, b'h', b'i', 0x00]
        );
    }

    #[test]
    fn named_integer_layout_big_endian() {
        let arg = Argument::new(Value::U16(0x1234)).with_name("n").with_unit("s");
        let mut buf = BytesMut::new();
        encode_arguments(&[arg], true, &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0x00, 0x00, 0x08, 0x42, 0x00, 0x02, 0x00, 0x02, b'n', 0, b's', 0, 0x12, 0x34]
        );
    }

    #[test]
    fn mixed_arguments_roundtrip_both_orders() {
        let args = vec![
            Argument::string("temperature").with_name("label"),
            Argument::new(Value::Bool(true)),
            Argument::new(Value::I32(-42)).with_name("delta").with_unit("mK"),
            Argument::new(Value::U64(u64::MAX)).with_coding(Coding::Hex),
            Argument::new(Value::I128(-7)),
            Argument::new(Value::F64(2.5)).with_name("ratio"),
            Argument::new(Value::F16(0x3c00)),
            Argument::raw(vec![1u8, 2, 3]).with_name("blob"),
            Argument::new(Value::TraceInfo(Bytes::from_static(b"fn"))),
        ];
        roundtrip(args.clone(), false);
        roundtrip(args, true);
    }

    #[test]
    fn fixed_point_offset_is_kept_not_applied() {
        let args = vec![
            Argument::new(Value::I16(100)).with_fixed_point(0.5, -3),
            Argument::new(Value::U64(9)).with_fixed_point(1.0, 1 << 40),
            Argument::new(Value::I128(1)).with_fixed_point(0.25, -(1 << 100)),
        ];
        roundtrip(args.clone(), false);

        let mut buf = BytesMut::new();
        encode_arguments(&args[..1], false, &mut buf).unwrap();
        let decoded = decode_arguments(&buf, 1, false).unwrap();
        assert_eq!(decoded[0].value, Value::I16(100));
        assert_eq!(decoded[0].fixed_point.unwrap().offset, -3);
    }

    #[test]
    fn shortfall_is_corrupt() {
        let mut buf = BytesMut::new();
        encode_arguments(&[Argument::string("truncated")], false, &mut buf).unwrap();
        for cut in 0..buf.len() {
            let err = decode_arguments(&buf[..cut], 1, false).unwrap_err();
            assert!(matches!(err, FrameError::Content(_)), "cut at {cut}");
        }
    }

    #[test]
    fn trailing_bytes_are_corrupt() {
        let mut buf = BytesMut::new();
        encode_arguments(&[Argument::new(Value::U8(1))], false, &mut buf).unwrap();
        buf.put_u8(0xFF);
        assert!(matches!(
            decode_arguments(&buf, 1, false),
            Err(FrameError::Content(_))
        ));
    }

    #[test]
    fn arrays_and_unknown_types_are_corrupt() {
        let array = (ti::ARAY | ti::UINT | ti::TYLE_8BIT).to_le_bytes();
        assert!(matches!(
            decode_arguments(&array, 1, false),
            Err(FrameError::Content(_))
        ));

        let unknown = 0u32.to_le_bytes();
        assert!(matches!(
            decode_arguments(&unknown, 1, false),
            Err(FrameError::Content(_))
        ));

        let mut bad_float = BytesMut::new();
        bad_float.put_u32_le(ti::FLOA | ti::TYLE_8BIT);
        bad_float.put_u8(0);
        assert!(matches!(
            decode_arguments(&bad_float, 1, false),
            Err(FrameError::Content(_))
        ));
    }

    #[test]
    fn unit_on_string_is_rejected() {
        let arg = Argument::string("x").with_unit("ms");
        let mut buf = BytesMut::new();
        assert!(matches!(
            encode_arguments(&[arg], false, &mut buf),
            Err(FrameError::Encode(_))
        ));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Argument::string("abc").to_string(), "abc");
        assert_eq!(Argument::new(Value::U8(10)).with_coding(Coding::Hex).to_string(), "0x0a");
        assert_eq!(Argument::raw(vec![0xde, 0xad]).to_string(), "de ad");
        assert_eq!(
            Argument::new(Value::I8(1)).with_name("n").name().as_deref(),
            Some("n")
        );
    }
}
