/*
 *
 *    Copyright (c) 2020-2022 Project CHIP Authors
 *
 *    Licensed under the Apache License, Version 2.0 (the "License");
 *    you may not use this file except in compliance with the License.
 *    You may obtain a copy of the License at
 *
 *        http://www.apache.org/licenses/LICENSE-2.0
 *
 *    Unless required by applicable law or agreed to in writing, software
 *    distributed under the License is distributed on an "AS IS" BASIS,
 *    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *    See the License for the specific language governing permissions and
 *    limitations under the License.
 */

//! A minimal Matter TLV codec: enough of a writer for session parameter
//! structures, and a flat reader which understands every element and tag
//! form so that unknown fields can be skipped.

use log::error;
use num_derive::FromPrimitive;

use crate::error::*;
use crate::utils::storage::WriteBuf;

pub const TAG_SHIFT_BITS: u8 = 5;
const TAG_MASK: u8 = 0xe0;
const TYPE_MASK: u8 = 0x1f;

// Number of bytes each tag control takes on the wire
const TAG_SIZE_MAP: [usize; 8] = [0, 1, 2, 4, 2, 4, 6, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Anonymous,
    Context(u8),
    CommonPrf16(u16),
    CommonPrf32(u32),
    ImplPrf16(u16),
    ImplPrf32(u32),
    FullQual48(u64),
    FullQual64(u64),
}

#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    S8 = 0,
    S16 = 1,
    S32 = 2,
    S64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    False = 8,
    True = 9,
    F32 = 10,
    F64 = 11,
    Utf8l = 12,
    Utf16l = 13,
    Utf32l = 14,
    Utf64l = 15,
    Str8l = 16,
    Str16l = 17,
    Str32l = 18,
    Str64l = 19,
    Null = 20,
    Struct = 21,
    Array = 22,
    List = 23,
    EndCnt = 24,
}

impl ElementType {
    // Size of the fixed value, or of the length prefix for strings
    const fn value_len(&self) -> usize {
        match self {
            Self::S8 | Self::U8 | Self::Utf8l | Self::Str8l => 1,
            Self::S16 | Self::U16 | Self::Utf16l | Self::Str16l => 2,
            Self::S32 | Self::U32 | Self::F32 | Self::Utf32l | Self::Str32l => 4,
            Self::S64 | Self::U64 | Self::F64 | Self::Utf64l | Self::Str64l => 8,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ElementValue<'a> {
    Signed(i64),
    Unsigned(u64),
    Bool(bool),
    F32(f32),
    F64(f64),
    Utf8(&'a [u8]),
    Str(&'a [u8]),
    Null,
    Struct,
    Array,
    List,
    EndCnt,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TLVElement<'a> {
    tag: TagType,
    value: ElementValue<'a>,
}

impl<'a> TLVElement<'a> {
    pub fn tag(&self) -> TagType {
        self.tag
    }

    pub fn value(&self) -> ElementValue<'a> {
        self.value
    }

    pub fn is_container_start(&self) -> bool {
        matches!(
            self.value,
            ElementValue::Struct | ElementValue::Array | ElementValue::List
        )
    }

    pub fn is_end_container(&self) -> bool {
        self.value == ElementValue::EndCnt
    }

    pub fn u64(&self) -> Result<u64, Error> {
        match self.value {
            ElementValue::Unsigned(v) => Ok(v),
            _ => Err(ErrorCode::TLVTypeMismatch.into()),
        }
    }

    pub fn u32(&self) -> Result<u32, Error> {
        u32::try_from(self.u64()?).map_err(|_| ErrorCode::InvalidData.into())
    }

    pub fn u16(&self) -> Result<u16, Error> {
        u16::try_from(self.u64()?).map_err(|_| ErrorCode::InvalidData.into())
    }

    pub fn i64(&self) -> Result<i64, Error> {
        match self.value {
            ElementValue::Signed(v) => Ok(v),
            _ => Err(ErrorCode::TLVTypeMismatch.into()),
        }
    }

    pub fn bool(&self) -> Result<bool, Error> {
        match self.value {
            ElementValue::Bool(v) => Ok(v),
            _ => Err(ErrorCode::TLVTypeMismatch.into()),
        }
    }

    pub fn confirm_struct(&self) -> Result<(), Error> {
        if self.value == ElementValue::Struct {
            Ok(())
        } else {
            Err(ErrorCode::TLVTypeMismatch.into())
        }
    }
}

/// Reads TLV elements one at a time. Containers are reported as a start
/// element, their members, then an `EndCnt` element.
pub struct TLVReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> TLVReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, off: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.off >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let data: &'a [u8] = self.data;
        let end = self.off.checked_add(len).ok_or(ErrorCode::TruncatedPacket)?;
        let slice = data.get(self.off..end).ok_or(ErrorCode::TruncatedPacket)?;
        self.off = end;
        Ok(slice)
    }

    fn read_uint(&mut self, len: usize) -> Result<u64, Error> {
        let mut bytes = [0; 8];
        bytes[..len].copy_from_slice(self.take(len)?);
        Ok(u64::from_le_bytes(bytes))
    }

    fn read_tag(&mut self, tag_ctl: u8) -> Result<TagType, Error> {
        let tag_size = TAG_SIZE_MAP[tag_ctl as usize];
        let val = self.read_uint(tag_size)?;

        Ok(match tag_ctl {
            0 => TagType::Anonymous,
            1 => TagType::Context(val as u8),
            2 => TagType::CommonPrf16(val as u16),
            3 => TagType::CommonPrf32(val as u32),
            4 => TagType::ImplPrf16(val as u16),
            5 => TagType::ImplPrf32(val as u32),
            6 => TagType::FullQual48(val),
            _ => TagType::FullQual64(val),
        })
    }

    fn sign_extend(val: u64, len: usize) -> i64 {
        let shift = 64 - (len as u32) * 8;
        ((val << shift) as i64) >> shift
    }

    /// Returns the next element, or `None` once the data is exhausted.
    pub fn next_element(&mut self) -> Result<Option<TLVElement<'a>>, Error> {
        if self.is_empty() {
            return Ok(None);
        }

        let control = self.take(1)?[0];
        let elem_type: ElementType = num::FromPrimitive::from_u8(control & TYPE_MASK)
            .ok_or_else(|| {
                error!("Invalid TLV element type in control byte {:x}", control);
                Error::new(ErrorCode::InvalidData)
            })?;
        let tag = self.read_tag((control & TAG_MASK) >> TAG_SHIFT_BITS)?;
        let len = elem_type.value_len();

        let value = match elem_type {
            ElementType::S8 | ElementType::S16 | ElementType::S32 | ElementType::S64 => {
                ElementValue::Signed(Self::sign_extend(self.read_uint(len)?, len))
            }
            ElementType::U8 | ElementType::U16 | ElementType::U32 | ElementType::U64 => {
                ElementValue::Unsigned(self.read_uint(len)?)
            }
            ElementType::False => ElementValue::Bool(false),
            ElementType::True => ElementValue::Bool(true),
            ElementType::F32 => ElementValue::F32(f32::from_bits(self.read_uint(len)? as u32)),
            ElementType::F64 => ElementValue::F64(f64::from_bits(self.read_uint(len)?)),
            ElementType::Utf8l
            | ElementType::Utf16l
            | ElementType::Utf32l
            | ElementType::Utf64l => {
                let str_len = usize::try_from(self.read_uint(len)?)
                    .map_err(|_| ErrorCode::TruncatedPacket)?;
                ElementValue::Utf8(self.take(str_len)?)
            }
            ElementType::Str8l
            | ElementType::Str16l
            | ElementType::Str32l
            | ElementType::Str64l => {
                let str_len = usize::try_from(self.read_uint(len)?)
                    .map_err(|_| ErrorCode::TruncatedPacket)?;
                ElementValue::Str(self.take(str_len)?)
            }
            ElementType::Null => ElementValue::Null,
            ElementType::Struct => ElementValue::Struct,
            ElementType::Array => ElementValue::Array,
            ElementType::List => ElementValue::List,
            ElementType::EndCnt => ElementValue::EndCnt,
        };

        Ok(Some(TLVElement { tag, value }))
    }

    /// Like `next_element`, but running out of data is an error.
    pub fn next_required(&mut self) -> Result<TLVElement<'a>, Error> {
        self.next_element()?
            .ok_or_else(|| ErrorCode::TruncatedPacket.into())
    }

    /// Skips the remainder of the container whose start element was just read,
    /// including its end marker.
    pub fn skip_container(&mut self) -> Result<(), Error> {
        let mut depth = 1_usize;

        while depth > 0 {
            let element = self.next_required()?;

            if element.is_container_start() {
                depth += 1;
            } else if element.is_end_container() {
                depth -= 1;
            }
        }

        Ok(())
    }
}

pub struct TLVWriter<'a, 'b> {
    buf: &'a mut WriteBuf<'b>,
}

impl<'a, 'b> TLVWriter<'a, 'b> {
    pub fn new(buf: &'a mut WriteBuf<'b>) -> Self {
        TLVWriter { buf }
    }

    fn put_control_tag(&mut self, tag_type: TagType, val_type: ElementType) -> Result<(), Error> {
        let (tag_id, tag_val) = match tag_type {
            TagType::Anonymous => (0_u8, 0),
            TagType::Context(v) => (1, v as u64),
            TagType::CommonPrf16(v) => (2, v as u64),
            TagType::CommonPrf32(v) => (3, v as u64),
            TagType::ImplPrf16(v) => (4, v as u64),
            TagType::ImplPrf32(v) => (5, v as u64),
            TagType::FullQual48(v) => (6, v),
            TagType::FullQual64(v) => (7, v),
        };
        self.buf
            .le_u8((tag_id << TAG_SHIFT_BITS) | (val_type as u8))?;
        if tag_type != TagType::Anonymous {
            self.buf.le_uint(TAG_SIZE_MAP[tag_id as usize], tag_val)?;
        }
        Ok(())
    }

    pub fn i8(&mut self, tag_type: TagType, data: i8) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::S8)?;
        self.buf.le_i8(data)
    }

    pub fn i16(&mut self, tag_type: TagType, data: i16) -> Result<(), Error> {
        if let Ok(data) = i8::try_from(data) {
            self.i8(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::S16)?;
            self.buf.le_i16(data)
        }
    }

    pub fn i32(&mut self, tag_type: TagType, data: i32) -> Result<(), Error> {
        if let Ok(data) = i16::try_from(data) {
            self.i16(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::S32)?;
            self.buf.le_i32(data)
        }
    }

    pub fn i64(&mut self, tag_type: TagType, data: i64) -> Result<(), Error> {
        if let Ok(data) = i32::try_from(data) {
            self.i32(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::S64)?;
            self.buf.le_i64(data)
        }
    }

    pub fn u8(&mut self, tag_type: TagType, data: u8) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::U8)?;
        self.buf.le_u8(data)
    }

    pub fn u16(&mut self, tag_type: TagType, data: u16) -> Result<(), Error> {
        if let Ok(data) = u8::try_from(data) {
            self.u8(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::U16)?;
            self.buf.le_u16(data)
        }
    }

    pub fn u32(&mut self, tag_type: TagType, data: u32) -> Result<(), Error> {
        if let Ok(data) = u16::try_from(data) {
            self.u16(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::U32)?;
            self.buf.le_u32(data)
        }
    }

    pub fn u64(&mut self, tag_type: TagType, data: u64) -> Result<(), Error> {
        if let Ok(data) = u32::try_from(data) {
            self.u32(tag_type, data)
        } else {
            self.put_control_tag(tag_type, ElementType::U64)?;
            self.buf.le_u64(data)
        }
    }

    pub fn bool(&mut self, tag_type: TagType, data: bool) -> Result<(), Error> {
        if data {
            self.put_control_tag(tag_type, ElementType::True)
        } else {
            self.put_control_tag(tag_type, ElementType::False)
        }
    }

    pub fn null(&mut self, tag_type: TagType) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::Null)
    }

    pub fn str8(&mut self, tag_type: TagType, data: &[u8]) -> Result<(), Error> {
        let len = u8::try_from(data.len()).map_err(|_| {
            error!("Octet string of {} bytes does not fit a str8", data.len());
            Error::new(ErrorCode::InvalidArgument)
        })?;
        self.put_control_tag(tag_type, ElementType::Str8l)?;
        self.buf.le_u8(len)?;
        self.buf.append(data)
    }

    pub fn start_struct(&mut self, tag_type: TagType) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::Struct)
    }

    pub fn start_array(&mut self, tag_type: TagType) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::Array)
    }

    pub fn start_list(&mut self, tag_type: TagType) -> Result<(), Error> {
        self.put_control_tag(tag_type, ElementType::List)
    }

    pub fn end_container(&mut self) -> Result<(), Error> {
        self.put_control_tag(TagType::Anonymous, ElementType::EndCnt)
    }

    pub fn get_tail(&self) -> usize {
        self.buf.get_tail()
    }

    pub fn rewind_to(&mut self, anchor: usize) {
        self.buf.rewind_tail_to(anchor);
    }
}
