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

use crate::error::*;
use byteorder::{ByteOrder, LittleEndian};

/// A buffer that is filled from a reserved head room: headers are prepended,
/// payload and trailers are appended.
#[derive(Debug)]
pub struct WriteBuf<'a> {
    buf: &'a mut [u8],
    start: usize,
    end: usize,
}

impl<'a> WriteBuf<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self {
            buf,
            start: 0,
            end: 0,
        }
    }

    pub fn get_start(&self) -> usize {
        self.start
    }

    pub fn get_tail(&self) -> usize {
        self.end
    }

    pub fn rewind_tail_to(&mut self, new_end: usize) {
        self.end = new_end;
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.start..self.end]
    }

    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    /// Sets aside `reserve` bytes of head room for later `prepend` calls.
    /// Only valid on an empty buffer.
    pub fn reserve(&mut self, reserve: usize) -> Result<(), Error> {
        if self.end != 0 || self.start != 0 {
            Err(ErrorCode::Invalid.into())
        } else if reserve > self.buf.len() {
            Err(ErrorCode::NoSpace.into())
        } else {
            self.start = reserve;
            self.end = reserve;
            Ok(())
        }
    }

    pub fn prepend(&mut self, src: &[u8]) -> Result<(), Error> {
        if src.len() <= self.start {
            self.start -= src.len();
            self.buf[self.start..self.start + src.len()].copy_from_slice(src);
            Ok(())
        } else {
            Err(ErrorCode::NoSpace.into())
        }
    }

    fn append_with<F>(&mut self, size: usize, f: F) -> Result<(), Error>
    where
        F: FnOnce(&mut [u8]),
    {
        if self.end + size <= self.buf.len() {
            f(&mut self.buf[self.end..self.end + size]);
            self.end += size;
            return Ok(());
        }
        Err(ErrorCode::NoSpace.into())
    }

    pub fn append(&mut self, src: &[u8]) -> Result<(), Error> {
        self.append_with(src.len(), |x| x.copy_from_slice(src))
    }

    pub fn le_i8(&mut self, data: i8) -> Result<(), Error> {
        self.le_u8(data as u8)
    }

    pub fn le_u8(&mut self, data: u8) -> Result<(), Error> {
        self.append_with(1, |x| x[0] = data)
    }

    pub fn le_u16(&mut self, data: u16) -> Result<(), Error> {
        self.append_with(2, |x| LittleEndian::write_u16(x, data))
    }

    pub fn le_i16(&mut self, data: i16) -> Result<(), Error> {
        self.append_with(2, |x| LittleEndian::write_i16(x, data))
    }

    pub fn le_u32(&mut self, data: u32) -> Result<(), Error> {
        self.append_with(4, |x| LittleEndian::write_u32(x, data))
    }

    pub fn le_i32(&mut self, data: i32) -> Result<(), Error> {
        self.append_with(4, |x| LittleEndian::write_i32(x, data))
    }

    pub fn le_u64(&mut self, data: u64) -> Result<(), Error> {
        self.append_with(8, |x| LittleEndian::write_u64(x, data))
    }

    pub fn le_i64(&mut self, data: i64) -> Result<(), Error> {
        self.append_with(8, |x| LittleEndian::write_i64(x, data))
    }

    pub fn le_uint(&mut self, nbytes: usize, data: u64) -> Result<(), Error> {
        if nbytes == 0 || nbytes > 8 {
            Err(ErrorCode::InvalidArgument)?;
        }

        self.append_with(nbytes, |x| LittleEndian::write_uint(x, data, nbytes))
    }
}
