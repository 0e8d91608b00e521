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

use core::borrow::{Borrow, BorrowMut};

use crate::error::*;

/// A cursor for reading little-endian data off the head (and trailers off the tail) of a byte slice.
pub struct ReadBuf<T> {
    buf: T,
    read_off: usize,
    left: usize,
}

impl<T> ReadBuf<T>
where
    T: Borrow<[u8]>,
{
    pub fn new(buf: T) -> Self {
        let left = buf.borrow().len();

        Self {
            buf,
            read_off: 0,
            left,
        }
    }

    pub fn reset(&mut self) {
        self.read_off = 0;
        self.left = self.buf.borrow().len();
    }

    pub fn remaining(&self) -> usize {
        self.left
    }

    pub fn is_empty(&self) -> bool {
        self.left == 0
    }

    // The not-yet-parsed data
    pub fn as_slice(&self) -> &[u8] {
        &self.buf.borrow()[self.read_off..(self.read_off + self.left)]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8]
    where
        T: BorrowMut<[u8]>,
    {
        &mut self.buf.borrow_mut()[self.read_off..(self.read_off + self.left)]
    }

    // Everything consumed so far from the head
    pub fn parsed_as_slice(&self) -> &[u8] {
        &self.buf.borrow()[0..self.read_off]
    }

    /// Splits the buffer into the parsed head and the mutable remainder,
    /// as needed for in-place decryption with the header as AAD.
    pub fn split_parsed_mut(&mut self) -> (&[u8], &mut [u8])
    where
        T: BorrowMut<[u8]>,
    {
        let (read_off, left) = (self.read_off, self.left);
        let (head, rest) = self.buf.borrow_mut().split_at_mut(read_off);

        (head, &mut rest[..left])
    }

    pub fn tail(&mut self, size: usize) -> Result<&[u8], Error> {
        if size <= self.left {
            let end_offset = self.read_off + self.left;
            let tail = &self.buf.borrow()[(end_offset - size)..end_offset];
            self.left -= size;
            return Ok(tail);
        }
        Err(ErrorCode::TruncatedPacket.into())
    }

    fn advance(&mut self, len: usize) {
        self.read_off += len;
        self.left -= len;
    }

    pub fn parse_slice(&mut self, size: usize) -> Result<&[u8], Error> {
        if self.left >= size {
            let start = self.read_off;
            self.advance(size);
            return Ok(&self.buf.borrow()[start..start + size]);
        }
        Err(ErrorCode::TruncatedPacket.into())
    }

    pub fn skip(&mut self, size: usize) -> Result<(), Error> {
        self.parse_slice(size).map(|_| ())
    }

    fn parse_as_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let data: [u8; N] = self.parse_slice(N)?.try_into()?;
        Ok(data)
    }

    pub fn le_u8(&mut self) -> Result<u8, Error> {
        self.parse_as_array::<1>().map(|x| x[0])
    }

    pub fn le_u16(&mut self) -> Result<u16, Error> {
        self.parse_as_array().map(u16::from_le_bytes)
    }

    pub fn le_u32(&mut self) -> Result<u32, Error> {
        self.parse_as_array().map(u32::from_le_bytes)
    }

    pub fn le_u64(&mut self) -> Result<u64, Error> {
        self.parse_as_array().map(u64::from_le_bytes)
    }

    /// Reads an unsigned little-endian integer of `nbytes` (at most 8) bytes.
    pub fn le_uint(&mut self, nbytes: usize) -> Result<u64, Error> {
        if nbytes > 8 {
            Err(ErrorCode::InvalidArgument)?;
        }

        let data = self.parse_slice(nbytes)?;
        let mut bytes = [0; 8];
        bytes[..nbytes].copy_from_slice(data);

        Ok(u64::from_le_bytes(bytes))
    }
}

pub type ParseBuf<'a> = ReadBuf<&'a mut [u8]>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_success() {
        let mut test_slice = [0x01, 65, 0, 0xbe, 0xba, 0xfe, 0xca, 0xa, 0xb, 0xc, 0xd];
        let mut buf = ParseBuf::new(&mut test_slice);

        assert_eq!(buf.le_u8().unwrap(), 0x01);
        assert_eq!(buf.le_u16().unwrap(), 65);
        assert_eq!(buf.le_u32().unwrap(), 0xcafebabe);
        assert_eq!(buf.as_slice(), [0xa, 0xb, 0xc, 0xd]);
        assert_eq!(buf.remaining(), 4);
    }

    #[test]
    fn test_parse_overrun_leaves_cursor() {
        let mut test_slice = [0x01, 65];
        let mut buf = ParseBuf::new(&mut test_slice);

        assert_eq!(buf.le_u8().unwrap(), 0x01);
        assert_eq!(
            buf.le_u16().unwrap_err().code(),
            ErrorCode::TruncatedPacket
        );
        assert!(buf.le_u32().is_err());

        assert_eq!(buf.le_u8().unwrap(), 65);
        assert!(buf.le_u8().is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_tail_strips_trailer() {
        let mut test_slice = [0x01, 65, 0, 0xbe, 0xba, 0xfe, 0xca, 0xa, 0xb, 0xc, 0xd];
        let mut buf = ParseBuf::new(&mut test_slice);

        buf.skip(7).unwrap();
        assert!(buf.tail(5).is_err());
        assert_eq!(buf.tail(2).unwrap(), [0xc, 0xd]);
        assert_eq!(buf.as_slice(), [0xa, 0xb]);
        assert_eq!(buf.parsed_as_slice(), [0x01, 65, 0, 0xbe, 0xba, 0xfe, 0xca]);
    }

    #[test]
    fn test_le_uint_and_split() {
        let mut test_slice = [0x34, 0x12, 0x56, 0xaa, 0xbb];
        let mut buf = ParseBuf::new(&mut test_slice);

        assert_eq!(buf.le_uint(3).unwrap(), 0x561234);
        assert!(buf.le_uint(9).is_err());

        let (head, rest) = buf.split_parsed_mut();
        assert_eq!(head, [0x34, 0x12, 0x56]);
        rest[0] = 0xcc;
        assert_eq!(buf.as_slice(), [0xcc, 0xbb]);
    }

    #[test]
    fn test_read_only_slice() {
        let data = [0x05, 0x00, 0x01];
        let mut buf = ReadBuf::new(&data[..]);

        assert_eq!(buf.le_u16().unwrap(), 5);
        assert_eq!(buf.parse_slice(1).unwrap(), [0x01]);
        buf.reset();
        assert_eq!(buf.remaining(), 3);
    }
}
