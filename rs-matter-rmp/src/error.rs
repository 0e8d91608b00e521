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

use core::{array::TryFromSliceError, fmt};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ErrorCode {
    AlreadyRegistered,
    BufferTooSmall,
    Crypto,
    Duplicate,
    Invalid,
    InvalidArgument,
    InvalidData,
    InvalidOpcode,
    InvalidState,
    MsgCounterExhausted,
    NoExchange,
    NoHandler,
    NoMemory,
    NoSession,
    NoSpace,
    NoSpaceExchanges,
    NoSpaceSessions,
    NotFound,
    StdIoError,
    Timeout,
    TLVNotFound,
    TLVTypeMismatch,
    TruncatedPacket,
}

impl From<ErrorCode> for Error {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// The error type of the crate: an `ErrorCode`, plus where it was raised
/// when built with the `backtrace` feature.
pub struct Error {
    code: ErrorCode,
    #[cfg(feature = "backtrace")]
    backtrace: std::backtrace::Backtrace,
}

impl Error {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            #[cfg(feature = "backtrace")]
            backtrace: std::backtrace::Backtrace::capture(),
        }
    }

    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    #[cfg(feature = "backtrace")]
    pub const fn backtrace(&self) -> &std::backtrace::Backtrace {
        &self.backtrace
    }

    /// Errors after which the exchange they were raised on can no longer make progress.
    pub fn is_exchange_terminal(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::Timeout | ErrorCode::NoSession | ErrorCode::MsgCounterExhausted
        )
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        Self::new(self.code)
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        log::debug!("I/O error: {}", err);
        Self::new(ErrorCode::StdIoError)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_e: TryFromSliceError) -> Self {
        Self::new(ErrorCode::Invalid)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error::{:?}", self.code)?;

        #[cfg(feature = "backtrace")]
        write!(f, "\n{}", self.backtrace)?;

        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.code)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
