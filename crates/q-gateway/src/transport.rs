// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Boundary transport
//!
//! A [`Message`] is one boundary call as the secure partition sees it: a type
//! tag, the caller identity, one input vector and one output vector. Bytes
//! move only through [`Message::read`] and [`Message::write`].

use q_common::types::ClientOrigin;
use q_common::{Error, Result};

use crate::wire::WireStruct;

/// One boundary call
pub struct Message<'a> {
    msg_type: u32,
    client_id: i32,
    input: &'a [u8],
    output: &'a mut [u8],
    written: usize,
}

impl<'a> Message<'a> {
    /// Wrap the vectors of a call
    pub fn new(msg_type: u32, client_id: i32, input: &'a [u8], output: &'a mut [u8]) -> Self {
        Self {
            msg_type,
            client_id,
            input,
            output,
            written: 0,
        }
    }

    /// Message type tag
    #[must_use]
    pub const fn msg_type(&self) -> u32 {
        self.msg_type
    }

    /// Transport client identifier
    #[must_use]
    pub const fn client_id(&self) -> i32 {
        self.client_id
    }

    /// Domain the call came from
    #[must_use]
    pub const fn origin(&self) -> ClientOrigin {
        ClientOrigin::from_client_id(self.client_id)
    }

    /// Input vector length
    #[must_use]
    pub const fn in_size(&self) -> usize {
        self.input.len()
    }

    /// Output vector length
    #[must_use]
    pub fn out_size(&self) -> usize {
        self.output.len()
    }

    /// Bytes written to the output vector so far
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    /// Copy input bytes starting at `offset` into `dest`, returning the count
    pub fn read(&self, offset: usize, dest: &mut [u8]) -> usize {
        let Some(available) = self.input.get(offset..) else {
            return 0;
        };
        let n = available.len().min(dest.len());
        dest[..n].copy_from_slice(&available[..n]);
        n
    }

    /// Copy `src` into the output vector at `offset`
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] if `src` does not fit.
    pub fn write(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let end = offset.checked_add(src.len()).ok_or(Error::InvalidMessageSize)?;
        let dest = self.output.get_mut(offset..end).ok_or(Error::InvalidMessageSize)?;
        dest.copy_from_slice(src);
        self.written = self.written.max(end);
        Ok(())
    }

    /// Check both vector sizes exactly
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] on any mismatch.
    pub fn expect_sizes(&self, in_size: usize, out_size: usize) -> Result<()> {
        if self.in_size() != in_size || self.out_size() != out_size {
            return Err(Error::InvalidMessageSize);
        }
        Ok(())
    }

    /// Check both vector sizes, then decode the input vector
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] if either size is not exact.
    pub fn read_input<T: WireStruct>(&self, out_size: usize) -> Result<T> {
        self.expect_sizes(T::SIZE, out_size)?;
        T::decode(self.input)
    }

    /// Encode `reply` at the start of the output vector
    ///
    /// # Errors
    /// Returns [`Error::InvalidMessageSize`] if the output vector is too short.
    pub fn write_reply<T: WireStruct>(&mut self, reply: &T) -> Result<()> {
        let mut bytes = [0u8; crate::wire::MAX_WIRE_SIZE];
        let encoded = bytes.get_mut(..T::SIZE).ok_or(Error::InternalError)?;
        reply.encode(encoded)?;
        self.write(0, encoded)
    }
}
