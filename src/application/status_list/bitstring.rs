/*
  Copyright (c) 2018-present evan GmbH.

  Licensed under the Apache License, Version 2.0 (the "License");
  you may not use this file except in compliance with the License.
  You may obtain a copy of the License at

      http://www.apache.org/licenses/LICENSE-2.0

  Unless required by applicable law or agreed to in writing, software
  distributed under the License is distributed on an "AS IS" BASIS,
  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
  See the License for the specific language governing permissions and
  limitations under the License.
*/

//! Bitstring Status List v1.0 codec: a fixed-length bitstring, gzipped, then
//! base64url-encoded without padding. Bit 0 sits at the left-most (most
//! significant) bit of byte 0, per the Bitstring Status List rule that the
//! first index is located at the left-most bit — the opposite convention
//! from a little-endian bit-vector view.

use crate::error::{Error, Result};
use data_encoding::BASE64URL_NOPAD;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Total number of entries in a single status list. 131,072 bits is exactly
/// 16 KiB uncompressed, the minimum size the Bitstring Status List spec
/// requires.
pub const LIST_LENGTH: usize = 131_072;

/// An in-memory bitstring of exactly [`LIST_LENGTH`] bits, MSB-first within
/// each byte.
#[derive(Debug, Clone)]
pub struct Bitstring {
    bytes: Vec<u8>,
}

impl Bitstring {
    pub fn new_all_unset() -> Self {
        Bitstring {
            bytes: vec![0u8; LIST_LENGTH / 8],
        }
    }

    fn locate(index: u32) -> Result<(usize, u8)> {
        let index = index as usize;
        if index >= LIST_LENGTH {
            return Err(Error::Invalid(format!(
                "status list index {} out of range (list length is {})",
                index, LIST_LENGTH
            )));
        }
        let byte = index / 8;
        // MSB-first: bit 0 of an index maps to the 0x80 bit of its byte.
        let mask = 0x80u8 >> (index % 8);
        Ok((byte, mask))
    }

    pub fn set(&mut self, index: u32, value: bool) -> Result<()> {
        let (byte, mask) = Self::locate(index)?;
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
        Ok(())
    }

    pub fn get(&self, index: u32) -> Result<bool> {
        let (byte, mask) = Self::locate(index)?;
        Ok(self.bytes[byte] & mask != 0)
    }

    /// Gzips then base64url-encodes (no padding) the raw bitstring, per the
    /// `encodedList` wire format.
    pub fn encode(&self) -> Result<String> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.bytes)?;
        let compressed = encoder.finish()?;
        Ok(BASE64URL_NOPAD.encode(&compressed))
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let compressed = BASE64URL_NOPAD
            .decode(encoded.as_bytes())
            .map_err(|e| Error::Invalid(format!("invalid base64url status list: {}", e)))?;
        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        if bytes.len() != LIST_LENGTH / 8 {
            return Err(Error::Invalid(format!(
                "decoded status list has {} bytes, expected {}",
                bytes.len(),
                LIST_LENGTH / 8
            )));
        }
        Ok(Bitstring { bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_gzip_and_base64() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let mut bits = Bitstring::new_all_unset();
        bits.set(0, true).unwrap();
        bits.set(42, true).unwrap();
        bits.set(LIST_LENGTH as u32 - 1, true).unwrap();

        let encoded = bits.encode().unwrap();
        let decoded = Bitstring::decode(&encoded).unwrap();

        assert!(decoded.get(0).unwrap());
        assert!(decoded.get(42).unwrap());
        assert!(decoded.get(LIST_LENGTH as u32 - 1).unwrap());
        assert!(!decoded.get(1).unwrap());
    }

    #[test]
    fn index_zero_is_left_most_bit_of_first_byte() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let mut bits = Bitstring::new_all_unset();
        bits.set(0, true).unwrap();
        assert_eq!(bits.bytes[0], 0b1000_0000);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let mut bits = Bitstring::new_all_unset();
        assert!(bits.set(LIST_LENGTH as u32, true).is_err());
        assert!(bits.get(LIST_LENGTH as u32).is_err());
    }

    #[test]
    fn new_bitstring_has_every_bit_unset() {
        match env_logger::try_init() {
            Ok(_) | Err(_) => (),
        };

        let bits = Bitstring::new_all_unset();
        for index in [0, 1, 100, LIST_LENGTH as u32 - 1] {
            assert!(!bits.get(index).unwrap());
        }
    }
}
