//! Backing storage for the nine VRAM banks

use crate::vram::BankId;
use bincode::de::read::Reader;
use bincode::de::{BorrowDecoder, Decoder};
use bincode::enc::Encoder;
use bincode::enc::write::Writer;
use bincode::error::{DecodeError, EncodeError};
use bincode::{BorrowDecode, Decode, Encode};
use std::array;

#[derive(Debug, Clone)]
pub(crate) struct Banks([Box<[u8]>; BankId::ALL.len()]);

impl Banks {
    pub(crate) fn new() -> Self {
        Self(BankId::ALL.map(|bank| vec![0; bank.len()].into_boxed_slice()))
    }

    pub(crate) fn clear(&mut self) {
        for bank in &mut self.0 {
            bank.fill(0);
        }
    }

    #[inline]
    pub(crate) fn get(&self, bank: BankId) -> &[u8] {
        &self.0[bank as usize]
    }

    #[inline]
    pub(crate) fn read<const N: usize>(&self, bank: BankId, offset: usize) -> [u8; N] {
        let data = &self.0[bank as usize];
        array::from_fn(|i| data[offset + i])
    }

    #[inline]
    pub(crate) fn write<const N: usize>(&mut self, bank: BankId, offset: usize, bytes: [u8; N]) {
        self.0[bank as usize][offset..offset + N].copy_from_slice(&bytes);
    }
}

// Banks are written as raw fixed-length byte runs with no length prefix; the length is implied by
// the bank ID
impl Encode for Banks {
    fn encode<E: Encoder>(&self, encoder: &mut E) -> Result<(), EncodeError> {
        for bank in &self.0 {
            encoder.writer().write(bank)?;
        }

        Ok(())
    }
}

fn decode_banks<R: Reader>(reader: &mut R) -> Result<Banks, DecodeError> {
    let mut banks = Banks::new();
    for bank in &mut banks.0 {
        reader.read(bank)?;
    }

    Ok(banks)
}

impl<Context> Decode<Context> for Banks {
    fn decode<D: Decoder<Context = Context>>(decoder: &mut D) -> Result<Self, DecodeError> {
        decode_banks(decoder.reader())
    }
}

impl<'de, Context> BorrowDecode<'de, Context> for Banks {
    fn borrow_decode<D: BorrowDecoder<'de, Context = Context>>(
        decoder: &mut D,
    ) -> Result<Self, DecodeError> {
        decode_banks(decoder.reader())
    }
}
