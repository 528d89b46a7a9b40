//! RPack byte-substitution tables.
//!
//! RPack is the transform RisuAI applies to every block of a `.risum`
//! container. It is a fixed bijection on byte values: encoding maps each
//! input byte through [`ENCODE_TABLE`], decoding maps back through
//! [`DECODE_TABLE`]. Output length always equals input length.

use super::{Codec, CodecError, CodecId};

pub struct RPackCodec;

impl Codec for RPackCodec {
    fn codec_id(&self) -> CodecId { CodecId::RPack }
    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.iter().map(|&b| ENCODE_TABLE[b as usize]).collect())
    }
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.iter().map(|&b| DECODE_TABLE[b as usize]).collect())
    }
}

pub(crate) const ENCODE_TABLE: [u8; 256] = [
    0xc4, 0x0d, 0x1e, 0x0b, 0xbd, 0x2b, 0x3f, 0x55, 0xfc, 0x45, 0x6e, 0xf5, 0x66, 0x53, 0x4f, 0x1a,
    0xe0, 0xbb, 0x30, 0x94, 0x86, 0xba, 0x6b, 0xbf, 0x41, 0x50, 0x6f, 0x9b, 0xef, 0xde, 0xb7, 0x10,
    0x61, 0x17, 0x20, 0xdf, 0x32, 0x89, 0xa8, 0x9d, 0x6d, 0xab, 0xc9, 0x90, 0x00, 0x0c, 0x5d, 0xaf,
    0xd2, 0xc1, 0x56, 0xe5, 0x16, 0x64, 0x91, 0x82, 0x65, 0x74, 0x97, 0xca, 0x23, 0xd6, 0x52, 0xd1,
    0xff, 0xb4, 0xa0, 0xe8, 0x2f, 0x8a, 0x58, 0x38, 0x5a, 0x60, 0x19, 0x96, 0x49, 0xdb, 0xd7, 0xc8,
    0x3b, 0x3e, 0x43, 0x4b, 0xa5, 0x63, 0x47, 0xaa, 0x6a, 0x29, 0x92, 0xf4, 0x15, 0xcf, 0x62, 0x34,
    0x78, 0xd3, 0x1d, 0x3c, 0xe2, 0x05, 0x8e, 0x2a, 0x57, 0x0e, 0x1b, 0xcd, 0x4c, 0x2d, 0xf2, 0x40,
    0x2c, 0x25, 0x79, 0x48, 0x0f, 0xb2, 0x7a, 0xb5, 0xa7, 0x6c, 0x37, 0xe6, 0x9c, 0x7b, 0x54, 0x7e,
    0xfe, 0x87, 0xdc, 0x9a, 0x02, 0xe4, 0x33, 0xa2, 0xeb, 0xb1, 0x2e, 0x03, 0xdd, 0x99, 0xa6, 0xb0,
    0xe7, 0xd5, 0x88, 0x18, 0x83, 0x7c, 0xf6, 0xbe, 0xe1, 0x5c, 0x9f, 0xc3, 0x21, 0x46, 0x1f, 0x08,
    0x4e, 0xd0, 0x76, 0x12, 0x5f, 0xee, 0xfd, 0x8f, 0x44, 0xea, 0xa3, 0x5e, 0x8b, 0x28, 0x09, 0x35,
    0x9e, 0x69, 0xcc, 0x0a, 0xc7, 0x85, 0x07, 0xad, 0x4a, 0xf3, 0x77, 0xe9, 0x67, 0xd4, 0xda, 0x84,
    0x80, 0x93, 0xb6, 0x4d, 0x73, 0xfa, 0x27, 0x26, 0x7f, 0x04, 0xc6, 0xfb, 0xf1, 0x72, 0x39, 0x51,
    0xc2, 0x36, 0xa9, 0x68, 0xac, 0xf8, 0xed, 0xc5, 0xb9, 0xcb, 0xce, 0x75, 0xa4, 0x3d, 0x81, 0xd9,
    0x42, 0x70, 0x1c, 0x95, 0x11, 0xbc, 0xd8, 0x8c, 0x98, 0xf9, 0x59, 0xa1, 0x13, 0xf7, 0x14, 0x7d,
    0xb3, 0xec, 0x71, 0xc0, 0xe3, 0x8d, 0xf0, 0x01, 0xae, 0x5b, 0x31, 0x06, 0x24, 0x22, 0x3a, 0xb8,
];

pub(crate) const DECODE_TABLE: [u8; 256] = [
    0x2c, 0xf7, 0x84, 0x8b, 0xc9, 0x65, 0xfb, 0xb6, 0x9f, 0xae, 0xb3, 0x03, 0x2d, 0x01, 0x69, 0x74,
    0x1f, 0xe4, 0xa3, 0xec, 0xee, 0x5c, 0x34, 0x21, 0x93, 0x4a, 0x0f, 0x6a, 0xe2, 0x62, 0x02, 0x9e,
    0x22, 0x9c, 0xfd, 0x3c, 0xfc, 0x71, 0xc7, 0xc6, 0xad, 0x59, 0x67, 0x05, 0x70, 0x6d, 0x8a, 0x44,
    0x12, 0xfa, 0x24, 0x86, 0x5f, 0xaf, 0xd1, 0x7a, 0x47, 0xce, 0xfe, 0x50, 0x63, 0xdd, 0x51, 0x06,
    0x6f, 0x18, 0xe0, 0x52, 0xa8, 0x09, 0x9d, 0x56, 0x73, 0x4c, 0xb8, 0x53, 0x6c, 0xc3, 0xa0, 0x0e,
    0x19, 0xcf, 0x3e, 0x0d, 0x7e, 0x07, 0x32, 0x68, 0x46, 0xea, 0x48, 0xf9, 0x99, 0x2e, 0xab, 0xa4,
    0x49, 0x20, 0x5e, 0x55, 0x35, 0x38, 0x0c, 0xbc, 0xd3, 0xb1, 0x58, 0x16, 0x79, 0x28, 0x0a, 0x1a,
    0xe1, 0xf2, 0xcd, 0xc4, 0x39, 0xdb, 0xa2, 0xba, 0x60, 0x72, 0x76, 0x7d, 0x95, 0xef, 0x7f, 0xc8,
    0xc0, 0xde, 0x37, 0x94, 0xbf, 0xb5, 0x14, 0x81, 0x92, 0x25, 0x45, 0xac, 0xe7, 0xf5, 0x66, 0xa7,
    0x2b, 0x36, 0x5a, 0xc1, 0x13, 0xe3, 0x4b, 0x3a, 0xe8, 0x8d, 0x83, 0x1b, 0x7c, 0x27, 0xb0, 0x9a,
    0x42, 0xeb, 0x87, 0xaa, 0xdc, 0x54, 0x8e, 0x78, 0x26, 0xd2, 0x57, 0x29, 0xd4, 0xb7, 0xf8, 0x2f,
    0x8f, 0x89, 0x75, 0xf0, 0x41, 0x77, 0xc2, 0x1e, 0xff, 0xd8, 0x15, 0x11, 0xe5, 0x04, 0x97, 0x17,
    0xf3, 0x31, 0xd0, 0x9b, 0x00, 0xd7, 0xca, 0xb4, 0x4f, 0x2a, 0x3b, 0xd9, 0xb2, 0x6b, 0xda, 0x5d,
    0xa1, 0x3f, 0x30, 0x61, 0xbd, 0x91, 0x3d, 0x4e, 0xe6, 0xdf, 0xbe, 0x4d, 0x82, 0x8c, 0x1d, 0x23,
    0x10, 0x98, 0x64, 0xf4, 0x85, 0x33, 0x7b, 0x90, 0x43, 0xbb, 0xa9, 0x88, 0xf1, 0xd6, 0xa5, 0x1c,
    0xf6, 0xcc, 0x6e, 0xb9, 0x5b, 0x0b, 0x96, 0xed, 0xd5, 0xe9, 0xc5, 0xcb, 0x08, 0xa6, 0x80, 0x40,
];
