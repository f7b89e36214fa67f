#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! # `MoosicBox` Range Coder
//!
//! `RFC 6716` Section 4.1 / 5.1 compliant range encoder and decoder.
//!
//! The encoder writes range-coded symbols from the front of a fixed-capacity
//! frame buffer and raw bits from the back of the same buffer. The decoder
//! mirrors it bit-exactly: an encoder and a decoder that issue the same
//! sequence of operations finish with identical `range` values.
//!
//! Data errors (a full buffer, a corrupt stream) never abort coding. They are
//! recorded in a sticky error slot that callers poll with
//! [`RangeEncoder::error`] / [`RangeDecoder::error`] once the frame is done.
//!
//! # Examples
//!
//! ```rust
//! use moosicbox_range_coder::{RangeDecoder, RangeEncoder};
//!
//! let mut buffer = [0_u8; 32];
//! let mut encoder = RangeEncoder::new(&mut buffer);
//! encoder.ec_encode(0, 1, 4);
//! encoder.ec_encode(2, 3, 4);
//! encoder.ec_enc_uint(1000, 1200);
//! let len = encoder.finish().unwrap();
//! assert!(len <= 32);
//!
//! let mut decoder = RangeDecoder::new(&buffer);
//! let fs = decoder.ec_decode(4);
//! assert_eq!(fs, 0);
//! decoder.ec_dec_update(0, 1, 4);
//! let fs = decoder.ec_decode(4);
//! assert_eq!(fs, 2);
//! decoder.ec_dec_update(2, 3, 4);
//! assert_eq!(decoder.ec_dec_uint(1200), 1000);
//! assert!(!decoder.has_error());
//! ```

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod laplace;
mod util;

pub use decoder::RangeDecoder;
pub use encoder::RangeEncoder;
pub use error::{Error, Result};
pub use util::ilog;

/// Number of bits output per renormalization step.
pub const SYM_BITS: u32 = 8;

/// Total number of bits in each of the state registers.
pub const CODE_BITS: u32 = 32;

/// Maximum symbol value.
pub const SYM_MAX: u32 = (1 << SYM_BITS) - 1;

/// Bits to shift by to move a symbol into the high-order position.
pub const CODE_SHIFT: u32 = CODE_BITS - SYM_BITS - 1;

/// Carry bit of the high-order range symbol. Also the initial encoder range.
pub const CODE_TOP: u32 = 1 << (CODE_BITS - 1);

/// Low-order bit of the high-order range symbol.
///
/// `range` is always strictly greater than this after any operation.
pub const CODE_BOT: u32 = CODE_TOP >> SYM_BITS;

/// Number of bits available for the last, partial symbol in the code field.
pub const CODE_EXTRA: u32 = (CODE_BITS - 2) % SYM_BITS + 1;

/// Number of bits to use for the range-coded part of unsigned integers.
pub const UINT_BITS: u32 = 8;

/// Resolution of fractional-precision bit usage measurements (1/8 bit).
pub const BITRES: u32 = 3;

/// Width of the raw-bit window.
pub const WINDOW_SIZE: u32 = 32;

/// Largest number of raw bits that can be coded by a single call.
pub const MAX_RAW_BITS: u32 = 25;

/// Largest total frequency accepted by the symbol coder.
pub const MAX_FT: u32 = 1 << 16;

/// Largest frame size handed to the coder by the Opus framing layer.
pub const MAX_FRAME_BYTES: usize = 1275;
