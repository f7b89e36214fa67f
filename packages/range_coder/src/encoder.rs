use crate::error::{Error, Result};
use crate::util::{ilog, tell, tell_frac};
use crate::{
    CODE_BITS, CODE_BOT, CODE_SHIFT, CODE_TOP, MAX_FT, MAX_RAW_BITS, SYM_BITS, SYM_MAX,
    UINT_BITS, WINDOW_SIZE,
};

/// Range encoder for entropy coding Opus frames.
///
/// Implements the range encoder specified in RFC 6716 Section 5.1. The encoder
/// narrows the interval `[value, value + range)` for every coded symbol and
/// shifts finished high-order bytes out to the front of the buffer. A byte is
/// held back in `rem` until it is known that no carry can reach it, and runs of
/// `0xFF` bytes that a carry would still ripple through are counted in `ext`.
///
/// Raw bits are packed independently into the back of the same buffer. The two
/// regions meet in the middle; [`RangeEncoder::ec_enc_done`] zeroes the gap and
/// ORs any partial raw-bit byte into place.
///
/// # Examples
///
/// ```rust
/// # use moosicbox_range_coder::RangeEncoder;
/// let mut buffer = vec![0_u8; 16];
/// let mut encoder = RangeEncoder::new(&mut buffer);
///
/// encoder.ec_enc_bit_logp(true, 1);
/// encoder.ec_enc_bits(0b101, 3);
/// encoder.ec_enc_done();
///
/// assert!(!encoder.has_error());
/// assert_eq!(encoder.ec_range_bytes(), 1);
/// ```
#[derive(Debug)]
pub struct RangeEncoder<'a> {
    buffer: &'a mut [u8],
    storage: usize,
    offs: usize,
    end_offs: usize,
    end_window: u32,
    end_bits: u32,
    bits_total: u32,
    value: u32,
    range: u32,
    rem: Option<u8>,
    ext: u32,
    error: Option<Error>,
}

impl<'a> RangeEncoder<'a> {
    /// Creates a new range encoder writing into `buffer`.
    ///
    /// The whole buffer is the frame's capacity. Its previous contents are
    /// irrelevant; every byte is either written or cleared by
    /// [`RangeEncoder::ec_enc_done`].
    #[must_use]
    pub fn new(buffer: &'a mut [u8]) -> Self {
        let storage = buffer.len();

        Self {
            buffer,
            storage,
            offs: 0,
            end_offs: 0,
            end_window: 0,
            end_bits: 0,
            // tell() subtracts the partial bits held in the range from this.
            bits_total: CODE_BITS + 1,
            value: 0,
            range: CODE_TOP,
            rem: None,
            ext: 0,
            error: None,
        }
    }

    /// Resets the encoder to its initial state over the whole buffer.
    ///
    /// Also clears the sticky error and undoes any [`RangeEncoder::ec_enc_shrink`].
    pub fn reset(&mut self) {
        self.storage = self.buffer.len();
        self.offs = 0;
        self.end_offs = 0;
        self.end_window = 0;
        self.end_bits = 0;
        self.bits_total = CODE_BITS + 1;
        self.value = 0;
        self.range = CODE_TOP;
        self.rem = None;
        self.ext = 0;
        self.error = None;
    }

    fn set_error(&mut self, error: Error) {
        if self.error.is_none() {
            log::debug!("range encoder error: {error}");
            self.error = Some(error);
        }
    }

    fn write_byte(&mut self, byte: u8) {
        if self.offs + self.end_offs >= self.storage {
            self.set_error(Error::CapacityOverflow {
                storage: self.storage,
            });
            return;
        }

        self.buffer[self.offs] = byte;
        self.offs += 1;
    }

    fn write_byte_at_end(&mut self, byte: u8) {
        if self.offs + self.end_offs >= self.storage {
            self.set_error(Error::CapacityOverflow {
                storage: self.storage,
            });
            return;
        }

        self.end_offs += 1;
        self.buffer[self.storage - self.end_offs] = byte;
    }

    /// Outputs the symbol `c` (a byte plus a possible carry in bit 8).
    ///
    /// A `0xFF` byte could still absorb a carry from a later symbol, so it is
    /// only counted. Any other byte settles the pending byte and the `0xFF` run
    /// ahead of it.
    #[allow(clippy::cast_possible_truncation)]
    fn carry_out(&mut self, c: u32) {
        if c == SYM_MAX {
            self.ext += 1;
            return;
        }

        let carry = c >> SYM_BITS;

        if let Some(rem) = self.rem {
            self.write_byte(((u32::from(rem) + carry) & SYM_MAX) as u8);
        }

        if self.ext > 0 {
            let sym = ((SYM_MAX + carry) & SYM_MAX) as u8;
            while self.ext > 0 {
                self.write_byte(sym);
                self.ext -= 1;
            }
        }

        self.rem = Some((c & SYM_MAX) as u8);
    }

    fn normalize(&mut self) {
        while self.range <= CODE_BOT {
            self.carry_out(self.value >> CODE_SHIFT);
            self.value = (self.value << SYM_BITS) & (CODE_TOP - 1);
            self.range <<= SYM_BITS;
            self.bits_total += SYM_BITS;
        }
    }

    /// Encodes a symbol occupying `[fl, fh)` out of a total frequency `ft`
    /// per RFC 6716 Section 5.1.1.
    ///
    /// The decoder must be able to reconstruct `ft` from the symbols decoded so
    /// far; the alphabet may change from symbol to symbol.
    ///
    /// # Panics
    ///
    /// * If `ft` is not in `2..=65536`
    /// * If `fl < fh <= ft` does not hold
    pub fn ec_encode(&mut self, fl: u32, fh: u32, ft: u32) {
        assert!(ft > 1 && ft <= MAX_FT, "invalid total frequency {ft}");
        assert!(fl < fh && fh <= ft, "invalid symbol interval [{fl}, {fh}) of {ft}");

        let r = self.range / ft;
        if fl > 0 {
            self.value += self.range - r * (ft - fl);
            self.range = r * (fh - fl);
        } else {
            self.range -= r * (ft - fh);
        }

        self.normalize();
    }

    /// Equivalent to [`RangeEncoder::ec_encode`] with `ft = 1 << bits`.
    ///
    /// # Panics
    ///
    /// * If `bits` is not in `1..=16`
    /// * If `fl < fh <= 1 << bits` does not hold
    pub fn ec_encode_bin(&mut self, fl: u32, fh: u32, bits: u32) {
        assert!(bits > 0 && bits <= 16, "invalid frequency precision {bits}");
        let ft = 1_u32 << bits;
        assert!(fl < fh && fh <= ft, "invalid symbol interval [{fl}, {fh}) of {ft}");

        let r = self.range >> bits;
        if fl > 0 {
            self.value += self.range - r * (ft - fl);
            self.range = r * (fh - fl);
        } else {
            self.range -= r * (ft - fh);
        }

        self.normalize();
    }

    /// Encodes a bit that is `true` with probability `1/(1<<logp)`
    /// per RFC 6716 Section 5.1.3.
    ///
    /// # Panics
    ///
    /// * If `logp` is not in `1..=16`
    pub fn ec_enc_bit_logp(&mut self, val: bool, logp: u32) {
        assert!(logp > 0 && logp <= 16, "invalid log probability {logp}");

        let s = self.range >> logp;
        let r = self.range - s;

        if val {
            self.value += r;
            self.range = s;
        } else {
            self.range = r;
        }

        self.normalize();
    }

    /// Encodes symbol `s` using an inverse CDF table per RFC 6716 Section 5.1.3.
    ///
    /// Symbol `s` occupies `[ft - icdf[s - 1], ft - icdf[s])` with
    /// `ft = 1 << ftb` (and `icdf[-1]` taken as `ft`). The table must be
    /// non-increasing and terminated by `0`.
    ///
    /// # Panics
    ///
    /// * If `s` is out of bounds for `icdf`
    pub fn ec_enc_icdf(&mut self, s: usize, icdf: &[u8], ftb: u32) {
        let r = self.range >> ftb;

        if s > 0 {
            let hi = u32::from(icdf[s - 1]);
            self.value += self.range - r * hi;
            self.range = r * (hi - u32::from(icdf[s]));
        } else {
            self.range -= r * u32::from(icdf[s]);
        }

        self.normalize();
    }

    /// Encodes symbol `s` using a 16-bit inverse CDF table.
    ///
    /// Same layout as [`RangeEncoder::ec_enc_icdf`], for high-precision PDFs.
    ///
    /// # Panics
    ///
    /// * If `s` is out of bounds for `icdf`
    pub fn ec_enc_icdf_u16(&mut self, s: usize, icdf: &[u16], ftb: u32) {
        let r = self.range >> ftb;

        if s > 0 {
            let hi = u32::from(icdf[s - 1]);
            self.value += self.range - r * hi;
            self.range = r * (hi - u32::from(icdf[s]));
        } else {
            self.range -= r * u32::from(icdf[s]);
        }

        self.normalize();
    }

    /// Encodes a uniformly distributed integer `fl` in `[0, ft)` per RFC 6716
    /// Section 5.1.4.
    ///
    /// Up to 8 bits are range coded directly. Wider values have their top 8 bits
    /// range coded and the remainder written as raw bits.
    ///
    /// # Panics
    ///
    /// * If `ft < 2` or `fl >= ft`
    pub fn ec_enc_uint(&mut self, fl: u32, ft: u32) {
        assert!(ft > 1, "uint total must be at least 2, got {ft}");
        assert!(fl < ft, "uint value {fl} out of range for total {ft}");

        let ft = ft - 1;
        let ftb = ilog(ft);

        if ftb > UINT_BITS {
            let low_bits = ftb - UINT_BITS;
            let ft_high = (ft >> low_bits) + 1;
            let fl_high = fl >> low_bits;
            self.ec_encode(fl_high, fl_high + 1, ft_high);
            self.ec_enc_bits(fl & ((1 << low_bits) - 1), low_bits);
        } else {
            self.ec_encode(fl, fl + 1, ft + 1);
        }
    }

    /// Packs the low `bits` bits of `fl` into the tail of the buffer per
    /// RFC 6716 Section 5.1.5.
    ///
    /// Raw bits are independent of the range coder state and are read back in
    /// the same order by the decoder.
    ///
    /// # Panics
    ///
    /// * If `bits > 25`
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_bits(&mut self, fl: u32, bits: u32) {
        assert!(
            bits <= MAX_RAW_BITS,
            "cannot encode more than {MAX_RAW_BITS} bits at once, got {bits}"
        );

        if bits == 0 {
            return;
        }

        let fl = fl & ((1 << bits) - 1);
        let mut window = self.end_window;
        let mut used = self.end_bits;

        if used + bits > WINDOW_SIZE {
            loop {
                self.write_byte_at_end((window & SYM_MAX) as u8);
                window >>= SYM_BITS;
                used -= SYM_BITS;

                if used < SYM_BITS {
                    break;
                }
            }
        }

        window |= fl << used;
        used += bits;

        self.end_window = window;
        self.end_bits = used;
        self.bits_total += bits;
    }

    /// Overwrites the first `nbits` bits of the stream after they were encoded.
    ///
    /// Lets a frame carry a few leading flags whose values are only known late
    /// in encoding. Those bits must have been coded with power-of-two
    /// probabilities. If fewer than `nbits` bits have been coded the sticky
    /// error is set to [`Error::NotEnoughBits`].
    ///
    /// # Panics
    ///
    /// * If `nbits > 8`
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_patch_initial_bits(&mut self, val: u32, nbits: u32) {
        assert!(nbits <= SYM_BITS, "cannot patch more than {SYM_BITS} bits");

        let shift = SYM_BITS - nbits;
        let mask = ((1_u32 << nbits) - 1) << shift;
        let val = (val << shift) & mask;

        if self.offs > 0 {
            self.buffer[0] = ((u32::from(self.buffer[0]) & !mask) | val) as u8;
        } else if let Some(rem) = self.rem {
            self.rem = Some(((u32::from(rem) & !mask) | val) as u8);
        } else if self.range <= (CODE_TOP >> nbits) {
            // Nothing has been shifted out yet; patch the top of the value.
            self.value = (self.value & !(mask << CODE_SHIFT)) | (val << CODE_SHIFT);
        } else {
            self.set_error(Error::NotEnoughBits(nbits));
        }
    }

    /// Shrinks the frame to `size` bytes, moving the raw bits written so far so
    /// that they end at the new capacity.
    ///
    /// # Panics
    ///
    /// * If `size` cannot hold the bytes already written or exceeds the current
    ///   capacity
    pub fn ec_enc_shrink(&mut self, size: usize) {
        assert!(
            self.offs + self.end_offs <= size && size <= self.storage,
            "cannot shrink {} byte frame holding {} bytes to {size} bytes",
            self.storage,
            self.offs + self.end_offs,
        );

        let start = self.storage - self.end_offs;
        self.buffer
            .copy_within(start..self.storage, size - self.end_offs);
        self.storage = size;
    }

    /// Finishes the frame, flushing all buffered state into the buffer.
    ///
    /// Outputs the fewest bits that make every symbol coded so far decode
    /// correctly regardless of what follows, then flushes the raw-bit window.
    /// The gap between the two regions is zeroed. A final partial raw-bit byte
    /// is ORed into the byte just before the raw-bit region, which may be the
    /// last range coder byte: its low bits are unused by the range coder.
    ///
    /// [`RangeEncoder::reset`] must be called before the encoder is reused.
    #[allow(clippy::cast_possible_truncation)]
    pub fn ec_enc_done(&mut self) {
        let mut l = CODE_BITS - ilog(self.range);
        let mut mask = (CODE_TOP - 1) >> l;
        let mut end = (self.value + mask) & !mask;

        if (end | mask) >= self.value + self.range {
            l += 1;
            mask >>= 1;
            end = (self.value + mask) & !mask;
        }

        // Low bits of the last range coder byte that carry no information.
        let spare = l.div_ceil(SYM_BITS) * SYM_BITS - l;

        while l > 0 {
            self.carry_out(end >> CODE_SHIFT);
            end = (end << SYM_BITS) & (CODE_TOP - 1);
            l = l.saturating_sub(SYM_BITS);
        }

        if self.rem.is_some() || self.ext > 0 {
            self.carry_out(0);
        }

        let mut window = self.end_window;
        let mut used = self.end_bits;

        while used >= SYM_BITS {
            self.write_byte_at_end((window & SYM_MAX) as u8);
            window >>= SYM_BITS;
            used -= SYM_BITS;
        }

        if self.error.is_none() {
            self.buffer[self.offs..self.storage - self.end_offs].fill(0);

            if used > 0 {
                if self.end_offs >= self.storage {
                    self.set_error(Error::CapacityOverflow {
                        storage: self.storage,
                    });
                } else {
                    if self.offs + self.end_offs >= self.storage && spare < used {
                        // The range coder data wins over the raw bits.
                        window &= (1 << spare) - 1;
                        self.set_error(Error::CapacityOverflow {
                            storage: self.storage,
                        });
                    }

                    self.buffer[self.storage - self.end_offs - 1] |= window as u8;
                }
            }
        }

        log::trace!(
            "range encoder done: range_bytes={} raw_bytes={} tell={} error={:?}",
            self.offs,
            self.end_offs + usize::from(used > 0),
            self.ec_tell(),
            self.error,
        );
    }

    /// Finishes the frame and returns the number of range coder bytes written.
    ///
    /// # Errors
    ///
    /// * Returns the sticky error if any data error was recorded while
    ///   encoding the frame
    pub fn finish(mut self) -> Result<usize> {
        self.ec_enc_done();
        self.error.map_or(Ok(self.offs), Err)
    }

    /// Returns the number of bytes written from the front of the buffer.
    ///
    /// Only final after [`RangeEncoder::ec_enc_done`].
    #[must_use]
    pub const fn ec_range_bytes(&self) -> usize {
        self.offs
    }

    /// Returns the number of whole bits used by the symbols encoded so far.
    ///
    /// Always rounds up, so the exact value never exceeds it. Matches
    /// [`crate::RangeDecoder::ec_tell`] at the same point of the stream.
    #[must_use]
    pub const fn ec_tell(&self) -> u32 {
        tell(self.bits_total, self.range)
    }

    /// Returns the bits used so far in units of 1/8 bit.
    #[must_use]
    pub fn ec_tell_frac(&self) -> u32 {
        tell_frac(self.bits_total, self.range)
    }

    /// Returns the current range.
    ///
    /// After [`RangeEncoder::ec_enc_done`] this equals the final range of a
    /// decoder that decoded the same symbols.
    #[must_use]
    pub const fn get_range(&self) -> u32 {
        self.range
    }

    /// Returns the current capacity of the frame in bytes.
    #[must_use]
    pub const fn storage(&self) -> usize {
        self.storage
    }

    /// Returns the first data error recorded, if any.
    #[must_use]
    pub const fn error(&self) -> Option<Error> {
        self.error
    }

    #[must_use]
    pub const fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
