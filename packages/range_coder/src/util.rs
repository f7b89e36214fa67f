use crate::BITRES;

/// Transition thresholds for the eighth-bit steps of [`tell_frac`].
const TELL_FRAC_CORRECTION: [u32; 8] = [35733, 38967, 42495, 46340, 50535, 55109, 60097, 65535];

/// Returns the number of bits needed to represent `x`, or `0` for `x == 0`.
///
/// This is `EC_ILOG()` from RFC 6716: `ilog(1) == 1`, `ilog(255) == 8`,
/// `ilog(256) == 9`.
#[must_use]
pub const fn ilog(x: u32) -> u32 {
    u32::BITS - x.leading_zeros()
}

/// Whole bits used so far, rounded up.
pub(crate) const fn tell(bits_total: u32, range: u32) -> u32 {
    bits_total.saturating_sub(ilog(range))
}

/// Bits used so far in units of 1/8 bit, rounded up.
///
/// Uses a linear estimate of `log2(range)` followed by a lookup of the exact
/// transition thresholds instead of the three squaring steps of the RFC
/// reference version. Both give identical results at this resolution.
pub(crate) fn tell_frac(bits_total: u32, range: u32) -> u32 {
    let bits = bits_total << BITRES;
    let mut l = ilog(range);
    let r = range >> (l - 16);
    let mut b = (r >> 12) - 8;
    if r > TELL_FRAC_CORRECTION[b as usize] {
        b += 1;
    }
    l = (l << 3) + b;
    bits.saturating_sub(l)
}
