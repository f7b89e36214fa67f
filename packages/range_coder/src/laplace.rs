//! Laplace-distributed integer coding per RFC 6716 Section 4.3.2.1.
//!
//! CELT codes coarse band energy residuals with a discrete Laplace
//! distribution: `fs` is the probability of zero (out of 32768) and each
//! further magnitude is less likely by a factor of `decay / 16384`. The tail
//! beyond the representable decay has a flat minimum probability.
//!
//! Reference: <https://gitlab.xiph.org/xiph/opus/-/blob/34bba701ae97c913de719b1f7c10686f62cddb15/celt/laplace.c>

use crate::{RangeDecoder, RangeEncoder};

/// Minimum probability of any value, in 1/32768 units.
const LAPLACE_MINP: u32 = 1;
const LAPLACE_LOG_MINP: u32 = 0;
/// Number of values that are guaranteed at least `LAPLACE_MINP` each side.
const LAPLACE_NMIN: u32 = 16;
/// Precision of the Laplace model (`ft = 32768`).
const LAPLACE_BITS: u32 = 15;
const LAPLACE_FT: u32 = 1 << LAPLACE_BITS;

/// Frequency of the `+/-1` values given the frequency of zero.
const fn laplace_get_freq1(fs0: u32, decay: u32) -> u32 {
    let ft = LAPLACE_FT
        .saturating_sub(LAPLACE_MINP * (2 * LAPLACE_NMIN))
        .saturating_sub(fs0);
    (ft * 16384_u32.saturating_sub(decay)) >> 15
}

impl RangeEncoder<'_> {
    /// Encodes a Laplace-distributed value per RFC 6716 Section 4.3.2.1.
    ///
    /// Values too large for the model are clamped to the largest magnitude that
    /// still fits in the 15-bit frequency range.
    ///
    /// # Arguments
    ///
    /// * `value` - Signed value to encode
    /// * `fs` - Probability of zero (fs0 parameter from `e_prob_model`)
    /// * `decay` - Decay parameter for geometric distribution
    ///
    /// # Returns
    ///
    /// The value that was actually encoded, which the decoder will reproduce
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation
    )]
    pub fn ec_laplace_encode(&mut self, value: i32, fs: u32, decay: u32) -> i32 {
        let mut fl = 0;
        let mut fs = fs;
        let mut coded = value;

        if value != 0 {
            // -1 for negative values, 0 otherwise.
            let s = -i32::from(value < 0);
            let magnitude = (value + s) ^ s;

            fl = fs;
            fs = laplace_get_freq1(fs, decay);

            // Search the decaying part of the PDF.
            let mut i = 1;
            while fs > 0 && i < magnitude {
                fs *= 2;
                fl += fs + 2 * LAPLACE_MINP;
                fs = (fs * decay) >> 15;
                i += 1;
            }

            if fs == 0 {
                // Everything beyond that has probability LAPLACE_MINP.
                let mut ndi_max = ((LAPLACE_FT - fl + LAPLACE_MINP - 1) >> LAPLACE_LOG_MINP) as i32;
                ndi_max = (ndi_max - s) >> 1;
                let di = (magnitude - i).min(ndi_max - 1);

                fl = (fl as i32 + (2 * di + 1 + s) * LAPLACE_MINP as i32) as u32;
                fs = LAPLACE_MINP.min(LAPLACE_FT - fl);
                coded = (i + di + s) ^ s;
            } else {
                fs += LAPLACE_MINP;
                if s == 0 {
                    fl += fs;
                }
            }
        }

        if coded != value {
            log::trace!("laplace value {value} clamped to {coded}");
        }

        self.ec_encode_bin(fl, fl + fs, LAPLACE_BITS);

        coded
    }
}

impl RangeDecoder<'_> {
    /// Decodes a Laplace-distributed value per RFC 6716 Section 4.3.2.1.
    ///
    /// # Arguments
    ///
    /// * `fs` - Probability of zero (fs0 parameter from `e_prob_model`)
    /// * `decay` - Decay parameter for geometric distribution
    ///
    /// # Returns
    ///
    /// Signed integer from Laplace distribution
    #[allow(clippy::cast_possible_wrap)]
    pub fn ec_laplace_decode(&mut self, fs: u32, decay: u32) -> i32 {
        let mut val: i32 = 0;
        let fm = self.ec_decode_bin(LAPLACE_BITS);
        let mut fl: u32 = 0;
        let mut fs = fs;

        if fm >= fs {
            val += 1;
            fl = fs;
            fs = laplace_get_freq1(fs, decay) + LAPLACE_MINP;

            // Search the decaying part of the PDF.
            while fs > LAPLACE_MINP && fm >= fl + 2 * fs {
                fs *= 2;
                fl += fs;
                fs = ((fs - 2 * LAPLACE_MINP) * decay) >> 15;
                fs += LAPLACE_MINP;
                val += 1;
            }

            // Everything beyond that has probability LAPLACE_MINP.
            if fs <= LAPLACE_MINP {
                let di = (fm - fl) >> (LAPLACE_LOG_MINP + 1);
                val += di as i32;
                fl += 2 * di * LAPLACE_MINP;
            }

            if fm < fl + fs {
                val = -val;
            } else {
                fl += fs;
            }
        }

        self.ec_dec_update(fl, (fl + fs).min(LAPLACE_FT), LAPLACE_FT);

        val
    }
}
