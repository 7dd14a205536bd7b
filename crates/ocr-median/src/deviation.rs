//! `deviates()` (spec §4.F): relative-deviation threshold with the two
//! zero-answer special cases called out in §8's boundary behaviors.

use num_bigint::BigInt;

/// `true` iff `|new - old| / |old| > alpha_ppb / 1e9`, except:
/// `old == 0 && new == 0` is always `false`; `old == 0 && new != 0` is
/// always `true` (there is no "relative" change from a zero baseline).
pub fn deviates(alpha_ppb: u64, old: &BigInt, new: &BigInt) -> bool {
    if old.sign() == num_bigint::Sign::NoSign {
        return new.sign() != num_bigint::Sign::NoSign;
    }
    if alpha_ppb == 0 {
        return old != new;
    }
    let diff = (new - old).magnitude().clone();
    let old_abs = old.magnitude().clone();
    // |diff|/|old| > alpha_ppb/1e9  <=>  diff * 1e9 > alpha_ppb * |old|
    let lhs = diff * BigInt::from(1_000_000_000u64);
    let rhs = BigInt::from(alpha_ppb) * old_abs;
    lhs > rhs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_to_zero_never_deviates() {
        assert!(!deviates(1, &BigInt::from(0), &BigInt::from(0)));
    }

    #[test]
    fn zero_to_nonzero_always_deviates() {
        assert!(deviates(1, &BigInt::from(0), &BigInt::from(1)));
    }

    #[test]
    fn zero_alpha_is_any_change() {
        assert!(!deviates(0, &BigInt::from(5), &BigInt::from(5)));
        assert!(deviates(0, &BigInt::from(5), &BigInt::from(6)));
    }

    #[test]
    fn same_value_never_deviates() {
        assert!(!deviates(10_000_000, &BigInt::from(100), &BigInt::from(100)));
    }

    #[test]
    fn one_percent_threshold_boundary() {
        // alpha=1% (10_000_000 ppb). 5/100 = 5% > 1% => deviates.
        assert!(deviates(10_000_000, &BigInt::from(100), &BigInt::from(105)));
        // exactly at the threshold is not "over" it.
        assert!(!deviates(10_000_000, &BigInt::from(100), &BigInt::from(101)));
    }

    #[test]
    fn negative_old_uses_magnitude() {
        assert!(!deviates(10_000_000, &BigInt::from(-100), &BigInt::from(-100)));
        assert!(deviates(10_000_000, &BigInt::from(-100), &BigInt::from(-105)));
    }
}
