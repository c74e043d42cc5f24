//! Power-of-two normalization for memory sizing suggestions.

/// Round `n` to the nearest power of two.
///
/// An exact tie between the two neighbouring powers resolves to the lower
/// one. Zero maps to zero: settings use it for "disabled" or "system
/// default", never for the smallest power of two.
pub fn round_to_power_of_two(n: u64) -> u64 {
    if n == 0 || n.is_power_of_two() {
        return n;
    }

    let lower = 1u64 << (63 - n.leading_zeros());
    let upper = match lower.checked_mul(2) {
        Some(upper) => upper,
        None => return lower,
    };

    if n - lower <= upper - n {
        lower
    } else {
        upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_sentinel() {
        assert_eq!(round_to_power_of_two(0), 0);
    }

    #[test]
    fn test_nearest_power() {
        assert_eq!(round_to_power_of_two(1), 1);
        assert_eq!(round_to_power_of_two(5), 4);
        assert_eq!(round_to_power_of_two(7), 8);
        assert_eq!(round_to_power_of_two(100), 128);
        assert_eq!(round_to_power_of_two(600), 512);
        assert_eq!(round_to_power_of_two(1_000_000), 1_048_576);
    }

    #[test]
    fn test_ties_round_down() {
        assert_eq!(round_to_power_of_two(3), 2);
        assert_eq!(round_to_power_of_two(6), 4);
        assert_eq!(round_to_power_of_two(12), 8);
        assert_eq!(round_to_power_of_two(768), 512);
    }

    #[test]
    fn test_top_of_range() {
        assert_eq!(round_to_power_of_two(u64::MAX), 1 << 63);
        assert_eq!(round_to_power_of_two((1 << 63) + 1), 1 << 63);
    }

    #[test]
    fn test_result_is_power_and_monotonic() {
        let mut previous = 0;
        for n in 1..5000u64 {
            let r = round_to_power_of_two(n);
            assert!(r.is_power_of_two(), "{} -> {}", n, r);
            assert!(r >= previous, "not monotonic at {}", n);
            previous = r;
        }
    }
}
